//! Storage Replay: per-table items that hold an open database transaction
//! across a window of ledger-applied SQL statements, and the registry that
//! drives them once each ledger validates.

use crate::builder::{Dialect, OpenTransaction};
use crate::error::{Result, TableSyncError};
use crate::ids::{AccountId, Hash160, Hash256};
use crate::ledger::{LedgerSource, LedgerTx, TableEntry};
use crate::pool::{DbConnectionPool, PoolHandle};
use crate::status_store::{self, StatusStore};
use crate::translator;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// A ledgers-applied-SQL window may not roll back further than this many
/// ledgers behind the current validated index when restoring from a prior
/// `SyncTableState` row; beyond that the table needs a fresh sync instead.
const MAX_RESTORE_GAP: u32 = 5;

/// One buffered, not-yet-confirmed transaction inside a Replay item's queue.
#[derive(Clone, Debug)]
struct TxInfo {
    account: AccountId,
    tx_hash: Hash256,
    last_ledger_seq: u32,
    committed: bool,
}

/// Outcome of one `do_job` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Commit,
    Rollback,
    Pending,
}

/// Told once a Replay item resolves, so the Sync Engine can resume feeding
/// this table. Implemented by the Sync Engine; named collaborator here to
/// keep the two registries from depending on each other's concrete types.
#[async_trait]
pub trait ResyncNotifier: Send + Sync {
    async fn restart_one_table(&self, owner: &AccountId, name_in_db: &Hash160, commit: bool);
}

/// Holds an open DB transaction over every SQL statement applied for one
/// table since its last confirmed ledger, until the confirmation protocol
/// resolves to a commit or a rollback.
pub struct ReplayItem {
    pub owner: AccountId,
    pub name_in_db: Hash160,
    pub table_name: String,
    dialect: Dialect,
    handle: PoolHandle,
    open_tx: Option<OpenTransaction>,
    session: Option<OwnedMutexGuard<()>>,
    queue: Vec<TxInfo>,
    txn_ledger_seq: u32,
    txn_ledger_hash: Hash256,
    ledger_seq: u32,
    ledger_hash: Hash256,
}

impl ReplayItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: AccountId,
        name_in_db: Hash160,
        table_name: String,
        handle: PoolHandle,
        txn_ledger_seq: u32,
        txn_ledger_hash: Hash256,
        ledger_seq: u32,
        ledger_hash: Hash256,
    ) -> ReplayItem {
        let dialect = handle.db_pool().dialect();
        ReplayItem {
            owner,
            name_in_db,
            table_name,
            dialect,
            handle,
            open_tx: None,
            session: None,
            queue: Vec::new(),
            txn_ledger_seq,
            txn_ledger_hash,
            ledger_seq,
            ledger_hash,
        }
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if self.open_tx.is_none() {
            self.session = Some(self.handle.lock_session_owned().await);
            self.open_tx = Some(self.handle.db_pool().begin().await?);
        }
        Ok(())
    }

    /// Offers a freshly-accepted transaction against this table. Row ops
    /// are translated and applied in the held-open transaction;
    /// metadata-only ops (Rename/Grant/Revoke) record a queue entry but
    /// emit no SQL, matching the Translator's own split.
    pub async fn put_elem(&mut self, tx: &LedgerTx, entry: Option<&TableEntry>) -> Result<()> {
        self.ensure_open().await?;
        let open_tx = self.open_tx.as_mut().expect("ensure_open leaves a transaction open");
        translator::execute_sql_in_tx(tx, entry, self.dialect, open_tx).await?;
        self.queue.push(TxInfo {
            account: tx.account,
            tx_hash: tx.tx_hash,
            last_ledger_seq: tx.last_ledger_seq,
            committed: false,
        });
        debug!(
            "replay[{}]: buffered tx {:?}, queue depth now {}",
            self.table_name,
            tx.tx_hash,
            self.queue.len()
        );
        Ok(())
    }

    /// Confirmation protocol, driven once per newly validated ledger:
    /// existence check, then successive check. Returns `Pending` when
    /// neither resolves and the transaction should stay open.
    pub async fn do_job(
        &mut self,
        current_validated_index: u32,
        ledger_source: &dyn LedgerSource,
    ) -> Result<ReplayOutcome> {
        if self.queue.is_empty() {
            return Ok(ReplayOutcome::Pending);
        }

        for item in &self.queue {
            if item.committed || item.last_ledger_seq > current_validated_index {
                continue;
            }
            if !ledger_source.has_transaction(&item.tx_hash).await {
                warn!(
                    "replay[{}]: tx {:?} unknown to the transaction master at ledger {}, rolling back",
                    self.table_name, item.tx_hash, current_validated_index
                );
                return Ok(ReplayOutcome::Rollback);
            }
        }

        let mut seq = self.ledger_seq + 1;
        while seq <= current_validated_index {
            let Some(ledger) = ledger_source.ledger_at(seq).await else {
                seq += 1;
                continue;
            };
            let matched_entry = ledger
                .table_entries
                .iter()
                .find(|e| e.name_in_db == self.name_in_db && e.previous_txn_lgr_seq == self.txn_ledger_seq);
            if let Some(entry) = matched_entry {
                for hash in &entry.txs {
                    match self.queue.iter_mut().find(|q| &q.tx_hash == hash) {
                        Some(q) => q.committed = true,
                        None => {
                            warn!(
                                "replay[{}]: ledger {} lists tx {:?} absent from our buffered queue, rolling back",
                                self.table_name, seq, hash
                            );
                            return Ok(ReplayOutcome::Rollback);
                        }
                    }
                }
                if self.queue.iter().all(|q| q.committed) {
                    self.txn_ledger_seq = entry.txn_lgr_seq;
                    self.txn_ledger_hash = entry.txn_ledger_hash;
                    self.ledger_seq = ledger.seq;
                    self.ledger_hash = ledger.hash;
                    return Ok(ReplayOutcome::Commit);
                }
            }
            seq += 1;
        }

        Ok(ReplayOutcome::Pending)
    }

    /// Persists the new sync record inside the still-open transaction, then
    /// commits it. Only valid to call after `do_job` returns `Commit`.
    pub async fn commit(mut self) -> Result<()> {
        let mut open_tx = self
            .open_tx
            .take()
            .ok_or_else(|| TableSyncError::Fatal("commit called with no open transaction".to_string()))?;
        status_store::update_full_in_tx(
            &mut open_tx,
            &self.owner,
            &self.name_in_db,
            self.txn_ledger_seq,
            self.txn_ledger_hash,
            self.ledger_seq,
            self.ledger_hash,
            &self.ledger_hash.to_hex(),
        )
        .await?;
        open_tx.commit().await?;
        self.session = None;
        info!(
            "replay[{}]: committed through ledger {} ({} tx)",
            self.table_name,
            self.ledger_seq,
            self.queue.len()
        );
        Ok(())
    }

    /// Discards every buffered statement.
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.open_tx.take() {
            tx.rollback().await?;
        }
        self.session = None;
        warn!(
            "replay[{}]: rolled back, {} buffered tx discarded",
            self.table_name,
            self.queue.len()
        );
        Ok(())
    }
}

/// Keyed by `nameInDB`, maps to an active Replay item. Owns the one
/// background worker that drives every item's confirmation protocol.
pub struct ReplayRegistry {
    items: Mutex<HashMap<Hash160, Arc<Mutex<ReplayItem>>>>,
    pool: Arc<DbConnectionPool>,
    ledger_source: Arc<dyn LedgerSource>,
    status_store: Arc<dyn StatusStore>,
    notifier: Arc<dyn ResyncNotifier>,
    ticking: AtomicBool,
}

impl ReplayRegistry {
    pub fn new(
        pool: Arc<DbConnectionPool>,
        ledger_source: Arc<dyn LedgerSource>,
        status_store: Arc<dyn StatusStore>,
        notifier: Arc<dyn ResyncNotifier>,
    ) -> ReplayRegistry {
        ReplayRegistry {
            items: Mutex::new(HashMap::new()),
            pool,
            ledger_source,
            status_store,
            notifier,
            ticking: AtomicBool::new(false),
        }
    }

    /// Dispatches a freshly-accepted transaction to its table's Replay
    /// item, creating one first if this is the table's first transaction
    /// since this node started (or since it last forgot the table).
    pub async fn init_item(&self, tx: &LedgerTx) -> Result<()> {
        let table_ref = tx.tables.first().ok_or(TableSyncError::BadTablesField)?;
        let name_in_db = table_ref.name_in_db;
        let table_name = table_ref.table_name.clone();
        let owner = tx.account;

        if let Some(existing) = self.items.lock().await.get(&name_in_db).cloned() {
            return existing.lock().await.put_elem(tx, self.current_entry(&owner, &name_in_db).await.as_ref()).await;
        }

        let validated_index = self.ledger_source.validated_index().await;
        let entry = self
            .ledger_source
            .table_entry_at(validated_index, &owner, &name_in_db)
            .await;
        let handle = self.pool.checkout();

        let prior = self.status_store.read_sync_db(handle.db_pool(), &name_in_db).await?;
        let item = match prior {
            Some(state) if !state.deleted => {
                let gap = validated_index.saturating_sub(state.ledger_seq);
                if gap > MAX_RESTORE_GAP {
                    warn!(
                        "replay: {} is {} ledgers behind (limit {}), needs a fresh sync instead of local restore",
                        table_name, gap, MAX_RESTORE_GAP
                    );
                    return Err(TableSyncError::SyncStall(state.ledger_seq));
                }
                // `TxnUpdateHash != 0` means the last session left a
                // partially-applied frame; the prior confirmed ledger's
                // actual hash is re-read rather than derived arithmetically.
                let (ledger_seq, ledger_hash) = if !state.txn_update_hash.is_zero() {
                    let rewound = state.ledger_seq.saturating_sub(1);
                    let hash = match self.ledger_source.ledger_at(rewound).await {
                        Some(l) => l.hash,
                        None => state.ledger_hash,
                    };
                    (rewound, hash)
                } else {
                    (state.ledger_seq, state.ledger_hash)
                };
                let mut item = ReplayItem::new(
                    owner,
                    name_in_db,
                    table_name.clone(),
                    handle,
                    state.txn_ledger_seq,
                    state.txn_ledger_hash,
                    ledger_seq,
                    ledger_hash,
                );
                item.put_elem(tx, entry.as_ref()).await?;
                item
            }
            _ => {
                let entry = entry
                    .clone()
                    .filter(|e| !e.deleted)
                    .ok_or(TableSyncError::NotFound(validated_index))?;
                let ledger_hash = match self.ledger_source.ledger_at(validated_index).await {
                    Some(l) => l.hash,
                    None => Hash256::ZERO,
                };
                let mut item = ReplayItem::new(
                    owner,
                    name_in_db,
                    table_name.clone(),
                    handle,
                    entry.txn_lgr_seq,
                    entry.txn_ledger_hash,
                    validated_index,
                    ledger_hash,
                );
                item.put_elem(tx, Some(&entry)).await?;
                item
            }
        };

        info!("replay: opened item for {} ({:?})", table_name, name_in_db);
        self.items.lock().await.insert(name_in_db, Arc::new(Mutex::new(item)));
        Ok(())
    }

    async fn current_entry(&self, owner: &AccountId, name_in_db: &Hash160) -> Option<TableEntry> {
        let validated_index = self.ledger_source.validated_index().await;
        self.ledger_source.table_entry_at(validated_index, owner, name_in_db).await
    }

    /// One tick of the background worker: iterates a consistent snapshot of
    /// the item map taken at entry (concurrent inserts during the tick are
    /// not observed by this tick, matching the registry's documented
    /// single-snapshot-per-tick semantics), calls `do_job` on each, and
    /// removes items that resolve. Re-entrant calls while a tick is already
    /// in flight are no-ops.
    pub async fn tick(&self) {
        if self.ticking.swap(true, Ordering::SeqCst) {
            return;
        }
        self.run_tick().await;
        self.ticking.store(false, Ordering::SeqCst);
    }

    async fn run_tick(&self) {
        let validated_index = self.ledger_source.validated_index().await;
        let snapshot: Vec<(Hash160, Arc<Mutex<ReplayItem>>)> = {
            let items = self.items.lock().await;
            items.iter().map(|(k, v)| (*k, v.clone())).collect()
        };

        for (name_in_db, item_lock) in snapshot {
            let outcome = {
                let mut item = item_lock.lock().await;
                item.do_job(validated_index, self.ledger_source.as_ref()).await
            };
            match outcome {
                Ok(ReplayOutcome::Pending) => {}
                Ok(ReplayOutcome::Commit) => {
                    self.resolve(name_in_db, item_lock, true).await;
                }
                Ok(ReplayOutcome::Rollback) => {
                    self.resolve(name_in_db, item_lock, false).await;
                }
                Err(e) => {
                    error!("replay: do_job failed for {:?}: {}", name_in_db, e);
                }
            }
        }
    }

    async fn resolve(&self, name_in_db: Hash160, item_lock: Arc<Mutex<ReplayItem>>, committed: bool) {
        self.items.lock().await.remove(&name_in_db);
        let Some(item) = Arc::try_unwrap(item_lock).ok() else {
            error!("replay: item for {:?} resolved while another handle was still live", name_in_db);
            return;
        };
        let item = item.into_inner();
        let owner = item.owner;
        let result = if committed { item.commit().await } else { item.rollback().await };
        if let Err(e) = result {
            error!("replay: failed to {} {:?}: {}", if committed { "commit" } else { "roll back" }, name_in_db, e);
        }
        self.notifier.restart_one_table(&owner, &name_in_db, committed).await;
    }

    /// Runs `tick` on `period`, stopping when `cancel` fires. Started once
    /// at node startup; `main.rs` holds the `CancellationToken` for
    /// graceful shutdown.
    pub async fn run_background(self: Arc<Self>, period: std::time::Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = cancel.cancelled() => {
                    info!("replay: background worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{TableRef, TableUser, ValidatedLedger};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::collections::HashMap as StdHashMap;

    struct FakeLedgerSource {
        validated: StdMutex<u32>,
        ledgers: StdMutex<StdHashMap<u32, ValidatedLedger>>,
        known_txs: StdMutex<Vec<Hash256>>,
        entries: StdMutex<StdHashMap<Hash160, TableEntry>>,
    }

    impl FakeLedgerSource {
        fn new() -> FakeLedgerSource {
            FakeLedgerSource {
                validated: StdMutex::new(0),
                ledgers: StdMutex::new(StdHashMap::new()),
                known_txs: StdMutex::new(Vec::new()),
                entries: StdMutex::new(StdHashMap::new()),
            }
        }

        fn push_ledger(&self, ledger: ValidatedLedger) {
            *self.validated.lock().unwrap() = ledger.seq;
            self.ledgers.lock().unwrap().insert(ledger.seq, ledger);
        }

        fn mark_known(&self, hash: Hash256) {
            self.known_txs.lock().unwrap().push(hash);
        }
    }

    #[async_trait]
    impl LedgerSource for FakeLedgerSource {
        async fn validated_index(&self) -> u32 {
            *self.validated.lock().unwrap()
        }

        async fn ledger_at(&self, seq: u32) -> Option<ValidatedLedger> {
            self.ledgers.lock().unwrap().get(&seq).cloned()
        }

        async fn table_entry_at(&self, _seq: u32, _owner: &AccountId, name_in_db: &Hash160) -> Option<TableEntry> {
            self.entries.lock().unwrap().get(name_in_db).cloned()
        }

        async fn has_transaction(&self, hash: &Hash256) -> bool {
            self.known_txs.lock().unwrap().contains(hash)
        }
    }

    async fn handle() -> PoolHandle {
        DbConnectionPool::connect_sqlite_memory().await.unwrap().checkout()
    }

    #[tokio::test]
    async fn commit_resolution_advances_watermarks() {
        let ledger_source = FakeLedgerSource::new();
        let owner = AccountId([1u8; 20]);
        let name_in_db = Hash160([2u8; 20]);
        let tx_hash = Hash256([9u8; 32]);

        let handle = handle().await;
        sqlx::query("CREATE TABLE t_0202020202020202020202020202020202020202 (id INTEGER)")
            .execute(handle.require_sqlite().unwrap())
            .await
            .unwrap();

        let mut item = ReplayItem::new(owner, name_in_db, "Orders".to_string(), handle, 5, Hash256::ZERO, 10, Hash256::ZERO);

        let tx = LedgerTx {
            opcode_name: "SqlStatement".to_string(),
            op_type: 6,
            account: owner,
            tx_hash,
            last_ledger_seq: 11,
            tables: vec![TableRef { name_in_db, table_name: "Orders".to_string() }],
            raw: Some(r#"[{"id":1}]"#.to_string()),
            auto_fill_field: None,
        };
        let entry = TableEntry {
            table_name: "Orders".to_string(),
            name_in_db,
            deleted: false,
            txn_lgr_seq: 5,
            txn_ledger_hash: Hash256::ZERO,
            previous_txn_lgr_seq: 0,
            prev_txn_ledger_hash: Hash256::ZERO,
            txs: Vec::new(),
            users: vec![TableUser { user: owner, flags: crate::ledger::RoleFlags::INSERT }],
        };
        item.put_elem(&tx, Some(&entry)).await.unwrap();

        ledger_source.mark_known(tx_hash);
        ledger_source.push_ledger(ValidatedLedger {
            seq: 11,
            hash: Hash256([7u8; 32]),
            table_entries: vec![TableEntry {
                table_name: "Orders".to_string(),
                name_in_db,
                deleted: false,
                txn_lgr_seq: 11,
                txn_ledger_hash: Hash256([8u8; 32]),
                previous_txn_lgr_seq: 5,
                prev_txn_ledger_hash: Hash256::ZERO,
                txs: vec![tx_hash],
                users: vec![TableUser { user: owner, flags: crate::ledger::RoleFlags::INSERT }],
            }],
        });

        let outcome = item.do_job(11, &ledger_source).await.unwrap();
        assert_eq!(outcome, ReplayOutcome::Commit);
        item.commit().await.unwrap();
    }

    #[tokio::test]
    async fn missing_transaction_master_entry_rolls_back() {
        let ledger_source = FakeLedgerSource::new();
        let owner = AccountId([1u8; 20]);
        let name_in_db = Hash160([3u8; 20]);

        let handle = handle().await;
        handle
            .require_sqlite()
            .unwrap()
            .execute("CREATE TABLE t_0303030303030303030303030303030303030303 (id INTEGER)")
            .await
            .unwrap();

        let mut item = ReplayItem::new(owner, name_in_db, "Orders".to_string(), handle, 5, Hash256::ZERO, 10, Hash256::ZERO);
        let tx = LedgerTx {
            opcode_name: "SqlStatement".to_string(),
            op_type: 6,
            account: owner,
            tx_hash: Hash256([5u8; 32]),
            last_ledger_seq: 11,
            tables: vec![TableRef { name_in_db, table_name: "Orders".to_string() }],
            raw: Some(r#"[{"id":1}]"#.to_string()),
            auto_fill_field: None,
        };
        let entry = TableEntry {
            table_name: "Orders".to_string(),
            name_in_db,
            deleted: false,
            txn_lgr_seq: 5,
            txn_ledger_hash: Hash256::ZERO,
            previous_txn_lgr_seq: 0,
            prev_txn_ledger_hash: Hash256::ZERO,
            txs: Vec::new(),
            users: vec![TableUser { user: owner, flags: crate::ledger::RoleFlags::INSERT }],
        };
        item.put_elem(&tx, Some(&entry)).await.unwrap();

        let outcome = item.do_job(11, &ledger_source).await.unwrap();
        assert_eq!(outcome, ReplayOutcome::Rollback);
        item.rollback().await.unwrap();
    }
}
