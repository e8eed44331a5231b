//! Status Store: the `SyncTableState` bookkeeping table, one
//! row per table keyed by `(Owner, TableNameInDB)`. Dialect variants differ
//! only in literal SQL, matching the DDL split in `builder`.

use crate::builder::{DbPool, OpenTransaction};
use crate::error::Result;
use crate::ids::{AccountId, Hash160, Hash256};
use async_trait::async_trait;

/// One persisted `SyncTableState` row.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncState {
    pub table_name: String,
    pub table_name_in_db: Hash160,
    pub owner: AccountId,
    pub txn_ledger_seq: u32,
    pub txn_ledger_hash: Hash256,
    pub ledger_seq: u32,
    pub ledger_hash: Hash256,
    pub txn_update_hash: Hash256,
    pub deleted: bool,
    pub auto_sync: bool,
    pub previous_commit: String,
}

/// Shared capability contract implemented by `SqliteStatusStore` and
/// `MySqlStatusStore`. All operations are idempotent except
/// `insert_sync_db`, whose primary key `(Owner, TableNameInDB)` rejects
/// duplicates; errors are logged by the caller and returned as `Result`,
/// not raised as panics.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn create_schema(&self, pool: &DbPool) -> Result<()>;

    async fn read_sync_db(&self, pool: &DbPool, name_in_db: &Hash160) -> Result<Option<SyncState>>;

    async fn insert_sync_db(
        &self,
        pool: &DbPool,
        table_name: &str,
        name_in_db: &Hash160,
        owner: &AccountId,
        ledger_seq: u32,
        ledger_hash: Hash256,
        is_auto_sync: bool,
    ) -> Result<bool>;

    /// Full confirm: advances both the txn and ledger watermarks together.
    async fn update_full(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_ledger_seq: u32,
        txn_ledger_hash: Hash256,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool>;

    /// Progress-only: advances `LedgerHash`/`LedgerSeq` without a new
    /// row-affecting transaction.
    async fn update_progress(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool>;

    /// Interim: records `TxnUpdateHash` mid-batch, the sole recovery anchor
    /// for a partially-applied frame.
    async fn update_interim(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_update_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool>;

    /// Tombstone: sets `Deleted`, terminal for the row.
    async fn update_deleted(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        deleted: bool,
        previous_commit: &str,
    ) -> Result<bool>;

    async fn rename_record(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        new_table_name: &str,
    ) -> Result<bool>;

    async fn delete_record(&self, pool: &DbPool, owner: &AccountId, table_name: &str) -> Result<bool>;

    async fn is_exist(&self, pool: &DbPool, owner: &AccountId, name_in_db: &Hash160) -> Result<bool>;

    async fn is_name_in_db_exist(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<Hash160>>;

    /// Most recent `(TxnLedgerSeq, TxnLedgerHash)` across records for
    /// `(owner, table_name)`.
    async fn max_txn_info(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<(u32, Hash256)>>;

    /// Drives re-subscription at startup.
    async fn auto_list(&self, pool: &DbPool, auto_sync: bool) -> Result<Vec<(AccountId, String, bool)>>;

    async fn update_state_db(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        table_name: &str,
        auto_sync: bool,
    ) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct RawRow {
    #[sqlx(rename = "Owner")]
    owner: String,
    #[sqlx(rename = "TableName")]
    table_name: String,
    #[sqlx(rename = "TableNameInDB")]
    table_name_in_db: String,
    #[sqlx(rename = "TxnLedgerHash")]
    txn_ledger_hash: String,
    #[sqlx(rename = "TxnLedgerSeq")]
    txn_ledger_seq: i64,
    #[sqlx(rename = "LedgerHash")]
    ledger_hash: String,
    #[sqlx(rename = "LedgerSeq")]
    ledger_seq: i64,
    #[sqlx(rename = "TxnUpdateHash")]
    txn_update_hash: String,
    #[sqlx(rename = "Deleted")]
    deleted: i64,
    #[sqlx(rename = "AutoSync")]
    auto_sync: i64,
    #[sqlx(rename = "PreviousCommit")]
    previous_commit: String,
}

impl RawRow {
    fn into_state(self) -> SyncState {
        SyncState {
            table_name: self.table_name,
            table_name_in_db: Hash160::from_hex(&self.table_name_in_db).unwrap_or_default(),
            owner: AccountId::from_base58(&self.owner).unwrap_or_default(),
            txn_ledger_seq: self.txn_ledger_seq as u32,
            txn_ledger_hash: Hash256::from_hex(&self.txn_ledger_hash).unwrap_or_default(),
            ledger_seq: self.ledger_seq as u32,
            ledger_hash: Hash256::from_hex(&self.ledger_hash).unwrap_or_default(),
            txn_update_hash: Hash256::from_hex(&self.txn_update_hash).unwrap_or_default(),
            deleted: self.deleted != 0,
            auto_sync: self.auto_sync != 0,
            previous_commit: self.previous_commit,
        }
    }
}

/// `PRAGMA`-free sqlite DDL: TEXT affinity for the hash/identifier columns,
/// matching how `builder::sqlite` renders CreateTable for user tables.
pub struct SqliteStatusStore;

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn create_schema(&self, pool: &DbPool) -> Result<()> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS SyncTableState ( \
             Owner TEXT NOT NULL, TableName TEXT NOT NULL, TableNameInDB TEXT NOT NULL, \
             TxnLedgerHash TEXT NOT NULL, TxnLedgerSeq INTEGER NOT NULL, LedgerHash TEXT NOT NULL, \
             LedgerSeq INTEGER NOT NULL, TxnUpdateHash TEXT NOT NULL, Deleted INTEGER NOT NULL, \
             AutoSync INTEGER NOT NULL, PreviousCommit TEXT NOT NULL, \
             PRIMARY KEY (Owner, TableNameInDB))",
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn read_sync_db(&self, pool: &DbPool, name_in_db: &Hash160) -> Result<Option<SyncState>> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<RawRow> = sqlx::query_as(
            "SELECT Owner, TableName, TableNameInDB, TxnLedgerHash, TxnLedgerSeq, LedgerHash, \
             LedgerSeq, TxnUpdateHash, Deleted, AutoSync, PreviousCommit FROM SyncTableState \
             WHERE TableNameInDB = ?",
        )
        .bind(name_in_db.to_hex())
        .fetch_optional(conn)
        .await?;
        Ok(row.map(RawRow::into_state))
    }

    async fn insert_sync_db(
        &self,
        pool: &DbPool,
        table_name: &str,
        name_in_db: &Hash160,
        owner: &AccountId,
        ledger_seq: u32,
        ledger_hash: Hash256,
        is_auto_sync: bool,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "INSERT INTO SyncTableState \
             (Owner, TableName, TableNameInDB, TxnLedgerHash, TxnLedgerSeq, LedgerHash, LedgerSeq, \
              TxnUpdateHash, Deleted, AutoSync, PreviousCommit) \
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, 0, ?, '')",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .bind(name_in_db.to_hex())
        .bind(Hash256::ZERO.to_hex())
        .bind(ledger_hash.to_hex())
        .bind(ledger_seq as i64)
        .bind(Hash256::ZERO.to_hex())
        .bind(is_auto_sync as i64)
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_full(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_ledger_seq: u32,
        txn_ledger_hash: Hash256,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET TxnLedgerSeq = ?, TxnLedgerHash = ?, LedgerSeq = ?, \
             LedgerHash = ?, PreviousCommit = ? WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(txn_ledger_seq as i64)
        .bind(txn_ledger_hash.to_hex())
        .bind(ledger_seq as i64)
        .bind(ledger_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_progress(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET LedgerSeq = ?, LedgerHash = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(ledger_seq as i64)
        .bind(ledger_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_interim(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_update_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET TxnUpdateHash = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(txn_update_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_deleted(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        deleted: bool,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET Deleted = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(deleted as i64)
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn rename_record(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        new_table_name: &str,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("UPDATE SyncTableState SET TableName = ? WHERE Owner = ? AND TableNameInDB = ?")
            .bind(new_table_name)
            .bind(owner.to_base58())
            .bind(name_in_db.to_hex())
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }

    async fn delete_record(&self, pool: &DbPool, owner: &AccountId, table_name: &str) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("DELETE FROM SyncTableState WHERE Owner = ? AND TableName = ?")
            .bind(owner.to_base58())
            .bind(table_name)
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }

    async fn is_exist(&self, pool: &DbPool, owner: &AccountId, name_in_db: &Hash160) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM SyncTableState WHERE Owner = ? AND TableNameInDB = ?")
            .bind(owner.to_base58())
            .bind(name_in_db.to_hex())
            .fetch_one(conn)
            .await?;
        Ok(row.0 > 0)
    }

    async fn is_name_in_db_exist(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<Hash160>> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT TableNameInDB FROM SyncTableState WHERE Owner = ? AND TableName = ? AND Deleted = 0",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .fetch_optional(conn)
        .await?;
        Ok(row.and_then(|(hex,)| Hash160::from_hex(&hex)))
    }

    async fn max_txn_info(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<(u32, Hash256)>> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT TxnLedgerSeq, TxnLedgerHash FROM SyncTableState WHERE Owner = ? AND TableName = ? \
             ORDER BY TxnLedgerSeq DESC LIMIT 1",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .fetch_optional(conn)
        .await?;
        Ok(row.and_then(|(seq, hash)| Hash256::from_hex(&hash).map(|h| (seq as u32, h))))
    }

    async fn auto_list(&self, pool: &DbPool, auto_sync: bool) -> Result<Vec<(AccountId, String, bool)>> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT Owner, TableName, AutoSync FROM SyncTableState WHERE AutoSync = ? AND Deleted = 0",
        )
        .bind(auto_sync as i64)
        .fetch_all(conn)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(owner, name, auto)| AccountId::from_base58(&owner).ok().map(|o| (o, name, auto != 0)))
            .collect())
    }

    async fn update_state_db(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        table_name: &str,
        auto_sync: bool,
    ) -> Result<bool> {
        let DbPool::Sqlite(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("UPDATE SyncTableState SET AutoSync = ? WHERE Owner = ? AND TableName = ?")
            .bind(auto_sync as i64)
            .bind(owner.to_base58())
            .bind(table_name)
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }
}

/// MySQL variant: identical operations, `AUTO_INCREMENT`-free DDL using
/// `VARCHAR`/`BOOLEAN` column types in place of sqlite's dynamic typing.
pub struct MySqlStatusStore;

#[async_trait]
impl StatusStore for MySqlStatusStore {
    async fn create_schema(&self, pool: &DbPool) -> Result<()> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS SyncTableState ( \
             Owner VARCHAR(64) NOT NULL, TableName VARCHAR(255) NOT NULL, TableNameInDB VARCHAR(40) NOT NULL, \
             TxnLedgerHash VARCHAR(64) NOT NULL, TxnLedgerSeq BIGINT NOT NULL, LedgerHash VARCHAR(64) NOT NULL, \
             LedgerSeq BIGINT NOT NULL, TxnUpdateHash VARCHAR(64) NOT NULL, Deleted TINYINT NOT NULL, \
             AutoSync TINYINT NOT NULL, PreviousCommit VARCHAR(255) NOT NULL, \
             PRIMARY KEY (Owner, TableNameInDB))",
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn read_sync_db(&self, pool: &DbPool, name_in_db: &Hash160) -> Result<Option<SyncState>> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<RawRow> = sqlx::query_as(
            "SELECT Owner, TableName, TableNameInDB, TxnLedgerHash, TxnLedgerSeq, LedgerHash, \
             LedgerSeq, TxnUpdateHash, Deleted, AutoSync, PreviousCommit FROM SyncTableState \
             WHERE TableNameInDB = ?",
        )
        .bind(name_in_db.to_hex())
        .fetch_optional(conn)
        .await?;
        Ok(row.map(RawRow::into_state))
    }

    async fn insert_sync_db(
        &self,
        pool: &DbPool,
        table_name: &str,
        name_in_db: &Hash160,
        owner: &AccountId,
        ledger_seq: u32,
        ledger_hash: Hash256,
        is_auto_sync: bool,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "INSERT INTO SyncTableState \
             (Owner, TableName, TableNameInDB, TxnLedgerHash, TxnLedgerSeq, LedgerHash, LedgerSeq, \
              TxnUpdateHash, Deleted, AutoSync, PreviousCommit) \
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, 0, ?, '')",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .bind(name_in_db.to_hex())
        .bind(Hash256::ZERO.to_hex())
        .bind(ledger_hash.to_hex())
        .bind(ledger_seq as i64)
        .bind(Hash256::ZERO.to_hex())
        .bind(is_auto_sync as i64)
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_full(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_ledger_seq: u32,
        txn_ledger_hash: Hash256,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET TxnLedgerSeq = ?, TxnLedgerHash = ?, LedgerSeq = ?, \
             LedgerHash = ?, PreviousCommit = ? WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(txn_ledger_seq as i64)
        .bind(txn_ledger_hash.to_hex())
        .bind(ledger_seq as i64)
        .bind(ledger_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_progress(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        ledger_seq: u32,
        ledger_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET LedgerSeq = ?, LedgerHash = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(ledger_seq as i64)
        .bind(ledger_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_interim(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        txn_update_hash: Hash256,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET TxnUpdateHash = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(txn_update_hash.to_hex())
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn update_deleted(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        deleted: bool,
        previous_commit: &str,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query(
            "UPDATE SyncTableState SET Deleted = ?, PreviousCommit = ? \
             WHERE Owner = ? AND TableNameInDB = ?",
        )
        .bind(deleted as i64)
        .bind(previous_commit)
        .bind(owner.to_base58())
        .bind(name_in_db.to_hex())
        .execute(conn)
        .await;
        Ok(result.is_ok())
    }

    async fn rename_record(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        name_in_db: &Hash160,
        new_table_name: &str,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("UPDATE SyncTableState SET TableName = ? WHERE Owner = ? AND TableNameInDB = ?")
            .bind(new_table_name)
            .bind(owner.to_base58())
            .bind(name_in_db.to_hex())
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }

    async fn delete_record(&self, pool: &DbPool, owner: &AccountId, table_name: &str) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("DELETE FROM SyncTableState WHERE Owner = ? AND TableName = ?")
            .bind(owner.to_base58())
            .bind(table_name)
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }

    async fn is_exist(&self, pool: &DbPool, owner: &AccountId, name_in_db: &Hash160) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM SyncTableState WHERE Owner = ? AND TableNameInDB = ?")
            .bind(owner.to_base58())
            .bind(name_in_db.to_hex())
            .fetch_one(conn)
            .await?;
        Ok(row.0 > 0)
    }

    async fn is_name_in_db_exist(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<Hash160>> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT TableNameInDB FROM SyncTableState WHERE Owner = ? AND TableName = ? AND Deleted = 0",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .fetch_optional(conn)
        .await?;
        Ok(row.and_then(|(hex,)| Hash160::from_hex(&hex)))
    }

    async fn max_txn_info(
        &self,
        pool: &DbPool,
        table_name: &str,
        owner: &AccountId,
    ) -> Result<Option<(u32, Hash256)>> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT TxnLedgerSeq, TxnLedgerHash FROM SyncTableState WHERE Owner = ? AND TableName = ? \
             ORDER BY TxnLedgerSeq DESC LIMIT 1",
        )
        .bind(owner.to_base58())
        .bind(table_name)
        .fetch_optional(conn)
        .await?;
        Ok(row.and_then(|(seq, hash)| Hash256::from_hex(&hash).map(|h| (seq as u32, h))))
    }

    async fn auto_list(&self, pool: &DbPool, auto_sync: bool) -> Result<Vec<(AccountId, String, bool)>> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT Owner, TableName, AutoSync FROM SyncTableState WHERE AutoSync = ? AND Deleted = 0",
        )
        .bind(auto_sync as i64)
        .fetch_all(conn)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(owner, name, auto)| AccountId::from_base58(&owner).ok().map(|o| (o, name, auto != 0)))
            .collect())
    }

    async fn update_state_db(
        &self,
        pool: &DbPool,
        owner: &AccountId,
        table_name: &str,
        auto_sync: bool,
    ) -> Result<bool> {
        let DbPool::MySql(conn) = pool else {
            return Err(crate::error::TableSyncError::NoTable);
        };
        let result = sqlx::query("UPDATE SyncTableState SET AutoSync = ? WHERE Owner = ? AND TableName = ?")
            .bind(auto_sync as i64)
            .bind(owner.to_base58())
            .bind(table_name)
            .execute(conn)
            .await;
        Ok(result.is_ok())
    }
}

/// Full-confirm write issued against the Replay item's already-open DB
/// transaction, so the `SyncTableState` row lands in the same atomic unit
/// as the row data it describes (§4.5: "persist the new sync record ...
/// inside the same DB transaction, then issue the DB commit").
pub async fn update_full_in_tx(
    tx: &mut OpenTransaction,
    owner: &AccountId,
    name_in_db: &Hash160,
    txn_ledger_seq: u32,
    txn_ledger_hash: Hash256,
    ledger_seq: u32,
    ledger_hash: Hash256,
    previous_commit: &str,
) -> Result<()> {
    const SQL: &str = "UPDATE SyncTableState SET TxnLedgerSeq = ?, TxnLedgerHash = ?, LedgerSeq = ?, \
         LedgerHash = ?, PreviousCommit = ? WHERE Owner = ? AND TableNameInDB = ?";
    match tx {
        OpenTransaction::Sqlite(t) => {
            sqlx::query(SQL)
                .bind(txn_ledger_seq as i64)
                .bind(txn_ledger_hash.to_hex())
                .bind(ledger_seq as i64)
                .bind(ledger_hash.to_hex())
                .bind(previous_commit)
                .bind(owner.to_base58())
                .bind(name_in_db.to_hex())
                .execute(&mut **t)
                .await?;
        }
        OpenTransaction::MySql(t) => {
            sqlx::query(SQL)
                .bind(txn_ledger_seq as i64)
                .bind(txn_ledger_hash.to_hex())
                .bind(ledger_seq as i64)
                .bind(ledger_hash.to_hex())
                .bind(previous_commit)
                .bind(owner.to_base58())
                .bind(name_in_db.to_hex())
                .execute(&mut **t)
                .await?;
        }
    }
    Ok(())
}

/// Interim write: records `TxnUpdateHash` mid-frame, inside the same
/// per-tx transaction the operate-SQL worker holds open. The sole recovery
/// anchor for a partially-applied frame (§5 "Crash/restart semantics").
pub async fn update_interim_in_tx(
    tx: &mut OpenTransaction,
    owner: &AccountId,
    name_in_db: &Hash160,
    txn_update_hash: Hash256,
    previous_commit: &str,
) -> Result<()> {
    const SQL: &str = "UPDATE SyncTableState SET TxnUpdateHash = ?, PreviousCommit = ? \
         WHERE Owner = ? AND TableNameInDB = ?";
    match tx {
        OpenTransaction::Sqlite(t) => {
            sqlx::query(SQL)
                .bind(txn_update_hash.to_hex())
                .bind(previous_commit)
                .bind(owner.to_base58())
                .bind(name_in_db.to_hex())
                .execute(&mut **t)
                .await?;
        }
        OpenTransaction::MySql(t) => {
            sqlx::query(SQL)
                .bind(txn_update_hash.to_hex())
                .bind(previous_commit)
                .bind(owner.to_base58())
                .bind(name_in_db.to_hex())
                .execute(&mut **t)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sqlite_pool() -> DbPool {
        DbPool::Sqlite(sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn insert_then_read_roundtrips() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([1u8; 20]);
        let name_in_db = Hash160([2u8; 20]);
        assert!(store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 5, Hash256::ZERO, false)
            .await
            .unwrap());
        let state = store.read_sync_db(&pool, &name_in_db).await.unwrap().unwrap();
        assert_eq!(state.table_name, "Orders");
        assert_eq!(state.ledger_seq, 5);
        assert!(!state.deleted);
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([1u8; 20]);
        let name_in_db = Hash160([2u8; 20]);
        assert!(store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 5, Hash256::ZERO, false)
            .await
            .unwrap());
        assert!(!store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 6, Hash256::ZERO, false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn deleted_tombstone_is_terminal() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([3u8; 20]);
        let name_in_db = Hash160([4u8; 20]);
        store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 1, Hash256::ZERO, false)
            .await
            .unwrap();
        store.update_deleted(&pool, &owner, &name_in_db, true, "").await.unwrap();
        let state = store.read_sync_db(&pool, &name_in_db).await.unwrap().unwrap();
        assert!(state.deleted);
    }

    #[tokio::test]
    async fn auto_list_drives_resubscription() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([5u8; 20]);
        store
            .insert_sync_db(&pool, "Orders", &Hash160([6u8; 20]), &owner, 1, Hash256::ZERO, true)
            .await
            .unwrap();
        let list = store.auto_list(&pool, true).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].1, "Orders");
    }
}
