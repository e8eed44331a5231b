use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dotenv::dotenv;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use table_sync::config::{Config, DbKind};
use table_sync::ids::{AccountId, Hash160};
use table_sync::ledger::{LedgerSource, PeerOverlay, TableEntry, ValidatedLedger};
use table_sync::pool::DbConnectionPool;
use table_sync::replay::ReplayRegistry;
use table_sync::schema_bootstrap;
use table_sync::status_store::{MySqlStatusStore, SqliteStatusStore, StatusStore};
use table_sync::sync::SyncEngine;
use table_sync::wire::{GetLedgerSkip, GetTable};

/// Stands in for the consensus/ledger core this node would otherwise be
/// embedded in. A real deployment wires `LedgerSource` to that core's
/// existing ledger history and table-SLE reads; this process has neither,
/// so it reports an empty ledger and no table entries. Enough for the
/// Replay/Sync registries to start and idle without a panic, not enough to
/// replicate anything — that requires the real collaborator.
struct NoLedger;

#[async_trait]
impl LedgerSource for NoLedger {
    async fn validated_index(&self) -> u32 {
        0
    }

    async fn ledger_at(&self, _seq: u32) -> Option<ValidatedLedger> {
        None
    }

    async fn table_entry_at(&self, _seq: u32, _owner: &AccountId, _name_in_db: &Hash160) -> Option<TableEntry> {
        None
    }

    async fn has_transaction(&self, _hash: &table_sync::ids::Hash256) -> bool {
        false
    }
}

/// Stands in for the peer overlay. A real deployment wires `PeerOverlay` to
/// its existing peer-connection transport; this process has no peers.
struct NoPeers;

#[async_trait]
impl PeerOverlay for NoPeers {
    async fn active_peers(&self) -> Vec<String> {
        Vec::new()
    }

    async fn send_get_table(&self, _peer: &str, _req: GetTable) {}

    async fn send_get_ledger(&self, _peer: &str, _req: GetLedgerSkip) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let config_path = env::var("TABLE_SYNC_CONFIG").unwrap_or_else(|_| "table_sync.cfg".to_string());
    info!("Loading config from {}", config_path);
    let config = Config::load(&config_path).await?;

    let pool = match config.sync_db.kind {
        DbKind::Sqlite => {
            info!("Connecting to sqlite database {}...", config.sync_db.db);
            DbConnectionPool::connect_sqlite(&config.sync_db.db).await?
        }
        DbKind::MySql => {
            let url = env::var("TABLE_SYNC_MYSQL_URL").map_err(|_| "TABLE_SYNC_MYSQL_URL must be set")?;
            info!("Connecting to mysql database {}...", config.sync_db.db);
            DbConnectionPool::connect_mysql(&url).await?
        }
    };
    let pool = Arc::new(pool);

    let handle = pool.checkout();
    schema_bootstrap::bootstrap(handle.db_pool()).await?;

    let status_store: Arc<dyn StatusStore> = match config.sync_db.kind {
        DbKind::Sqlite => Arc::new(SqliteStatusStore),
        DbKind::MySql => Arc::new(MySqlStatusStore),
    };

    for table in &config.sync_tables {
        let name_in_db = status_store
            .is_name_in_db_exist(handle.db_pool(), &table.table_name, &table.owner)
            .await?;
        if name_in_db.is_none() {
            info!(
                "configured table {} ({}) has no persisted nameInDB yet, will register on its first transaction",
                table.table_name,
                table.owner.to_base58()
            );
        }
    }

    let ledger_source: Arc<dyn LedgerSource> = Arc::new(NoLedger);
    let peer_overlay: Arc<dyn PeerOverlay> = Arc::new(NoPeers);

    let sync_engine = SyncEngine::new(pool.clone(), ledger_source.clone(), peer_overlay, status_store.clone());
    let replay_registry = Arc::new(ReplayRegistry::new(
        pool.clone(),
        ledger_source,
        status_store,
        sync_engine.clone(),
    ));

    if config.auto_sync {
        sync_engine.start().await?;
    }

    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGTERM/Ctrl-C received, initiating graceful shutdown...");
                cancel_clone.cancel();
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    });

    info!("Starting table storage replication service...");

    let replay_token = cancel_token.clone();
    let replay_task = tokio::spawn(replay_registry.run_background(Duration::from_millis(500), replay_token));

    let sync_token = cancel_token.clone();
    let sync_task = tokio::spawn(sync_engine.clone().run_background(Duration::from_secs(1), sync_token));

    let _ = tokio::join!(replay_task, sync_task);

    info!("Shut down cleanly.");
    Ok(())
}
