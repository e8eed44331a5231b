//! Schema bootstrap: creates the `SyncTableState` table on
//! first run. Out of scope for behavior beyond this — the collaborator that
//! bootstraps user-data table schema is the Translator's CreateTable path
//!, not this module.

use crate::builder::DbPool;
use crate::error::Result;
use crate::status_store::{MySqlStatusStore, SqliteStatusStore, StatusStore};

pub async fn bootstrap(pool: &DbPool) -> Result<()> {
    match pool {
        DbPool::Sqlite(_) => SqliteStatusStore.create_schema(pool).await,
        DbPool::MySql(_) => MySqlStatusStore.create_schema(pool).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AccountId, Hash160, Hash256};

    #[tokio::test]
    async fn bootstrap_creates_sync_table_state() {
        let pool = DbPool::Sqlite(sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap());
        bootstrap(&pool).await.unwrap();
        let store = SqliteStatusStore;
        assert!(store
            .insert_sync_db(&pool, "Orders", &Hash160([1u8; 20]), &AccountId::default(), 1, Hash256::ZERO, false)
            .await
            .unwrap());
    }
}
