//! Connection pooling. The source
//! this crate replaces passes raw pointers into long-lived members; here one
//! `DbConnectionPool` owns the dialect's underlying `sqlx` pool, and each
//! Sync/Replay item checks out one `PoolHandle` for its lifetime. The handle
//! serializes access with a session lock rather than handing out the bare
//! `sqlx` pool, so two callers sharing a handle (which should not happen,
//! but the type does not prevent it) cannot interleave statements that are
//! meant to run as one logical unit.

use crate::builder::{DbPool, Dialect};
use crate::error::{Result, TableSyncError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Owns the one dialect pool for this node. Constructed once at startup from
/// `config::SyncDbConfig`.
pub struct DbConnectionPool {
    inner: DbPool,
}

impl DbConnectionPool {
    pub async fn connect_sqlite(db_path: &str) -> Result<DbConnectionPool> {
        let url = format!("sqlite://{}?mode=rwc", db_path);
        let pool = sqlx::SqlitePool::connect(&url).await?;
        Ok(DbConnectionPool { inner: DbPool::Sqlite(pool) })
    }

    pub async fn connect_sqlite_memory() -> Result<DbConnectionPool> {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await?;
        Ok(DbConnectionPool { inner: DbPool::Sqlite(pool) })
    }

    pub async fn connect_mysql(url: &str) -> Result<DbConnectionPool> {
        let pool = sqlx::MySqlPool::connect(url).await?;
        Ok(DbConnectionPool { inner: DbPool::MySql(pool) })
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    /// Checks out one handle. Every Sync/Replay item calls this exactly once
    /// and keeps the handle for its lifetime.
    pub fn checkout(&self) -> PoolHandle {
        PoolHandle {
            pool: self.inner.clone(),
            session: Arc::new(Mutex::new(())),
        }
    }
}

/// A checked-out handle to the pool. Cheap to clone (the underlying `sqlx`
/// pool is itself a cloneable connection-pool handle); `session` is the
/// serializing lock a caller takes before issuing a sequence of statements
/// that must not interleave with another caller's sequence on this handle.
#[derive(Clone)]
pub struct PoolHandle {
    pool: DbPool,
    session: Arc<Mutex<()>>,
}

impl PoolHandle {
    pub fn db_pool(&self) -> &DbPool {
        &self.pool
    }

    /// Acquires the serializing session lock. Hold the guard for the
    /// duration of one logical unit of work (e.g. an open DB transaction in
    /// the Replay item, or one frame's worth of applies in the Sync item).
    pub async fn lock_session(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.session.lock().await
    }

    /// Same lock, owned rather than borrowed. Needed by callers that hold
    /// the guard as a struct field across an open transaction's lifetime
    /// (the Replay item) rather than within one function body.
    pub async fn lock_session_owned(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.session.clone().lock_owned().await
    }

    pub fn require_sqlite(&self) -> Result<&sqlx::SqlitePool> {
        match &self.pool {
            DbPool::Sqlite(p) => Ok(p),
            DbPool::MySql(_) => Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "handle is not a sqlite pool".into(),
            ))),
        }
    }

    pub fn require_mysql(&self) -> Result<&sqlx::MySqlPool> {
        match &self.pool {
            DbPool::MySql(p) => Ok(p),
            DbPool::Sqlite(_) => Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "handle is not a mysql pool".into(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_yields_independent_handles_over_one_pool() {
        let pool = DbConnectionPool::connect_sqlite_memory().await.unwrap();
        let a = pool.checkout();
        let b = pool.checkout();
        let _guard_a = a.lock_session().await;
        // b's session lock is independent of a's: does not deadlock.
        let _guard_b = b.lock_session().await;
    }
}
