//! SQL Builder: dialect-specific textual SQL assembly and
//! parameter binding for the seven statement kinds. Two dialects —
//! `sqlite` and `mysql` — share one capability contract (`SqlBuilder`)
//! rather than an inheritance tree.

mod mysql;
mod render;
mod sqlite;

pub use mysql::MySqlBuilder;
pub use sqlite::SqliteBuilder;

use crate::condition::AndGroup;
use crate::error::{Result, TableSyncError};
use crate::field::ColumnDescriptor;
use crate::statement::{Statement, StatementKind};
use async_trait::async_trait;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

/// One logical database handle per dialect. Built by `DbConnectionPool`
/// (`pool.rs`); every Sync/Replay item owns one checked-out handle for its
/// lifetime.
#[derive(Clone)]
pub enum DbPool {
    Sqlite(sqlx::SqlitePool),
    MySql(sqlx::MySqlPool),
}

impl DbPool {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Sqlite(_) => Dialect::Sqlite,
            DbPool::MySql(_) => Dialect::MySql,
        }
    }

    /// Opens a new database transaction. The Replay item holds
    /// this open across every `put_elem` until the enclosing ledger is
    /// validated, then commits or rolls back the whole window at once.
    pub async fn begin(&self) -> Result<OpenTransaction> {
        match self {
            DbPool::Sqlite(p) => Ok(OpenTransaction::Sqlite(p.begin().await?)),
            DbPool::MySql(p) => Ok(OpenTransaction::MySql(p.begin().await?)),
        }
    }
}

/// A held-open database transaction, dialect-tagged. Owned exclusively by
/// one Replay item for the window between its first buffered statement and
/// its commit/rollback decision.
pub enum OpenTransaction {
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
    MySql(sqlx::Transaction<'static, sqlx::MySql>),
}

impl OpenTransaction {
    pub fn dialect(&self) -> Dialect {
        match self {
            OpenTransaction::Sqlite(_) => Dialect::Sqlite,
            OpenTransaction::MySql(_) => Dialect::MySql,
        }
    }

    pub async fn commit(self) -> Result<()> {
        match self {
            OpenTransaction::Sqlite(t) => t.commit().await?,
            OpenTransaction::MySql(t) => t.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        match self {
            OpenTransaction::Sqlite(t) => t.rollback().await?,
            OpenTransaction::MySql(t) => t.rollback().await?,
        }
        Ok(())
    }
}

/// The result of a non-SELECT execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    NormalError,
}

/// Shared capability contract implemented by `SqliteBuilder` and
/// `MySqlBuilder`. Mutators build up one `Statement` at a time; `as_string`
/// and `exec_sql` render/execute it.
#[async_trait]
pub trait SqlBuilder: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn add_table(&mut self, name: &str);
    fn add_field(&mut self, field: ColumnDescriptor);
    fn add_condition(&mut self, group: AndGroup);
    fn set_kind(&mut self, kind: StatementKind);
    fn clear(&mut self);

    fn statement(&self) -> &Statement;

    /// Renders the held statement as inlined, unparameterized SQL text.
    /// Diagnostic/logging/RPC-read-text use only — this path never touches
    /// a live table.
    fn as_string(&self) -> Result<String>;

    /// Renders and executes the held statement as parameterized SQL against
    /// a live connection. For `Insert`, one row is one array element in the
    /// Translator's Raw payload — the Translator calls this once per row
    /// and is responsible for the `;`-joined concatenation it returns to
    /// its own caller; `exec_sql` itself issues exactly one statement.
    async fn exec_sql(&self, pool: &DbPool) -> Result<ExecStatus>;

    /// Same rendering/binding as `exec_sql`, but against an already-open
    /// transaction instead of checking out a new connection from the pool.
    async fn exec_in_tx(&self, tx: &mut OpenTransaction) -> Result<ExecStatus>;

    /// Runs the held SELECT statement and marshals rows to JSON objects
    /// (the RPC read path).
    async fn query_rows(&self, pool: &DbPool) -> Result<Vec<JsonMap<String, JsonValue>>>;
}

pub(crate) fn require_table(stmt: &Statement) -> Result<&str> {
    stmt.tables.first().map(|s| s.as_str()).ok_or(TableSyncError::NoTable)
}

pub(crate) fn require_kind(stmt: &Statement) -> Result<StatementKind> {
    stmt.kind.ok_or(TableSyncError::NoTable)
}
