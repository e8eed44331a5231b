use super::render::render;
use super::{DbPool, Dialect, ExecStatus, OpenTransaction, SqlBuilder};
use crate::condition::AndGroup;
use crate::error::{Result, TableSyncError};
use crate::field::{ColumnDescriptor, FieldValue};
use crate::statement::{Statement, StatementKind};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::{Column, Row, SqlitePool};

#[derive(Default)]
pub struct SqliteBuilder {
    stmt: Statement,
}

impl SqliteBuilder {
    pub fn new() -> Self {
        SqliteBuilder::default()
    }

    fn sqlite_pool<'a>(&self, pool: &'a DbPool) -> Result<&'a SqlitePool> {
        match pool {
            DbPool::Sqlite(p) => Ok(p),
            DbPool::MySql(_) => Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "SqliteBuilder given a MySql pool".into(),
            ))),
        }
    }
}

fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [FieldValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for value in params {
        query = match value {
            FieldValue::Int32(v) => query.bind(*v),
            FieldValue::Int64(v) => query.bind(*v),
            FieldValue::Float32(v) => query.bind(*v),
            FieldValue::Float64(v) => query.bind(*v),
            FieldValue::Decimal(v, _) => query.bind(v.to_string()),
            FieldValue::DateTime(v) => query.bind(*v),
            FieldValue::String(s) | FieldValue::Varchar(s) | FieldValue::Text(s) => query.bind(s.as_str()),
            FieldValue::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}

#[async_trait]
impl SqlBuilder for SqliteBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn add_table(&mut self, name: &str) {
        self.stmt.add_table(name);
    }

    fn add_field(&mut self, field: ColumnDescriptor) {
        self.stmt.add_field(field);
    }

    fn add_condition(&mut self, group: AndGroup) {
        self.stmt.add_condition(group);
    }

    fn set_kind(&mut self, kind: StatementKind) {
        self.stmt.kind = Some(kind);
    }

    fn clear(&mut self) {
        self.stmt.clear();
    }

    fn statement(&self) -> &Statement {
        &self.stmt
    }

    fn as_string(&self) -> Result<String> {
        let (sql, _) = render(Dialect::Sqlite, &self.stmt, true)?;
        Ok(sql)
    }

    async fn exec_sql(&self, pool: &DbPool) -> Result<ExecStatus> {
        let sqlite_pool = self.sqlite_pool(pool)?;
        let (sql, params) = render(Dialect::Sqlite, &self.stmt, false)?;
        if sql.is_empty() {
            return Ok(ExecStatus::Success);
        }
        let query = bind_sqlite(sqlx::query(&sql), &params);
        match query.execute(sqlite_pool).await {
            Ok(_) => Ok(ExecStatus::Success),
            Err(e) => {
                log::warn!("sqlite exec failed: {} (sql: {})", e, sql);
                Err(TableSyncError::Driver(e))
            }
        }
    }

    async fn exec_in_tx(&self, tx: &mut OpenTransaction) -> Result<ExecStatus> {
        let OpenTransaction::Sqlite(txn) = tx else {
            return Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "SqliteBuilder given a non-sqlite transaction".into(),
            )));
        };
        let (sql, params) = render(Dialect::Sqlite, &self.stmt, false)?;
        if sql.is_empty() {
            return Ok(ExecStatus::Success);
        }
        let query = bind_sqlite(sqlx::query(&sql), &params);
        match query.execute(&mut *txn).await {
            Ok(_) => Ok(ExecStatus::Success),
            Err(e) => {
                log::warn!("sqlite exec (in tx) failed: {} (sql: {})", e, sql);
                Err(TableSyncError::Driver(e))
            }
        }
    }

    async fn query_rows(&self, pool: &DbPool) -> Result<Vec<JsonMap<String, JsonValue>>> {
        let sqlite_pool = self.sqlite_pool(pool)?;
        let (sql, _) = render(Dialect::Sqlite, &self.stmt, true)?;
        let rows = sqlx::query(&sql).fetch_all(sqlite_pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> JsonMap<String, JsonValue> {
    let mut map = JsonMap::new();
    for col in row.columns() {
        let name = col.name().to_string();
        let value = row
            .try_get::<i64, _>(col.ordinal())
            .map(JsonValue::from)
            .or_else(|_| row.try_get::<f64, _>(col.ordinal()).map(JsonValue::from))
            .or_else(|_| row.try_get::<String, _>(col.ordinal()).map(JsonValue::from))
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(col.ordinal())
                    .map(|b| JsonValue::String(hex::encode(b)))
            })
            .unwrap_or(JsonValue::Null);
        map.insert(name, value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ColumnFlags, FieldValue};

    #[tokio::test]
    async fn create_insert_select_roundtrip() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let db = DbPool::Sqlite(pool);

        let mut create = SqliteBuilder::new();
        create.set_kind(StatementKind::CreateTable);
        create.add_table("t_test");
        create.add_field(ColumnDescriptor::new("id", FieldValue::Int32(0)).with_flag(ColumnFlags::PK));
        create.add_field(ColumnDescriptor::new("name", FieldValue::Varchar(String::new())).with_length(64));
        assert_eq!(create.exec_sql(&db).await.unwrap(), ExecStatus::Success);

        for (id, name) in [(1, "alice"), (2, "bob")] {
            let mut insert = SqliteBuilder::new();
            insert.set_kind(StatementKind::Insert);
            insert.add_table("t_test");
            insert.add_field(ColumnDescriptor::new("id", FieldValue::Int32(id)));
            insert.add_field(ColumnDescriptor::new("name", FieldValue::Varchar(name.to_string())));
            insert.exec_sql(&db).await.unwrap();
        }

        let mut select = SqliteBuilder::new();
        select.set_kind(StatementKind::Select);
        select.add_table("t_test");
        let rows = select.query_rows(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], JsonValue::String("alice".into()));
    }

    #[test]
    fn as_string_never_touches_db() {
        let mut b = SqliteBuilder::new();
        b.set_kind(StatementKind::Select);
        b.add_table("t_test");
        assert_eq!(b.as_string().unwrap(), "SELECT * FROM t_test");
    }
}
