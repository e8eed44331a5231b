use super::render::render;
use super::{DbPool, Dialect, ExecStatus, OpenTransaction, SqlBuilder};
use crate::condition::AndGroup;
use crate::error::{Result, TableSyncError};
use crate::field::{ColumnDescriptor, FieldValue};
use crate::statement::{Statement, StatementKind};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::{Column, MySqlPool, Row};

#[derive(Default)]
pub struct MySqlBuilder {
    stmt: Statement,
}

impl MySqlBuilder {
    pub fn new() -> Self {
        MySqlBuilder::default()
    }

    fn mysql_pool<'a>(&self, pool: &'a DbPool) -> Result<&'a MySqlPool> {
        match pool {
            DbPool::MySql(p) => Ok(p),
            DbPool::Sqlite(_) => Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "MySqlBuilder given a Sqlite pool".into(),
            ))),
        }
    }
}

fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    params: &'q [FieldValue],
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    for value in params {
        query = match value {
            FieldValue::Int32(v) => query.bind(*v),
            FieldValue::Int64(v) => query.bind(*v),
            FieldValue::Float32(v) => query.bind(*v),
            FieldValue::Float64(v) => query.bind(*v),
            FieldValue::Decimal(v, _) => query.bind(v.to_string()),
            FieldValue::DateTime(v) => query.bind(*v),
            FieldValue::String(s) | FieldValue::Varchar(s) | FieldValue::Text(s) => query.bind(s.clone()),
            FieldValue::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

#[async_trait]
impl SqlBuilder for MySqlBuilder {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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
        let (sql, _) = render(Dialect::MySql, &self.stmt, true)?;
        Ok(sql)
    }

    async fn exec_sql(&self, pool: &DbPool) -> Result<ExecStatus> {
        let mysql_pool = self.mysql_pool(pool)?;
        let (sql, params) = render(Dialect::MySql, &self.stmt, false)?;
        if sql.is_empty() {
            return Ok(ExecStatus::Success);
        }
        let query = bind_mysql(sqlx::query(&sql), &params);
        match query.execute(mysql_pool).await {
            Ok(_) => Ok(ExecStatus::Success),
            Err(e) => {
                log::warn!("mysql exec failed: {} (sql: {})", e, sql);
                Err(TableSyncError::Driver(e))
            }
        }
    }

    async fn exec_in_tx(&self, tx: &mut OpenTransaction) -> Result<ExecStatus> {
        let OpenTransaction::MySql(txn) = tx else {
            return Err(TableSyncError::Driver(sqlx::Error::Configuration(
                "MySqlBuilder given a non-mysql transaction".into(),
            )));
        };
        let (sql, params) = render(Dialect::MySql, &self.stmt, false)?;
        if sql.is_empty() {
            return Ok(ExecStatus::Success);
        }
        let query = bind_mysql(sqlx::query(&sql), &params);
        match query.execute(&mut *txn).await {
            Ok(_) => Ok(ExecStatus::Success),
            Err(e) => {
                log::warn!("mysql exec (in tx) failed: {} (sql: {})", e, sql);
                Err(TableSyncError::Driver(e))
            }
        }
    }

    async fn query_rows(&self, pool: &DbPool) -> Result<Vec<JsonMap<String, JsonValue>>> {
        let mysql_pool = self.mysql_pool(pool)?;
        let (sql, _) = render(Dialect::MySql, &self.stmt, true)?;
        let rows = sqlx::query(&sql).fetch_all(mysql_pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &sqlx::mysql::MySqlRow) -> JsonMap<String, JsonValue> {
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
    use crate::field::FieldValue;

    #[test]
    fn as_string_uses_mysql_column_types() {
        let mut b = MySqlBuilder::new();
        b.set_kind(StatementKind::CreateTable);
        b.add_table("t_abc");
        b.add_field(ColumnDescriptor::new("id", FieldValue::Int32(0)));
        assert_eq!(b.as_string().unwrap(), "CREATE TABLE IF NOT EXISTS t_abc (id INT )");
    }
}
