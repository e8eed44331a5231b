//! Transaction-to-SQL Translator: deterministic translation of
//! a ledger transaction's payload into one or more Builder invocations.

use crate::builder::{DbPool, Dialect, ExecStatus, MySqlBuilder, OpenTransaction, SqlBuilder, SqliteBuilder};
use crate::error::{Result, TableSyncError};
use crate::field::{ColumnDescriptor, ColumnFlags, FieldValue};
use crate::ids::physical_table_name;
use crate::ledger::{LedgerTx, OpType, RoleFlags, TableEntry, TxOpcode};
use crate::statement::StatementKind;
use serde_json::Value as JsonValue;

/// Result of translating and executing one transaction: the dialect status
/// code plus the concatenated SQL text actually issued.
#[derive(Debug, Clone)]
pub struct TranslateOutcome {
    pub status: ExecStatus,
    pub sql_text: String,
}

fn new_builder(dialect: Dialect) -> Box<dyn SqlBuilder> {
    match dialect {
        Dialect::Sqlite => Box::new(SqliteBuilder::new()),
        Dialect::MySql => Box::new(MySqlBuilder::new()),
    }
}

/// Where a rendered statement actually executes: a fresh pool checkout (the
/// RPC/normal-replay path) or an already-open transaction (the buffered,
/// held-open-until-ledger-validation replay path). Sharing one code path
/// over both keeps the translation logic identical regardless of caller.
enum ExecTarget<'a> {
    Pool(&'a DbPool),
    Tx(&'a mut OpenTransaction),
}

impl<'a> ExecTarget<'a> {
    async fn run(&mut self, builder: &dyn SqlBuilder) -> Result<ExecStatus> {
        match self {
            ExecTarget::Pool(pool) => builder.exec_sql(pool).await,
            ExecTarget::Tx(tx) => builder.exec_in_tx(tx).await,
        }
    }
}

/// Opcodes that the Translator renders no SQL for: the ledger core already
/// validated them, and they affect ledger-level table metadata rather than
/// the replicated row data.
fn is_metadata_only(op: OpType) -> bool {
    matches!(op, OpType::RenameTable | OpType::Grant | OpType::Revoke)
}

fn required_flag(op: OpType) -> Option<RoleFlags> {
    match op {
        OpType::Insert => Some(RoleFlags::INSERT),
        OpType::Update => Some(RoleFlags::UPDATE),
        OpType::Delete => Some(RoleFlags::DELETE),
        _ => None,
    }
}

/// A row op requires the submitting account to hold the opcode's role flag in the
/// table's `Users` list. Table lifecycle opcodes are trusted (validated by
/// the ledger core) and are not re-checked here.
fn check_authorization(entry: &TableEntry, tx: &LedgerTx, op: OpType) -> Result<()> {
    let Some(flag) = required_flag(op) else {
        return Ok(());
    };
    match entry.user_flags(&tx.account) {
        Some(flags) if flags.contains(flag) => Ok(()),
        Some(_) => Err(TableSyncError::BadTableFlags),
        None => Err(TableSyncError::BadAuthNo),
    }
}

fn parse_raw(tx: &LedgerTx, op: OpType) -> Result<Vec<serde_json::Map<String, JsonValue>>> {
    let raw = match &tx.raw {
        Some(r) => r,
        None => {
            if op == OpType::DropTable {
                return Ok(Vec::new());
            }
            return Err(TableSyncError::MissingRaw);
        }
    };
    let parsed: JsonValue = serde_json::from_str(raw).map_err(|_| TableSyncError::RawNotArray)?;
    let arr = parsed.as_array().ok_or(TableSyncError::RawNotArray)?;
    let mut out = Vec::with_capacity(arr.len());
    for (i, elem) in arr.iter().enumerate() {
        let obj = elem
            .as_object()
            .ok_or(TableSyncError::RawElementNotObject(i))?;
        out.push(obj.clone());
    }
    Ok(out)
}

fn descriptor_from_create_entry(
    field_name: &str,
    entry: &serde_json::Map<String, JsonValue>,
) -> Result<ColumnDescriptor> {
    let type_name = entry
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| TableSyncError::BadFlags(field_name.to_string()))?;
    let length = entry.get("length").and_then(JsonValue::as_i64).unwrap_or(0) as i32;
    let zero_value = zero_value_for_type(type_name)
        .ok_or_else(|| TableSyncError::BadFlags(type_name.to_string()))?;
    let mut col = ColumnDescriptor::new(field_name, zero_value).with_length(length);
    if entry.contains_key("PK") {
        col.flags.insert(ColumnFlags::PK);
    }
    if entry.contains_key("NN") {
        col.flags.insert(ColumnFlags::NOT_NULL);
    }
    if entry.contains_key("UQ") {
        col.flags.insert(ColumnFlags::UNIQUE);
    }
    if entry.contains_key("AI") {
        col.flags.insert(ColumnFlags::AUTO_INCREMENT);
    }
    if entry.contains_key("index") {
        col.flags.insert(ColumnFlags::INDEX);
    }
    if let Some(default) = entry.get("default") {
        let text = match default {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        col = col.with_default(text);
    }
    Ok(col)
}

fn zero_value_for_type(type_name: &str) -> Option<FieldValue> {
    match type_name.to_ascii_lowercase().as_str() {
        "int" => Some(FieldValue::Int32(0)),
        "float" => Some(FieldValue::Float32(0.0)),
        "double" => Some(FieldValue::Float64(0.0)),
        "decimal" => Some(FieldValue::Decimal(Default::default(), None)),
        "text" => Some(FieldValue::Text(String::new())),
        "varchar" => Some(FieldValue::Varchar(String::new())),
        "blob" => Some(FieldValue::Blob(Vec::new())),
        "datetime" => Some(FieldValue::DateTime(0)),
        _ => None,
    }
}

fn descriptor_from_value(name: &str, value: &JsonValue) -> Result<ColumnDescriptor> {
    let fv = FieldValue::from_json_untyped(value)
        .ok_or_else(|| TableSyncError::BadFlags(name.to_string()))?;
    Ok(ColumnDescriptor::new(name, fv))
}

/// Entry point `execute_sql(tx)`. `dialect` and `pool` select
/// which live connection Inserts/Updates/Deletes/CreateTable execute
/// against; `entry` is the ledger-observed `TableEntry` used for the
/// authorization check on row ops (absent for table-lifecycle ops, which
/// the caller validates before ever reaching the Translator).
pub async fn execute_sql(
    tx: &LedgerTx,
    entry: Option<&TableEntry>,
    dialect: Dialect,
    pool: &DbPool,
) -> Result<TranslateOutcome> {
    execute(tx, entry, dialect, &mut ExecTarget::Pool(pool), Some(pool)).await
}

/// Same translation as `execute_sql`, but applied inside an already-open
/// transaction.
/// The mysql `AutoFillField` catalog check is skipped in this mode — it is
/// a read-only pre-bind sanity check, not something the transaction's
/// isolation needs to cover, and the open transaction has no pool reference
/// of its own to query information_schema with.
pub async fn execute_sql_in_tx(
    tx: &LedgerTx,
    entry: Option<&TableEntry>,
    dialect: Dialect,
    open_tx: &mut OpenTransaction,
) -> Result<TranslateOutcome> {
    execute(tx, entry, dialect, &mut ExecTarget::Tx(open_tx), None).await
}

async fn execute(
    tx: &LedgerTx,
    entry: Option<&TableEntry>,
    dialect: Dialect,
    target: &mut ExecTarget<'_>,
    catalog_pool: Option<&DbPool>,
) -> Result<TranslateOutcome> {
    if !matches!(tx.opcode(), TxOpcode::TableListSet | TxOpcode::SqlStatement) {
        return Err(TableSyncError::BadOpcode(tx.op_type));
    }
    let table_ref = tx
        .tables
        .first()
        .ok_or(TableSyncError::BadTablesField)?;
    if tx.tables.len() != 1 {
        return Err(TableSyncError::BadTablesField);
    }
    if table_ref.table_name.is_empty() {
        return Err(TableSyncError::EmptyTableName);
    }
    if table_ref.name_in_db.is_zero() {
        return Err(TableSyncError::ZeroNameInDb);
    }
    let physical = physical_table_name(&table_ref.name_in_db);

    let op = OpType::from_i32(tx.op_type).ok_or(TableSyncError::BadOpcode(tx.op_type))?;

    match entry {
        Some(entry) => check_authorization(entry, tx, op)?,
        // The table's ledger entry could not be read at all (the ledger
        // core has no record to check against) — a row op here has no
        // authorization to appeal to, so it is rejected rather than let
        // through by default. Lifecycle ops are trusted to the ledger core
        // either way and carry no role flag, so `required_flag` gates this.
        None if required_flag(op).is_some() => return Err(TableSyncError::BadAuthExist),
        None => {}
    }

    if is_metadata_only(op) {
        // Ledger-level metadata only; the Builder has nothing to emit.
        return Ok(TranslateOutcome {
            status: ExecStatus::Success,
            sql_text: String::new(),
        });
    }

    let rows = parse_raw(tx, op)?;

    match op {
        OpType::CreateTable => translate_create_table(&physical, &rows, dialect, target).await,
        OpType::DropTable => translate_drop_table(&physical, dialect, target).await,
        OpType::Insert => translate_insert(&physical, &rows, tx, dialect, target, catalog_pool).await,
        OpType::Update => translate_update(&physical, &rows, dialect, target).await,
        OpType::Delete => translate_delete(&physical, &rows, dialect, target).await,
        OpType::RenameTable | OpType::Grant | OpType::Revoke => unreachable!("handled above"),
    }
}

async fn translate_create_table(
    table: &str,
    rows: &[serde_json::Map<String, JsonValue>],
    dialect: Dialect,
    target: &mut ExecTarget<'_>,
) -> Result<TranslateOutcome> {
    let mut builder = new_builder(dialect);
    builder.set_kind(StatementKind::CreateTable);
    builder.add_table(table);
    for entry in rows {
        let field_name = entry
            .get("field")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| TableSyncError::BadFlags("field".to_string()))?;
        builder.add_field(descriptor_from_create_entry(field_name, entry)?);
    }
    let sql = builder.as_string()?;
    let status = target.run(builder.as_ref()).await?;
    Ok(TranslateOutcome { status, sql_text: sql })
}

async fn translate_drop_table(table: &str, dialect: Dialect, target: &mut ExecTarget<'_>) -> Result<TranslateOutcome> {
    let mut builder = new_builder(dialect);
    builder.set_kind(StatementKind::DropTable);
    builder.add_table(table);
    let sql = builder.as_string()?;
    let status = target.run(builder.as_ref()).await?;
    Ok(TranslateOutcome { status, sql_text: sql })
}

/// `AutoFillField`: a column auto-populated with the transaction's hash.
/// Presence of the target column is checked against the mysql information
/// schema before binding; sqlite has no catalog to check against, so the
/// check is dialect-gated.
async fn verify_auto_fill_column(table: &str, column: &str, dialect: Dialect, pool: &DbPool) -> Result<()> {
    if dialect != Dialect::MySql {
        return Ok(());
    }
    let DbPool::MySql(mysql_pool) = pool else {
        return Ok(());
    };
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = ? AND column_name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(mysql_pool)
    .await?;
    match row {
        Some((count,)) if count > 0 => Ok(()),
        _ => Err(TableSyncError::BadFlags(column.to_string())),
    }
}

async fn translate_insert(
    table: &str,
    rows: &[serde_json::Map<String, JsonValue>],
    tx: &LedgerTx,
    dialect: Dialect,
    target: &mut ExecTarget<'_>,
    catalog_pool: Option<&DbPool>,
) -> Result<TranslateOutcome> {
    if rows.is_empty() {
        return Err(TableSyncError::MissingFields(table.to_string(), StatementKind::Insert));
    }
    if let (Some(col), Some(pool)) = (&tx.auto_fill_field, catalog_pool) {
        verify_auto_fill_column(table, col, dialect, pool).await?;
    }
    let mut texts = Vec::with_capacity(rows.len());
    let mut status = ExecStatus::Success;
    for row in rows {
        let mut builder = new_builder(dialect);
        builder.set_kind(StatementKind::Insert);
        builder.add_table(table);
        for (col, value) in row {
            builder.add_field(descriptor_from_value(col, value)?);
        }
        if let Some(col) = &tx.auto_fill_field {
            if !row.contains_key(col) {
                builder.add_field(ColumnDescriptor::new(
                    col,
                    FieldValue::Blob(tx.tx_hash.0.to_vec()),
                ));
            }
        }
        texts.push(builder.as_string()?);
        status = target.run(builder.as_ref()).await?;
    }
    Ok(TranslateOutcome {
        status,
        sql_text: texts.join(";"),
    })
}

/// `[{col: newval, ...}, {col: cond, ...}, ...]` — element 0 is SET, the
/// rest are OR-of-AND conditions.
async fn translate_update(
    table: &str,
    rows: &[serde_json::Map<String, JsonValue>],
    dialect: Dialect,
    target: &mut ExecTarget<'_>,
) -> Result<TranslateOutcome> {
    let Some((set_row, cond_rows)) = rows.split_first() else {
        return Err(TableSyncError::MissingFields(table.to_string(), StatementKind::Update));
    };
    let mut builder = new_builder(dialect);
    builder.set_kind(StatementKind::Update);
    builder.add_table(table);
    for (col, value) in set_row {
        builder.add_field(descriptor_from_value(col, value)?);
    }
    for cond_row in cond_rows {
        let mut group = Vec::with_capacity(cond_row.len());
        for (col, value) in cond_row {
            group.push(descriptor_from_value(col, value)?);
        }
        builder.add_condition(group);
    }
    let sql = builder.as_string()?;
    let status = target.run(builder.as_ref()).await?;
    Ok(TranslateOutcome { status, sql_text: sql })
}

/// `[{col: cond, ...}, ...]` — each element is one AND group.
async fn translate_delete(
    table: &str,
    rows: &[serde_json::Map<String, JsonValue>],
    dialect: Dialect,
    target: &mut ExecTarget<'_>,
) -> Result<TranslateOutcome> {
    let mut builder = new_builder(dialect);
    builder.set_kind(StatementKind::Delete);
    builder.add_table(table);
    for cond_row in rows {
        let mut group = Vec::with_capacity(cond_row.len());
        for (col, value) in cond_row {
            group.push(descriptor_from_value(col, value)?);
        }
        builder.add_condition(group);
    }
    let sql = builder.as_string()?;
    let status = target.run(builder.as_ref()).await?;
    Ok(TranslateOutcome { status, sql_text: sql })
}

/// SELECT mode (spec §2 read-path data flow: "RPC handler → Translator in
/// SELECT mode → Builder → direct query → rows marshalled to JSON"). Raw
/// shape: `[[col, …], {cond: val, …}, …]` — element 0 is the optional
/// column list (absent or empty selects `*`), the rest are OR-of-AND
/// equality conditions, same as Update/Delete's condition rows. Only
/// equality-conjunction queries are supported (spec §1 Non-goals).
pub async fn execute_select(
    table_physical: &str,
    raw: &str,
    dialect: Dialect,
    pool: &DbPool,
) -> Result<Vec<serde_json::Map<String, JsonValue>>> {
    let parsed: JsonValue = serde_json::from_str(raw).map_err(|_| TableSyncError::RawNotArray)?;
    let arr = parsed.as_array().ok_or(TableSyncError::RawNotArray)?;

    let mut builder = new_builder(dialect);
    builder.set_kind(StatementKind::Select);
    builder.add_table(table_physical);

    let mut rest = arr.as_slice();
    if let Some(first) = arr.first() {
        if let Some(cols) = first.as_array() {
            for col in cols {
                let name = col.as_str().ok_or(TableSyncError::RawElementNotObject(0))?;
                builder.add_field(ColumnDescriptor::new(name, FieldValue::Int32(0)));
            }
            rest = &arr[1..];
        }
    }

    for (i, cond_row) in rest.iter().enumerate() {
        let obj = cond_row
            .as_object()
            .ok_or(TableSyncError::RawElementNotObject(i + 1))?;
        let mut group = Vec::with_capacity(obj.len());
        for (col, value) in obj {
            group.push(descriptor_from_value(col, value)?);
        }
        builder.add_condition(group);
    }

    builder.query_rows(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AccountId, Hash160, Hash256};
    use crate::ledger::TableRef;

    fn tx_with(op_type: i32, raw: Option<&str>) -> LedgerTx {
        LedgerTx {
            opcode_name: "SqlStatement".to_string(),
            op_type,
            account: AccountId::default(),
            tx_hash: Hash256::ZERO,
            last_ledger_seq: 10,
            tables: vec![TableRef {
                name_in_db: Hash160([0xab; 20]),
                table_name: "Orders".to_string(),
            }],
            raw: raw.map(str::to_string),
            auto_fill_field: None,
        }
    }

    async fn sqlite_pool() -> DbPool {
        DbPool::Sqlite(sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap())
    }

    /// A `TableEntry` granting the default test account every row-op role
    /// flag, for tests that exercise translation rather than authorization.
    fn full_access_entry() -> TableEntry {
        TableEntry {
            table_name: "Orders".to_string(),
            name_in_db: Hash160([0xab; 20]),
            deleted: false,
            txn_lgr_seq: 1,
            txn_ledger_hash: Hash256::ZERO,
            previous_txn_lgr_seq: 0,
            prev_txn_ledger_hash: Hash256::ZERO,
            txs: Vec::new(),
            users: vec![crate::ledger::TableUser {
                user: AccountId::default(),
                flags: RoleFlags(RoleFlags::INSERT.0 | RoleFlags::UPDATE.0 | RoleFlags::DELETE.0 | RoleFlags::SELECT.0),
            }],
        }
    }

    #[tokio::test]
    async fn create_insert_roundtrip_matches_scenario_a() {
        let pool = sqlite_pool().await;
        let create = tx_with(
            1,
            Some(r#"[{"field":"id","type":"int","PK":true},{"field":"name","type":"varchar","length":64}]"#),
        );
        let out = execute_sql(&create, None, Dialect::Sqlite, &pool).await.unwrap();
        assert_eq!(
            out.sql_text,
            "CREATE TABLE IF NOT EXISTS t_abababababababababababababababababababab (id INTEGER PRIMARY KEY , name TEXT )"
        );

        let mut insert = tx_with(6, Some(r#"[{"id":1,"name":"alice"},{"id":2,"name":"bob"}]"#));
        insert.opcode_name = "SqlStatement".to_string();
        let entry = full_access_entry();
        let out = execute_sql(&insert, Some(&entry), Dialect::Sqlite, &pool).await.unwrap();
        assert!(out.sql_text.contains("INSERT INTO"));
        assert!(out.sql_text.contains(';'));
    }

    #[tokio::test]
    async fn update_or_of_and_matches_scenario_b() {
        let pool = sqlite_pool().await;
        let create = tx_with(1, Some(r#"[{"field":"id","type":"int"},{"field":"name","type":"varchar"}]"#));
        execute_sql(&create, None, Dialect::Sqlite, &pool).await.unwrap();
        let entry = full_access_entry();
        execute_sql(
            &tx_with(6, Some(r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#)),
            Some(&entry),
            Dialect::Sqlite,
            &pool,
        )
        .await
        .unwrap();

        let update = tx_with(8, Some(r#"[{"name":"zed"},{"id":1},{"id":2}]"#));
        let out = execute_sql(&update, Some(&entry), Dialect::Sqlite, &pool).await.unwrap();
        assert_eq!(
            out.sql_text,
            "UPDATE t_abababababababababababababababababababab SET name=\"zed\" WHERE (id=1) OR (id=2)"
        );
    }

    #[tokio::test]
    async fn rejects_unknown_opcode() {
        let pool = sqlite_pool().await;
        let mut tx = tx_with(1, None);
        tx.opcode_name = "Payment".to_string();
        assert!(matches!(
            execute_sql(&tx, None, Dialect::Sqlite, &pool).await,
            Err(TableSyncError::BadOpcode(_))
        ));
    }

    #[tokio::test]
    async fn drop_table_requires_no_raw() {
        let pool = sqlite_pool().await;
        let create = tx_with(1, Some(r#"[{"field":"id","type":"int"}]"#));
        execute_sql(&create, None, Dialect::Sqlite, &pool).await.unwrap();
        let drop = tx_with(2, None);
        let out = execute_sql(&drop, None, Dialect::Sqlite, &pool).await.unwrap();
        assert_eq!(out.sql_text, "DROP TABLE IF EXISTS t_abababababababababababababababababababab");
    }

    #[tokio::test]
    async fn authorization_rejects_missing_role_flag() {
        let pool = sqlite_pool().await;
        let entry = TableEntry {
            table_name: "Orders".to_string(),
            name_in_db: Hash160([0xab; 20]),
            deleted: false,
            txn_lgr_seq: 1,
            txn_ledger_hash: Hash256::ZERO,
            previous_txn_lgr_seq: 0,
            prev_txn_ledger_hash: Hash256::ZERO,
            txs: Vec::new(),
            users: vec![crate::ledger::TableUser {
                user: AccountId::default(),
                flags: RoleFlags::SELECT,
            }],
        };
        let insert = tx_with(6, Some(r#"[{"id":1}]"#));
        let err = execute_sql(&insert, Some(&entry), Dialect::Sqlite, &pool).await.unwrap_err();
        assert!(matches!(err, TableSyncError::BadTableFlags));
    }

    #[tokio::test]
    async fn select_mode_applies_or_of_and_condition() {
        let pool = sqlite_pool().await;
        let create = tx_with(1, Some(r#"[{"field":"id","type":"int"},{"field":"name","type":"varchar"}]"#));
        execute_sql(&create, None, Dialect::Sqlite, &pool).await.unwrap();
        let entry = full_access_entry();
        execute_sql(
            &tx_with(6, Some(r#"[{"id":1,"name":"a"},{"id":2,"name":"b"},{"id":3,"name":"c"}]"#)),
            Some(&entry),
            Dialect::Sqlite,
            &pool,
        )
        .await
        .unwrap();

        let rows = execute_select(
            "t_abababababababababababababababababababab",
            r#"[["id","name"],{"id":1},{"id":2}]"#,
            Dialect::Sqlite,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn select_mode_without_column_list_selects_star() {
        let pool = sqlite_pool().await;
        let create = tx_with(1, Some(r#"[{"field":"id","type":"int"}]"#));
        execute_sql(&create, None, Dialect::Sqlite, &pool).await.unwrap();
        let entry = full_access_entry();
        execute_sql(&tx_with(6, Some(r#"[{"id":1}]"#)), Some(&entry), Dialect::Sqlite, &pool).await.unwrap();

        let rows = execute_select(
            "t_abababababababababababababababababababab",
            r#"[{"id":1}]"#,
            Dialect::Sqlite,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
