//! RPC handlers (spec §6 "External Interfaces"). The RPC transport itself
//! is a named collaborator out of scope for this crate (spec §1); what's in
//! scope is the three handlers' request/response shapes and the part of
//! their behavior that lives entirely in this crate — `r_get`'s replay
//! through the Translator's SELECT mode, and `g_dbname`'s Status Store
//! lookup. `t_create` only goes as far as building the hex-encoded Raw
//! payload a real submission path (signing/fee/admission, also out of
//! scope) would attach to a `TableListSet` transaction.

use crate::builder::{DbPool, Dialect};
use crate::error::{Result, TableSyncError};
use crate::ids::{compute_name_in_db, physical_table_name, AccountId, Hash160};
use crate::status_store::StatusStore;
use crate::translator;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// `t_create` request: the column-spec document is read from `raw_path` on
/// disk and hex-encoded, matching the teacher's own file-reading style in
/// `config::Config::load`.
#[derive(Clone, Debug)]
pub struct TCreateRequest {
    pub owner: AccountId,
    pub table_name: String,
    pub raw_path: std::path::PathBuf,
}

/// The hex-encoded Raw payload plus the `nameInDB` this table will be
/// created under — everything a submission layer needs to assemble the
/// actual `TableListSet` transaction, which this crate does not sign or
/// submit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TCreateResponse {
    pub name_in_db: String,
    pub table_name: String,
    pub raw_hex: String,
}

/// Reads the column-spec document at `req.raw_path`, hex-encodes it, and
/// derives the `nameInDB` this table would be created under at
/// `creation_ledger_seq` (the ledger core — a named collaborator — assigns
/// the real creation sequence at commit time; the caller supplies its best
/// current guess, typically the next ledger to close).
pub async fn t_create(req: &TCreateRequest, creation_ledger_seq: u32) -> Result<TCreateResponse> {
    if req.table_name.is_empty() {
        return Err(TableSyncError::EmptyTableName);
    }
    let bytes = tokio::fs::read(&req.raw_path)
        .await
        .map_err(|e| TableSyncError::Config(e.to_string()))?;
    // Validate the file actually holds the CreateTable Raw shape (spec
    // §4.3 table) before committing to a hex encoding nobody can parse back.
    let parsed: JsonValue =
        serde_json::from_slice(&bytes).map_err(|_| TableSyncError::RawNotArray)?;
    if !parsed.is_array() {
        return Err(TableSyncError::RawNotArray);
    }
    let name_in_db = compute_name_in_db(creation_ledger_seq, &req.owner, &req.table_name);
    Ok(TCreateResponse {
        name_in_db: name_in_db.to_hex(),
        table_name: req.table_name.clone(),
        raw_hex: hex::encode(&bytes),
    })
}

/// `r_get` request. `raw` carries `"[[col,…],{cond:val,…},…]"` — the same
/// optional-column-list-then-OR-of-AND-conditions shape the Translator's
/// SELECT mode parses.
#[derive(Clone, Debug)]
pub struct RGetRequest {
    pub owner: AccountId,
    pub table_name: String,
    pub raw: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RGetResponse {
    pub lines: Vec<JsonMap<String, JsonValue>>,
}

/// Replays `req` through the Translator's SELECT mode and the Builder,
/// then marshals rows to JSON (spec §2 read-path data flow).
pub async fn r_get(
    req: &RGetRequest,
    status_store: &dyn StatusStore,
    dialect: Dialect,
    pool: &DbPool,
) -> Result<RGetResponse> {
    let name_in_db = status_store
        .is_name_in_db_exist(pool, &req.table_name, &req.owner)
        .await?
        .ok_or(TableSyncError::NotFound(0))?;
    let physical = physical_table_name(&name_in_db);
    let lines = translator::execute_select(&physical, &req.raw, dialect, pool).await?;
    Ok(RGetResponse { lines })
}

/// `g_dbname` request/response: compute-or-look-up `nameInDB` for
/// `(owner, tableName)`.
#[derive(Clone, Debug)]
pub struct GDbNameRequest {
    pub owner: AccountId,
    pub table_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GDbNameResponse {
    pub name_in_db: String,
}

/// Looks up the persisted `nameInDB` for `(owner, tableName)`. Unlike
/// `t_create`, this never derives a fresh one — by the time a caller asks
/// `g_dbname`, the table already exists and its `nameInDB` was fixed at
/// creation (spec §3 "Derivation for new tables ... at creation time").
pub async fn g_dbname(
    req: &GDbNameRequest,
    status_store: &dyn StatusStore,
    pool: &DbPool,
) -> Result<GDbNameResponse> {
    let name_in_db: Hash160 = status_store
        .is_name_in_db_exist(pool, &req.table_name, &req.owner)
        .await?
        .ok_or(TableSyncError::NotFound(0))?;
    Ok(GDbNameResponse {
        name_in_db: name_in_db.to_hex(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Hash256;
    use crate::ledger::LedgerTx;
    use crate::status_store::SqliteStatusStore;
    use std::io::Write;

    async fn sqlite_pool() -> DbPool {
        DbPool::Sqlite(sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap())
    }

    async fn create_table(pool: &DbPool, name_in_db: Hash160) {
        let tx = LedgerTx {
            opcode_name: "SqlStatement".to_string(),
            op_type: 1,
            account: AccountId::default(),
            tx_hash: Hash256::ZERO,
            last_ledger_seq: 1,
            tables: vec![crate::ledger::TableRef {
                name_in_db,
                table_name: "Orders".to_string(),
            }],
            raw: Some(r#"[{"field":"id","type":"int"},{"field":"name","type":"varchar"}]"#.to_string()),
            auto_fill_field: None,
        };
        translator::execute_sql(&tx, None, Dialect::Sqlite, pool).await.unwrap();
    }

    #[tokio::test]
    async fn g_dbname_looks_up_persisted_name() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([9u8; 20]);
        let name_in_db = crate::ids::compute_name_in_db(1, &owner, "Orders");
        store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 1, Hash256::ZERO, false)
            .await
            .unwrap();

        let resp = g_dbname(
            &GDbNameRequest { owner, table_name: "Orders".to_string() },
            &store,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(resp.name_in_db, name_in_db.to_hex());
    }

    #[tokio::test]
    async fn g_dbname_unknown_table_is_not_found() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let err = g_dbname(
            &GDbNameRequest { owner: AccountId::default(), table_name: "Nope".to_string() },
            &store,
            &pool,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TableSyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn r_get_replays_through_select_mode() {
        let pool = sqlite_pool().await;
        let store = SqliteStatusStore;
        store.create_schema(&pool).await.unwrap();
        let owner = AccountId([1u8; 20]);
        let name_in_db = crate::ids::compute_name_in_db(1, &owner, "Orders");
        store
            .insert_sync_db(&pool, "Orders", &name_in_db, &owner, 1, Hash256::ZERO, false)
            .await
            .unwrap();
        create_table(&pool, name_in_db).await;

        let insert = LedgerTx {
            opcode_name: "SqlStatement".to_string(),
            op_type: 6,
            account: owner,
            tx_hash: Hash256::ZERO,
            last_ledger_seq: 2,
            tables: vec![crate::ledger::TableRef { name_in_db, table_name: "Orders".to_string() }],
            raw: Some(r#"[{"id":1,"name":"alice"}]"#.to_string()),
            auto_fill_field: None,
        };
        let entry = crate::ledger::TableEntry {
            table_name: "Orders".to_string(),
            name_in_db,
            deleted: false,
            txn_lgr_seq: 1,
            txn_ledger_hash: Hash256::ZERO,
            previous_txn_lgr_seq: 0,
            prev_txn_ledger_hash: Hash256::ZERO,
            txs: Vec::new(),
            users: vec![crate::ledger::TableUser {
                user: owner,
                flags: crate::ledger::RoleFlags::INSERT,
            }],
        };
        translator::execute_sql(&insert, Some(&entry), Dialect::Sqlite, &pool).await.unwrap();

        let resp = r_get(
            &RGetRequest { owner, table_name: "Orders".to_string(), raw: r#"[{"id":1}]"#.to_string() },
            &store,
            Dialect::Sqlite,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(resp.lines.len(), 1);
        assert_eq!(resp.lines[0]["name"], JsonValue::String("alice".to_string()));
    }

    #[tokio::test]
    async fn t_create_hex_encodes_raw_file() {
        let mut file = tempfile_json(r#"[{"field":"id","type":"int","PK":true}]"#);
        let req = TCreateRequest {
            owner: AccountId([3u8; 20]),
            table_name: "Orders".to_string(),
            raw_path: file.path().to_path_buf(),
        };
        let resp = t_create(&req, 100).await.unwrap();
        assert_eq!(resp.table_name, "Orders");
        let decoded = hex::decode(&resp.raw_hex).unwrap();
        assert_eq!(decoded, br#"[{"field":"id","type":"int","PK":true}]"#);
        file.flush().ok();
    }

    fn tempfile_json(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }
}
