//! Configuration: parses the `[sync_db]`,
//! `[sync_tables]`, `[auto_sync]` sections from a rippled-style sectioned
//! config file — bare `key=value` lines inside `[sync_db]`, bare
//! `"<base58 owner> <tableName>"` lines inside `[sync_tables]`, a single
//! bare integer inside `[auto_sync]`. DB connection DSNs are read from the
//! process environment via `dotenv`, matching the teacher's bootstrap style
//! in `main.rs`.

use crate::error::{Result, TableSyncError};
use crate::ids::AccountId;
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    MySql,
}

impl DbKind {
    fn parse(s: &str) -> Result<DbKind> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DbKind::Sqlite),
            "mysql" => Ok(DbKind::MySql),
            other => Err(TableSyncError::Config(format!("unknown [sync_db] type '{}'", other))),
        }
    }
}

/// `[sync_db]` section: `type=mysql|sqlite`, `db=<name>`, `firstStorage=0|1`.
#[derive(Clone, Debug)]
pub struct SyncDbConfig {
    pub kind: DbKind,
    pub db: String,
    pub first_storage: bool,
}

/// One `[sync_tables]` line: `<base58 owner> <tableName>`.
#[derive(Clone, Debug)]
pub struct ConfiguredTable {
    pub owner: AccountId,
    pub table_name: String,
}

/// The three sections read at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub sync_db: SyncDbConfig,
    pub sync_tables: Vec<ConfiguredTable>,
    pub auto_sync: bool,
}

/// Splits a rippled-style config file into `[section] -> lines` groups.
/// Blank lines and `#`-prefixed comments are dropped; section bodies are
/// bare text, not TOML/INI `key=value` uniformly.
fn split_sections(text: &str) -> HashMap<String, Vec<String>> {
    let mut sections: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = Some(line[1..line.len() - 1].to_ascii_lowercase());
            sections.entry(current.clone().unwrap()).or_default();
            continue;
        }
        if let Some(name) = &current {
            sections.get_mut(name).unwrap().push(line.to_string());
        }
    }
    sections
}

fn section_kv(lines: &[String]) -> HashMap<String, String> {
    lines
        .iter()
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        let sections = split_sections(text);

        let db_lines = sections
            .get("sync_db")
            .ok_or_else(|| TableSyncError::Config("missing [sync_db] section".to_string()))?;
        let kv = section_kv(db_lines);
        let kind = DbKind::parse(
            kv.get("type")
                .ok_or_else(|| TableSyncError::Config("[sync_db] missing 'type'".to_string()))?,
        )?;
        let db = kv
            .get("db")
            .ok_or_else(|| TableSyncError::Config("[sync_db] missing 'db'".to_string()))?
            .clone();
        let first_storage = kv.get("firstStorage").map(|v| v == "1").unwrap_or(false);

        let mut sync_tables = Vec::new();
        if let Some(lines) = sections.get("sync_tables") {
            for line in lines {
                let mut parts = line.splitn(2, char::is_whitespace);
                let owner_s = parts
                    .next()
                    .ok_or_else(|| TableSyncError::Config(format!("bad [sync_tables] line '{}'", line)))?;
                let table_name = parts
                    .next()
                    .ok_or_else(|| TableSyncError::Config(format!("bad [sync_tables] line '{}'", line)))?
                    .trim()
                    .to_string();
                let owner = AccountId::from_base58(owner_s)?;
                sync_tables.push(ConfiguredTable { owner, table_name });
            }
        }

        let auto_sync = sections
            .get("auto_sync")
            .and_then(|lines| lines.first())
            .map(|v| v.trim() == "1")
            .unwrap_or(false);

        Ok(Config {
            sync_db: SyncDbConfig { kind, db, first_storage },
            sync_tables,
            auto_sync,
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TableSyncError::Config(e.to_string()))?;
        Config::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# sample node config
[sync_db]
type=sqlite
db=tablesync.db
firstStorage=1

[sync_tables]
2NBFNJm1VW2K5xJJhasYpAeEWUCUQeuwbq Orders
2NBFNJm1VW2K5xJJhasYpAeEWUCUQeuwbq Ledger

[auto_sync]
1
"#;

    #[test]
    fn parses_all_three_sections() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(cfg.sync_db.kind, DbKind::Sqlite);
        assert_eq!(cfg.sync_db.db, "tablesync.db");
        assert!(cfg.sync_db.first_storage);
        assert_eq!(cfg.sync_tables.len(), 2);
        assert_eq!(cfg.sync_tables[0].table_name, "Orders");
        assert!(cfg.auto_sync);
    }

    #[test]
    fn missing_sync_db_is_an_error() {
        assert!(Config::parse("[auto_sync]\n0\n").is_err());
    }

    #[test]
    fn defaults_without_optional_sections() {
        let cfg = Config::parse("[sync_db]\ntype=mysql\ndb=chain\n").unwrap();
        assert_eq!(cfg.sync_db.kind, DbKind::MySql);
        assert!(cfg.sync_tables.is_empty());
        assert!(!cfg.auto_sync);
    }
}
