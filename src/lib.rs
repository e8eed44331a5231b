//! Table storage replication: a Transaction-to-SQL Translator, a Storage
//! Replay Engine, and a Table Sync Engine, sharing one SQL Builder and one
//! Status Store.

pub mod builder;
pub mod condition;
pub mod config;
pub mod error;
pub mod field;
pub mod ids;
pub mod ledger;
pub mod pool;
pub mod replay;
pub mod rpc;
pub mod schema_bootstrap;
pub mod statement;
pub mod status_store;
pub mod sync;
pub mod translator;
pub mod wire;
