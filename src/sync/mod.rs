//! Table Sync Engine (spec §4.7/§4.8): the pull-based counterpart to
//! `replay` — catches a table up on ledger ranges it is missing, from
//! either a peer or this node's own ledger history, and feeds the result
//! through the same Translator/Status Store path.

mod engine;
mod item;
mod skip_cache;

pub use engine::SyncEngine;
pub use item::{BlockStopAction, LedgerSyncState, RequestRange, SyncItem, SyncItemState};
pub use skip_cache::SkipNodeCache;
