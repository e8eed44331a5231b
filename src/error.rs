use crate::ids::Hash256;

/// Crate-wide result alias. Library code returns this; `main` widens to
/// `anyhow::Result` at the process boundary.
pub type Result<T> = std::result::Result<T, TableSyncError>;

/// Error kinds raised throughout this crate, returned as enumerated values
/// and logged with context by the caller.
#[derive(Debug, thiserror::Error)]
pub enum TableSyncError {
    #[error("unsupported opcode {0}")]
    BadOpcode(i32),

    #[error("transaction Raw payload missing")]
    MissingRaw,

    #[error("transaction Raw payload is not a JSON array")]
    RawNotArray,

    #[error("Raw array element {0} is not a JSON object")]
    RawElementNotObject(usize),

    #[error("Tables field is absent or does not contain exactly one entry")]
    BadTablesField,

    #[error("table name is empty")]
    EmptyTableName,

    #[error("nameInDB is zero")]
    ZeroNameInDb,

    #[error("owner account id is malformed")]
    BadOwner,

    #[error("unrecognized column flag {0:?}")]
    BadFlags(String),

    #[error("account lacks required table role flag for this operation")]
    BadTableFlags,

    #[error("account is not authorized (no role record)")]
    BadAuthNo,

    #[error("account is not authorized (table does not exist)")]
    BadAuthExist,

    #[error("table entry not found or deleted at ledger {0}")]
    NotFound(u32),

    #[error("dialect/driver error: {0}")]
    Driver(#[from] sqlx::Error),

    #[error("sync stalled waiting on data from peer, last progress at ledger {0}")]
    SyncStall(u32),

    #[error("validated ledger disagrees with buffered transaction queue, rolling back to {0}")]
    Rollback(u32),

    #[error("item transitioned to a terminal Stop state: {0}")]
    Fatal(String),

    #[error("column {0} missing required value for statement kind {1:?}")]
    MissingFields(String, crate::statement::StatementKind),

    #[error("builder has no table registered")]
    NoTable,

    #[error("config error: {0}")]
    Config(String),

    #[error("expected ledger hash {expected:?}, frame carried {actual:?}")]
    HashMismatch { expected: Hash256, actual: Hash256 },
}
