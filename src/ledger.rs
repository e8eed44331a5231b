//! Named collaborator interfaces this crate consumes but does not
//! implement: the consensus/ledger core, the peer overlay, and the job
//! queue. Everything here is a trait or a plain
//! data shape the real collaborator is expected to hand us; there is no
//! ledger/consensus logic in this crate.

use crate::ids::{AccountId, Hash160, Hash256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Bitfield role flags a `Users` entry carries for a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RoleFlags(pub u32);

impl RoleFlags {
    pub const SELECT: RoleFlags = RoleFlags(0x0001_0000);
    pub const INSERT: RoleFlags = RoleFlags(0x0002_0000);
    pub const UPDATE: RoleFlags = RoleFlags(0x0004_0000);
    pub const DELETE: RoleFlags = RoleFlags(0x0008_0000);
    pub const EXECUTE: RoleFlags = RoleFlags(0x0010_0000);

    pub fn contains(self, other: RoleFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One entry of a `Table` SLE's `Users` array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableUser {
    pub user: AccountId,
    pub flags: RoleFlags,
}

/// The ledger-observed per-table record embedded in a `Table` SLE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableEntry {
    pub table_name: String,
    pub name_in_db: Hash160,
    pub deleted: bool,
    pub txn_lgr_seq: u32,
    pub txn_ledger_hash: Hash256,
    pub previous_txn_lgr_seq: u32,
    pub prev_txn_ledger_hash: Hash256,
    /// Tx hashes recorded against this entry for the ledger that
    /// introduced it.
    pub txs: Vec<Hash256>,
    pub users: Vec<TableUser>,
}

impl TableEntry {
    pub fn user_flags(&self, account: &AccountId) -> Option<RoleFlags> {
        self.users.iter().find(|u| &u.user == account).map(|u| u.flags)
    }
}

/// The opcode carried by a ledger transaction's `OpType` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpType {
    CreateTable = 1,
    DropTable = 2,
    RenameTable = 3,
    Grant = 4,
    Revoke = 5,
    Insert = 6,
    Update = 8,
    Delete = 9,
}

impl OpType {
    pub fn from_i32(v: i32) -> Option<OpType> {
        match v {
            1 => Some(OpType::CreateTable),
            2 => Some(OpType::DropTable),
            3 => Some(OpType::RenameTable),
            4 => Some(OpType::Grant),
            5 => Some(OpType::Revoke),
            6 => Some(OpType::Insert),
            8 => Some(OpType::Update),
            9 => Some(OpType::Delete),
            _ => None,
        }
    }
}

/// The ledger transaction opcode family a submitted tx belongs to (spec
/// §4.3 step 1): only `TableListSet` and `SqlStatement` are accepted by
/// the Translator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOpcode {
    TableListSet,
    SqlStatement,
    Other,
}

/// A committed ledger transaction's decoded shape, as handed to this crate
/// by the ledger core. `raw` is the `Raw` field's JSON payload, already
/// hex-decoded to UTF-8 text (parsed as a JSON array by the Translator).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerTx {
    pub opcode_name: String,
    pub op_type: i32,
    pub account: AccountId,
    pub tx_hash: Hash256,
    pub last_ledger_seq: u32,
    pub tables: Vec<TableRef>,
    pub raw: Option<String>,
    pub auto_fill_field: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableRef {
    pub name_in_db: Hash160,
    pub table_name: String,
}

impl LedgerTx {
    pub fn opcode(&self) -> TxOpcode {
        match self.opcode_name.as_str() {
            "TableListSet" => TxOpcode::TableListSet,
            "SqlStatement" => TxOpcode::SqlStatement,
            _ => TxOpcode::Other,
        }
    }
}

/// One committed, validated ledger as the rest of this crate needs it:
/// sequence/hash plus the table entries it carries.
#[derive(Clone, Debug)]
pub struct ValidatedLedger {
    pub seq: u32,
    pub hash: Hash256,
    pub table_entries: Vec<TableEntry>,
}

/// Read-only access to the ledger/consensus core: validated ledger history,
/// directory/account SLE reads, and the current validated index. Named
/// collaborator — out of scope for this crate's behavior.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn validated_index(&self) -> u32;

    async fn ledger_at(&self, seq: u32) -> Option<ValidatedLedger>;

    /// Reads the `Table` SLE for `(owner, name_in_db)` as of `seq`, if any.
    async fn table_entry_at(
        &self,
        seq: u32,
        owner: &AccountId,
        name_in_db: &Hash160,
    ) -> Option<TableEntry>;

    /// True if the tx master/ledger core reports `hash` as a known,
    /// validated transaction.
    async fn has_transaction(&self, hash: &Hash256) -> bool;
}

/// The peer overlay: named collaborator providing the active peer list and
/// message transport for `GetTable`/`TableData`/`GetLedger`/`LedgerData`
/// frames. Out of scope for this crate's behavior.
#[async_trait]
pub trait PeerOverlay: Send + Sync {
    /// A snapshot of currently connected peer ids, for random selection.
    async fn active_peers(&self) -> Vec<String>;

    async fn send_get_table(&self, peer: &str, req: crate::wire::GetTable);

    async fn send_get_ledger(&self, peer: &str, req: crate::wire::GetLedgerSkip);
}

/// The scheduling/job-queue collaborator: distinct named
/// categories at minimum `storage`, `sync`, `local-sync`, `operate-sql`.
/// This crate schedules its own background tasks over Tokio directly
/// (see `replay::registry`, `sync_engine::registry`); `JobQueue` remains a
/// named seam for a caller that wants to drive ticks externally instead
/// (e.g. from a shared ledger-core job scheduler) rather than via our own
/// `tokio::spawn` loops.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn schedule(&self, category: &'static str, f: Box<dyn FnOnce() + Send>);
}
