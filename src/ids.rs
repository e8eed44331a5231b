//! 160/256-bit identifiers and the deterministic NameInDB derivation
//!.

use ripemd::{Digest, Ripemd160};
use std::fmt;

/// A 32-byte ledger/transaction hash. Zero is the distinguished "unset"
/// sentinel used throughout the replay and sync state machines.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Hash256> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Hash256(out))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

/// A 20-byte account identifier, base58-check encoded on the wire (matching
/// the ledger core's `AccountId` — named collaborator, reproduced here only
/// as the shape this crate consumes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).with_check().into_string()
    }

    pub fn from_base58(s: &str) -> Result<AccountId, crate::error::TableSyncError> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| crate::error::TableSyncError::BadOwner)?;
        if bytes.len() != 20 {
            return Err(crate::error::TableSyncError::BadOwner);
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(AccountId(out))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_base58())
    }
}

/// `(owner, nameInDB, tableName)` — the stable identity of a replicated
/// table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    pub owner: AccountId,
    pub name_in_db: Hash160,
    pub table_name: String,
}

impl TableIdentity {
    /// The physical database table name: `t_` followed by the hex encoding
    /// of `nameInDB`.
    pub fn physical_name(&self) -> String {
        physical_table_name(&self.name_in_db)
    }
}

/// A 160-bit identifier, distinct from `Hash256` since NameInDB is always
/// exactly 20 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Hash160> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 20 {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Some(Hash160(out))
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", self.to_hex())
    }
}

pub fn physical_table_name(name_in_db: &Hash160) -> String {
    format!("t_{}", name_in_db.to_hex())
}

/// `RIPEMD160(ascii(creationLedgerSeq) || base58(owner) || tableName)`,
/// computed once at table-creation time.
/// Deterministic across dialects and runs: identical inputs always hash to
/// the identical 20 bytes, independent of process state or clock.
pub fn compute_name_in_db(creation_ledger_seq: u32, owner: &AccountId, table_name: &str) -> Hash160 {
    let mut hasher = Ripemd160::new();
    hasher.update(creation_ledger_seq.to_string().as_bytes());
    hasher.update(owner.to_base58().as_bytes());
    hasher.update(table_name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Hash160(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_in_db_is_deterministic() {
        let owner = AccountId([7u8; 20]);
        let a = compute_name_in_db(100, &owner, "Orders");
        let b = compute_name_in_db(100, &owner, "Orders");
        assert_eq!(a, b);
    }

    #[test]
    fn name_in_db_varies_with_any_input() {
        let owner = AccountId([7u8; 20]);
        let base = compute_name_in_db(100, &owner, "Orders");
        assert_ne!(base, compute_name_in_db(101, &owner, "Orders"));
        assert_ne!(base, compute_name_in_db(100, &AccountId([8u8; 20]), "Orders"));
        assert_ne!(base, compute_name_in_db(100, &owner, "orders"));
    }

    #[test]
    fn physical_name_is_hex_prefixed() {
        let id = Hash160([0xab; 20]);
        assert_eq!(physical_table_name(&id), format!("t_{}", "ab".repeat(20)));
    }

    #[test]
    fn account_base58_roundtrip() {
        let acct = AccountId([42u8; 20]);
        let encoded = acct.to_base58();
        let decoded = AccountId::from_base58(&encoded).unwrap();
        assert_eq!(acct, decoded);
    }
}
