//! Per-table encryption keys.
//!
//! Every table file gets a fresh [`TableKey`] when it is built. The key is
//! recorded in the table's [`FileMetaData`](crate::build::FileMetaData) and
//! copied into each reader that needs to decrypt the table's data blocks.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a table key in bytes (256-bit symmetric key).
pub const TABLE_KEY_LEN: usize = 32;

/// A 256-bit symmetric key that encrypts the data blocks of one table file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableKey([u8; TABLE_KEY_LEN]);

impl TableKey {
    /// Generates a fresh key from a cryptographically secure generator.
    pub fn generate<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; TABLE_KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps existing key bytes, e.g. ones recovered from a manifest.
    pub fn from_bytes(bytes: [u8; TABLE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; TABLE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TableKey(<redacted>)")
    }
}

/// The key slot handed to block materialization.
///
/// `Unencrypted` is the explicit sentinel for tables whose data blocks are
/// stored in plaintext. A block is never decoded with a key of the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKey {
    /// Data blocks are stored without encryption.
    Unencrypted,
    /// Data blocks are encrypted with this table key.
    Table(TableKey),
}

impl BlockKey {
    /// Returns the table key, if any.
    pub fn table_key(&self) -> Option<&TableKey> {
        match self {
            BlockKey::Unencrypted => None,
            BlockKey::Table(key) => Some(key),
        }
    }

    /// Returns true if blocks read with this slot must be decrypted.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, BlockKey::Table(_))
    }
}

impl From<TableKey> for BlockKey {
    fn from(key: TableKey) -> Self {
        BlockKey::Table(key)
    }
}

impl From<&TableKey> for BlockKey {
    fn from(key: &TableKey) -> Self {
        BlockKey::Table(key.clone())
    }
}
