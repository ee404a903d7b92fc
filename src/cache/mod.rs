//! Block cache for table reads.
//!
//! Caches verified, still-sealed data blocks so repeated reads of the same
//! block skip the file read and checksum, while decryption is redone per
//! reader with its own key.

mod lru;

pub use lru::{BlockCache, CacheKey, CacheStats, SealedBlock};
