//! Encrypted table file format.
//!
//! A table is an immutable, sorted file of key-value pairs. Data blocks are
//! compressed and then sealed with a per-table key; the index block and the
//! footer stay in plaintext so a reader can locate blocks before it has
//! been handed a key.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1][trailer]
//! [Data Block 2][trailer]
//! ...
//! [Data Block N][trailer]
//! [Index Block][trailer]   // max key of each data block -> BlockHandle
//! [Footer: 32B]            // index handle, version, flags, magic
//! ```
//!
//! ## Block Trailer
//!
//! ```text
//! [block_type: u8]   // compression id | 0x80 if encrypted
//! [crc32: u32]       // over the stored payload
//! ```
//!
//! Reading a table goes through a [`TwoLevelIterator`]: the outer level
//! walks the index, the inner level walks the block the current index entry
//! points at, decrypted with whichever key the caller supplied last.

pub mod block;
pub mod builder;
pub mod codec;
pub mod footer;
pub mod index;
pub mod reader;
pub mod two_level;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::TableBuilder;
pub use codec::{BlockCodec, EncodedBlock, StandardBlockCodec};
pub use footer::{BlockHandle, Footer};
pub use index::{IndexBlock, IndexEntry};
pub use reader::{Table, TableBlockLoader};
pub use two_level::{BlockLoader, TwoLevelIterator};

pub use crate::config::CompressionType;

/// Default block size (4KB)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 32;

/// Size of the per-block trailer: type byte plus CRC32
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Current on-disk format version
pub const FORMAT_VERSION: u8 = 1;

/// Magic number for table files
pub const MAGIC_NUMBER: u64 = 0x5441424c455f5353; // "SSTABLE_" in hex
