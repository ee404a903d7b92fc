//! # sealtable - Encrypted Tables for an LSM-Tree Storage Engine
//!
//! sealtable implements the on-disk table layer of a LevelDB-style storage
//! engine in which every table file is encrypted at the data-block level with
//! its own randomly generated key.
//!
//! ## Architecture
//!
//! - **Build**: [`build::build_table`] drains a sorted cursor into a new
//!   table, generating a fresh [`key::TableKey`] and returning the
//!   [`build::FileMetaData`] that records it
//! - **Table format**: [`sstable`] holds the block, index and footer encoding,
//!   the [`sstable::TableBuilder`] and the block codec (compression followed
//!   by XChaCha20-Poly1305)
//! - **Reading**: [`sstable::TwoLevelIterator`] walks the plaintext index and
//!   decrypts data blocks lazily with the key handed to its seek calls
//! - **Caching**: [`table_cache::TableCache`] keeps tables open and shares a
//!   [`cache::BlockCache`] of verified, still-sealed blocks
//! - **Manifest**: [`manifest`] persists table metadata, keys included, as
//!   framed [`record_log`] records
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sealtable::build::build_table;
//! use sealtable::env::FsTableStore;
//! use sealtable::iterator::{DbIterator, VecIterator};
//! use sealtable::table_cache::TableCache;
//! use sealtable::{Options, ReadOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), sealtable::Error> {
//! let options = Options::default();
//! let store = Arc::new(FsTableStore::new("./data")?);
//! let tables = TableCache::new(store.clone(), options.clone());
//!
//! let mut input = VecIterator::new(vec![("apple", "red"), ("pear", "green")]);
//! let meta = build_table(store.as_ref(), &options, &tables, &mut input, 1, &mut rand::rng())?
//!     .expect("input was not empty");
//!
//! let mut iter = tables.new_iterator(ReadOptions::default(), &meta);
//! iter.seek(b"pear");
//! assert_eq!(iter.value(), b"green");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod build;
pub mod cache;
pub mod config;
pub mod env;
pub mod error;
pub mod iterator;
pub mod key;
pub mod manifest;
pub mod record_log;
pub mod sstable;
pub mod table_cache;

pub use build::{build_table, FileMetaData};
pub use config::{CompressionType, Options, ReadOptions};
pub use error::{Error, Result};
pub use iterator::DbIterator;
pub use key::{BlockKey, TableKey};
pub use table_cache::TableCache;
