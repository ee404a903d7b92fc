//! Configuration options for building and reading tables.

use crate::sstable::codec::{BlockCodec, StandardBlockCodec};
use std::sync::Arc;

/// Options that control how tables are built and opened.
#[derive(Debug, Clone)]
pub struct Options {
    /// Target size of an uncompressed data block (in bytes).
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points in a data block.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Compression applied to data blocks before encryption.
    /// Default: CompressionType::Snappy when the `snappy` feature is enabled
    pub compression: CompressionType,

    /// Capacity of the sealed block cache in bytes; 0 turns it off.
    /// Default: 8MB
    pub block_cache_size: usize,

    /// Scan every entry of a freshly built table before accepting it.
    /// Default: false
    pub paranoid_checks: bool,

    /// Maximum number of tables kept open by the table cache.
    /// Default: 1000
    pub max_open_tables: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024, // 4KB
            block_restart_interval: 16,
            compression: CompressionType::default(),
            block_cache_size: 8 * 1024 * 1024, // 8MB
            paranoid_checks: false,
            max_open_tables: 1000,
        }
    }
}

/// Compression algorithms supported for data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy, kept only when it shrinks the block by an eighth or more.
    #[cfg(feature = "snappy")]
    Snappy = 1,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

impl Options {
    /// Same as `Options::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size for tables.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval for data blocks.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the compression applied before encryption.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the block cache size.
    pub fn block_cache_size(mut self, size: usize) -> Self {
        self.block_cache_size = size;
        self
    }

    /// Enables or disables full verification of freshly built tables.
    pub fn paranoid_checks(mut self, value: bool) -> Self {
        self.paranoid_checks = value;
        self
    }

    /// Sets the table cache capacity.
    pub fn max_open_tables(mut self, count: usize) -> Self {
        self.max_open_tables = count;
        self
    }

    /// Returns the block codec matching these options.
    pub fn block_codec(&self) -> Arc<dyn BlockCodec> {
        Arc::new(StandardBlockCodec::new(self.compression))
    }

    /// Rejects zero block size, restart interval or table cache capacity.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_restart_interval == 0 {
            return Err(crate::Error::invalid_argument("block_restart_interval must be > 0"));
        }
        if self.max_open_tables == 0 {
            return Err(crate::Error::invalid_argument("max_open_tables must be > 0"));
        }
        Ok(())
    }
}

/// Options for a single read path (iterator or point lookup).
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Verify block checksums on every read.
    /// Default: true
    pub verify_checksums: bool,

    /// Insert blocks read from disk into the block cache.
    /// Default: true
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { verify_checksums: true, fill_cache: true }
    }
}
