//! Index block implementation for tables.
//!
//! The index block maps the largest key of every data block to that block's
//! handle. It is an ordinary block, stored unencrypted, so the index can be
//! searched without the table key.

use crate::error::Result;
use crate::sstable::block::{Block, BlockBuilder, BlockIterator};
use crate::sstable::footer::BlockHandle;
use bytes::Bytes;

/// One index entry: a data block's last key and its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Last key of the data block
    pub key: Vec<u8>,
    /// Handle to the data block
    pub handle: BlockHandle,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(key: Vec<u8>, handle: BlockHandle) -> Self {
        Self { key, handle }
    }

    /// Decode the entry value (just the BlockHandle)
    pub fn decode_value(data: &[u8]) -> Result<BlockHandle> {
        BlockHandle::decode(data)
    }
}

/// The decoded index block of an open table.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    block: Block,
}

impl IndexBlock {
    /// Wrap index block contents read from a table
    pub fn new(data: Bytes) -> Result<Self> {
        let block = Block::new(data)?;
        Ok(Self { block })
    }

    /// Create a cursor over index entries (key = max key, value = handle)
    pub fn iter(&self) -> BlockIterator {
        self.block.iter()
    }

    /// Collect every entry of the index
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        use crate::iterator::DbIterator;

        let mut entries = Vec::new();
        let mut iter = self.iter();
        iter.seek_to_first();
        while iter.valid() {
            let handle = IndexEntry::decode_value(iter.value())?;
            entries.push(IndexEntry::new(iter.key().to_vec(), handle));
            iter.next();
        }
        iter.status()?;
        Ok(entries)
    }
}

/// Collects one entry per finished data block.
pub struct IndexBlockBuilder {
    builder: BlockBuilder,
    num_entries: usize,
}

impl IndexBlockBuilder {
    /// Create an empty index builder
    pub fn new() -> Self {
        // Every index entry is a restart point so seeks binary search directly
        Self { builder: BlockBuilder::new(1), num_entries: 0 }
    }

    /// Add an index entry
    pub fn add_entry(&mut self, entry: &IndexEntry) {
        self.builder.add(&entry.key, &entry.handle.encode());
        self.num_entries += 1;
    }

    /// Encode the index block
    pub fn finish(self) -> Bytes {
        self.builder.finish()
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.num_entries
    }

    /// Whether no data block has been indexed yet
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }
}

impl Default for IndexBlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}
