//! Table builder implementation.
//!
//! Builds a table file from a sequence of sorted key-value pairs. Data blocks
//! are sealed with the table's key through the block codec; the index block
//! and footer are written in plaintext.

use crate::config::Options;
use crate::env::WritableFile;
use crate::error::Result;
use crate::key::BlockKey;
use crate::sstable::block::BlockBuilder;
use crate::sstable::codec::{BlockCodec, EncodedBlock};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::index::{IndexBlockBuilder, IndexEntry};
use crate::sstable::BLOCK_TRAILER_SIZE;
use std::sync::Arc;

/// TableBuilder builds a table file.
///
/// Usage:
/// ```no_run
/// use sealtable::env::{FsTableStore, TableStore};
/// use sealtable::key::{BlockKey, TableKey};
/// use sealtable::sstable::TableBuilder;
/// use sealtable::Options;
///
/// # fn main() -> sealtable::Result<()> {
/// let store = FsTableStore::new("./tables")?;
/// let mut file = store.create_table(1)?;
/// let key = TableKey::generate(&mut rand::rng());
///
/// let mut builder = TableBuilder::new(&Options::default(), file.as_mut(), BlockKey::Table(key));
/// builder.add(b"key1", b"value1")?;
/// builder.add(b"key2", b"value2")?;
/// let size = builder.finish()?;
/// file.sync()?;
/// file.close()?;
/// # Ok(())
/// # }
/// ```
///
/// # Panics
///
/// `add` panics if keys are not strictly ascending, and `add`/`finish`
/// panic once the builder was finished or abandoned.
pub struct TableBuilder<'a> {
    file: &'a mut dyn WritableFile,
    codec: Arc<dyn BlockCodec>,
    key: BlockKey,
    data_block_builder: BlockBuilder,
    index_block_builder: IndexBlockBuilder,
    last_key: Vec<u8>,
    offset: u64,
    num_entries: u64,
    num_data_blocks: usize,
    block_size: usize,
    block_restart_interval: usize,
    pending_handle: Option<BlockHandle>,
    closed: bool,
}

impl<'a> TableBuilder<'a> {
    /// Create a new TableBuilder writing to `file`, sealing blocks with `key`
    pub fn new(options: &Options, file: &'a mut dyn WritableFile, key: BlockKey) -> Self {
        Self::with_codec(options, file, key, options.block_codec())
    }

    /// Create a new TableBuilder with an explicit block codec
    pub fn with_codec(
        options: &Options,
        file: &'a mut dyn WritableFile,
        key: BlockKey,
        codec: Arc<dyn BlockCodec>,
    ) -> Self {
        Self {
            file,
            codec,
            key,
            data_block_builder: BlockBuilder::new(options.block_restart_interval),
            index_block_builder: IndexBlockBuilder::new(),
            last_key: Vec::new(),
            offset: 0,
            num_entries: 0,
            num_data_blocks: 0,
            block_size: options.block_size,
            block_restart_interval: options.block_restart_interval,
            pending_handle: None,
            closed: false,
        }
    }

    /// Add a key-value pair to the table.
    ///
    /// Keys must be added in strictly ascending order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "TableBuilder already finished");
        assert!(
            self.num_entries == 0 || key > self.last_key.as_slice(),
            "Keys must be added in strictly ascending order"
        );

        // The previous block's index entry uses its last key
        if let Some(handle) = self.pending_handle.take() {
            let entry = IndexEntry::new(self.last_key.clone(), handle);
            self.index_block_builder.add_entry(&entry);
        }

        self.data_block_builder.add(key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        // Flush block if it's large enough
        if self.data_block_builder.current_size() >= self.block_size {
            self.flush_data_block()?;
        }

        Ok(())
    }

    /// Flush the current data block to the file
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block_builder.is_empty() {
            return Ok(());
        }

        let old_builder = std::mem::replace(
            &mut self.data_block_builder,
            BlockBuilder::new(self.block_restart_interval),
        );
        let raw = old_builder.finish();

        let encoded = self.codec.encode(&raw, self.offset, &self.key)?;
        let handle = self.write_block(&encoded)?;
        self.pending_handle = Some(handle);
        self.num_data_blocks += 1;

        Ok(())
    }

    /// Write a stored block and its trailer, returning the block's handle
    fn write_block(&mut self, block: &EncodedBlock) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, block.payload.len() as u64);

        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = block.block_type;
        trailer[1..].copy_from_slice(&crc32fast::hash(&block.payload).to_le_bytes());

        self.file.append(&block.payload)?;
        self.file.append(&trailer)?;
        self.offset += block.payload.len() as u64 + BLOCK_TRAILER_SIZE as u64;

        Ok(handle)
    }

    /// Finish building the table.
    ///
    /// Flushes the last data block, then writes the index block and footer.
    /// Returns the total file size. Syncing and closing the file is left to
    /// the caller.
    pub fn finish(&mut self) -> Result<u64> {
        assert!(!self.closed, "TableBuilder already finished");
        self.closed = true;

        self.flush_data_block()?;

        if let Some(handle) = self.pending_handle.take() {
            let entry = IndexEntry::new(self.last_key.clone(), handle);
            self.index_block_builder.add_entry(&entry);
        }

        let index_builder = std::mem::take(&mut self.index_block_builder);
        let index_data = index_builder.finish();
        let index_block = EncodedBlock { payload: index_data.to_vec(), block_type: 0 };
        let index_handle = self.write_block(&index_block)?;

        let footer = Footer::new(index_handle, self.key.is_encrypted());
        let encoded = footer.encode();
        self.file.append(&encoded)?;
        self.offset += encoded.len() as u64;

        Ok(self.offset)
    }

    /// Stop building without writing the index or footer.
    ///
    /// The caller is responsible for deleting the partial file.
    pub fn abandon(&mut self) {
        assert!(!self.closed, "TableBuilder already finished");
        self.closed = true;
    }

    /// Get the number of entries added
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far; after `finish` this is the final file size
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Number of data blocks written so far
    pub fn num_data_blocks(&self) -> usize {
        self.num_data_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionType;
    use crate::env::{FsTableStore, TableStore};
    use crate::key::{TableKey, TABLE_KEY_LEN};
    use tempfile::TempDir;

    fn key() -> BlockKey {
        BlockKey::Table(TableKey::from_bytes([7; TABLE_KEY_LEN]))
    }

    fn options() -> Options {
        Options::default().compression(CompressionType::None)
    }

    #[test]
    fn test_builder_empty_table() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options(), file.as_mut(), key());
        assert_eq!(builder.num_entries(), 0);

        let size = builder.finish().unwrap();
        // Empty index block + trailer + footer
        assert!(size > 0);
        assert_eq!(builder.num_data_blocks(), 0);
    }

    #[test]
    fn test_builder_file_size_matches_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options().block_size(256), file.as_mut(), key());
        for i in 0..200 {
            let k = format!("key{:08}", i);
            let v = format!("value{:08}", i);
            builder.add(k.as_bytes(), v.as_bytes()).unwrap();
        }
        assert_eq!(builder.num_entries(), 200);

        let size = builder.finish().unwrap();
        assert_eq!(size, builder.file_size());
        assert!(builder.num_data_blocks() > 1);
        file.sync().unwrap();
        file.close().unwrap();

        let on_disk = std::fs::metadata(store.table_path(1)).unwrap().len();
        assert_eq!(on_disk, size);
    }

    #[test]
    fn test_builder_data_is_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options(), file.as_mut(), key());
        builder.add(b"secret-key", b"secret-value-that-must-not-leak").unwrap();
        builder.finish().unwrap();
        file.close().unwrap();

        let bytes = std::fs::read(store.table_path(1)).unwrap();
        let needle = b"secret-value-that-must-not-leak";
        assert!(!bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn test_builder_unsorted_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options(), file.as_mut(), key());
        builder.add(b"b", b"2").unwrap();
        let _ = builder.add(b"a", b"1");
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn test_builder_duplicate_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options(), file.as_mut(), key());
        builder.add(b"a", b"1").unwrap();
        let _ = builder.add(b"a", b"2");
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn test_builder_add_after_finish() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let mut file = store.create_table(1).unwrap();

        let mut builder = TableBuilder::new(&options(), file.as_mut(), key());
        builder.add(b"a", b"1").unwrap();
        builder.finish().unwrap();
        let _ = builder.add(b"b", b"2");
    }
}
