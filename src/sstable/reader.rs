//! Table reader implementation.
//!
//! Opens a table file, loads its plaintext index block and materializes data
//! blocks on demand with a caller-supplied [`BlockKey`].

use crate::cache::{BlockCache, CacheKey, SealedBlock};
use crate::config::{Options, ReadOptions};
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::iterator::{DbIterator, EmptyIterator};
use crate::key::BlockKey;
use crate::sstable::block::Block;
use crate::sstable::codec::BlockCodec;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::index::{IndexBlock, IndexEntry};
use crate::sstable::two_level::{BlockLoader, TwoLevelIterator};
use crate::sstable::{BLOCK_TRAILER_SIZE, FOOTER_SIZE};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// An open, immutable table.
///
/// A `Table` holds no key material. Every read names the key to decode data
/// blocks with, so one open table can serve any number of concurrent
/// iterators.
///
/// Usage:
/// ```no_run
/// use sealtable::env::{FsTableStore, TableStore};
/// use sealtable::key::{BlockKey, TableKey};
/// use sealtable::iterator::DbIterator;
/// use sealtable::sstable::Table;
/// use sealtable::{Options, ReadOptions};
/// use std::sync::Arc;
///
/// # fn main() -> sealtable::Result<()> {
/// # let key = TableKey::from_bytes([0; 32]);
/// let store = FsTableStore::new("./tables")?;
/// let file = store.open_table(1)?;
/// let size = file.size()?;
/// let table = Arc::new(Table::open(file, size, &Options::default())?);
///
/// let mut iter = table.iter(ReadOptions::default(), BlockKey::Table(key));
/// iter.seek_to_first();
/// while iter.valid() {
///     println!("{:?} => {:?}", iter.key(), iter.value());
///     iter.next();
/// }
/// iter.status()?;
/// # Ok(())
/// # }
/// ```
pub struct Table {
    file: Arc<dyn RandomAccessFile>,
    file_size: u64,
    codec: Arc<dyn BlockCodec>,
    footer: Footer,
    index_block: IndexBlock,
    num_data_blocks: usize,
    block_cache: Option<(Arc<BlockCache>, u64)>,
}

impl Table {
    /// Open a table of `file_size` bytes without a block cache
    pub fn open(file: Arc<dyn RandomAccessFile>, file_size: u64, options: &Options) -> Result<Self> {
        Self::open_internal(file, file_size, options, None)
    }

    /// Open a table whose sealed blocks are cached in `cache` under `table_id`
    pub fn open_with_cache(
        file: Arc<dyn RandomAccessFile>,
        file_size: u64,
        options: &Options,
        cache: Arc<BlockCache>,
        table_id: u64,
    ) -> Result<Self> {
        Self::open_internal(file, file_size, options, Some((cache, table_id)))
    }

    fn open_internal(
        file: Arc<dyn RandomAccessFile>,
        file_size: u64,
        options: &Options,
        block_cache: Option<(Arc<BlockCache>, u64)>,
    ) -> Result<Self> {
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("File too small to be a valid table"));
        }

        let footer_data = file.read_at(file_size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_data)?;

        let index_end = footer
            .index_handle
            .offset
            .checked_add(footer.index_handle.size)
            .and_then(|n| n.checked_add(BLOCK_TRAILER_SIZE as u64));
        if index_end != Some(file_size - FOOTER_SIZE as u64) {
            return Err(Error::corruption(format!(
                "Index block at offset {} does not end at the footer",
                footer.index_handle.offset
            )));
        }

        let (payload, block_type) = read_raw(file.as_ref(), file_size, &footer.index_handle, true)?;
        if block_type != 0 {
            return Err(Error::corruption(format!("Unexpected index block type {:#x}", block_type)));
        }
        let index_block = IndexBlock::new(payload)?;
        let num_data_blocks = index_block.entries()?.len();

        log::debug!(
            "Opened table: {} bytes, {} data blocks, encrypted={}",
            file_size,
            num_data_blocks,
            footer.encrypted
        );
        Ok(Self { file, file_size, codec: options.block_codec(), footer, index_block, num_data_blocks, block_cache })
    }

    /// Fetch the sealed form of a data block, through the block cache if any
    fn read_sealed(&self, options: &ReadOptions, handle: &BlockHandle) -> Result<SealedBlock> {
        if let Some((cache, table_id)) = &self.block_cache {
            let cache_key = CacheKey::new(*table_id, handle.offset);
            if let Some(block) = cache.get(&cache_key) {
                return Ok(block);
            }

            // Cached blocks must have passed a checksum
            let (payload, block_type) = read_raw(self.file.as_ref(), self.file_size, handle, true)?;
            let block = SealedBlock { payload, block_type };
            if options.fill_cache {
                cache.insert(cache_key, block.clone());
            }
            return Ok(block);
        }

        let (payload, block_type) = read_raw(self.file.as_ref(), self.file_size, handle, options.verify_checksums)?;
        Ok(SealedBlock { payload, block_type })
    }

    /// Read, decrypt and decode one data block
    pub fn read_block(&self, options: &ReadOptions, handle: &BlockHandle, key: &BlockKey) -> Result<Block> {
        let sealed = self.read_sealed(options, handle)?;
        let contents = self.codec.decode(&sealed.payload, sealed.block_type, handle.offset, key)?;
        Block::new(contents)
    }

    /// Materialize the block named by an encoded index value.
    ///
    /// Any failure is carried by the returned iterator's status.
    pub fn block_reader(&self, options: &ReadOptions, handle_value: &[u8], key: &BlockKey) -> Box<dyn DbIterator> {
        let block = IndexEntry::decode_value(handle_value).and_then(|handle| {
            self.read_block(options, &handle, key).map_err(|e| {
                log::warn!("Failed to read data block at offset {}: {}", handle.offset, e);
                e
            })
        });
        match block {
            Ok(block) => Box::new(block.iter()),
            Err(e) => Box::new(EmptyIterator::with_error(e)),
        }
    }

    /// Iterator over the index block (max key -> encoded block handle)
    pub fn index_iter(&self) -> Box<dyn DbIterator> {
        Box::new(self.index_block.iter())
    }

    /// Iterator over every entry of the table, decoding blocks with `key`
    pub fn iter(self: &Arc<Self>, options: ReadOptions, key: BlockKey) -> TwoLevelIterator<TableBlockLoader> {
        TwoLevelIterator::with_key(self.index_iter(), TableBlockLoader::new(Arc::clone(self)), options, key)
    }

    /// Iterator with no active key; the first keyed seek supplies one
    pub fn iter_unkeyed(self: &Arc<Self>, options: ReadOptions) -> TwoLevelIterator<TableBlockLoader> {
        TwoLevelIterator::new(self.index_iter(), TableBlockLoader::new(Arc::clone(self)), options)
    }

    /// Point lookup of `target`
    pub fn get(&self, options: &ReadOptions, key: &BlockKey, target: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut index = self.index_block.iter();
        index.seek(target);
        if !index.valid() {
            index.status()?;
            return Ok(None);
        }

        let mut block = self.block_reader(options, index.value(), key);
        block.seek(target);
        let found = if block.valid() && block.key() == target { Some(block.value().to_vec()) } else { None };
        block.status()?;
        Ok(found)
    }

    /// Number of data blocks listed in the index
    pub fn num_data_blocks(&self) -> usize {
        self.num_data_blocks
    }

    /// Size of the table file in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether the footer marks the data blocks as encrypted
    pub fn is_encrypted(&self) -> bool {
        self.footer.encrypted
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("file_size", &self.file_size)
            .field("footer", &self.footer)
            .field("cached", &self.block_cache.is_some())
            .finish()
    }
}

/// Read a stored block payload and its type byte, checking bounds and CRC
fn read_raw(
    file: &dyn RandomAccessFile,
    file_size: u64,
    handle: &BlockHandle,
    verify_checksum: bool,
) -> Result<(Bytes, u8)> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|n| n.checked_add(BLOCK_TRAILER_SIZE as u64))
        .ok_or_else(|| Error::corruption("Block handle overflows"))?;
    if end > file_size - FOOTER_SIZE as u64 {
        return Err(Error::corruption(format!(
            "Block [{}, {}) extends past end of data in file of {} bytes",
            handle.offset, end, file_size
        )));
    }

    let size = handle.size as usize;
    let mut data = file.read_at(handle.offset, size + BLOCK_TRAILER_SIZE)?;
    if data.len() != size + BLOCK_TRAILER_SIZE {
        return Err(Error::corruption("Truncated block read"));
    }

    let block_type = data[size];
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&data[size + 1..]);
    let expected = u32::from_le_bytes(crc);

    data.truncate(size);
    if verify_checksum {
        let actual = crc32fast::hash(&data);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
    }

    Ok((Bytes::from(data), block_type))
}

/// [`BlockLoader`] reading blocks from an open [`Table`].
#[derive(Debug, Clone)]
pub struct TableBlockLoader {
    table: Arc<Table>,
}

impl TableBlockLoader {
    /// Create a loader for `table`
    pub fn new(table: Arc<Table>) -> Self {
        Self { table }
    }

    /// The table blocks are read from
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }
}

impl BlockLoader for TableBlockLoader {
    fn load_block(&self, options: &ReadOptions, handle: &[u8], key: &BlockKey) -> Box<dyn DbIterator> {
        self.table.block_reader(options, handle, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionType;
    use crate::env::{FsTableStore, TableStore};
    use crate::key::{TableKey, TABLE_KEY_LEN};
    use crate::sstable::TableBuilder;
    use tempfile::TempDir;

    fn key(byte: u8) -> BlockKey {
        BlockKey::Table(TableKey::from_bytes([byte; TABLE_KEY_LEN]))
    }

    fn build(store: &FsTableStore, options: &Options, key: BlockKey, n: usize) -> u64 {
        let mut file = store.create_table(1).unwrap();
        let mut builder = TableBuilder::new(options, file.as_mut(), key);
        for i in 0..n {
            builder.add(format!("key{:05}", i).as_bytes(), format!("value{:05}", i).as_bytes()).unwrap();
        }
        let size = builder.finish().unwrap();
        file.close().unwrap();
        size
    }

    fn open(store: &FsTableStore, options: &Options, size: u64) -> Table {
        Table::open(store.open_table(1).unwrap(), size, options).unwrap()
    }

    #[test]
    fn test_point_lookup() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let options = Options::default().block_size(128);
        let size = build(&store, &options, key(1), 100);

        let table = open(&store, &options, size);
        assert!(table.is_encrypted());
        assert!(table.num_data_blocks() > 1);
        assert_eq!(table.file_size(), size);

        let read = ReadOptions::default();
        assert_eq!(table.get(&read, &key(1), b"key00042").unwrap(), Some(b"value00042".to_vec()));
        assert_eq!(table.get(&read, &key(1), b"key00042x").unwrap(), None);
        assert_eq!(table.get(&read, &key(1), b"zzz").unwrap(), None);
        assert!(table.get(&read, &key(2), b"key00042").unwrap_err().is_corruption());
    }

    #[test]
    fn test_unencrypted_table() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let options = Options::default().compression(CompressionType::None);
        let size = build(&store, &options, BlockKey::Unencrypted, 10);

        let table = open(&store, &options, size);
        assert!(!table.is_encrypted());
        let read = ReadOptions::default();
        assert_eq!(table.get(&read, &BlockKey::Unencrypted, b"key00003").unwrap(), Some(b"value00003".to_vec()));
        assert!(table.get(&read, &key(1), b"key00003").unwrap_err().is_corruption());
    }

    #[test]
    fn test_cache_holds_sealed_blocks() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let options = Options::default().block_size(128);
        let size = build(&store, &options, key(1), 50);

        let cache = Arc::new(BlockCache::new(1 << 20));
        let table = Table::open_with_cache(store.open_table(1).unwrap(), size, &options, Arc::clone(&cache), 1).unwrap();

        let read = ReadOptions::default();
        assert!(table.get(&read, &key(1), b"key00001").unwrap().is_some());
        assert_eq!(cache.len(), 1);

        // A cached block still needs the right key
        assert!(table.get(&read, &key(9), b"key00001").is_err());
        assert_eq!(cache.stats().hits, 1);

        let no_fill = ReadOptions { fill_cache: false, ..ReadOptions::default() };
        assert!(table.get(&no_fill, &key(1), b"key00049").unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let options = Options::default();
        let size = build(&store, &options, key(1), 10);

        let file = store.open_table(1).unwrap();
        assert!(Table::open(Arc::clone(&file), size - 1, &options).is_err());
        assert!(Table::open(file, 8, &options).unwrap_err().is_corruption());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();
        let options = Options::default().compression(CompressionType::None);
        let size = build(&store, &options, key(1), 10);

        let path = store.table_path(1);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[3] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let table = open(&store, &options, size);
        let err = table.get(&ReadOptions::default(), &key(1), b"key00001").unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));

        // Without checksum verification the AEAD tag still rejects the block
        let unchecked = ReadOptions { verify_checksums: false, ..ReadOptions::default() };
        assert!(table.get(&unchecked, &key(1), b"key00001").unwrap_err().is_corruption());
    }
}
