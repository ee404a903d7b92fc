//! Cache of open tables keyed by file number.
//!
//! The table cache owns the open file handle and decoded index block of each
//! table, and hands out iterators whose block loader reads through the shared
//! block cache. It never stores key material; every iterator gets the key
//! recorded in the table's [`FileMetaData`].

use crate::build::FileMetaData;
use crate::cache::BlockCache;
use crate::config::{Options, ReadOptions};
use crate::env::TableStore;
use crate::error::Result;
use crate::iterator::{DbIterator, EmptyIterator};
use crate::key::BlockKey;
use crate::sstable::{Table, TableBlockLoader, TwoLevelIterator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct OpenTables {
    tables: HashMap<u64, (Arc<Table>, u64)>,
    next_tick: u64,
}

/// Bounded cache of open [`Table`]s.
///
/// Safe to share between threads; lookups of different tables only contend
/// on a short critical section around the map.
pub struct TableCache {
    store: Arc<dyn TableStore>,
    options: Options,
    block_cache: Option<Arc<BlockCache>>,
    open: Mutex<OpenTables>,
}

impl TableCache {
    /// Create a table cache over `store`.
    ///
    /// A block cache of `options.block_cache_size` bytes is created unless
    /// the size is zero. `options` are expected to have passed
    /// [`Options::validate`]; tables are opened with them as given.
    pub fn new(store: Arc<dyn TableStore>, options: Options) -> Self {
        let block_cache =
            if options.block_cache_size > 0 { Some(Arc::new(BlockCache::new(options.block_cache_size))) } else { None };
        Self { store, options, block_cache, open: Mutex::new(OpenTables::default()) }
    }

    /// Return the open table for `file_number`, opening it if needed
    pub fn find_table(&self, file_number: u64, file_size: u64) -> Result<Arc<Table>> {
        {
            let mut open = self.open.lock();
            open.next_tick += 1;
            let tick = open.next_tick;
            if let Some((table, last_used)) = open.tables.get_mut(&file_number) {
                *last_used = tick;
                return Ok(Arc::clone(table));
            }
        }

        // Open outside the lock; a racing open of the same table is harmless
        let file = self.store.open_table(file_number)?;
        let table = match &self.block_cache {
            Some(cache) => Table::open_with_cache(file, file_size, &self.options, Arc::clone(cache), file_number)?,
            None => Table::open(file, file_size, &self.options)?,
        };
        let table = Arc::new(table);
        log::debug!("Opened table {} ({} bytes)", file_number, file_size);

        let mut open = self.open.lock();
        open.next_tick += 1;
        let tick = open.next_tick;
        if open.tables.len() >= self.options.max_open_tables && !open.tables.contains_key(&file_number) {
            let victim = open.tables.iter().min_by_key(|(_, (_, used))| *used).map(|(number, _)| *number);
            if let Some(victim) = victim {
                open.tables.remove(&victim);
            }
        }
        let entry = open.tables.entry(file_number).or_insert((table, tick));
        entry.1 = tick;
        Ok(Arc::clone(&entry.0))
    }

    /// Iterator over a table with no active key.
    ///
    /// The caller supplies the key through the iterator's keyed seeks.
    pub fn table_iterator(
        &self,
        options: ReadOptions,
        file_number: u64,
        file_size: u64,
    ) -> Result<TwoLevelIterator<TableBlockLoader>> {
        let table = self.find_table(file_number, file_size)?;
        Ok(table.iter_unkeyed(options))
    }

    /// Iterator over the table described by `meta`, decrypting with its key.
    ///
    /// Failure to open the table is reported through the iterator's status.
    pub fn new_iterator(&self, options: ReadOptions, meta: &FileMetaData) -> Box<dyn DbIterator> {
        match self.find_table(meta.number, meta.file_size) {
            Ok(table) => Box::new(table.iter(options, BlockKey::Table(meta.key.clone()))),
            Err(e) => Box::new(EmptyIterator::with_error(e)),
        }
    }

    /// Point lookup in the table described by `meta`
    pub fn get(&self, options: &ReadOptions, meta: &FileMetaData, target: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.find_table(meta.number, meta.file_size)?;
        table.get(options, &BlockKey::Table(meta.key.clone()), target)
    }

    /// Forget an open table and its cached blocks
    pub fn evict(&self, file_number: u64) {
        self.open.lock().tables.remove(&file_number);
        if let Some(cache) = &self.block_cache {
            cache.erase_table(file_number);
        }
    }

    /// The table store files are opened from
    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// The shared block cache, if enabled
    pub fn block_cache(&self) -> Option<&Arc<BlockCache>> {
        self.block_cache.as_ref()
    }

    /// Number of tables currently open
    pub fn len(&self) -> usize {
        self.open.lock().tables.len()
    }

    /// Check if no table is open
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_table;
    use crate::env::FsTableStore;
    use crate::iterator::VecIterator;
    use tempfile::TempDir;

    fn setup(max_open: usize) -> (TempDir, TableCache) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
        let cache = TableCache::new(store, Options::default().max_open_tables(max_open));
        (dir, cache)
    }

    fn build(cache: &TableCache, number: u64) -> FileMetaData {
        let mut input = VecIterator::new((0..20).map(|i| (format!("{}-{:03}", number, i), format!("v{}", i))));
        build_table(cache.store().as_ref(), &Options::default(), cache, &mut input, number, &mut rand::rng())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_find_table_reuses_open_table() {
        let (_dir, cache) = setup(10);
        let meta = build(&cache, 1);

        let a = cache.find_table(meta.number, meta.file_size).unwrap();
        let b = cache.find_table(meta.number, meta.file_size).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (_dir, cache) = setup(2);
        let metas: Vec<_> = (1..=3).map(|n| build(&cache, n)).collect();

        cache.find_table(1, metas[0].file_size).unwrap();
        cache.find_table(2, metas[1].file_size).unwrap();
        cache.find_table(1, metas[0].file_size).unwrap();
        cache.find_table(3, metas[2].file_size).unwrap();

        assert_eq!(cache.len(), 2);
        let open = cache.open.lock();
        assert!(open.tables.contains_key(&1));
        assert!(!open.tables.contains_key(&2));
    }

    #[test]
    fn test_iterator_uses_metadata_key() {
        let (_dir, cache) = setup(10);
        let meta = build(&cache, 7);

        let mut iter = cache.new_iterator(ReadOptions::default(), &meta);
        iter.seek(b"7-010");
        assert_eq!(iter.key(), b"7-010");
        assert_eq!(iter.value(), b"v10");

        assert_eq!(cache.get(&ReadOptions::default(), &meta, b"7-019").unwrap(), Some(b"v19".to_vec()));
    }

    #[test]
    fn test_table_iterator_takes_key_from_seek() {
        let (_dir, cache) = setup(10);
        let meta = build(&cache, 4);

        let mut iter = cache.table_iterator(ReadOptions::default(), meta.number, meta.file_size).unwrap();
        assert!(iter.active_key().is_none());
        iter.seek_with(b"4-005", BlockKey::Table(meta.key.clone()));
        assert_eq!(iter.key(), b"4-005");
        assert_eq!(iter.value(), b"v5");

        assert!(cache.table_iterator(ReadOptions::default(), 99, meta.file_size).is_err());
    }

    #[test]
    fn test_missing_table_reports_status() {
        let (_dir, cache) = setup(10);
        let mut meta = build(&cache, 1);
        meta.number = 99;

        let mut iter = cache.new_iterator(ReadOptions::default(), &meta);
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(matches!(iter.status(), Err(crate::Error::NotFound(_))));
    }

    #[test]
    fn test_evict_drops_cached_blocks() {
        let (_dir, cache) = setup(10);
        let meta = build(&cache, 1);

        assert!(cache.get(&ReadOptions::default(), &meta, b"1-000").unwrap().is_some());
        assert!(!cache.is_empty());

        cache.evict(1);
        assert!(cache.is_empty());
        assert!(cache.block_cache().unwrap().is_empty());
    }
}
