// Shared helpers for integration tests

#![allow(dead_code)]

use sealtable::env::{FsTableStore, TableStore};
use sealtable::iterator::{DbIterator, VecIterator};
use sealtable::key::BlockKey;
use sealtable::sstable::{Table, TableBuilder};
use sealtable::{CompressionType, Options, TableKey};
use std::sync::Arc;
use tempfile::TempDir;

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

pub fn test_key(byte: u8) -> TableKey {
    TableKey::from_bytes([byte; 32])
}

/// Options with compression off so block boundaries depend only on entry sizes
pub fn plain_options(block_size: usize) -> Options {
    Options::default().block_size(block_size).compression(CompressionType::None)
}

/// Write `entries` into table `number` with `key` and open it
pub fn write_table(
    store: &FsTableStore,
    options: &Options,
    number: u64,
    key: BlockKey,
    entries: &[(Vec<u8>, Vec<u8>)],
) -> Arc<Table> {
    let mut file = store.create_table(number).unwrap();
    let mut builder = TableBuilder::new(options, file.as_mut(), key);
    for (k, v) in entries {
        builder.add(k, v).unwrap();
    }
    let size = builder.finish().unwrap();
    file.sync().unwrap();
    file.close().unwrap();

    Arc::new(Table::open(store.open_table(number).unwrap(), size, options).unwrap())
}

pub fn numbered_entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n).map(|i| (format!("key{:06}", i).into_bytes(), format!("value{:06}", i).into_bytes())).collect()
}

pub fn temp_store() -> (TempDir, Arc<FsTableStore>) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
    (dir, store)
}

/// Drain an iterator forward from its current position
pub fn collect(iter: &mut dyn DbIterator) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    out
}

pub fn input(entries: &[(Vec<u8>, Vec<u8>)]) -> VecIterator {
    VecIterator::new(entries.iter().cloned())
}
