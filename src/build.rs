//! Building a table file from a sorted input.
//!
//! [`build_table`] drains a sorted cursor (typically a frozen memtable or a
//! merge of compaction inputs) into a new encrypted table, generating a fresh
//! key for it, and returns the [`FileMetaData`] the manifest records.

use crate::config::{Options, ReadOptions};
use crate::env::TableStore;
use crate::error::{Error, Result};
use crate::iterator::DbIterator;
use crate::key::{BlockKey, TableKey};
use crate::sstable::TableBuilder;
use crate::table_cache::TableCache;
use rand::CryptoRng;
use serde::{Deserialize, Serialize};

/// Metadata of a finished table file.
///
/// `key` is fixed when the table is built and is the only key its data
/// blocks can be read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// File number in the table store
    pub number: u64,
    /// File size in bytes
    pub file_size: u64,
    /// First key in the table
    pub smallest: Vec<u8>,
    /// Last key in the table
    pub largest: Vec<u8>,
    /// Key the data blocks are encrypted with
    pub key: TableKey,
}

/// Build table `file_number` from every entry of `iter`.
///
/// Returns `Ok(None)` when the input is empty; no file is left behind in
/// that case. On success the table has been synced, closed and verified
/// through `table_cache`. On any failure the partial file is deleted and the
/// first error is returned; an error reported by the input cursor takes
/// precedence over a successful build.
///
/// Invalid `options` are rejected with `InvalidArgument` before any file is
/// created.
///
/// # Panics
///
/// Panics if the input keys are not strictly ascending.
pub fn build_table<R: CryptoRng + ?Sized>(
    store: &dyn TableStore,
    options: &Options,
    table_cache: &TableCache,
    iter: &mut dyn DbIterator,
    file_number: u64,
    rng: &mut R,
) -> Result<Option<FileMetaData>> {
    options.validate()?;

    iter.seek_to_first();
    if !iter.valid() {
        iter.status()?;
        log::info!("Input for table {} is empty, no table written", file_number);
        return Ok(None);
    }

    let key = TableKey::generate(rng);
    log::info!("Building table {}", file_number);

    let result = write_table(store, options, iter, file_number, key)
        .and_then(|meta| verify_table(options, table_cache, &meta).map(|()| meta));

    match result {
        Ok(meta) => {
            log::info!("Table {} built: {} bytes", file_number, meta.file_size);
            Ok(Some(meta))
        }
        Err(e) => {
            log::warn!("Building table {} failed: {}", file_number, e);
            table_cache.evict(file_number);
            if let Err(delete_err) = store.delete_table(file_number) {
                log::warn!("Failed to delete partial table {}: {}", file_number, delete_err);
            }
            Err(e)
        }
    }
}

fn write_table(
    store: &dyn TableStore,
    options: &Options,
    iter: &mut dyn DbIterator,
    file_number: u64,
    key: TableKey,
) -> Result<FileMetaData> {
    let mut file = store.create_table(file_number)?;
    let mut builder = TableBuilder::new(options, file.as_mut(), BlockKey::Table(key.clone()));

    let smallest = iter.key().to_vec();
    let mut largest = Vec::new();
    while iter.valid() {
        largest.clear();
        largest.extend_from_slice(iter.key());
        builder.add(iter.key(), iter.value())?;
        iter.next();
    }

    if let Err(e) = iter.status() {
        builder.abandon();
        return Err(e);
    }

    let file_size = builder.finish()?;
    log::debug!("Table {}: {} entries in {} data blocks", file_number, builder.num_entries(), builder.num_data_blocks());
    if file_size == 0 {
        return Err(Error::internal(format!("Table {} finished with zero size", file_number)));
    }

    file.sync()?;
    file.close()?;

    Ok(FileMetaData { number: file_number, file_size, smallest, largest, key })
}

/// Re-open a freshly written table with its recorded key
fn verify_table(options: &Options, table_cache: &TableCache, meta: &FileMetaData) -> Result<()> {
    let read_options = ReadOptions { verify_checksums: true, fill_cache: false };
    let mut iter = table_cache.new_iterator(read_options, meta);

    iter.seek_to_first();
    if iter.valid() && iter.key() != meta.smallest.as_slice() {
        return Err(Error::corruption(format!("Table {} does not start at its smallest key", meta.number)));
    }

    if options.paranoid_checks {
        let mut last = None;
        while iter.valid() {
            last = Some(iter.key().to_vec());
            iter.next();
        }
        iter.status()?;
        if last.as_deref() != Some(meta.largest.as_slice()) {
            return Err(Error::corruption(format!("Table {} does not end at its largest key", meta.number)));
        }
    }

    iter.status()
}
