//! Two-level iteration over a table.
//!
//! The outer level walks the index block; each index value is an encoded
//! [`BlockHandle`](crate::sstable::BlockHandle). The inner level is an
//! iterator over the data block that handle points at, produced on demand by
//! a [`BlockLoader`] with the iterator's active [`BlockKey`].
//!
//! The active key is set by the keyed seek calls (`seek_with`,
//! `seek_to_first_with`, `seek_to_last_with`) or at construction, and is
//! used for every block materialized afterwards, including the ones pulled
//! in by `next`/`prev` crossing a block boundary. Without a key, block
//! materialization fails with `InvalidState`.

use crate::config::ReadOptions;
use crate::error::{Error, Result};
use crate::iterator::{DbIterator, EmptyIterator};
use crate::key::BlockKey;

/// Produces an iterator over one data block.
///
/// Failures are reported through the returned iterator's status rather than
/// a `Result`, so the caller can keep walking the index.
pub trait BlockLoader {
    /// Materializes the block addressed by the encoded `handle`, decoded
    /// with `key`.
    fn load_block(&self, options: &ReadOptions, handle: &[u8], key: &BlockKey) -> Box<dyn DbIterator>;
}

impl<F> BlockLoader for F
where
    F: Fn(&ReadOptions, &[u8], &BlockKey) -> Box<dyn DbIterator>,
{
    fn load_block(&self, options: &ReadOptions, handle: &[u8], key: &BlockKey) -> Box<dyn DbIterator> {
        self(options, handle, key)
    }
}

/// Iterator over a table built from an index cursor and a block loader.
///
/// A valid position always has a materialized data iterator sitting on a
/// real entry; empty or failed blocks are skipped in the direction of
/// travel. Errors from discarded blocks are remembered and reported by
/// [`status`](DbIterator::status) after the index and current block errors.
pub struct TwoLevelIterator<L: BlockLoader> {
    loader: L,
    options: ReadOptions,
    index_iter: Box<dyn DbIterator>,
    data_iter: Option<Box<dyn DbIterator>>,
    /// Encoded handle `data_iter` was built from
    data_block_handle: Vec<u8>,
    key: Option<BlockKey>,
    saved_error: Option<Error>,
}

impl<L: BlockLoader> TwoLevelIterator<L> {
    /// Creates an iterator with no active key.
    ///
    /// A key must be supplied through one of the keyed seek calls before
    /// any block can be read.
    pub fn new(index_iter: Box<dyn DbIterator>, loader: L, options: ReadOptions) -> Self {
        Self {
            loader,
            options,
            index_iter,
            data_iter: None,
            data_block_handle: Vec::new(),
            key: None,
            saved_error: None,
        }
    }

    /// Creates an iterator whose active key is `key`.
    pub fn with_key(index_iter: Box<dyn DbIterator>, loader: L, options: ReadOptions, key: BlockKey) -> Self {
        let mut iter = Self::new(index_iter, loader, options);
        iter.key = Some(key);
        iter
    }

    /// Returns the key used for block materialization, if one was supplied.
    pub fn active_key(&self) -> Option<&BlockKey> {
        self.key.as_ref()
    }

    /// Seeks to the first entry >= `target`, decoding blocks with `key`.
    ///
    /// Supplying a key does not clear errors saved from earlier blocks,
    /// including the `InvalidState` left by reading without a key; `status`
    /// keeps reporting them after the iterator becomes valid again.
    pub fn seek_with(&mut self, target: &[u8], key: BlockKey) {
        self.set_key(key);
        self.seek(target);
    }

    /// Seeks to the first entry, decoding blocks with `key`.
    ///
    /// Saved errors are kept, as for [`seek_with`](Self::seek_with).
    pub fn seek_to_first_with(&mut self, key: BlockKey) {
        self.set_key(key);
        self.seek_to_first();
    }

    /// Seeks to the last entry, decoding blocks with `key`.
    ///
    /// Saved errors are kept, as for [`seek_with`](Self::seek_with).
    pub fn seek_to_last_with(&mut self, key: BlockKey) {
        self.set_key(key);
        self.seek_to_last();
    }

    fn set_key(&mut self, key: BlockKey) {
        if self.key.as_ref() == Some(&key) {
            return;
        }
        // A block decoded with another key must not be reused
        self.set_data_iter(None);
        self.key = Some(key);
    }

    fn save_error(&mut self, result: Result<()>) {
        if self.saved_error.is_none() {
            if let Err(e) = result {
                self.saved_error = Some(e);
            }
        }
    }

    fn set_data_iter(&mut self, data_iter: Option<Box<dyn DbIterator>>) {
        if let Some(old) = self.data_iter.take() {
            self.save_error(old.status());
        }
        self.data_iter = data_iter;
    }

    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iter(None);
            return;
        }

        let handle = self.index_iter.value();
        if self.data_iter.is_some() && handle == self.data_block_handle.as_slice() {
            // Already positioned on this block
            return;
        }

        let handle = handle.to_vec();
        let iter: Box<dyn DbIterator> = match &self.key {
            Some(key) => self.loader.load_block(&self.options, &handle, key),
            None => Box::new(EmptyIterator::with_error(Error::invalid_state(
                "No block key supplied before reading a data block",
            ))),
        };
        self.data_block_handle = handle;
        self.set_data_iter(Some(iter));
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|d| d.valid())
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(data) = self.data_iter.as_mut() {
                data.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(data) = self.data_iter.as_mut() {
                data.seek_to_last();
            }
        }
    }

    fn data(&self) -> &dyn DbIterator {
        match &self.data_iter {
            Some(data) if data.valid() => data.as_ref(),
            _ => panic!("Iterator not valid"),
        }
    }
}

impl<L: BlockLoader> DbIterator for TwoLevelIterator<L> {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        assert!(self.valid(), "Iterator not valid");
        if let Some(data) = self.data_iter.as_mut() {
            data.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "Iterator not valid");
        if let Some(data) = self.data_iter.as_mut() {
            data.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.data().key()
    }

    fn value(&self) -> &[u8] {
        self.data().value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(data) = &self.data_iter {
            data.status()?;
        }
        match &self.saved_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
