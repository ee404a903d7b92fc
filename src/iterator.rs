//! Cursor abstraction shared by blocks, tables and build inputs.
//!
//! Every sorted source (a data block, the index block, a whole table, an
//! in-memory batch of entries) is exposed through [`DbIterator`]. Read
//! operations never return errors directly; a failure leaves the cursor
//! invalid and is reported by [`DbIterator::status`].

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A bidirectional cursor over sorted key-value entries.
///
/// # Panics
///
/// `key`, `value`, `next` and `prev` require the cursor to be valid and
/// panic otherwise.
pub trait DbIterator {
    /// Returns true if the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Positions the iterator at the first entry.
    fn seek_to_first(&mut self);

    /// Positions the iterator at the last entry.
    fn seek_to_last(&mut self);

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, target: &[u8]);

    /// Moves to the next entry.
    fn next(&mut self);

    /// Moves to the previous entry.
    fn prev(&mut self);

    /// Returns the key at the current position.
    fn key(&self) -> &[u8];

    /// Returns the value at the current position.
    fn value(&self) -> &[u8];

    /// Returns the first error encountered, if any.
    fn status(&self) -> Result<()>;
}

impl<I: DbIterator + ?Sized> DbIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) {
        (**self).seek_to_first()
    }

    fn seek_to_last(&mut self) {
        (**self).seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        (**self).seek(target)
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn prev(&mut self) {
        (**self).prev()
    }

    fn key(&self) -> &[u8] {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn status(&self) -> Result<()> {
        (**self).status()
    }
}

/// An iterator with no entries, optionally carrying an error.
///
/// Block materialization hands one of these back when a block cannot be
/// read, decoded or decrypted.
#[derive(Debug, Default)]
pub struct EmptyIterator {
    error: Option<Error>,
}

impl EmptyIterator {
    /// Creates an empty iterator with an OK status.
    pub fn new() -> Self {
        Self { error: None }
    }

    /// Creates an empty iterator whose status is `error`.
    pub fn with_error(error: Error) -> Self {
        Self { error: Some(error) }
    }
}

impl DbIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {
        panic!("Iterator not valid");
    }

    fn prev(&mut self) {
        panic!("Iterator not valid");
    }

    fn key(&self) -> &[u8] {
        panic!("Iterator not valid");
    }

    fn value(&self) -> &[u8] {
        panic!("Iterator not valid");
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// An in-memory iterator over a sorted, de-duplicated set of entries.
///
/// Typically used to feed [`build_table`](crate::build::build_table) from
/// entries collected elsewhere (e.g. a frozen memtable).
#[derive(Debug, Clone, Default)]
pub struct VecIterator {
    /// Entries in ascending key order
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Current position; None when not valid
    position: Option<usize>,
}

impl VecIterator {
    /// Creates an iterator from arbitrary entries.
    ///
    /// Entries are sorted by key; for duplicate keys the last one wins.
    pub fn new<K, V, I>(entries: I) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let sorted: BTreeMap<Vec<u8>, Vec<u8>> =
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: sorted.into_iter().collect(), position: None }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn current(&self) -> &(Vec<u8>, Vec<u8>) {
        let pos = self.position.expect("Iterator not valid");
        &self.entries[pos]
    }
}

impl DbIterator for VecIterator {
    fn valid(&self) -> bool {
        self.position.is_some()
    }

    fn seek_to_first(&mut self) {
        self.position = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.position = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, target: &[u8]) {
        let pos = match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(target)) {
            Ok(pos) => pos,
            Err(pos) => pos,
        };
        self.position = if pos < self.entries.len() { Some(pos) } else { None };
    }

    fn next(&mut self) {
        let pos = self.position.expect("Iterator not valid");
        self.position = if pos + 1 < self.entries.len() { Some(pos + 1) } else { None };
    }

    fn prev(&mut self) {
        let pos = self.position.expect("Iterator not valid");
        self.position = pos.checked_sub(1);
    }

    fn key(&self) -> &[u8] {
        &self.current().0
    }

    fn value(&self) -> &[u8] {
        &self.current().1
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
