//! Sorted key/value blocks.
//!
//! Keys are prefix-compressed against their predecessor, except at restart
//! points, which store the full key and let a seek binary-search the block.
//! Data blocks and the index block share this encoding. Encryption is applied
//! on top of the finished bytes by the block codec.

use crate::error::{Error, Result};
use crate::iterator::DbIterator;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of an entry header: shared, unshared and value lengths (u32 each)
const ENTRY_HEADER_SIZE: usize = 12;

/// A decoded (plaintext) block.
///
/// ```text
/// entry*  restart_offset: u32 LE *  num_restarts: u32 LE
/// entry = shared: u32 | unshared: u32 | value_len: u32 | key[shared..] | value
/// ```
/// All lengths are little-endian. An empty block still holds one restart
/// point at offset 0.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Parse the restart array of plaintext block contents
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("Block too small"));
        }

        let num_restarts = read_u32(&data, data.len() - 4);
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts == 0 || num_restarts as usize > max_restarts {
            return Err(Error::corruption(format!(
                "Invalid restart count {} for block of {} bytes",
                num_restarts,
                data.len()
            )));
        }

        let restart_offset = data.len() - 4 - num_restarts as usize * 4;

        Ok(Self { data, restart_offset, num_restarts })
    }

    /// Number of restart points, at least one
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    fn restart_point(&self, index: u32) -> usize {
        read_u32(&self.data, self.restart_offset + index as usize * 4) as usize
    }

    /// Iterator over the entries; shares the block's buffer
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.clone())
    }

    /// Encoded block contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Decoded entry header: (shared, unshared, value_len, offset of key suffix)
fn decode_entry_header(data: &[u8], offset: usize, limit: usize) -> Option<(usize, usize, usize, usize)> {
    if offset + ENTRY_HEADER_SIZE > limit {
        return None;
    }
    let shared = read_u32(data, offset) as usize;
    let unshared = read_u32(data, offset + 4) as usize;
    let value_len = read_u32(data, offset + 8) as usize;
    let key_offset = offset + ENTRY_HEADER_SIZE;
    if key_offset.checked_add(unshared)?.checked_add(value_len)? > limit {
        return None;
    }
    Some((shared, unshared, value_len, key_offset))
}

/// Accumulates sorted entries into the block encoding.
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
    block_restart_interval: usize,
}

impl BlockBuilder {
    /// Start a block with a restart point every `block_restart_interval` entries
    pub fn new(block_restart_interval: usize) -> Self {
        assert!(block_restart_interval > 0, "Restart interval must be positive");

        Self {
            buffer: BytesMut::new(),
            restarts: vec![0],
            counter: 0,
            last_key: Vec::new(),
            block_restart_interval,
        }
    }

    /// Append an entry. Keys must be strictly ascending.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(self.is_empty() || key > self.last_key.as_slice(), "Block keys out of order");

        let shared = if self.counter < self.block_restart_interval {
            shared_prefix_len(&self.last_key, key)
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        for len in [shared, key.len() - shared, value.len()] {
            self.buffer.put_u32_le(len as u32);
        }
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Append the restart array and return the encoded block
    pub fn finish(mut self) -> Bytes {
        let num_restarts = self.restarts.len() as u32;
        for offset in self.restarts.iter().copied().chain([num_restarts]) {
            self.buffer.put_u32_le(offset);
        }
        self.buffer.freeze()
    }

    /// Encoded size if the block were finished now
    pub fn current_size(&self) -> usize {
        self.buffer.len() + (self.restarts.len() + 1) * 4
    }

    /// Whether no entry has been added
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Bidirectional iterator over the entries of a block.
///
/// A malformed entry makes the iterator invalid and sets a corruption
/// status.
pub struct BlockIterator {
    block: Block,
    /// Offset of the current entry; equals `restart_offset` when invalid
    current: usize,
    /// Offset just past the current entry
    next_offset: usize,
    /// Restart block containing `current`
    restart_index: u32,
    key: Vec<u8>,
    value_start: usize,
    value_end: usize,
    status: Option<Error>,
}

impl BlockIterator {
    fn new(block: Block) -> Self {
        let restart_offset = block.restart_offset;
        let num_restarts = block.num_restarts;
        Self {
            block,
            current: restart_offset,
            next_offset: restart_offset,
            restart_index: num_restarts,
            key: Vec::new(),
            value_start: 0,
            value_end: 0,
            status: None,
        }
    }

    fn mark_invalid(&mut self) {
        self.current = self.block.restart_offset;
        self.next_offset = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
    }

    fn corruption(&mut self, msg: &str) {
        self.mark_invalid();
        self.key.clear();
        if self.status.is_none() {
            self.status = Some(Error::corruption(msg.to_string()));
        }
    }

    /// Seek to a restart point; the next parse yields its entry
    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        self.next_offset = self.block.restart_point(index);
    }

    /// Parse the entry at `next_offset`. Returns false at the end of the block
    fn parse_next_entry(&mut self) -> bool {
        self.current = self.next_offset;
        let limit = self.block.restart_offset;
        if self.current >= limit {
            self.mark_invalid();
            return false;
        }

        let Some((shared, unshared, value_len, key_offset)) =
            decode_entry_header(&self.block.data, self.current, limit)
        else {
            self.corruption("bad entry in block");
            return false;
        };
        if shared > self.key.len() {
            self.corruption("bad shared prefix in block");
            return false;
        }

        // Reconstruct key
        self.key.truncate(shared);
        self.key.extend_from_slice(&self.block.data[key_offset..key_offset + unshared]);

        self.value_start = key_offset + unshared;
        self.value_end = self.value_start + value_len;
        self.next_offset = self.value_end;

        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }

    /// Key stored at a restart point (restart entries never share a prefix)
    fn restart_key(&self, index: u32) -> Option<&[u8]> {
        let offset = self.block.restart_point(index);
        let (shared, unshared, _, key_offset) =
            decode_entry_header(&self.block.data, offset, self.block.restart_offset)?;
        if shared != 0 {
            return None;
        }
        Some(&self.block.data[key_offset..key_offset + unshared])
    }
}

impl DbIterator for BlockIterator {
    fn valid(&self) -> bool {
        self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    fn seek_to_last(&mut self) {
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_entry() && self.next_offset < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        // Binary search for the last restart point with a key < target
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let Some(mid_key) = self.restart_key(mid) else {
                self.corruption("bad restart entry in block");
                return;
            };
            if mid_key < target {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        // Linear search for the first key >= target
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.key.as_slice() >= target {
                return;
            }
        }
    }

    fn next(&mut self) {
        assert!(self.valid(), "Iterator not valid");
        self.parse_next_entry();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "Iterator not valid");

        // Scan backwards to a restart point before the current entry
        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.mark_invalid();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_entry() && self.next_offset < original {}
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid(), "Iterator not valid");
        &self.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid(), "Iterator not valid");
        &self.block.data[self.value_start..self.value_end]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
