//! Table footer implementation.
//!
//! The footer is a fixed-size (32 bytes) structure at the end of a table file
//! that locates the index block and records whether data blocks are encrypted.

use crate::error::{Error, Result};
use crate::sstable::{FOOTER_SIZE, FORMAT_VERSION, MAGIC_NUMBER};

/// Encoded size of a [`BlockHandle`]
pub const BLOCK_HANDLE_SIZE: usize = 16;

/// Footer flag: data blocks are encrypted with the table key
const FLAG_ENCRYPTED: u8 = 0x01;

/// BlockHandle represents a pointer to a block in the table file.
///
/// It contains the offset and size of the block. The size excludes the
/// block trailer (type byte and checksum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    /// File offset of the block's first byte
    pub offset: u64,
    /// Size of the stored block payload in bytes
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Fixed 16-byte encoding: offset then size, both u64 LE
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HANDLE_SIZE);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Parse the fixed 16-byte handle encoding
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HANDLE_SIZE {
            return Err(Error::corruption("BlockHandle too short"));
        }

        let mut offset = [0u8; 8];
        let mut size = [0u8; 8];
        offset.copy_from_slice(&data[0..8]);
        size.copy_from_slice(&data[8..16]);

        Ok(Self { offset: u64::from_le_bytes(offset), size: u64::from_le_bytes(size) })
    }
}

/// Footer is the last 32 bytes of a table file.
///
/// Format:
/// ```text
/// [index_handle: 16 bytes]
/// [format_version: 1 byte]
/// [flags: 1 byte]
/// [reserved: 6 bytes]
/// [magic: 8 bytes]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the index block
    pub index_handle: BlockHandle,
    /// Whether the data blocks are encrypted
    pub encrypted: bool,
}

impl Footer {
    /// Create a new Footer
    pub fn new(index_handle: BlockHandle, encrypted: bool) -> Self {
        Self { index_handle, encrypted }
    }

    /// Encode the footer to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        buf.extend_from_slice(&self.index_handle.encode());
        buf.push(FORMAT_VERSION);
        buf.push(if self.encrypted { FLAG_ENCRYPTED } else { 0 });
        buf.extend_from_slice(&[0u8; 6]);
        buf.extend_from_slice(&MAGIC_NUMBER.to_le_bytes());

        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Decode a footer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        // Verify magic number
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[24..32]);
        let magic = u64::from_le_bytes(magic);
        if magic != MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "Invalid table magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER, magic
            )));
        }

        let version = data[16];
        if version != FORMAT_VERSION {
            return Err(Error::corruption(format!("Unsupported table format version {}", version)));
        }

        let flags = data[17];
        if flags & !FLAG_ENCRYPTED != 0 {
            return Err(Error::corruption(format!("Unknown footer flags {:#x}", flags)));
        }

        let index_handle = BlockHandle::decode(&data[0..16])?;
        Ok(Self { index_handle, encrypted: flags & FLAG_ENCRYPTED != 0 })
    }
}
