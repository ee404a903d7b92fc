//! Block codec: compression and encryption of stored blocks.
//!
//! A finished block is optionally compressed and then, when a table key is
//! supplied, sealed with XChaCha20-Poly1305. The nonce is derived from the
//! block's file offset, which is unique within a table, and every table has
//! its own key. The block type byte is authenticated as associated data.
//!
//! ```text
//! block_type = compression id (low 7 bits) | 0x80 if encrypted
//! ```

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::key::BlockKey;
use bytes::Bytes;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use std::fmt;

/// Block type bit marking an encrypted payload
pub const ENCRYPTED_FLAG: u8 = 0x80;

/// Size of the authentication tag appended to encrypted payloads
pub const TAG_SIZE: usize = 16;

const NONCE_SIZE: usize = 24;

/// A block as it is written to the table file, minus its trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Stored payload (compressed and/or encrypted)
    pub payload: Vec<u8>,
    /// Block type byte recorded in the trailer
    pub block_type: u8,
}

/// Encodes and decodes the stored form of a block.
pub trait BlockCodec: Send + Sync + fmt::Debug {
    /// Turn a finished block into its stored form.
    ///
    /// `offset` is the file offset the payload will be written at.
    fn encode(&self, raw: &[u8], offset: u64, key: &BlockKey) -> Result<EncodedBlock>;

    /// Recover the finished block from its stored form.
    fn decode(&self, payload: &[u8], block_type: u8, offset: u64, key: &BlockKey) -> Result<Bytes>;
}

/// The default codec: optional Snappy compression followed by encryption.
#[derive(Debug, Clone)]
pub struct StandardBlockCodec {
    compression: CompressionType,
}

impl StandardBlockCodec {
    /// Creates a codec compressing with `compression`.
    pub fn new(compression: CompressionType) -> Self {
        Self { compression }
    }

    fn compress(&self, raw: &[u8]) -> Result<(Vec<u8>, CompressionType)> {
        match self.compression {
            CompressionType::None => Ok((raw.to_vec(), CompressionType::None)),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(raw)
                    .map_err(|e| Error::internal(format!("Compression failed: {}", e)))?;
                // Keep the raw block unless compression saves at least 12.5%
                if compressed.len() < raw.len() - raw.len() / 8 {
                    Ok((compressed, CompressionType::Snappy))
                } else {
                    Ok((raw.to_vec(), CompressionType::None))
                }
            }
        }
    }
}

impl Default for StandardBlockCodec {
    fn default() -> Self {
        Self::new(CompressionType::default())
    }
}

impl BlockCodec for StandardBlockCodec {
    fn encode(&self, raw: &[u8], offset: u64, key: &BlockKey) -> Result<EncodedBlock> {
        let (compressed, compression) = self.compress(raw)?;

        match key {
            BlockKey::Unencrypted => {
                Ok(EncodedBlock { payload: compressed, block_type: compression as u8 })
            }
            BlockKey::Table(table_key) => {
                let block_type = compression as u8 | ENCRYPTED_FLAG;
                let cipher = XChaCha20Poly1305::new(Key::from_slice(table_key.as_bytes()));
                let nonce = block_nonce(offset);
                let payload = cipher
                    .encrypt(XNonce::from_slice(&nonce), Payload { msg: &compressed, aad: &[block_type] })
                    .map_err(|_| Error::internal(format!("Block encryption failed at offset {}", offset)))?;
                Ok(EncodedBlock { payload, block_type })
            }
        }
    }

    fn decode(&self, payload: &[u8], block_type: u8, offset: u64, key: &BlockKey) -> Result<Bytes> {
        let encrypted = block_type & ENCRYPTED_FLAG != 0;
        let compression = CompressionType::from_u8(block_type & !ENCRYPTED_FLAG).ok_or_else(|| {
            Error::corruption(format!("Invalid block type {:#x} at offset {}", block_type, offset))
        })?;

        let plain = match (encrypted, key) {
            (false, BlockKey::Unencrypted) => payload.to_vec(),
            (true, BlockKey::Unencrypted) => {
                return Err(Error::invalid_argument(format!(
                    "Block at offset {} is encrypted but no table key was supplied",
                    offset
                )));
            }
            (false, BlockKey::Table(_)) => {
                return Err(Error::corruption(format!(
                    "Expected an encrypted block at offset {}",
                    offset
                )));
            }
            (true, BlockKey::Table(table_key)) => {
                let cipher = XChaCha20Poly1305::new(Key::from_slice(table_key.as_bytes()));
                let nonce = block_nonce(offset);
                cipher
                    .decrypt(XNonce::from_slice(&nonce), Payload { msg: payload, aad: &[block_type] })
                    .map_err(|_| {
                        Error::corruption(format!(
                            "Block decryption failed at offset {} (wrong key or damaged block)",
                            offset
                        ))
                    })?
            }
        };

        match compression {
            CompressionType::None => Ok(Bytes::from(plain)),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(&plain)
                .map(Bytes::from)
                .map_err(|e| Error::corruption(format!("Decompression failed: {}", e))),
        }
    }
}

fn block_nonce(offset: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&offset.to_le_bytes());
    nonce
}
