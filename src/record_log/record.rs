//! Fragment encoding.
//!
//! Each fragment has the format:
//! ```text
//! [crc32: u32]     // over the type byte and the data
//! [length: u16]    // length of data
//! [type: u8]       // FragmentType
//! [data: bytes]
//! ```

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

/// Maximum data bytes carried by one fragment (32KB)
pub const MAX_FRAGMENT_SIZE: usize = 32 * 1024;

/// Fragment header size: crc32 (4) + length (2) + type (1)
pub const HEADER_SIZE: usize = 7;

/// Position of a fragment within its logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FragmentType {
    /// The whole record
    Full = 1,
    /// First fragment of a split record
    First = 2,
    /// Interior fragment of a split record
    Middle = 3,
    /// Final fragment of a split record
    Last = 4,
}

impl FragmentType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FragmentType::Full),
            2 => Ok(FragmentType::First),
            3 => Ok(FragmentType::Middle),
            4 => Ok(FragmentType::Last),
            _ => Err(Error::corruption(format!("Invalid fragment type: {}", value))),
        }
    }

    /// Type of the fragment covering `[offset, offset + chunk)` of a record of `total` bytes
    pub fn for_chunk(offset: usize, chunk: usize, total: usize) -> Self {
        let begin = offset == 0;
        let end = offset + chunk >= total;
        match (begin, end) {
            (true, true) => FragmentType::Full,
            (true, false) => FragmentType::First,
            (false, true) => FragmentType::Last,
            (false, false) => FragmentType::Middle,
        }
    }
}

/// One framed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Fragment type
    pub fragment_type: FragmentType,
    /// Payload carried by this fragment
    pub data: Vec<u8>,
}

impl Fragment {
    /// Create a new fragment
    pub fn new(fragment_type: FragmentType, data: Vec<u8>) -> Self {
        assert!(data.len() <= MAX_FRAGMENT_SIZE, "Fragment larger than {} bytes", MAX_FRAGMENT_SIZE);
        Self { fragment_type, data }
    }

    /// Encode the fragment with its header
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        buf.put_u32_le(checksum(self.fragment_type as u8, &self.data));
        buf.put_u16_le(self.data.len() as u16);
        buf.put_u8(self.fragment_type as u8);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Decode a fragment, checking its checksum when `verify` is set
    pub fn decode(mut data: &[u8], verify: bool) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!("Fragment too short: {} bytes", data.len())));
        }

        let stored = data.get_u32_le();
        let length = data.get_u16_le() as usize;
        let type_byte = data.get_u8();

        if data.len() < length {
            return Err(Error::corruption(format!(
                "Incomplete fragment: expected {} bytes, got {}",
                length,
                data.len()
            )));
        }
        let payload = &data[..length];

        if verify {
            let actual = checksum(type_byte, payload);
            if actual != stored {
                return Err(Error::ChecksumMismatch { expected: stored, actual });
            }
        }

        Ok(Self { fragment_type: FragmentType::from_u8(type_byte)?, data: payload.to_vec() })
    }

    /// Size of the encoded fragment
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }
}

fn checksum(type_byte: u8, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[type_byte]);
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_encode_decode() {
        let fragment = Fragment::new(FragmentType::Middle, b"hello world".to_vec());
        let encoded = fragment.encode();
        assert_eq!(encoded.len(), fragment.encoded_size());
        assert_eq!(Fragment::decode(&encoded, true).unwrap(), fragment);
    }

    #[test]
    fn test_fragment_type_for_chunk() {
        assert_eq!(FragmentType::for_chunk(0, 10, 10), FragmentType::Full);
        assert_eq!(FragmentType::for_chunk(0, 10, 30), FragmentType::First);
        assert_eq!(FragmentType::for_chunk(10, 10, 30), FragmentType::Middle);
        assert_eq!(FragmentType::for_chunk(20, 10, 30), FragmentType::Last);
    }

    #[test]
    fn test_checksum_validation() {
        let mut encoded = Fragment::new(FragmentType::Full, b"test data".to_vec()).encode();
        encoded[HEADER_SIZE] ^= 0xFF;

        assert!(matches!(Fragment::decode(&encoded, true), Err(Error::ChecksumMismatch { .. })));
        // Skipping verification hands back the damaged payload
        let fragment = Fragment::decode(&encoded, false).unwrap();
        assert_ne!(fragment.data, b"test data");
    }

    #[test]
    fn test_invalid_type() {
        let mut encoded = Fragment::new(FragmentType::Full, b"x".to_vec()).encode();
        encoded[6] = 9;
        assert!(Fragment::decode(&encoded, false).unwrap_err().is_corruption());
    }

    #[test]
    fn test_truncated_fragment() {
        let encoded = Fragment::new(FragmentType::Full, vec![0xAB; 100]).encode();
        assert!(Fragment::decode(&encoded[..50], true).is_err());
        assert!(Fragment::decode(&encoded[..3], true).is_err());
    }
}
