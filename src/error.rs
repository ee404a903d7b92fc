//! Error types for the table subsystem.

use std::io;
use std::sync::Arc;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for table build and read operations.
///
/// `Error` is `Clone` so that iterators can keep a saved status and report it
/// from every `status()` call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Failure reported by the file layer.
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Data corruption was detected (malformed block, failed decryption, ...).
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The requested file or entry was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller passed something unusable, such as no key for an encrypted block.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An object was used in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A manifest record or metadata value failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored CRC does not match the bytes read.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// CRC stored in the file
        expected: u32,
        /// CRC of the bytes read
        actual: u32,
    },

    /// An internal consistency check failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Shorthand for [`Error::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Shorthand for [`Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for errors that indicate damaged or undecryptable data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
