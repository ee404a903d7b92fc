//! Framed record log.
//!
//! A log is a sequence of checksummed fragments. A logical record larger
//! than [`MAX_FRAGMENT_SIZE`] is split into `First`, `Middle`... `Last`
//! fragments; smaller ones are written as a single `Full` fragment. The
//! manifest is stored in this format.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealtable::record_log::{LogReader, LogWriter};
//!
//! # fn main() -> Result<(), sealtable::Error> {
//! let mut writer = LogWriter::create("MANIFEST-000001")?;
//! writer.add_record(b"first")?;
//! writer.sync()?;
//!
//! let mut reader = LogReader::open("MANIFEST-000001", true)?;
//! while let Some(record) = reader.read_record()? {
//!     println!("{} bytes", record.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::LogReader;
pub use record::{Fragment, FragmentType, HEADER_SIZE, MAX_FRAGMENT_SIZE};
pub use writer::LogWriter;
