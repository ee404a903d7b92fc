//! Log writer.

use super::record::{Fragment, FragmentType, MAX_FRAGMENT_SIZE};
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends framed records to a log file.
pub struct LogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    file_size: u64,
}

impl LogWriter {
    /// Create a new log file, truncating any existing one
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        Ok(Self { path, writer: BufWriter::new(file), file_size: 0 })
    }

    /// Open a log file for appending, creating it if missing
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { path, writer: BufWriter::new(file), file_size })
    }

    /// Append one logical record, splitting it into fragments as needed
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        loop {
            let chunk = (data.len() - offset).min(MAX_FRAGMENT_SIZE);
            let fragment_type = FragmentType::for_chunk(offset, chunk, data.len());
            let encoded = Fragment::new(fragment_type, data[offset..offset + chunk].to_vec()).encode();

            self.writer.write_all(&encoded)?;
            self.file_size += encoded.len() as u64;
            offset += chunk;

            if offset >= data.len() {
                return Ok(());
            }
        }
    }

    /// Flush buffered records and fsync the file
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Bytes written to the log, including what was there on open
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync and close the log
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
