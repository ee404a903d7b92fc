//! File contracts used by the table build and read paths.
//!
//! [`TableStore`] creates, opens and deletes table files by number. The
//! filesystem implementation stores table `N` as `{dir}/{N:06}.sst`.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A sequentially written file.
pub trait WritableFile: Send {
    /// Appends data to the end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Flushes buffered data and makes the file contents durable.
    fn sync(&mut self) -> Result<()>;

    /// Closes the file. No further appends are allowed.
    fn close(&mut self) -> Result<()>;
}

/// A file supporting positional reads from any thread.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Returns the current size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// Creates, opens and deletes table files by table number.
pub trait TableStore: Send + Sync {
    /// Creates a new, empty table file. An existing file is truncated.
    fn create_table(&self, number: u64) -> Result<Box<dyn WritableFile>>;

    /// Opens an existing table file for reading.
    fn open_table(&self, number: u64) -> Result<Arc<dyn RandomAccessFile>>;

    /// Deletes a table file.
    fn delete_table(&self, number: u64) -> Result<()>;
}

/// Generate the file name of table `number`
pub fn table_file_name(number: u64) -> String {
    format!("{:06}.sst", number)
}

/// Parse a table file name to extract the table number
pub fn parse_table_file_name(filename: &str) -> Option<u64> {
    filename.strip_suffix(".sst")?.parse().ok()
}

/// A [`TableStore`] keeping table files in one directory.
#[derive(Debug, Clone)]
pub struct FsTableStore {
    dir: PathBuf,
}

impl FsTableStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the full path of table `number`.
    pub fn table_path(&self, number: u64) -> PathBuf {
        self.dir.join(table_file_name(number))
    }

    /// Returns the directory holding the tables.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableStore for FsTableStore {
    fn create_table(&self, number: u64) -> Result<Box<dyn WritableFile>> {
        let file = FsWritableFile::create(self.table_path(number))?;
        Ok(Box::new(file))
    }

    fn open_table(&self, number: u64) -> Result<Arc<dyn RandomAccessFile>> {
        let path = self.table_path(number);
        if !path.exists() {
            return Err(Error::not_found(format!("table file {:?}", path)));
        }
        let file = FsRandomAccessFile::open(path)?;
        Ok(Arc::new(file))
    }

    fn delete_table(&self, number: u64) -> Result<()> {
        fs::remove_file(self.table_path(number))?;
        Ok(())
    }
}

/// Buffered [`WritableFile`] backed by a regular file.
pub struct FsWritableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FsWritableFile {
    /// Create (or truncate) the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        Ok(Self { path, writer: Some(BufWriter::new(file)) })
    }

    /// Get the path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::invalid_state(format!("file {:?} already closed", self.path)))
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer()?.write_all(data)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FsWritableFile {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

/// [`RandomAccessFile`] backed by a regular file.
///
/// Reads are serialized through a mutex because they share one seek cursor.
#[derive(Debug)]
pub struct FsRandomAccessFile {
    file: Mutex<File>,
}

impl FsRandomAccessFile {
    /// Open the file at `path` for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl RandomAccessFile for FsRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_table_file_name() {
        assert_eq!(table_file_name(1), "000001.sst");
        assert_eq!(table_file_name(123), "000123.sst");
        assert_eq!(table_file_name(1234567), "1234567.sst");
    }

    #[test]
    fn test_parse_table_file_name() {
        assert_eq!(parse_table_file_name("000001.sst"), Some(1));
        assert_eq!(parse_table_file_name("999999.sst"), Some(999999));
        assert_eq!(parse_table_file_name("000001.log"), None);
        assert_eq!(parse_table_file_name("invalid"), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();

        let mut file = store.create_table(7).unwrap();
        file.append(b"hello ").unwrap();
        file.append(b"world").unwrap();
        file.sync().unwrap();
        file.close().unwrap();

        let reader = store.open_table(7).unwrap();
        assert_eq!(reader.size().unwrap(), 11);
        assert_eq!(reader.read_at(6, 5).unwrap(), b"world");
        assert!(reader.read_at(8, 10).is_err());
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();

        let mut file = store.create_table(1).unwrap();
        file.close().unwrap();
        assert!(matches!(file.append(b"x"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_delete_table() {
        let dir = TempDir::new().unwrap();
        let store = FsTableStore::new(dir.path()).unwrap();

        let mut file = store.create_table(3).unwrap();
        file.close().unwrap();
        assert!(store.table_path(3).exists());

        store.delete_table(3).unwrap();
        assert!(!store.table_path(3).exists());
        assert!(matches!(store.open_table(3), Err(Error::NotFound(_))));
        assert!(store.delete_table(3).is_err());
    }
}
