//! Manifest: the persistent log of table-set changes.
//!
//! Every change to the set of live tables is recorded as a [`VersionEdit`],
//! encoded with bincode and appended to the manifest as one framed record.
//! `AddFile` edits carry the full [`FileMetaData`], including the table key,
//! so tables remain readable after a restart.

use crate::build::FileMetaData;
use crate::error::{Error, Result};
use crate::record_log::{LogReader, LogWriter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

/// A single change to the table set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionEdit {
    /// Add a new table
    AddFile {
        /// Level the table is added to
        level: u32,
        /// Metadata of the table, including its key
        meta: FileMetaData,
    },
    /// Remove a table
    DeleteFile {
        /// Level the table lives on
        level: u32,
        /// File number of the table
        file_number: u64,
    },
    /// Set the number of the current write-ahead log
    SetLogNumber(u64),
    /// Set the next file number to allocate
    SetNextFileNumber(u64),
    /// Set the last used sequence number
    SetLastSequence(u64),
}

impl VersionEdit {
    /// Encode the edit as a manifest record
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an edit from a manifest record
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::corruption(format!("Bad version edit: {}", e)))
    }
}

impl fmt::Display for VersionEdit {
    // Key material is never printed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionEdit::AddFile { level, meta } => write!(
                f,
                "AddFile level={} file={} size={} smallest={} largest={} key=<{} bytes>",
                level,
                meta.number,
                meta.file_size,
                escape(&meta.smallest),
                escape(&meta.largest),
                meta.key.as_bytes().len()
            ),
            VersionEdit::DeleteFile { level, file_number } => {
                write!(f, "DeleteFile level={} file={}", level, file_number)
            }
            VersionEdit::SetLogNumber(n) => write!(f, "SetLogNumber {}", n),
            VersionEdit::SetNextFileNumber(n) => write!(f, "SetNextFileNumber {}", n),
            VersionEdit::SetLastSequence(n) => write!(f, "SetLastSequence {}", n),
        }
    }
}

fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Appends edits to a manifest file.
pub struct ManifestWriter {
    log: LogWriter,
}

impl ManifestWriter {
    /// Create a new, empty manifest
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Creating new manifest: {:?}", path.as_ref());
        Ok(Self { log: LogWriter::create(path)? })
    }

    /// Open an existing manifest for appending
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { log: LogWriter::open_append(path)? })
    }

    /// Durably append one edit
    pub fn log_edit(&mut self, edit: &VersionEdit) -> Result<()> {
        self.log.add_record(&edit.encode()?)?;
        self.log.sync()
    }

    /// Close the manifest
    pub fn close(self) -> Result<()> {
        self.log.close()
    }
}

/// Reads edits back from a manifest file.
pub struct ManifestReader {
    log: LogReader<BufReader<File>>,
}

impl ManifestReader {
    /// Open a manifest
    pub fn open<P: AsRef<Path>>(path: P, verify_checksums: bool) -> Result<Self> {
        Ok(Self { log: LogReader::open(path, verify_checksums)? })
    }

    /// The next edit, or `None` at the end of the manifest
    pub fn next_edit(&mut self) -> Result<Option<VersionEdit>> {
        match self.log.read_record()? {
            Some(record) => VersionEdit::decode(&record).map(Some),
            None => Ok(None),
        }
    }
}

/// Table set reconstructed by replaying a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestState {
    /// Live tables per level, keyed by file number
    pub levels: BTreeMap<u32, BTreeMap<u64, FileMetaData>>,
    /// Current write-ahead log number
    pub log_number: u64,
    /// Next file number to allocate
    pub next_file_number: u64,
    /// Last used sequence number
    pub last_sequence: u64,
}

impl ManifestState {
    /// Replay every edit of the manifest at `path`
    pub fn recover<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Recovering from manifest: {:?}", path.as_ref());

        let mut reader = ManifestReader::open(path, true)?;
        let mut state = Self::default();
        let mut edits = 0;
        while let Some(edit) = reader.next_edit()? {
            state.apply(&edit);
            edits += 1;
        }

        log::info!("Recovered {} tables from {} manifest edits", state.num_files(), edits);
        Ok(state)
    }

    /// Apply one edit
    pub fn apply(&mut self, edit: &VersionEdit) {
        match edit {
            VersionEdit::AddFile { level, meta } => {
                self.levels.entry(*level).or_default().insert(meta.number, meta.clone());
            }
            VersionEdit::DeleteFile { level, file_number } => {
                if let Some(files) = self.levels.get_mut(level) {
                    files.remove(file_number);
                }
            }
            VersionEdit::SetLogNumber(n) => self.log_number = *n,
            VersionEdit::SetNextFileNumber(n) => self.next_file_number = *n,
            VersionEdit::SetLastSequence(n) => self.last_sequence = *n,
        }
    }

    /// Metadata of a live table
    pub fn file(&self, file_number: u64) -> Option<&FileMetaData> {
        self.levels.values().find_map(|files| files.get(&file_number))
    }

    /// Number of live tables
    pub fn num_files(&self) -> usize {
        self.levels.values().map(BTreeMap::len).sum()
    }
}

/// Print every edit of the manifest at `path`, one line each.
///
/// Records that do not decode as edits are reported inline and skipped.
/// Returns the number of records read.
pub fn dump_manifest<P: AsRef<Path>>(path: P, out: &mut dyn Write) -> Result<usize> {
    let mut reader = LogReader::open(path, true)?;
    let mut count = 0;
    while let Some(record) = reader.read_record()? {
        count += 1;
        match VersionEdit::decode(&record) {
            Ok(edit) => writeln!(out, "#{} {}", count, edit)?,
            Err(e) => {
                log::warn!("Skipping undecodable manifest record {}: {}", count, e);
                writeln!(out, "#{} <corrupted edit: {}>", count, e)?;
            }
        }
    }
    Ok(count)
}
