//! Log reader.

use super::record::{Fragment, FragmentType, HEADER_SIZE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Reads logical records back from a framed log.
pub struct LogReader<R: Read> {
    reader: R,
    verify_checksums: bool,
    position: u64,
}

impl LogReader<BufReader<File>> {
    /// Open a log file
    pub fn open<P: AsRef<Path>>(path: P, verify_checksums: bool) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), verify_checksums))
    }
}

impl<R: Read> LogReader<R> {
    /// Read records from `reader`
    pub fn new(reader: R, verify_checksums: bool) -> Self {
        Self { reader, verify_checksums, position: 0 }
    }

    /// Read the next logical record, or `None` at the end of the log.
    ///
    /// A fragment cut short at the end of the log is treated as the end of
    /// the log.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut assembled: Option<Vec<u8>> = None;

        loop {
            let Some(fragment) = self.read_fragment()? else {
                if assembled.is_some() {
                    log::warn!("Log ends inside a split record at offset {}", self.position);
                }
                return Ok(None);
            };

            match fragment.fragment_type {
                FragmentType::Full if assembled.is_none() => return Ok(Some(fragment.data)),
                FragmentType::First if assembled.is_none() => assembled = Some(fragment.data),
                FragmentType::Middle | FragmentType::Last if assembled.is_some() => {
                    if let Some(buf) = assembled.as_mut() {
                        buf.extend_from_slice(&fragment.data);
                    }
                    if fragment.fragment_type == FragmentType::Last {
                        return Ok(assembled);
                    }
                }
                fragment_type => {
                    return Err(Error::corruption(format!(
                        "Unexpected {:?} fragment at offset {}",
                        fragment_type, self.position
                    )));
                }
            }
        }
    }

    /// Offset just past the last fragment read
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_fragment(&mut self) -> Result<Option<Fragment>> {
        let mut header = [0u8; HEADER_SIZE];
        if !self.read_full(&mut header)? {
            return Ok(None);
        }

        let length = u16::from_le_bytes([header[4], header[5]]) as usize;
        let mut buffer = vec![0u8; HEADER_SIZE + length];
        buffer[..HEADER_SIZE].copy_from_slice(&header);
        if !self.read_full(&mut buffer[HEADER_SIZE..])? {
            return Ok(None);
        }

        let fragment = Fragment::decode(&buffer, self.verify_checksums)?;
        self.position += buffer.len() as u64;
        Ok(Some(fragment))
    }

    /// Fill `buf`; false if the log ended first
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
