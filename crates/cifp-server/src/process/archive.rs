//! Zip archive access over a random-access byte source
//!
//! These are blocking operations; the pipeline runs them on the blocking
//! thread pool.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("No archive entry ends with '{member}'")]
    MemberNotFound { member: String },

    /// Local I/O failure outside the archive itself
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Corrupt(err.to_string())
    }
}

/// Presents the first `len` bytes of `inner` as the whole source.
#[derive(Debug)]
pub struct Bounded<R> {
    inner: R,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> Bounded<R> {
    pub fn new(mut inner: R, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len, pos: 0 })
    }
}

impl<R: Read> Read for Bounded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for Bounded<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of source"))?;

        self.inner.seek(SeekFrom::Start(target))?;
        self.pos = target;
        Ok(target)
    }
}

/// Enumerates and opens entries of a zip container.
pub struct ArchiveReader<R: Read + Seek> {
    archive: ZipArchive<Bounded<R>>,
}

impl<R: Read + Seek> std::fmt::Debug for ArchiveReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Parse the central directory of the first `len` bytes of `source`.
    pub fn new(source: R, len: u64) -> Result<Self, ArchiveError> {
        let bounded = Bounded::new(source, len)?;
        let archive = ZipArchive::new(bounded)?;
        Ok(Self { archive })
    }

    /// Entry names in container order.
    #[cfg(test)]
    fn entry_names(&mut self) -> Result<Vec<String>, ArchiveError> {
        (0..self.archive.len())
            .map(|i| Ok(self.archive.by_index_raw(i)?.name().to_string()))
            .collect()
    }

    /// Index of the first file entry, in container order, whose name ends
    /// with `suffix`.
    pub fn find_member(&mut self, suffix: &str) -> Result<usize, ArchiveError> {
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index)?;
            debug!(entry = entry.name(), dir = entry.is_dir(), "Archive entry");
            if !entry.is_dir() && entry.name().ends_with(suffix) {
                return Ok(index);
            }
        }

        Err(ArchiveError::MemberNotFound {
            member: suffix.to_string(),
        })
    }

    /// Decompress the first entry ending with `suffix` into `out`, returning
    /// the entry name and the number of bytes written.
    pub fn copy_member<W: Write>(
        &mut self,
        suffix: &str,
        out: &mut W,
    ) -> Result<(String, u64), ArchiveError> {
        let index = self.find_member(suffix)?;
        let mut entry = self.archive.by_index(index)?;
        let name = entry.name().to_string();

        let mut buffer = [0u8; 64 * 1024];
        let mut copied = 0u64;
        loop {
            // Decompression and checksum failures surface as read errors.
            let n = entry
                .read(&mut buffer)
                .map_err(|e| ArchiveError::Corrupt(format!("{}: {}", name, e)))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])?;
            copied += n as u64;
        }
        out.flush()?;

        Ok((name, copied))
    }
}
