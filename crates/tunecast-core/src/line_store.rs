//! Memory-mapped line store with a key → byte offset index
//!
//! Auxiliary files (user factors, blacklists, artist tracks) can be far larger
//! than the item catalog and only a handful of their lines are touched per
//! query. Instead of materializing them, `LineStore` maps the file, scans it
//! once to record where every line starts, and afterwards serves single lines
//! by offset.
//!
//! # Safety
//!
//! The index is only valid while the backing file is unmodified. Truncating a
//! mapped file can raise SIGBUS on the next read, and rewriting it in place
//! makes offsets point into the middle of unrelated lines. Files are expected
//! to be replaced atomically (write + rename) and the process restarted.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::Serialize;
use thiserror::Error;

use crate::format::{decode_record, record_key, trim_line_end, Record, RecordError, Separators};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("offset {offset} out of range for {len}-byte file")]
    OffsetOutOfRange { offset: u64, len: u64 },

    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Summary of an opened store, for startup logging and `tunecast stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineStoreStats {
    /// Distinct keys in the offset index
    pub records: usize,
    /// Blank lines and lines without a key separator
    pub skipped: usize,
    /// Size of the mapped file
    pub bytes: u64,
}

/// A line-oriented file with an in-memory key → offset index.
pub struct LineStore {
    path: PathBuf,
    mmap: Mmap,
    offsets: HashMap<String, u64>,
    separators: Separators,
    skipped: usize,
}

impl LineStore {
    /// Map `path` and build its offset index in a single sequential scan.
    ///
    /// Each line is keyed by the text before the first key separator. When a
    /// key appears more than once the last line wins.
    pub fn open<P: AsRef<Path>>(path: P, separators: Separators) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(io_err)?;
        let mmap = unsafe { Mmap::map(&file).map_err(io_err)? };

        let (offsets, skipped) = build_offsets(&mmap, separators);
        tracing::debug!(
            "Indexed {:?}: {} keys, {} lines skipped",
            path,
            offsets.len(),
            skipped
        );

        Ok(Self {
            path,
            mmap,
            offsets,
            separators,
            skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn separators(&self) -> Separators {
        self.separators
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }

    /// Byte offset of the line recorded for `key`.
    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Iterate over `(key, offset)` pairs in arbitrary order.
    pub fn offsets(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.offsets.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn stats(&self) -> LineStoreStats {
        LineStoreStats {
            records: self.offsets.len(),
            skipped: self.skipped,
            bytes: self.mmap.len() as u64,
        }
    }

    /// Read exactly one line starting at `offset`, without its terminator.
    pub fn fetch(&self, offset: u64) -> Result<&str, StoreError> {
        let len = self.mmap.len() as u64;
        if offset >= len {
            return Err(StoreError::OffsetOutOfRange { offset, len });
        }

        let rest = &self.mmap[offset as usize..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        let line = std::str::from_utf8(&rest[..end]).map_err(|_| RecordError::InvalidUtf8)?;
        Ok(trim_line_end(line))
    }

    /// Fetch and decode the record for `key`.
    ///
    /// `Ok(None)` means the key is not in the index; errors mean the key is
    /// indexed but its line could not be read back.
    pub fn lookup(&self, key: &str) -> Result<Option<Record<'_>>, StoreError> {
        let Some(offset) = self.offset_of(key) else {
            return Ok(None);
        };
        let line = self.fetch(offset)?;
        Ok(Some(decode_record(line, self.separators)?))
    }
}

fn build_offsets(data: &[u8], separators: Separators) -> (HashMap<String, u64>, usize) {
    let mut offsets = HashMap::new();
    let mut skipped = 0usize;
    let mut start = 0usize;

    while start < data.len() {
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| start + p)
            .unwrap_or(data.len());

        let key = readable_prefix(&data[start..end])
            .map(trim_line_end)
            .and_then(|line| record_key(line, separators));

        match key {
            Some(key) => {
                offsets.insert(key.to_string(), start as u64);
            }
            None => skipped += 1,
        }

        start = end + 1;
    }

    (offsets, skipped)
}

/// The line, or its leading valid UTF-8 run when the payload is corrupt.
///
/// Keeps a line with a readable key indexed so that its bad bytes surface as
/// a lookup error for that key instead of the key silently going missing.
fn readable_prefix(line: &[u8]) -> Option<&str> {
    match std::str::from_utf8(line) {
        Ok(line) => Some(line),
        Err(err) => std::str::from_utf8(&line[..err.valid_up_to()]).ok(),
    }
}
