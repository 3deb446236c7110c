//! Line record format
//!
//! Every input file (item factors, user factors, blacklist, artist tracks) is a
//! flat text file with one record per line:
//!
//! ```text
//! key<KEY_SEP>field_1<FIELD_SEP>field_2<FIELD_SEP>...<FIELD_SEP>field_n
//! ```
//!
//! With the default separators an item factor line looks like
//! `10:5.0|0.1|0.7` and a blacklist line like `u1:30|a7`.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = RecordWriter::create("items.txt", Separators::default())?;
//! writer.write_record("10", [5.0, 0.1])?;
//! writer.finish()?;
//! ```

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default separator between the key and the payload.
pub const DEFAULT_KEY_SEP: char = ':';

/// Default separator between payload fields.
pub const DEFAULT_FIELD_SEP: char = '|';

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing key separator {sep:?} in line {line:?}")]
    MissingKeySeparator { sep: char, line: String },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("field {index} ({value:?}) is not a number: {reason}")]
    InvalidNumber {
        index: usize,
        value: String,
        reason: String,
    },

    #[error("key {key:?} is not an integer id")]
    InvalidId { key: String },
}

/// Key and field separators shared by all record files of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Separators {
    pub key: char,
    pub field: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY_SEP,
            field: DEFAULT_FIELD_SEP,
        }
    }
}

impl Separators {
    pub fn new(key: char, field: char) -> Self {
        Self { key, field }
    }
}

/// A decoded line: the key and its ordered payload fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub key: &'a str,
    pub fields: Vec<&'a str>,
}

impl<'a> Record<'a> {
    /// Parse every field as `f64`.
    pub fn float_fields(&self) -> Result<Vec<f64>, RecordError> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, raw)| parse_f64(index, raw))
            .collect()
    }

    /// Parse the key as an integer external id.
    pub fn int_key(&self) -> Result<i64, RecordError> {
        self.key.trim().parse().map_err(|_: ParseIntError| RecordError::InvalidId {
            key: self.key.to_string(),
        })
    }
}

/// Strip a trailing `\n` / `\r\n`.
#[inline]
pub fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// The key portion of a line, or `None` if the key separator is absent.
#[inline]
pub fn record_key(line: &str, separators: Separators) -> Option<&str> {
    line.split_once(separators.key).map(|(key, _)| key)
}

/// Split a line into its key and ordered fields.
///
/// An empty payload (`key:`) decodes to zero fields rather than one empty
/// field, so a user with an empty blacklist line excludes nothing.
pub fn decode_record(line: &str, separators: Separators) -> Result<Record<'_>, RecordError> {
    let line = trim_line_end(line);
    let (key, payload) =
        line.split_once(separators.key)
            .ok_or_else(|| RecordError::MissingKeySeparator {
                sep: separators.key,
                line: line.to_string(),
            })?;

    let fields = if payload.is_empty() {
        Vec::new()
    } else {
        payload.split(separators.field).collect()
    };

    Ok(Record { key, fields })
}

/// NaN and infinities parse as `f64` but would outrank every real score.
fn parse_f64(index: usize, raw: &str) -> Result<f64, RecordError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e: ParseFloatError| RecordError::InvalidNumber {
            index,
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
    if !value.is_finite() {
        return Err(RecordError::InvalidNumber {
            index,
            value: raw.to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    Ok(value)
}

/// Writer for record files, used to produce fixtures and exports.
pub struct RecordWriter {
    writer: BufWriter<File>,
    separators: Separators,
    count: usize,
}

impl RecordWriter {
    pub fn create<P: AsRef<Path>>(path: P, separators: Separators) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            separators,
            count: 0,
        })
    }

    /// Write one `key<sep>f1<sep>f2...` line.
    pub fn write_record<K, I, F>(&mut self, key: K, fields: I) -> io::Result<()>
    where
        K: Display,
        I: IntoIterator<Item = F>,
        F: Display,
    {
        write!(self.writer, "{}{}", key, self.separators.key)?;
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                write!(self.writer, "{}", self.separators.field)?;
            }
            write!(self.writer, "{}", field)?;
        }
        writeln!(self.writer)?;
        self.count += 1;
        Ok(())
    }

    /// Flush and sync, returning the number of records written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.count)
    }
}
