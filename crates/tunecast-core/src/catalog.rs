//! Item factor catalog
//!
//! The item file is the one input that is always fully materialized: every
//! item takes part in ranking. Rows are stored arena-style in a single flat
//! buffer of `[bias, f_1, ..., f_d]`, addressed by the dense internal index
//! assigned in file order, with a separate external id → internal index table.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::format::{decode_record, trim_line_end, RecordError, Separators};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: RecordError,
    },

    #[error("line {line}: item row has {actual} fields, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("line {line}: item {external_id} already loaded at index {existing}")]
    DuplicateItem {
        line: usize,
        external_id: i64,
        existing: u32,
    },

    #[error("line {line}: item row needs a bias field")]
    MissingBias { line: usize },

    #[error("item catalog is empty")]
    Empty,
}

/// Borrowed view of one catalog row.
#[derive(Debug, Clone, Copy)]
pub struct ItemRecord<'a> {
    pub external_id: i64,
    pub internal_index: u32,
    pub bias: f64,
    pub factors: &'a [f64],
}

/// Dense item factor matrix plus its reverse index.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    /// Row-major `[bias, factors...]`, `width` values per item
    rows: Vec<f64>,
    /// External id for each internal index
    external_ids: Vec<i64>,
    /// External id → internal index
    reverse: HashMap<i64, u32>,
    /// d + 1
    width: usize,
}

impl ItemCatalog {
    /// Load the full item factor file.
    ///
    /// Any malformed line aborts the load: a partially loaded catalog would
    /// silently shift every internal index after the bad row.
    pub fn load<P: AsRef<Path>>(path: P, separators: Separators) -> Result<Self, CatalogError> {
        let reader = BufReader::new(File::open(path)?);
        let mut builder = CatalogBuilder::default();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            let line = trim_line_end(&line);
            if line.trim().is_empty() {
                continue;
            }

            let record = decode_record(line, separators).map_err(|source| CatalogError::Parse {
                line: line_no,
                source,
            })?;
            let external_id = record.int_key().map_err(|source| CatalogError::Parse {
                line: line_no,
                source,
            })?;
            let values = record.float_fields().map_err(|source| CatalogError::Parse {
                line: line_no,
                source,
            })?;

            builder.push(line_no, external_id, &values)?;
        }

        builder.finish()
    }

    /// Build a catalog from `(external_id, [bias, factors...])` rows.
    pub fn from_rows<I, V>(rows: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (i64, V)>,
        V: AsRef<[f64]>,
    {
        let mut builder = CatalogBuilder::default();
        for (i, (external_id, values)) in rows.into_iter().enumerate() {
            builder.push(i + 1, external_id, values.as_ref())?;
        }
        builder.finish()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.external_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external_ids.is_empty()
    }

    /// Latent dimension d (row width minus the bias column).
    pub fn dim(&self) -> usize {
        self.width - 1
    }

    /// Width of a scoring vector: d + 1.
    pub fn width(&self) -> usize {
        self.width
    }

    /// `[bias, factors...]` for an internal index.
    #[inline]
    pub fn row(&self, index: u32) -> &[f64] {
        let start = index as usize * self.width;
        &self.rows[start..start + self.width]
    }

    pub fn get(&self, index: u32) -> Option<ItemRecord<'_>> {
        if index as usize >= self.len() {
            return None;
        }
        let row = self.row(index);
        Some(ItemRecord {
            external_id: self.external_ids[index as usize],
            internal_index: index,
            bias: row[0],
            factors: &row[1..],
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = ItemRecord<'_>> + '_ {
        (0..self.len() as u32).map(move |i| {
            let row = self.row(i);
            ItemRecord {
                external_id: self.external_ids[i as usize],
                internal_index: i,
                bias: row[0],
                factors: &row[1..],
            }
        })
    }

    /// External id for an internal index.
    #[inline]
    pub fn external_id(&self, index: u32) -> Option<i64> {
        self.external_ids.get(index as usize).copied()
    }

    /// Internal index for an external id.
    #[inline]
    pub fn internal_index(&self, external_id: i64) -> Option<u32> {
        self.reverse.get(&external_id).copied()
    }

    /// Map internal indices back to external ids.
    pub fn to_external(&self, indices: &[u32]) -> Vec<i64> {
        indices
            .iter()
            .filter_map(|&i| self.external_id(i))
            .collect()
    }

    /// External ids of the `k` items with the largest bias.
    ///
    /// Ties keep file order (ascending internal index), so the cold-start list
    /// is stable across runs.
    pub fn top_bias_items(&self, k: usize) -> Vec<i64> {
        let mut order: Vec<u32> = (0..self.len() as u32).collect();
        order.sort_by(|&a, &b| {
            self.row(b)[0]
                .total_cmp(&self.row(a)[0])
                .then_with(|| a.cmp(&b))
        });
        order.truncate(k);
        self.to_external(&order)
    }
}

#[derive(Default)]
struct CatalogBuilder {
    rows: Vec<f64>,
    external_ids: Vec<i64>,
    reverse: HashMap<i64, u32>,
    width: Option<usize>,
}

impl CatalogBuilder {
    fn push(&mut self, line: usize, external_id: i64, values: &[f64]) -> Result<(), CatalogError> {
        if values.is_empty() {
            return Err(CatalogError::MissingBias { line });
        }

        let expected = *self.width.get_or_insert(values.len());
        if values.len() != expected {
            return Err(CatalogError::RaggedRow {
                line,
                expected,
                actual: values.len(),
            });
        }

        if let Some((index, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CatalogError::Parse {
                line,
                source: RecordError::InvalidNumber {
                    index,
                    value: value.to_string(),
                    reason: "not a finite number".to_string(),
                },
            });
        }

        let index = self.external_ids.len() as u32;
        if let Some(&existing) = self.reverse.get(&external_id) {
            return Err(CatalogError::DuplicateItem {
                line,
                external_id,
                existing,
            });
        }

        self.reverse.insert(external_id, index);
        self.external_ids.push(external_id);
        self.rows.extend_from_slice(values);
        Ok(())
    }

    fn finish(self) -> Result<ItemCatalog, CatalogError> {
        let Some(width) = self.width else {
            return Err(CatalogError::Empty);
        };
        Ok(ItemCatalog {
            rows: self.rows,
            external_ids: self.external_ids,
            reverse: self.reverse,
            width,
        })
    }
}
