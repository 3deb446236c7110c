//! User factor lookup
//!
//! User factors are never loaded in full; each query reads one line through a
//! [`LineStore`]. A user line has the same shape as an item line,
//! `user:bias|f_1|...|f_d`, and resolves to the scoring vector
//! `[1.0, f_1, ..., f_d]`. The leading 1.0 multiplies the item bias; the
//! user's own bias is a per-query constant and does not change the ranking,
//! so it is dropped.

use std::path::Path;

use thiserror::Error;

use crate::format::{RecordError, Separators};
use crate::line_store::{LineStore, LineStoreStats, StoreError};

#[derive(Error, Debug)]
pub enum UserError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("user {key:?}: {source}")]
    Record {
        key: String,
        #[source]
        source: RecordError,
    },

    #[error("user {key:?} has a {actual}-wide factor vector, catalog expects {expected}")]
    DimensionMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Random-access view over the user factor file.
pub struct UserFactors {
    store: LineStore,
    width: usize,
}

impl UserFactors {
    /// Index the user factor file. `width` is the catalog's d + 1.
    pub fn open<P: AsRef<Path>>(
        path: P,
        separators: Separators,
        width: usize,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store: LineStore::open(path, separators)?,
            width,
        })
    }

    pub fn from_store(store: LineStore, width: usize) -> Self {
        Self { store, width }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    pub fn stats(&self) -> LineStoreStats {
        self.store.stats()
    }

    /// Resolve a user's scoring vector.
    ///
    /// `Ok(None)` means the user has no factors and should get the cold-start
    /// list. A record that exists but cannot be decoded, or whose width does
    /// not match the catalog, is an error the caller degrades per key.
    pub fn resolve(&self, key: &str) -> Result<Option<Vec<f64>>, UserError> {
        let Some(record) = self.store.lookup(key)? else {
            return Ok(None);
        };

        let values = record.float_fields().map_err(|source| UserError::Record {
            key: key.to_string(),
            source,
        })?;

        let mut vector = Vec::with_capacity(values.len().max(1));
        vector.push(1.0);
        vector.extend(values.iter().skip(1));

        if vector.len() != self.width {
            return Err(UserError::DimensionMismatch {
                key: key.to_string(),
                expected: self.width,
                actual: vector.len(),
            });
        }

        Ok(Some(vector))
    }

    /// Width of the first decodable user record, used to validate the
    /// user file against the catalog at startup.
    pub fn probe_width(&self) -> Option<(String, usize)> {
        let mut offsets: Vec<(&str, u64)> = self.store.offsets().collect();
        offsets.sort_by_key(|&(_, offset)| offset);

        offsets.into_iter().find_map(|(key, offset)| {
            let line = self.store.fetch(offset).ok()?;
            let record = crate::format::decode_record(line, self.store.separators()).ok()?;
            // bias column is replaced by the 1.0 multiplier, width is unchanged
            Some((key.to_string(), record.fields.len().max(1)))
        })
    }
}
