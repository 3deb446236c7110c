//! Serving configuration
//!
//! Built once at startup (from CLI flags in `main.rs`, or directly in tests)
//! and handed to [`Recommender::open`](crate::engine::Recommender::open). It is
//! never mutated afterwards.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tunecast_core::{BallTreeParams, RankError, Separators, Strategy, DEFAULT_ARTIST_MARKER};

/// Default number of recommendations per user.
pub const DEFAULT_TOP_K: usize = 50;

/// Default number of cached user results.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("key separator and field separator are both {0:?}")]
    SeparatorClash(char),

    #[error("artist marker {0:?} collides with a separator or an item id")]
    MarkerClash(char),

    #[error("ball tree leaf size must be at least 1")]
    InvalidLeafSize,

    #[error(
        "user factors in {path:?} are {actual} wide (first record {key:?}), item catalog is {expected} wide"
    )]
    DimensionMismatch {
        path: PathBuf,
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Strategy(#[from] RankError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    /// Item factor file, fully loaded; required
    pub items_path: PathBuf,
    /// User factor file; without it every user gets the cold-start list
    pub users_path: Option<PathBuf>,
    /// Per-user blacklist file
    pub blacklist_path: Option<PathBuf>,
    /// Artist → tracks file used to expand artist references
    pub artists_path: Option<PathBuf>,
    pub strategy: Strategy,
    pub top_k: usize,
    pub cache_capacity: usize,
    pub separators: Separators,
    pub artist_marker: char,
    pub tree: BallTreeParams,
}

impl ServeConfig {
    pub fn new(items_path: impl Into<PathBuf>) -> Self {
        Self {
            items_path: items_path.into(),
            users_path: None,
            blacklist_path: None,
            artists_path: None,
            strategy: Strategy::default(),
            top_k: DEFAULT_TOP_K,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            separators: Separators::default(),
            artist_marker: DEFAULT_ARTIST_MARKER,
            tree: BallTreeParams::default(),
        }
    }

    pub fn with_users(mut self, path: impl AsRef<Path>) -> Self {
        self.users_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_blacklist(mut self, path: impl AsRef<Path>) -> Self {
        self.blacklist_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_artists(mut self, path: impl AsRef<Path>) -> Self {
        self.artists_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Separators { key, field } = self.separators;
        if key == field {
            return Err(ConfigError::SeparatorClash(key));
        }
        let marker = self.artist_marker;
        // a marker that can start an item id would turn item `10` into artist `0`
        if marker == key
            || marker == field
            || marker.is_ascii_digit()
            || matches!(marker, '-' | '+')
        {
            return Err(ConfigError::MarkerClash(marker));
        }
        if self.tree.max_leaf_size == 0 {
            return Err(ConfigError::InvalidLeafSize);
        }
        Ok(())
    }
}
