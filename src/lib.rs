//! tunecast: top-k recommendation serving over matrix factorization factors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              serve loop (stdin keys → stdout ids)           │
//! │                 plain or JSON, one key at a time            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Recommender                          │
//! │   user → exclusions → cache → rank → cache, or fallback     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       tunecast-core                         │
//! │  line stores (mmap) · item catalog · ball tree · LRU cache  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod serve;

pub use config::{ConfigError, ServeConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_TOP_K};
pub use engine::{EngineError, EngineStats, Recommendation, Recommender, Source};
pub use serve::{serve, write_recommendation, OutputFormat, ServeSummary};

pub use tunecast_core::{
    BallTreeParams, ItemCatalog, RecordWriter, Separators, Strategy, DEFAULT_ARTIST_MARKER,
};
