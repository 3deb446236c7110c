//! tunecast core – line stores, factor catalog, ranking and result cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          ResultCache (LRU, user key → internal ids)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │   RankingIndex: exact scan · ball tree (MIPS → NN lift)    │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  ItemCatalog (dense arena,   │  UserFactors · Exclusion-    │
//! │  id ↔ index bijection)       │  Resolver (blacklist→artist) │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │         LineStore (mmap + key → byte offset index)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod exclusion;
pub mod format;
pub mod line_store;
pub mod rank;
pub mod simd;
pub mod users;

pub use cache::{CacheStats, ResultCache};
pub use catalog::{CatalogError, ItemCatalog, ItemRecord};
pub use exclusion::{ExclusionResolver, ExclusionSet, DEFAULT_ARTIST_MARKER};
pub use format::{decode_record, Record, RecordError, RecordWriter, Separators};
pub use line_store::{LineStore, LineStoreStats, StoreError};
pub use rank::{BallTreeParams, RankError, RankingIndex, SearchStats, Strategy};
pub use users::{UserError, UserFactors};
