//! Recommender: the per-user serving state machine
//!
//! ```text
//! key ─► resolve user ─┬─ found ───► resolve exclusions ─► cache lookup ─┬─ hit ──────────────────► emit (Cached)
//!                      │                                                 └─ miss ─► rank ─► store ─► emit (Ranked)
//!                      └─ missing ─► fallback ─────────────────────────────────────────────────────► emit (Fallback)
//! ```
//!
//! Everything loaded by [`Recommender::open`] is immutable afterwards; the
//! only mutable state is the result cache, which is internally locked. A
//! `Recommender` can therefore be shared across threads as-is.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tunecast_core::rank::BallTreeShape;
use tunecast_core::{
    CacheStats, CatalogError, ExclusionResolver, ItemCatalog, LineStore, LineStoreStats,
    RankingIndex, ResultCache, Separators, Strategy, UserFactors,
};

use crate::config::{ConfigError, ServeConfig};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load item catalog {path:?}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
}

/// Where a recommendation list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Freshly ranked from the user's factors
    Ranked,
    /// Served from the result cache
    Cached,
    /// Bias-only cold-start list
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub user: String,
    /// External item ids, best first
    pub items: Vec<i64>,
    pub source: Source,
}

/// Snapshot of the loaded state, for the `stats` command and startup logs.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub items: usize,
    pub dim: usize,
    pub strategy: Strategy,
    pub tree: Option<BallTreeShape>,
    pub users: Option<LineStoreStats>,
    pub blacklist: Option<LineStoreStats>,
    pub artists: Option<LineStoreStats>,
    pub cache: CacheStats,
}

pub struct Recommender {
    config: ServeConfig,
    catalog: Arc<ItemCatalog>,
    index: RankingIndex,
    users: Option<UserFactors>,
    exclusions: ExclusionResolver,
    cache: ResultCache,
    /// `top_bias_items(k)`, computed once
    fallback: Vec<i64>,
}

impl Recommender {
    /// Load the catalog, build the ranking index and open the auxiliary stores.
    ///
    /// A missing or unreadable item file is fatal, as is a user file whose
    /// rows do not match the catalog width. Unreadable user, blacklist or
    /// artist files only disable their feature.
    pub fn open(config: ServeConfig) -> Result<Self, EngineError> {
        config.validate()?;

        tracing::info!("Loading item catalog from {:?}", config.items_path);
        let catalog = ItemCatalog::load(&config.items_path, config.separators).map_err(|source| {
            EngineError::Catalog {
                path: config.items_path.clone(),
                source,
            }
        })?;
        tracing::info!(
            "Loaded {} items of dimension {}",
            catalog.len(),
            catalog.dim()
        );
        let catalog = Arc::new(catalog);

        let start = Instant::now();
        let index = RankingIndex::build_with(catalog.clone(), config.strategy, config.tree);
        match index.tree_shape() {
            Some(shape) => tracing::info!(
                "Ball tree built in {:?}: {} nodes, {} leaves, depth {}",
                start.elapsed(),
                shape.nodes,
                shape.leaves,
                shape.depth
            ),
            None => tracing::info!("Using exact scan over {} items", catalog.len()),
        }

        let users = match &config.users_path {
            Some(path) => open_users(path, config.separators, catalog.width())?,
            None => {
                tracing::warn!("No user factor file given; every user gets the cold-start list");
                None
            }
        };

        let blacklist = open_aux(config.blacklist_path.as_deref(), config.separators, "blacklist");
        let artists = open_aux(config.artists_path.as_deref(), config.separators, "artist");
        if artists.is_some() && blacklist.is_none() {
            tracing::warn!("Artist file loaded without a blacklist; it will never be consulted");
        }
        let exclusions = ExclusionResolver::new(blacklist, artists, config.artist_marker);

        let fallback = catalog.top_bias_items(config.top_k);
        let cache = ResultCache::new(config.cache_capacity);
        if config.cache_capacity == 0 {
            tracing::info!("Result cache disabled");
        }

        Ok(Self {
            config,
            catalog,
            index,
            users,
            exclusions,
            cache,
            fallback,
        })
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// The cold-start list served to unknown users.
    pub fn fallback(&self) -> &[i64] {
        &self.fallback
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            items: self.catalog.len(),
            dim: self.catalog.dim(),
            strategy: self.index.strategy(),
            tree: self.index.tree_shape(),
            users: self.users.as_ref().map(UserFactors::stats),
            blacklist: self.exclusions.blacklist_stats(),
            artists: self.exclusions.artist_stats(),
            cache: self.cache.stats(),
        }
    }

    /// Recommend up to `top_k` items for one user key.
    ///
    /// Never fails: any per-key problem degrades to the fallback list.
    pub fn recommend(&self, key: &str) -> Recommendation {
        let start = Instant::now();

        let Some(query) = self.resolve_user(key) else {
            tracing::debug!(user = key, "fallback");
            return self.emit(key, self.fallback.clone(), Source::Fallback);
        };

        let excluded = self.exclusions.resolve(key, &self.catalog);

        if let Some(indices) = self.cache.get(key) {
            tracing::debug!(user = key, elapsed = ?start.elapsed(), "cache hit");
            return self.emit(key, self.catalog.to_external(&indices), Source::Cached);
        }

        match self.index.query(&query, self.config.top_k, &excluded) {
            Ok((indices, stats)) => {
                let items = self.catalog.to_external(&indices);
                self.cache.put(key, indices);
                tracing::debug!(
                    user = key,
                    elapsed = ?start.elapsed(),
                    excluded = excluded.len(),
                    scored = stats.scored,
                    nodes = stats.nodes_visited,
                    pruned = stats.pruned,
                    "ranked"
                );
                self.emit(key, items, Source::Ranked)
            }
            Err(err) => {
                tracing::warn!("Ranking failed for user {:?}: {}; serving fallback", key, err);
                self.emit(key, self.fallback.clone(), Source::Fallback)
            }
        }
    }

    /// Serve independent keys in parallel. Results keep the input order.
    pub fn recommend_batch<S: AsRef<str> + Sync>(&self, keys: &[S]) -> Vec<Recommendation> {
        keys.par_iter().map(|key| self.recommend(key.as_ref())).collect()
    }

    fn resolve_user(&self, key: &str) -> Option<Vec<f64>> {
        let users = self.users.as_ref()?;
        match users.resolve(key) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!("Unusable factors for user {:?}: {}", key, err);
                None
            }
        }
    }

    fn emit(&self, key: &str, items: Vec<i64>, source: Source) -> Recommendation {
        Recommendation {
            user: key.to_string(),
            items,
            source,
        }
    }
}

fn open_users(
    path: &Path,
    separators: Separators,
    width: usize,
) -> Result<Option<UserFactors>, EngineError> {
    let users = match UserFactors::open(path, separators, width) {
        Ok(users) => users,
        Err(err) => {
            tracing::warn!(
                "User factors unavailable ({}); every user gets the cold-start list",
                err
            );
            return Ok(None);
        }
    };

    let stats = users.stats();
    tracing::info!(
        "Indexed {} user records from {:?} ({} lines skipped)",
        stats.records,
        path,
        stats.skipped
    );

    match users.probe_width() {
        Some((key, actual)) if actual != width => Err(ConfigError::DimensionMismatch {
            path: path.to_path_buf(),
            key,
            expected: width,
            actual,
        }
        .into()),
        Some(_) => Ok(Some(users)),
        None => {
            tracing::warn!("User factor file {:?} has no usable records", path);
            Ok(Some(users))
        }
    }
}

fn open_aux(path: Option<&Path>, separators: Separators, what: &str) -> Option<LineStore> {
    let path = path?;
    match LineStore::open(path, separators) {
        Ok(store) => {
            let stats = store.stats();
            tracing::info!(
                "Indexed {} {} records from {:?} ({} lines skipped)",
                stats.records,
                what,
                path,
                stats.skipped
            );
            Some(store)
        }
        Err(err) => {
            tracing::warn!("{} file unavailable ({}); feature disabled", what, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use tunecast_core::RecordWriter;

    fn write(dir: &TempDir, name: &str, rows: &[(&str, Vec<String>)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = RecordWriter::create(&path, Separators::default()).unwrap();
        for (key, fields) in rows {
            writer.write_record(key, fields).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Items 10/20/30 and user u1, k = 2.
    fn fixture(dir: &TempDir) -> ServeConfig {
        let items = write(
            dir,
            "items.txt",
            &[
                ("10", fields(&["5", "0.1"])),
                ("20", fields(&["1", "0.2"])),
                ("30", fields(&["9", "0.3"])),
            ],
        );
        let users = write(dir, "users.txt", &[("u1", fields(&["1", "0.5"]))]);
        ServeConfig::new(items).with_users(users).with_top_k(2)
    }

    #[test]
    fn test_ranked_then_cached() {
        let dir = tempdir().unwrap();
        let engine = Recommender::open(fixture(&dir)).unwrap();

        let first = engine.recommend("u1");
        assert_eq!(first.items, vec![30, 10]);
        assert_eq!(first.source, Source::Ranked);

        let second = engine.recommend("u1");
        assert_eq!(second.items, vec![30, 10]);
        assert_eq!(second.source, Source::Cached);
        assert_eq!(engine.cache().stats().hits, 1);
    }

    #[test]
    fn test_unknown_user_is_not_cached() {
        let dir = tempdir().unwrap();
        let engine = Recommender::open(fixture(&dir)).unwrap();

        for _ in 0..2 {
            let rec = engine.recommend("u2");
            assert_eq!(rec.items, vec![30, 10]);
            assert_eq!(rec.source, Source::Fallback);
        }
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_blacklist_applies() {
        let dir = tempdir().unwrap();
        let black = write(&dir, "black.txt", &[("u1", fields(&["30"]))]);
        let engine = Recommender::open(fixture(&dir).with_blacklist(black)).unwrap();
        assert_eq!(engine.recommend("u1").items, vec![10, 20]);
    }

    #[test]
    fn test_user_width_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let users = write(&dir, "wide.txt", &[("u1", fields(&["1", "0.5", "0.7"]))]);
        let config = fixture(&dir).with_users(users);
        assert!(matches!(
            Recommender::open(config),
            Err(EngineError::Config(ConfigError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }))
        ));
    }

    #[test]
    fn test_missing_item_file_is_fatal() {
        let dir = tempdir().unwrap();
        let config = ServeConfig::new(dir.path().join("nope.txt"));
        assert!(matches!(
            Recommender::open(config),
            Err(EngineError::Catalog { .. })
        ));
    }

    #[test]
    fn test_missing_aux_files_degrade() {
        let dir = tempdir().unwrap();
        let config = fixture(&dir)
            .with_blacklist(dir.path().join("missing-black.txt"))
            .with_artists(dir.path().join("missing-artists.txt"));
        let engine = Recommender::open(config).unwrap();

        let stats = engine.stats();
        assert!(stats.blacklist.is_none());
        assert!(stats.artists.is_none());
        assert_eq!(engine.recommend("u1").items, vec![30, 10]);
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let dir = tempdir().unwrap();
        let engine = Recommender::open(fixture(&dir)).unwrap();
        let keys = ["u2", "u1", "u3"];
        let recs = engine.recommend_batch(&keys);
        let users: Vec<&str> = recs.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users, keys);
        assert_eq!(recs[1].items, vec![30, 10]);
        assert_eq!(recs[1].source, Source::Ranked);
    }

    #[test]
    fn test_exact_and_accelerated_agree() {
        let dir = tempdir().unwrap();
        let exact = Recommender::open(fixture(&dir).with_strategy(Strategy::Exact)).unwrap();
        let tree = Recommender::open(fixture(&dir).with_strategy(Strategy::Accelerated)).unwrap();
        assert_eq!(exact.recommend("u1").items, tree.recommend("u1").items);
        assert!(exact.stats().tree.is_none());
        assert!(tree.stats().tree.is_some());
    }
}
