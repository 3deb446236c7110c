//! Top-k ranking by inner product
//!
//! Score of item i for query q is `q · [bias_i, f_i1, ..., f_id]`; with
//! `q = [1.0, u_1, ..., u_d]` that is `bias_i + u · f_i`.
//!
//! # Strategies
//!
//! | Strategy      | Preprocessing          | Query                           |
//! |---------------|------------------------|---------------------------------|
//! | `Exact`       | none                   | linear scan                     |
//! | `Accelerated` | ball tree, O(n log n)  | branch-and-bound, sub-linear on average, linear worst case |
//!
//! Both return the same list for the same inputs: the k best non-excluded
//! items, score descending, ties broken by ascending internal index.

mod balltree;
pub(crate) mod exact;
mod topk;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ItemCatalog;
use crate::exclusion::ExclusionSet;

pub use balltree::{BallTree, BallTreeParams, BallTreeShape};
pub use topk::{Scored, TopK};

pub(crate) type ScoredItems = Vec<Scored>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RankError {
    #[error("query has {actual} values, catalog rows have {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown ranking strategy {0:?} (expected exact|accelerated)")]
    UnknownStrategy(String),
}

/// How the index answers queries. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Accelerated,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Accelerated
    }
}

impl FromStr for Strategy {
    type Err = RankError;

    /// Accepts `exact`/`linear` and `accelerated`/`tree`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" | "linear" => Ok(Strategy::Exact),
            "accelerated" | "tree" => Ok(Strategy::Accelerated),
            other => Err(RankError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Exact => f.write_str("exact"),
            Strategy::Accelerated => f.write_str("accelerated"),
        }
    }
}

/// Per-query work counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Items whose score was computed
    pub scored: usize,
    /// Tree nodes entered (0 for the exact scan)
    pub nodes_visited: usize,
    /// Subtrees skipped by the bound
    pub pruned: usize,
}

enum Backend {
    Exact,
    BallTree(BallTree),
}

/// Read-only ranking index over a shared catalog.
pub struct RankingIndex {
    catalog: Arc<ItemCatalog>,
    backend: Backend,
}

impl RankingIndex {
    pub fn build(catalog: Arc<ItemCatalog>, strategy: Strategy) -> Self {
        Self::build_with(catalog, strategy, BallTreeParams::default())
    }

    pub fn build_with(catalog: Arc<ItemCatalog>, strategy: Strategy, params: BallTreeParams) -> Self {
        let backend = match strategy {
            Strategy::Exact => Backend::Exact,
            Strategy::Accelerated => Backend::BallTree(BallTree::build(&catalog, params)),
        };
        Self { catalog, backend }
    }

    pub fn strategy(&self) -> Strategy {
        match self.backend {
            Backend::Exact => Strategy::Exact,
            Backend::BallTree(_) => Strategy::Accelerated,
        }
    }

    pub fn catalog(&self) -> &Arc<ItemCatalog> {
        &self.catalog
    }

    /// Tree shape, `None` for the exact scan.
    pub fn tree_shape(&self) -> Option<BallTreeShape> {
        match &self.backend {
            Backend::Exact => None,
            Backend::BallTree(tree) => Some(tree.shape()),
        }
    }

    /// Internal indices of the top `k` items, best first.
    pub fn query(
        &self,
        query: &[f64],
        k: usize,
        excluded: &ExclusionSet,
    ) -> Result<(Vec<u32>, SearchStats), RankError> {
        let (scored, stats) = self.query_scored(query, k, excluded)?;
        Ok((scored.into_iter().map(|s| s.index).collect(), stats))
    }

    /// Like [`query`](Self::query) but keeps the scores.
    pub fn query_scored(
        &self,
        query: &[f64],
        k: usize,
        excluded: &ExclusionSet,
    ) -> Result<(Vec<Scored>, SearchStats), RankError> {
        if query.len() != self.catalog.width() {
            return Err(RankError::DimensionMismatch {
                expected: self.catalog.width(),
                actual: query.len(),
            });
        }

        Ok(match &self.backend {
            Backend::Exact => exact::search(&self.catalog, query, k, excluded),
            Backend::BallTree(tree) => tree.search(&self.catalog, query, k, excluded),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Arc<ItemCatalog> {
        Arc::new(
            ItemCatalog::from_rows([(10, [5.0, 0.1]), (20, [1.0, 0.2]), (30, [9.0, 0.3])]).unwrap(),
        )
    }

    #[test]
    fn test_worked_example_both_strategies() {
        for strategy in [Strategy::Exact, Strategy::Accelerated] {
            let index = RankingIndex::build(example(), strategy);
            let (scored, _) = index
                .query_scored(&[1.0, 0.5], 2, &ExclusionSet::new())
                .unwrap();
            let ids: Vec<u32> = scored.iter().map(|s| s.index).collect();
            assert_eq!(ids, vec![2, 0], "{strategy}");
            assert!((scored[0].score - 9.15).abs() < 1e-12);
            assert!((scored[1].score - 5.05).abs() < 1e-12);
        }
    }

    #[test]
    fn test_exclusions_are_skipped() {
        for strategy in [Strategy::Exact, Strategy::Accelerated] {
            let index = RankingIndex::build(example(), strategy);
            let excluded: ExclusionSet = [2].into_iter().collect();
            let (ids, _) = index.query(&[1.0, 0.5], 2, &excluded).unwrap();
            assert_eq!(ids, vec![0, 1], "{strategy}");
        }
    }

    #[test]
    fn test_k_larger_than_catalog_and_zero() {
        let index = RankingIndex::build(example(), Strategy::Accelerated);
        let (ids, _) = index.query(&[1.0, 0.5], 10, &ExclusionSet::new()).unwrap();
        assert_eq!(ids, vec![2, 0, 1]);

        let (ids, _) = index.query(&[1.0, 0.5], 0, &ExclusionSet::new()).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_everything_excluded() {
        let index = RankingIndex::build(example(), Strategy::Exact);
        let excluded: ExclusionSet = [0, 1, 2].into_iter().collect();
        let (ids, _) = index.query(&[1.0, 0.5], 2, &excluded).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = RankingIndex::build(example(), Strategy::Exact);
        assert_eq!(
            index.query(&[1.0, 0.5, 0.5], 2, &ExclusionSet::new()),
            Err(RankError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("exact".parse::<Strategy>(), Ok(Strategy::Exact));
        assert_eq!("linear".parse::<Strategy>(), Ok(Strategy::Exact));
        assert_eq!("Tree".parse::<Strategy>(), Ok(Strategy::Accelerated));
        assert_eq!("accelerated".parse::<Strategy>(), Ok(Strategy::Accelerated));
        assert!(matches!(
            "kdtree".parse::<Strategy>(),
            Err(RankError::UnknownStrategy(_))
        ));
        assert_eq!(Strategy::Accelerated.to_string(), "accelerated");
    }

    #[test]
    fn test_exact_reports_no_tree() {
        let index = RankingIndex::build(example(), Strategy::Exact);
        assert_eq!(index.strategy(), Strategy::Exact);
        assert!(index.tree_shape().is_none());
        let (_, stats) = index.query(&[1.0, 0.5], 1, &ExclusionSet::new()).unwrap();
        assert_eq!(stats.scored, 3);
        assert_eq!(stats.nodes_visited, 0);
    }
}
