//! Ball tree for maximum inner product search.
//!
//! A ball tree prunes with the triangle inequality, which only holds for a
//! metric. Inner product is not one, so items are lifted into one extra
//! dimension first (Bachrach et al. 2014):
//!
//! ```text
//! x' = [x, sqrt(M² - ‖x‖²)]      M = max ‖x‖ over the catalog
//! q' = [q, 0]
//! ‖q' - x'‖² = ‖q‖² + M² - 2·q·x
//! ```
//!
//! Every lifted item has norm M, and the nearest lifted item is the one with
//! the largest inner product. For a ball with center c and radius r the
//! closest any member can be is `max(0, ‖q' - c‖ - r)`, which turns into an
//! upper bound on the score of everything inside:
//!
//! ```text
//! score ≤ (‖q‖² + M² - max(0, ‖q' - c‖ - r)²) / 2
//! ```
//!
//! The search is branch-and-bound on that bound. Candidates that survive
//! pruning are scored with the same exact dot product as the brute-force scan,
//! so both strategies agree on the result.
//!
//! Nodes live in a flat arena; leaves own a contiguous range of a permutation
//! of internal indices.
//!
//! # References
//!
//! - Omohundro (1989): "Five balltree construction algorithms"
//! - Ram & Gray (2012): "Maximum inner-product search using cone trees"
//! - Bachrach et al. (2014): "Speeding up the Xbox recommender system using a
//!   Euclidean transformation for inner-product spaces"

use super::topk::TopK;
use super::{ScoredItems, SearchStats};
use crate::catalog::ItemCatalog;
use crate::exclusion::ExclusionSet;
use crate::simd::{dot, l2_distance, l2_distance_squared, norm_squared};

/// Ball tree construction parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BallTreeParams {
    /// Maximum number of items in a leaf
    pub max_leaf_size: usize,

    /// Maximum depth; deeper ranges become leaves regardless of size
    pub max_depth: usize,
}

impl Default for BallTreeParams {
    fn default() -> Self {
        Self {
            max_leaf_size: 16,
            max_depth: 40,
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Internal { left: usize, right: usize },
    Leaf { start: usize, end: usize },
}

#[derive(Debug, Clone)]
struct BallNode {
    center: Vec<f64>,
    radius: f64,
    kind: NodeKind,
}

/// Shape of a built tree, for logs and `tunecast stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BallTreeShape {
    pub nodes: usize,
    pub leaves: usize,
    pub depth: usize,
}

/// Ball tree over the lifted item rows.
pub struct BallTree {
    nodes: Vec<BallNode>,
    /// Internal indices permuted so every leaf covers a contiguous range
    order: Vec<u32>,
    /// M² from the lift
    max_norm_sq: f64,
    /// Lifted dimension (catalog width + 1)
    dim: usize,
    depth: usize,
}

impl BallTree {
    pub fn build(catalog: &ItemCatalog, params: BallTreeParams) -> Self {
        let width = catalog.width();
        let dim = width + 1;
        let n = catalog.len();

        let norms: Vec<f64> = (0..n as u32).map(|i| norm_squared(catalog.row(i))).collect();
        let max_norm_sq = norms.iter().copied().fold(0.0f64, f64::max);

        let mut points = Vec::with_capacity(n * dim);
        for (i, norm_sq) in norms.iter().enumerate() {
            points.extend_from_slice(catalog.row(i as u32));
            points.push((max_norm_sq - norm_sq).max(0.0).sqrt());
        }

        let mut builder = Builder {
            points: &points,
            dim,
            params: BallTreeParams {
                max_leaf_size: params.max_leaf_size.max(1),
                max_depth: params.max_depth,
            },
            nodes: Vec::new(),
            depth: 0,
        };
        let mut order: Vec<u32> = (0..n as u32).collect();
        if n > 0 {
            builder.build(&mut order, 0, 0);
        }

        let depth = builder.depth;
        Self {
            nodes: builder.nodes,
            order,
            max_norm_sq,
            dim,
            depth,
        }
    }

    pub fn shape(&self) -> BallTreeShape {
        BallTreeShape {
            nodes: self.nodes.len(),
            leaves: self
                .nodes
                .iter()
                .filter(|n| matches!(n.kind, NodeKind::Leaf { .. }))
                .count(),
            depth: self.depth,
        }
    }

    pub(crate) fn search(
        &self,
        catalog: &ItemCatalog,
        query: &[f64],
        k: usize,
        excluded: &ExclusionSet,
    ) -> (ScoredItems, SearchStats) {
        let mut stats = SearchStats::default();
        let mut top = TopK::new(k);
        if k == 0 || self.nodes.is_empty() {
            return (top.into_sorted(), stats);
        }

        let mut lifted = Vec::with_capacity(self.dim);
        lifted.extend_from_slice(query);
        lifted.push(0.0);

        let offset = norm_squared(query) + self.max_norm_sq;
        let search = Search {
            tree: self,
            catalog,
            query,
            lifted: &lifted,
            offset,
            // absorbs rounding in the sqrt/square round trip of the bound
            slack: 1e-9 * (1.0 + offset),
            excluded,
        };

        let root_bound = search.bound(&self.nodes[0]);
        search.visit(0, root_bound, &mut top, &mut stats);

        (top.into_sorted(), stats)
    }
}

struct Builder<'a> {
    points: &'a [f64],
    dim: usize,
    params: BallTreeParams,
    nodes: Vec<BallNode>,
    depth: usize,
}

impl<'a> Builder<'a> {
    fn point(&self, index: u32) -> &'a [f64] {
        let start = index as usize * self.dim;
        &self.points[start..start + self.dim]
    }

    /// Build the subtree over `items` (positions `base..base+items.len()` of
    /// the permutation) and return its arena id.
    fn build(&mut self, items: &mut [u32], base: usize, depth: usize) -> usize {
        self.depth = self.depth.max(depth);
        let center = self.centroid(items);
        let radius = items
            .iter()
            .map(|&i| l2_distance(self.point(i), &center))
            .fold(0.0f64, f64::max);

        let id = self.nodes.len();
        self.nodes.push(BallNode {
            center,
            radius,
            kind: NodeKind::Leaf {
                start: base,
                end: base + items.len(),
            },
        });

        if items.len() <= self.params.max_leaf_size || depth >= self.params.max_depth {
            return id;
        }

        let split = self.partition(items, id);
        if split == 0 || split == items.len() {
            // every point coincides with the seeds; nothing to separate
            return id;
        }

        let (left_items, right_items) = items.split_at_mut(split);
        let left = self.build(left_items, base, depth + 1);
        let right = self.build(right_items, base + split, depth + 1);
        self.nodes[id].kind = NodeKind::Internal { left, right };
        id
    }

    fn centroid(&self, items: &[u32]) -> Vec<f64> {
        let mut center = vec![0.0f64; self.dim];
        for &i in items {
            for (c, v) in center.iter_mut().zip(self.point(i)) {
                *c += v;
            }
        }
        let count = items.len() as f64;
        for c in center.iter_mut() {
            *c /= count;
        }
        center
    }

    /// Split around two far-apart seeds: the point farthest from the centroid,
    /// then the point farthest from that one. Points go to the closer seed.
    fn partition(&self, items: &mut [u32], node: usize) -> usize {
        let center = &self.nodes[node].center;
        let farthest_from = |from: &[f64]| {
            items
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    l2_distance_squared(self.point(a), from)
                        .total_cmp(&l2_distance_squared(self.point(b), from))
                        .then_with(|| b.cmp(&a))
                })
                .unwrap_or(items[0])
        };
        let seed_a = self.point(farthest_from(center));
        let seed_b = self.point(farthest_from(seed_a));

        let mut split = 0;
        for i in 0..items.len() {
            let p = self.point(items[i]);
            if l2_distance_squared(p, seed_a) <= l2_distance_squared(p, seed_b) {
                items.swap(i, split);
                split += 1;
            }
        }

        if split == items.len() && items.len() > 1 {
            // seeds coincide: fall back to an even split by index
            items.sort_unstable();
            split = items.len() / 2;
        }
        split
    }
}

struct Search<'a> {
    tree: &'a BallTree,
    catalog: &'a ItemCatalog,
    query: &'a [f64],
    lifted: &'a [f64],
    offset: f64,
    slack: f64,
    excluded: &'a ExclusionSet,
}

impl<'a> Search<'a> {
    /// Upper bound on the score of any item inside `node`.
    #[inline]
    fn bound(&self, node: &BallNode) -> f64 {
        let gap = (l2_distance(self.lifted, &node.center) - node.radius).max(0.0);
        (self.offset - gap * gap) / 2.0
    }

    fn visit(&self, id: usize, bound: f64, top: &mut TopK, stats: &mut SearchStats) {
        // ties with the k-th score must still be explored: a tied item with a
        // lower index displaces the current k-th entry
        if bound + self.slack < top.threshold() {
            stats.pruned += 1;
            return;
        }
        stats.nodes_visited += 1;

        let node = &self.tree.nodes[id];
        match node.kind {
            NodeKind::Leaf { start, end } => {
                for &index in &self.tree.order[start..end] {
                    if self.excluded.contains(&index) {
                        continue;
                    }
                    top.offer(index, dot(self.query, self.catalog.row(index)));
                    stats.scored += 1;
                }
            }
            NodeKind::Internal { left, right } => {
                let left_bound = self.bound(&self.tree.nodes[left]);
                let right_bound = self.bound(&self.tree.nodes[right]);
                if left_bound >= right_bound {
                    self.visit(left, left_bound, top, stats);
                    self.visit(right, right_bound, top, stats);
                } else {
                    self.visit(right, right_bound, top, stats);
                    self.visit(left, left_bound, top, stats);
                }
            }
        }
    }
}
