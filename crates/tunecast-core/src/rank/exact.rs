//! Brute-force scan: score every item, keep the best k.

use super::topk::TopK;
use super::{SearchStats, ScoredItems};
use crate::catalog::ItemCatalog;
use crate::exclusion::ExclusionSet;
use crate::simd::dot;

pub(crate) fn search(
    catalog: &ItemCatalog,
    query: &[f64],
    k: usize,
    excluded: &ExclusionSet,
) -> (ScoredItems, SearchStats) {
    let mut top = TopK::new(k);
    let mut stats = SearchStats::default();

    for index in 0..catalog.len() as u32 {
        if excluded.contains(&index) {
            continue;
        }
        top.offer(index, dot(query, catalog.row(index)));
        stats.scored += 1;
    }

    (top.into_sorted(), stats)
}
