use std::sync::Arc;

use proptest::prelude::*;
use tunecast_core::rank::BallTreeParams;
use tunecast_core::simd::dot;
use tunecast_core::Strategy as RankStrategy;
use tunecast_core::{ExclusionSet, ItemCatalog, RankingIndex, ResultCache};

fn catalog_strategy() -> impl Strategy<Value = (usize, Vec<Vec<f64>>)> {
    (1..6_usize).prop_flat_map(|dim| {
        let row = proptest::collection::vec(-10.0..10.0_f64, dim + 1);
        (Just(dim), proptest::collection::vec(row, 1..120))
    })
}

fn build(rows: &[Vec<f64>]) -> Arc<ItemCatalog> {
    let catalog = ItemCatalog::from_rows(
        rows.iter()
            .enumerate()
            .map(|(i, row)| (i as i64 * 10 + 1, row.clone())),
    )
    .unwrap();
    Arc::new(catalog)
}

/// Brute-force reference: every non-excluded item, best first.
fn reference(rows: &[Vec<f64>], query: &[f64], k: usize, excluded: &ExclusionSet) -> Vec<u32> {
    let mut scored: Vec<(u32, f64)> = rows
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(&(*i as u32)))
        .map(|(i, row)| (i as u32, dot(query, row)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored.into_iter().map(|(i, _)| i).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Both strategies return the same list as a brute-force sort
    #[test]
    fn prop_strategies_match_reference(
        (dim, rows) in catalog_strategy(),
        raw_query in proptest::collection::vec(-5.0..5.0_f64, 6),
        k in 0..40_usize,
        excluded in proptest::collection::hash_set(0..120_u32, 0..30),
        leaf in 1..12_usize,
    ) {
        let catalog = build(&rows);
        let mut query = vec![1.0];
        query.extend_from_slice(&raw_query[..dim]);

        let expected = reference(&rows, &query, k, &excluded);
        let params = BallTreeParams { max_leaf_size: leaf, ..BallTreeParams::default() };

        for strategy in [RankStrategy::Exact, RankStrategy::Accelerated] {
            let index = RankingIndex::build_with(catalog.clone(), strategy, params);
            let (ids, _) = index.query(&query, k, &excluded).unwrap();
            prop_assert_eq!(&ids, &expected, "{}", strategy);
        }
    }

    /// At most k results, none excluded, scores non-increasing
    #[test]
    fn prop_result_invariants(
        (dim, rows) in catalog_strategy(),
        raw_query in proptest::collection::vec(-5.0..5.0_f64, 6),
        k in 0..20_usize,
        excluded in proptest::collection::hash_set(0..120_u32, 0..30),
    ) {
        let catalog = build(&rows);
        let mut query = vec![1.0];
        query.extend_from_slice(&raw_query[..dim]);

        let index = RankingIndex::build(catalog.clone(), RankStrategy::Accelerated);
        let (scored, _) = index.query_scored(&query, k, &excluded).unwrap();

        prop_assert!(scored.len() <= k);
        let available = (0..rows.len() as u32).filter(|i| !excluded.contains(i)).count();
        prop_assert_eq!(scored.len(), k.min(available));
        for item in &scored {
            prop_assert!(!excluded.contains(&item.index));
        }
        for pair in scored.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    /// Fallback is the bias ranking, ties by catalog order
    #[test]
    fn prop_top_bias_items(
        (_dim, rows) in catalog_strategy(),
        k in 0..20_usize,
    ) {
        let catalog = build(&rows);
        let top = catalog.top_bias_items(k);

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| rows[b][0].total_cmp(&rows[a][0]).then(a.cmp(&b)));
        let expected: Vec<i64> = order
            .into_iter()
            .take(k)
            .map(|i| i as i64 * 10 + 1)
            .collect();
        prop_assert_eq!(top, expected);
    }

    /// Re-inserting a key never changes what a later get returns, and the
    /// cache never grows past capacity
    #[test]
    fn prop_cache_bounded_and_idempotent(
        capacity in 0..8_usize,
        ops in proptest::collection::vec((0..12_u8, proptest::collection::vec(0..50_u32, 0..4)), 0..60),
    ) {
        let cache = ResultCache::new(capacity);
        for (key, value) in &ops {
            let key = format!("u{key}");
            cache.put(&key, value.clone());
            cache.put(&key, value.clone());
            prop_assert!(cache.len() <= capacity);
            if capacity > 0 {
                prop_assert_eq!(cache.get(&key), Some(value.clone()));
            } else {
                prop_assert_eq!(cache.get(&key), None);
            }
        }
    }
}
