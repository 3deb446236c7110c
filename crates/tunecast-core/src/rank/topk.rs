//! Bounded top-k collector shared by every ranking strategy.
//!
//! Ordering is total: higher score first, then lower internal index. Because
//! the exact scan and the ball tree feed the same collector with the same
//! scores, they produce the same list whenever they see the same candidates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored catalog entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub index: u32,
    pub score: f64,
}

impl Scored {
    /// `Less` when `self` ranks ahead of `other`.
    #[inline]
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Heap entry ordered so the worst-ranked candidate sits at the top.
#[derive(Clone, Copy)]
struct Worst(Scored);

impl PartialEq for Worst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Worst {}

impl Ord for Worst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

impl PartialOrd for Worst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct TopK {
    k: usize,
    heap: BinaryHeap<Worst>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Score of the current k-th candidate, or `-inf` while not full.
    ///
    /// A candidate scoring strictly below this can never enter the result.
    #[inline]
    pub fn threshold(&self) -> f64 {
        if self.is_full() {
            self.heap.peek().map(|w| w.0.score).unwrap_or(f64::NEG_INFINITY)
        } else {
            f64::NEG_INFINITY
        }
    }

    #[inline]
    pub fn offer(&mut self, index: u32, score: f64) {
        if self.k == 0 {
            return;
        }
        let candidate = Scored { index, score };
        if !self.is_full() {
            self.heap.push(Worst(candidate));
            return;
        }
        if let Some(mut worst) = self.heap.peek_mut() {
            if candidate.rank_cmp(&worst.0) == Ordering::Less {
                *worst = Worst(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best first.
    pub fn into_sorted(self) -> Vec<Scored> {
        let mut out: Vec<Scored> = self.heap.into_iter().map(|w| w.0).collect();
        out.sort_by(Scored::rank_cmp);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_k() {
        let mut top = TopK::new(2);
        for (i, s) in [1.0, 5.0, 3.0, 4.0].into_iter().enumerate() {
            top.offer(i as u32, s);
        }
        let out = top.into_sorted();
        assert_eq!(out.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let mut top = TopK::new(2);
        top.offer(7, 1.0);
        top.offer(3, 1.0);
        top.offer(5, 1.0);
        let out = top.into_sorted();
        assert_eq!(out.iter().map(|s| s.index).collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_threshold() {
        let mut top = TopK::new(2);
        assert_eq!(top.threshold(), f64::NEG_INFINITY);
        top.offer(0, 2.0);
        assert_eq!(top.threshold(), f64::NEG_INFINITY);
        top.offer(1, 3.0);
        assert_eq!(top.threshold(), 2.0);
        top.offer(2, 4.0);
        assert_eq!(top.threshold(), 3.0);
    }

    #[test]
    fn test_zero_k() {
        let mut top = TopK::new(0);
        top.offer(0, 1.0);
        assert!(top.is_empty());
        assert!(top.into_sorted().is_empty());
    }
}
