//! Progressive reduction of oversized collections.
//!
//! Tries fixed retention percentages in decreasing order and keeps the
//! first slice whose summed per-item estimate fits the budget. Never
//! returns an empty result for non-empty input: when even one item is
//! over the limit, that single item comes back marked truncated.

use std::cmp::Ordering;

use serde::Serialize;

/// Retention percentages tried in order.
const RETENTION_STEPS: [usize; 7] = [100, 75, 50, 30, 20, 10, 5];

/// Which ordering the percentage search ran over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Original item order; reduction keeps a prefix.
    Standard,
    /// Items ranked by an external score; reduction keeps the top-ranked.
    Priority,
}

/// Outcome of one reduction pass. Purely derived; no shared state.
#[derive(Debug, Clone)]
pub struct Reduction<T> {
    pub items: Vec<T>,
    pub original_count: usize,
    pub estimated_tokens: usize,
    pub truncated: bool,
    pub strategy: StrategyKind,
    /// Accepted retention step, or 0 when even the smallest step was
    /// over the limit and the single-item floor applied.
    pub retention_percent: usize,
}

impl<T> Reduction<T> {
    /// Whether the retained items actually fit the budget.
    pub fn fits(&self, token_limit: usize) -> bool {
        self.estimated_tokens <= token_limit
    }
}

/// Reduce `items` to fit `token_limit`, keeping a prefix of the original
/// order. `estimate` prices one item; its sum over the kept slice is the
/// cost compared against the limit.
pub fn reduce<T, F>(items: &[T], estimate: F, token_limit: usize) -> Reduction<T>
where
    T: Clone,
    F: Fn(&T) -> usize,
{
    let per_item: Vec<usize> = items.iter().map(|item| estimate(item)).collect();
    reduce_ranked(items, &per_item, token_limit, StrategyKind::Standard)
}

/// Reduce with the most important items kept first. `priority` scores
/// each item; higher scores survive longer. Kept items are returned in
/// their original relative order.
pub fn reduce_with_priority<T, F, P>(
    items: &[T],
    estimate: F,
    priority: P,
    token_limit: usize,
) -> Reduction<T>
where
    T: Clone,
    F: Fn(&T) -> usize,
    P: Fn(&T) -> f64,
{
    let scores: Vec<f64> = items.iter().map(|item| priority(item)).collect();
    let mut order: Vec<usize> = (0..items.len()).collect();
    // Stable sort: equal scores keep their original order.
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let ranked: Vec<T> = order.iter().map(|&i| items[i].clone()).collect();
    let per_item: Vec<usize> = ranked.iter().map(|item| estimate(item)).collect();
    let picked = reduce_ranked(&ranked, &per_item, token_limit, StrategyKind::Priority);

    // Map the kept prefix of the ranking back to original positions.
    let mut kept: Vec<usize> = order[..picked.items.len()].to_vec();
    kept.sort_unstable();
    Reduction {
        items: kept.iter().map(|&i| items[i].clone()).collect(),
        original_count: picked.original_count,
        estimated_tokens: picked.estimated_tokens,
        truncated: picked.truncated,
        strategy: StrategyKind::Priority,
        retention_percent: picked.retention_percent,
    }
}

/// Run both strategies and keep whichever retains more items while
/// staying within budget. Ties and all-over-budget cases favor standard.
pub fn reduce_best<T, F, P>(
    items: &[T],
    estimate: F,
    priority: P,
    token_limit: usize,
) -> Reduction<T>
where
    T: Clone,
    F: Fn(&T) -> usize,
    P: Fn(&T) -> f64,
{
    let standard = reduce(items, &estimate, token_limit);
    let prioritized = reduce_with_priority(items, &estimate, priority, token_limit);
    match (standard.fits(token_limit), prioritized.fits(token_limit)) {
        (true, true) => {
            if prioritized.items.len() > standard.items.len() {
                prioritized
            } else {
                standard
            }
        }
        (false, true) => prioritized,
        _ => standard,
    }
}

fn reduce_ranked<T: Clone>(
    items: &[T],
    per_item: &[usize],
    token_limit: usize,
    strategy: StrategyKind,
) -> Reduction<T> {
    if items.is_empty() {
        return Reduction {
            items: Vec::new(),
            original_count: 0,
            estimated_tokens: 0,
            truncated: false,
            strategy,
            retention_percent: 100,
        };
    }

    // Prefix sums make each percentage step O(1).
    let mut prefix = Vec::with_capacity(items.len() + 1);
    prefix.push(0usize);
    for &cost in per_item {
        prefix.push(prefix[prefix.len() - 1] + cost);
    }

    for &percent in RETENTION_STEPS.iter() {
        let keep = (items.len() * percent).div_ceil(100).max(1);
        let cost = prefix[keep];
        if cost <= token_limit {
            return Reduction {
                items: items[..keep].to_vec(),
                original_count: items.len(),
                estimated_tokens: cost,
                truncated: keep < items.len(),
                strategy,
                retention_percent: percent,
            };
        }
    }

    // Even a single item is over the limit. Best-effort floor.
    Reduction {
        items: vec![items[0].clone()],
        original_count: items.len(),
        estimated_tokens: per_item[0],
        truncated: true,
        strategy,
        retention_percent: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(_: &u32) -> usize {
        10
    }

    #[test]
    fn test_everything_fits_at_full_retention() {
        let items: Vec<u32> = (0..10).collect();
        let r = reduce(&items, flat, 1000);
        assert_eq!(r.items.len(), 10);
        assert!(!r.truncated);
        assert_eq!(r.retention_percent, 100);
        assert_eq!(r.estimated_tokens, 100);
    }

    #[test]
    fn test_hundred_items_budget_55_keeps_five() {
        let items: Vec<u32> = (0..100).collect();
        let r = reduce(&items, flat, 55);
        assert_eq!(r.items.len(), 5);
        assert_eq!(r.items, vec![0, 1, 2, 3, 4]);
        assert!(r.truncated);
        assert_eq!(r.estimated_tokens, 50);
        assert_eq!(r.retention_percent, 5);
    }

    #[test]
    fn test_minimum_one_item_floor() {
        let items = vec![1u32, 2, 3];
        let r = reduce(&items, flat, 3);
        assert_eq!(r.items.len(), 1);
        assert!(r.truncated);
        assert!(!r.fits(3));
        assert_eq!(r.retention_percent, 0);
    }

    #[test]
    fn test_never_empty_for_nonempty_input() {
        let items = vec![99u32];
        let r = reduce(&items, flat, 0);
        assert_eq!(r.items.len(), 1);
        assert!(r.truncated);
    }

    #[test]
    fn test_empty_input_stays_empty() {
        let items: Vec<u32> = Vec::new();
        let r = reduce(&items, flat, 100);
        assert!(r.items.is_empty());
        assert!(!r.truncated);
    }

    #[test]
    fn test_larger_budget_never_keeps_fewer() {
        let items: Vec<u32> = (0..40).collect();
        let mut previous = 0;
        for limit in [0, 15, 35, 95, 125, 205, 305, 405] {
            let kept = reduce(&items, flat, limit).items.len();
            assert!(
                kept >= previous,
                "budget {} kept {} after {}",
                limit,
                kept,
                previous
            );
            previous = kept;
        }
    }

    #[test]
    fn test_rounds_up_with_minimum() {
        // 3 items at 30%: ceil(0.9) = 1, the first step that fits.
        let items = vec![1u32, 2, 3];
        let r = reduce(&items, flat, 10);
        assert_eq!(r.items.len(), 1);
        assert!(r.truncated);
        assert!(r.fits(10));
    }

    #[test]
    fn test_priority_keeps_highest_scores_in_original_order() {
        let items: Vec<u32> = (0..10).collect();
        // Even numbers matter most.
        let r = reduce_with_priority(
            &items,
            flat,
            |n| if n % 2 == 0 { 1.0 } else { 0.0 },
            55,
        );
        assert_eq!(r.items, vec![0, 2, 4, 6, 8]);
        assert!(r.truncated);
        assert_eq!(r.strategy, StrategyKind::Priority);
    }

    #[test]
    fn test_priority_wins_when_top_items_are_cheaper() {
        // Items 0..10 cost 100 each except the last five cost 1.
        let items: Vec<u32> = (0..10).collect();
        let estimate = |n: &u32| if *n >= 5 { 1 } else { 100 };
        let priority = |n: &u32| *n as f64;
        let best = reduce_best(&items, estimate, priority, 5);
        // Standard keeps only the floor (first item, cost 100); priority
        // keeps the five cheap high-scoring items.
        assert_eq!(best.strategy, StrategyKind::Priority);
        assert_eq!(best.items, vec![5, 6, 7, 8, 9]);
        assert!(best.fits(5));
    }

    #[test]
    fn test_best_ties_favor_standard() {
        let items: Vec<u32> = (0..10).collect();
        let best = reduce_best(&items, flat, |n| *n as f64, 1000);
        assert_eq!(best.strategy, StrategyKind::Standard);
        assert_eq!(best.items.len(), 10);
    }
}
