//! # Merge & Rank
//!
//! Shards answer with partial `(value, count)` observations. Merging sums the
//! counts per value; the reduction is associative and commutative, so the
//! result does not depend on how many shards answered or in which order.
//! Ranking and truncation only ever run on the fully merged set.

use crate::{SuggestionCandidate, ValueCount};
use std::collections::HashMap;

/// Sum observations per distinct value. Counts saturate at `u64::MAX`.
pub fn merge_observations<I>(observations: I) -> HashMap<String, u64>
where
    I: IntoIterator<Item = ValueCount>,
{
    let mut merged: HashMap<String, u64> = HashMap::new();
    for ValueCount { value, count } in observations {
        let slot = merged.entry(value).or_insert(0);
        *slot = slot.saturating_add(count);
    }
    merged
}

/// Output of [`rank`]: the top candidates and what the cut removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub suggestions: Vec<SuggestionCandidate>,
    /// Total occurrences of merged values that did not make the cut.
    pub sum_other_occurrences: u64,
}

/// Order merged values (occurrence desc, value asc) and keep the first `limit`.
pub fn rank(merged: HashMap<String, u64>, limit: usize) -> Ranked {
    let mut candidates: Vec<SuggestionCandidate> = merged
        .into_iter()
        .map(|(value, occurrence)| SuggestionCandidate { value, occurrence })
        .collect();

    // Total order: no two candidates compare equal, so unstable sort is deterministic.
    candidates.sort_unstable();

    let rest = if candidates.len() > limit {
        candidates.split_off(limit)
    } else {
        Vec::new()
    };
    let sum_other_occurrences = rest
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.occurrence));

    Ranked {
        suggestions: candidates,
        sum_other_occurrences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: &str, count: u64) -> ValueCount {
        ValueCount::new(value, count)
    }

    fn pairs(ranked: &Ranked) -> Vec<(&str, u64)> {
        ranked
            .suggestions
            .iter()
            .map(|c| (c.value.as_str(), c.occurrence))
            .collect()
    }

    #[test]
    fn test_duplicates_across_shards_are_summed() {
        let merged = merge_observations(vec![obs("a", 2), obs("b", 1), obs("a", 3)]);
        assert_eq!(merged.get("a"), Some(&5));
        assert_eq!(merged.get("b"), Some(&1));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let shard_a = vec![obs("x", 4), obs("y", 1)];
        let shard_b = vec![obs("y", 7), obs("z", 2)];

        let forward = merge_observations(shard_a.iter().chain(&shard_b).cloned());
        let backward = merge_observations(shard_b.iter().chain(&shard_a).cloned());
        assert_eq!(forward, backward);
        assert_eq!(rank(forward, 10), rank(backward, 10));
    }

    #[test]
    fn test_ties_break_on_value() {
        let ranked = rank(
            merge_observations(vec![obs("c", 3), obs("b", 5), obs("a", 5)]),
            20,
        );
        assert_eq!(pairs(&ranked), vec![("a", 5), ("b", 5), ("c", 3)]);
        assert_eq!(ranked.sum_other_occurrences, 0);
    }

    #[test]
    fn test_truncation_happens_after_global_merge() {
        // "rare" tops each shard locally; "spread" only wins once shards are combined.
        let shard_1 = vec![obs("rare-1", 5), obs("spread", 4)];
        let shard_2 = vec![obs("rare-2", 5), obs("spread", 4)];
        let shard_3 = vec![obs("rare-3", 5), obs("spread", 4)];

        let merged = merge_observations(shard_1.into_iter().chain(shard_2).chain(shard_3));
        let ranked = rank(merged, 1);
        assert_eq!(pairs(&ranked), vec![("spread", 12)]);
        assert_eq!(ranked.sum_other_occurrences, 15);
    }

    #[test]
    fn test_limit_bounds_result() {
        let observations = (0..100).map(|i| obs(&format!("v{:03}", i), i));
        let ranked = rank(merge_observations(observations), 20);
        assert_eq!(ranked.suggestions.len(), 20);
        assert_eq!(ranked.suggestions[0].value, "v099");
        assert!(ranked
            .suggestions
            .windows(2)
            .all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let ranked = rank(merge_observations(vec![obs("a", 1), obs("b", 2)]), 0);
        assert!(ranked.suggestions.is_empty());
        assert_eq!(ranked.sum_other_occurrences, 3);
    }

    #[test]
    fn test_counts_saturate() {
        let merged = merge_observations(vec![obs("a", u64::MAX), obs("a", 1)]);
        assert_eq!(merged.get("a"), Some(&u64::MAX));
    }
}
