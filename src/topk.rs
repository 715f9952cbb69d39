//! Top-K selection over sampling keys
//!
//! **Problem**: capping a frontier of N combinations at K by sorting all
//! keys is O(N log N).
//!
//! **Solution**: min-heap based selection, O(N log K).
//!
//! Keys are Efraimidis–Spirakis keys `ln(u) / w`: the K largest keys form a
//! weighted sample without replacement, and sorting all keys in descending
//! order yields a weighted random permutation. Entries with key `-inf`
//! (zero weight) or `NaN` never take part.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sampling key for weight `w` and uniform draw `u ∈ [0, 1)`
///
/// Zero or negative weights map to `-inf` and are never selected.
#[must_use]
pub fn weighted_key(weight: f64, u: f64) -> f64 {
    if weight > 0.0 && weight.is_finite() {
        // 1 - u lies in (0, 1], so the log is finite or zero
        (1.0 - u).ln() / weight
    } else {
        f64::NEG_INFINITY
    }
}

// Heap item with reversed ordering so the smallest key sits at the top.
// Equal keys prefer the lower index, making selection deterministic.
#[derive(Debug)]
struct MinHeapItem {
    key: f64,
    index: usize,
}

impl PartialEq for MinHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MinHeapItem {}

impl Ord for MinHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap (smallest key, then largest index, at top)
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for MinHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn selectable(key: f64) -> bool {
    !key.is_nan() && key != f64::NEG_INFINITY
}

fn descending(keys: &[f64], a: usize, b: usize) -> Ordering {
    keys[b].total_cmp(&keys[a]).then_with(|| a.cmp(&b))
}

/// Indices of the `k` largest selectable keys, largest first
///
/// Time complexity: O(N log K), space O(K).
#[must_use]
pub fn top_k_by_key(keys: &[f64], k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<MinHeapItem> = BinaryHeap::with_capacity(k.min(keys.len()));
    for (index, &key) in keys.iter().enumerate() {
        if !selectable(key) {
            continue;
        }
        let item = MinHeapItem { key, index };
        if heap.len() < k {
            heap.push(item);
        } else if let Some(top) = heap.peek() {
            // `item < top` in reversed order means it beats the current minimum
            if item < *top {
                heap.pop();
                heap.push(item);
            }
        }
    }

    let mut result: Vec<usize> = heap.into_iter().map(|item| item.index).collect();
    result.sort_by(|&a, &b| descending(keys, a, b));
    result
}

/// All selectable indices ordered by descending key
#[must_use]
pub fn order_by_key(keys: &[f64]) -> Vec<usize> {
    let mut result: Vec<usize> = (0..keys.len()).filter(|&i| selectable(keys[i])).collect();
    result.sort_by(|&a, &b| descending(keys, a, b));
    result
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_top_k_basic() {
        let keys = [1.0, 5.0, 3.0, 9.0, 2.0];
        assert_eq!(top_k_by_key(&keys, 3), vec![3, 1, 2]);
    }

    #[test]
    fn test_top_k_k_greater_than_length() {
        let keys = [3.0, 1.0, 2.0];
        assert_eq!(top_k_by_key(&keys, 10), vec![0, 2, 1]);
        assert_eq!(top_k_by_key(&keys, 10), order_by_key(&keys));
    }

    #[test]
    fn test_top_k_zero() {
        assert!(top_k_by_key(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_excluded_keys_never_selected() {
        let keys = [f64::NEG_INFINITY, -2.0, f64::NAN, -1.0];
        assert_eq!(top_k_by_key(&keys, 4), vec![3, 1]);
        assert_eq!(order_by_key(&keys), vec![3, 1]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let keys = [-1.0, -1.0, -1.0, -1.0];
        assert_eq!(top_k_by_key(&keys, 2), vec![0, 1]);
        assert_eq!(order_by_key(&keys), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_weighted_key_zero_weight() {
        assert_eq!(weighted_key(0.0, 0.3), f64::NEG_INFINITY);
        assert_eq!(weighted_key(-1.0, 0.3), f64::NEG_INFINITY);
        assert_eq!(weighted_key(f64::NAN, 0.3), f64::NEG_INFINITY);
        assert!(weighted_key(0.5, 0.0) == 0.0);
    }

    #[test]
    fn test_heavier_weight_selected_more_often() {
        // Weights 9:1, pick one: the heavy item should win ~90% of the time
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let trials = 10_000;
        let heavy_wins = (0..trials)
            .filter(|_| {
                let keys = [weighted_key(0.9, rng.gen()), weighted_key(0.1, rng.gen())];
                top_k_by_key(&keys, 1) == vec![0]
            })
            .count();
        let fraction = heavy_wins as f64 / f64::from(trials);
        assert!((fraction - 0.9).abs() < 0.02, "fraction={fraction}");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: returns min(k, selectable) indices in descending key order
            #[test]
            fn prop_top_k_sorted_and_sized(
                keys in prop::collection::vec(-100.0f64..0.0, 0..500),
                k in 0usize..100
            ) {
                let result = top_k_by_key(&keys, k);
                prop_assert_eq!(result.len(), k.min(keys.len()));
                for pair in result.windows(2) {
                    prop_assert!(keys[pair[0]] >= keys[pair[1]]);
                }
            }

            /// Property: top-k agrees with the prefix of the full ordering
            #[test]
            fn prop_top_k_is_prefix_of_order(
                keys in prop::collection::vec(-100.0f64..0.0, 0..300),
                k in 0usize..50
            ) {
                let full = order_by_key(&keys);
                let top = top_k_by_key(&keys, k);
                prop_assert_eq!(&full[..top.len()], &top[..]);
            }
        }
    }
}
