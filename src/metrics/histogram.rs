//! Explicit-bucket histogram aggregation.
//!
//! A histogram update touches count, sum, min/max and one bucket, which
//! must stay mutually consistent in a snapshot, so the cell is guarded by
//! a word-sized `parking_lot` mutex (adaptive spin, uncontended in the
//! expected regime of modest per-series concurrency).

use parking_lot::Mutex;
use std::sync::Arc;

/// Boundary count above which bucket lookup switches from a linear scan
/// to binary search.
const LINEAR_SCAN_MAX_BOUNDARIES: usize = 49;

/// Accumulated histogram state.
#[derive(Debug, Clone)]
pub(crate) struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub bucket_counts: Vec<u64>,
}

impl HistogramSnapshot {
    fn empty(bucket_count: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            bucket_counts: vec![0; bucket_count],
        }
    }

    /// Option-shaped min: `None` until a finite value has been recorded.
    pub fn min_opt(&self) -> Option<f64> {
        (self.min <= self.max).then_some(self.min)
    }

    /// Option-shaped max: `None` until a finite value has been recorded.
    pub fn max_opt(&self) -> Option<f64> {
        (self.min <= self.max).then_some(self.max)
    }

    /// Folds `delta` into this accumulated state.
    pub fn merge(&mut self, delta: &HistogramSnapshot) {
        self.count += delta.count;
        self.sum += delta.sum;
        self.min = self.min.min(delta.min);
        self.max = self.max.max(delta.max);
        for (acc, d) in self.bucket_counts.iter_mut().zip(delta.bucket_counts.iter()) {
            *acc += d;
        }
    }
}

/// One explicit-bucket histogram cell.
#[derive(Debug)]
pub(crate) struct HistogramCell {
    boundaries: Arc<[f64]>,
    record_min_max: bool,
    state: Mutex<HistogramSnapshot>,
}

impl HistogramCell {
    pub(crate) fn new(boundaries: Arc<[f64]>, record_min_max: bool) -> Self {
        let buckets = bucket_slots(&boundaries);
        Self {
            boundaries,
            record_min_max,
            state: Mutex::new(HistogramSnapshot::empty(buckets)),
        }
    }

    /// Records one value. Returns the bucket index for exemplar
    /// alignment, when the value landed in a bucket.
    ///
    /// Non-finite values accumulate into count and sum only: NaN poisons
    /// the sum, buckets and min/max are untouched.
    pub(crate) fn record(&self, value: f64) -> Option<usize> {
        let bucket = value
            .is_finite()
            .then(|| bucket_index(&self.boundaries, value))
            .flatten();
        let mut state = self.state.lock();
        state.count += 1;
        state.sum += value;
        if let Some(idx) = bucket {
            state.bucket_counts[idx] += 1;
        }
        if self.record_min_max && value.is_finite() {
            state.min = state.min.min(value);
            state.max = state.max.max(value);
        }
        bucket
    }

    /// Takes the accumulated state, resetting the cell for the next
    /// interval.
    pub(crate) fn take(&self) -> HistogramSnapshot {
        let mut state = self.state.lock();
        std::mem::replace(
            &mut state,
            HistogramSnapshot::empty(bucket_slots(&self.boundaries)),
        )
    }

    /// Count without taking; used by the collector's straggler re-check.
    pub(crate) fn pending_count(&self) -> u64 {
        self.state.lock().count
    }

    /// Zeroes all state, for slot reuse after reclamation.
    pub(crate) fn reset(&self) {
        *self.state.lock() = HistogramSnapshot::empty(bucket_slots(&self.boundaries));
    }
}

fn bucket_slots(boundaries: &[f64]) -> usize {
    if boundaries.is_empty() {
        0
    } else {
        boundaries.len() + 1
    }
}

/// Finds the bucket for `value`: index `i` such that
/// `boundaries[i-1] < value <= boundaries[i]`, with infinite sentinels on
/// both ends. Returns `None` when no buckets are configured.
fn bucket_index(boundaries: &[f64], value: f64) -> Option<usize> {
    if boundaries.is_empty() {
        return None;
    }
    if boundaries.len() <= LINEAR_SCAN_MAX_BOUNDARIES {
        for (idx, bound) in boundaries.iter().enumerate() {
            if value <= *bound {
                return Some(idx);
            }
        }
        Some(boundaries.len())
    } else {
        Some(boundaries.partition_point(|bound| *bound < value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(boundaries: &[f64]) -> HistogramCell {
        HistogramCell::new(boundaries.to_vec().into(), true)
    }

    #[test]
    fn test_bucket_edges_are_upper_inclusive() {
        let bounds = [0.0, 5.0, 10.0];
        assert_eq!(bucket_index(&bounds, -1.0), Some(0));
        assert_eq!(bucket_index(&bounds, 0.0), Some(0));
        assert_eq!(bucket_index(&bounds, 0.1), Some(1));
        assert_eq!(bucket_index(&bounds, 5.0), Some(1));
        assert_eq!(bucket_index(&bounds, 10.0), Some(2));
        assert_eq!(bucket_index(&bounds, 10.1), Some(3));
    }

    #[test]
    fn test_linear_and_binary_search_agree() {
        let bounds: Vec<f64> = (0..80).map(|i| i as f64 * 10.0).collect();
        for value in [-5.0, 0.0, 4.9, 10.0, 399.9, 400.0, 795.0, 1000.0] {
            let linear = {
                let mut found = bounds.len();
                for (idx, bound) in bounds.iter().enumerate() {
                    if value <= *bound {
                        found = idx;
                        break;
                    }
                }
                found
            };
            assert_eq!(bucket_index(&bounds, value), Some(linear), "value {value}");
        }
    }

    #[test]
    fn test_empty_boundaries_have_no_buckets() {
        let cell = cell(&[]);
        for value in [-10.0, 0.0, 1.0, 9.0, 10.0, 11.0, 19.0] {
            assert_eq!(cell.record(value), None);
        }
        let snap = cell.take();
        assert_eq!(snap.count, 7);
        assert_eq!(snap.sum, 40.0);
        assert!(snap.bucket_counts.is_empty());
    }

    #[test]
    fn test_non_finite_values_skip_buckets() {
        let cell = cell(&[0.0, 10.0]);
        cell.record(5.0);
        cell.record(f64::INFINITY);
        cell.record(f64::NAN);
        let snap = cell.take();
        assert_eq!(snap.count, 3);
        assert!(snap.sum.is_nan());
        assert_eq!(snap.bucket_counts.iter().sum::<u64>(), 1);
        // min/max only saw the finite value
        assert_eq!(snap.min_opt(), Some(5.0));
        assert_eq!(snap.max_opt(), Some(5.0));
    }

    #[test]
    fn test_take_resets() {
        let cell = cell(&[10.0]);
        cell.record(5.0);
        let first = cell.take();
        assert_eq!(first.count, 1);
        let second = cell.take();
        assert_eq!(second.count, 0);
        assert_eq!(second.min_opt(), None);
    }

    #[test]
    fn test_merge_accumulates() {
        let cell = cell(&[10.0]);
        cell.record(5.0);
        let mut acc = cell.take();
        cell.record(15.0);
        acc.merge(&cell.take());
        assert_eq!(acc.count, 2);
        assert_eq!(acc.sum, 20.0);
        assert_eq!(acc.bucket_counts, vec![1, 1]);
        assert_eq!(acc.min_opt(), Some(5.0));
        assert_eq!(acc.max_opt(), Some(15.0));
    }
}
