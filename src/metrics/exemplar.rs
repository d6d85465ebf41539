//! Exemplar reservoirs.
//!
//! A reservoir samples raw measurements on the update path so exporters
//! can link aggregated series back to concrete traced requests. Reservoirs
//! own their sampling discipline; the store shields the update path from
//! reservoir panics.

use crate::attributes::AttributeSet;
use crate::core::types::SpanContext;
use crate::metrics::data::Exemplar;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// A raw measurement offered to a reservoir after the aggregation update.
#[derive(Debug)]
pub struct ExemplarMeasurement<'a> {
    /// The measurement, promoted to double.
    pub value: f64,
    /// Attributes recorded with the measurement.
    pub attributes: &'a AttributeSet,
    /// Trace active at record time, if any.
    pub span_context: Option<&'a SpanContext>,
    /// Histogram bucket the value landed in, for aligned reservoirs.
    pub bucket_index: Option<usize>,
}

/// Sampling discipline for exemplars. Implementations must tolerate
/// concurrent `offer` calls.
pub trait ExemplarReservoir: Send + Sync + std::fmt::Debug {
    /// Considers one measurement for retention.
    fn offer(&self, measurement: ExemplarMeasurement<'_>);

    /// Returns the retained exemplars. `reset` clears the reservoir for
    /// the next delta interval.
    fn collect(&self, reset: bool) -> Vec<Exemplar>;
}

/// Factory invoked once per metric point.
pub type ReservoirFactory = dyn Fn() -> Box<dyn ExemplarReservoir> + Send + Sync;

fn to_exemplar(measurement: &ExemplarMeasurement<'_>) -> Exemplar {
    Exemplar {
        value: measurement.value,
        timestamp: SystemTime::now(),
        filtered_attributes: measurement.attributes.clone(),
        trace_id: measurement.span_context.map(|sc| sc.trace_id.clone()),
        span_id: measurement.span_context.map(|sc| sc.span_id.clone()),
    }
}

/// Keeps up to `size` exemplars with uniform probability over everything
/// offered (classic reservoir sampling).
#[derive(Debug)]
pub struct SimpleFixedSizeReservoir {
    slots: Mutex<Vec<Option<Exemplar>>>,
    offered: AtomicU64,
}

impl SimpleFixedSizeReservoir {
    /// Creates a reservoir with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; size.max(1)]),
            offered: AtomicU64::new(0),
        }
    }
}

impl ExemplarReservoir for SimpleFixedSizeReservoir {
    fn offer(&self, measurement: ExemplarMeasurement<'_>) {
        let seen = self.offered.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock();
        let size = slots.len() as u64;
        if seen < size {
            slots[seen as usize] = Some(to_exemplar(&measurement));
            return;
        }
        let candidate = rand::thread_rng().gen_range(0..=seen);
        if candidate < size {
            slots[candidate as usize] = Some(to_exemplar(&measurement));
        }
    }

    fn collect(&self, reset: bool) -> Vec<Exemplar> {
        let mut slots = self.slots.lock();
        let collected = slots.iter().flatten().cloned().collect();
        if reset {
            slots.iter_mut().for_each(|slot| *slot = None);
            self.offered.store(0, Ordering::Relaxed);
        }
        collected
    }
}

/// Keeps the latest measurement per histogram bucket.
#[derive(Debug)]
pub struct AlignedHistogramReservoir {
    slots: Mutex<Vec<Option<Exemplar>>>,
}

impl AlignedHistogramReservoir {
    /// One slot per bucket of the owning histogram.
    pub fn new(bucket_count: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; bucket_count.max(1)]),
        }
    }
}

impl ExemplarReservoir for AlignedHistogramReservoir {
    fn offer(&self, measurement: ExemplarMeasurement<'_>) {
        let Some(bucket) = measurement.bucket_index else {
            return;
        };
        let mut slots = self.slots.lock();
        if bucket < slots.len() {
            slots[bucket] = Some(to_exemplar(&measurement));
        }
    }

    fn collect(&self, reset: bool) -> Vec<Exemplar> {
        let mut slots = self.slots.lock();
        let collected = slots.iter().flatten().cloned().collect();
        if reset {
            slots.iter_mut().for_each(|slot| *slot = None);
        }
        collected
    }
}
