//! Cardinality-bounded aggregation store.
//!
//! Maps attribute sets to metric points over a dense, preallocated slab.
//! Index 0 is reserved for the zero-tag series and index 1 for the
//! overflow series; everything else is claimed on first use, bounded by
//! the cardinality limit, and optionally returned to a free list when a
//! series goes idle under delta temporality.

use crate::attributes::AttributeSet;
use crate::core::diagnostics::{Diagnostics, DropKind};
use crate::core::types::SpanContext;
use crate::metrics::data::{Exemplar, Number, NumberKind, Temporality};
use crate::metrics::point::{AggregateKind, MetricPoint, PointValue};
use crate::metrics::exemplar::ReservoirFactory;
use crossbeam::queue::ArrayQueue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

const ZERO_TAG_INDEX: usize = 0;
const OVERFLOW_INDEX: usize = 1;
const FIRST_DYNAMIC_INDEX: usize = 2;

/// Everything a store needs to know about its stream.
#[derive(Clone)]
pub(crate) struct StoreConfig {
    pub kind: AggregateKind,
    pub number: NumberKind,
    pub temporality: Temporality,
    pub cardinality_limit: usize,
    pub emit_overflow: bool,
    pub reclaim: bool,
    pub reservoir: Option<Arc<ReservoirFactory>>,
}

/// One series snapshot handed to the stream for assembly.
#[derive(Debug)]
pub(crate) struct CollectedPoint {
    pub attributes: AttributeSet,
    pub value: PointValue,
    pub exemplars: Vec<Exemplar>,
}

/// Bounded mapping of attribute sets to live aggregation cells.
pub(crate) struct AggregatorStore {
    config: StoreConfig,
    points: Box<[MetricPoint]>,
    lookup: DashMap<AttributeSet, usize, ahash::RandomState>,
    free: ArrayQueue<usize>,
    cursor: AtomicUsize,
    interval_start: Mutex<SystemTime>,
    diagnostics: Arc<Diagnostics>,
}

impl AggregatorStore {
    pub(crate) fn new(config: StoreConfig, diagnostics: Arc<Diagnostics>) -> Self {
        let slots = config.cardinality_limit + FIRST_DYNAMIC_INDEX;
        let mut points = Vec::with_capacity(slots);
        for _ in 0..slots {
            points.push(MetricPoint::new(
                &config.kind,
                config.number,
                config.reservoir.as_ref(),
            ));
        }
        points[ZERO_TAG_INDEX].set_tags(AttributeSet::empty());
        points[OVERFLOW_INDEX].set_tags(AttributeSet::overflow());
        Self {
            free: ArrayQueue::new(config.cardinality_limit.max(1)),
            cursor: AtomicUsize::new(FIRST_DYNAMIC_INDEX),
            lookup: DashMap::with_hasher(ahash::RandomState::new()),
            interval_start: Mutex::new(SystemTime::now()),
            points: points.into_boxed_slice(),
            config,
            diagnostics,
        }
    }

    pub(crate) fn temporality(&self) -> Temporality {
        self.config.temporality
    }

    pub(crate) fn kind(&self) -> &AggregateKind {
        &self.config.kind
    }

    pub(crate) fn wants_exemplars(&self) -> bool {
        self.config.reservoir.is_some()
    }

    fn reclaim_enabled(&self) -> bool {
        self.config.reclaim && self.config.temporality == Temporality::Delta
    }

    fn exponential_max_size(&self) -> usize {
        match &self.config.kind {
            AggregateKind::Exponential { max_size, .. } => *max_size,
            _ => 0,
        }
    }

    /// Applies one measurement to the series keyed by `attrs`.
    pub(crate) fn update(
        &self,
        value: Number,
        attrs: &AttributeSet,
        span_context: Option<&SpanContext>,
    ) {
        if self.config.kind.is_monotonic() && value.is_negative() {
            self.diagnostics.note(DropKind::NegativeValue);
            return;
        }
        loop {
            let Some(index) = self.resolve_index(attrs) else {
                return; // dropped at the cardinality limit
            };
            let point = &self.points[index];
            if self.reclaim_enabled() && index >= FIRST_DYNAMIC_INDEX {
                // The collector may be reclaiming this slot; registering
                // as a recorder fences it out. A failed registration
                // means the slot is gone and the lookup must be retried.
                if !point.try_acquire() {
                    std::hint::spin_loop();
                    continue;
                }
                // The slot may have been reclaimed and handed to a
                // different attribute set between the lookup and the
                // acquire; re-verify before touching it.
                let still_current = self.lookup.get(attrs).map(|entry| *entry) == Some(index);
                if !still_current {
                    point.release();
                    std::hint::spin_loop();
                    continue;
                }
                let bucket = point.record(value);
                self.offer_exemplar(point, value, attrs, span_context, bucket);
                point.release();
            } else {
                let bucket = point.record(value);
                self.offer_exemplar(point, value, attrs, span_context, bucket);
            }
            return;
        }
    }

    fn offer_exemplar(
        &self,
        point: &MetricPoint,
        value: Number,
        attrs: &AttributeSet,
        span_context: Option<&SpanContext>,
        bucket: Option<usize>,
    ) {
        if self.config.reservoir.is_none() {
            return;
        }
        if !point.offer_exemplar(value.as_f64(), attrs, span_context, bucket) {
            self.diagnostics.note(DropKind::ReservoirPanic);
        }
    }

    fn resolve_index(&self, attrs: &AttributeSet) -> Option<usize> {
        if attrs.is_empty() {
            return Some(ZERO_TAG_INDEX);
        }
        if let Some(index) = self.lookup.get(attrs) {
            return Some(*index);
        }
        self.claim(attrs)
    }

    /// Claims a slot for a new attribute set. The entry insert is the
    /// linearization point: the point is fully initialized before the
    /// index becomes visible, and losers of the race simply read the
    /// winner's index.
    fn claim(&self, attrs: &AttributeSet) -> Option<usize> {
        match self.lookup.entry(attrs.clone()) {
            Entry::Occupied(occupied) => Some(*occupied.get()),
            Entry::Vacant(vacant) => match self.take_index() {
                Some(index) => {
                    self.points[index].reset_for(
                        attrs.clone(),
                        &self.config.kind,
                        self.config.number,
                    );
                    vacant.insert(index);
                    Some(index)
                }
                None => {
                    drop(vacant);
                    if self.config.emit_overflow {
                        self.diagnostics.note(DropKind::Overflow);
                        Some(OVERFLOW_INDEX)
                    } else {
                        self.diagnostics.note(DropKind::CardinalityLimit);
                        None
                    }
                }
            },
        }
    }

    fn take_index(&self) -> Option<usize> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.points.len()).then_some(next + 1)
            })
            .ok()
    }

    /// Snapshots every live series.
    ///
    /// Under delta temporality only series with a pending update are
    /// emitted, and idle series become reclamation candidates when the
    /// option is on. Under cumulative temporality every touched series is
    /// emitted unconditionally. Returns the points plus the aggregation
    /// window `(start, end)`.
    pub(crate) fn collect(&self) -> (Vec<CollectedPoint>, SystemTime, SystemTime) {
        let output = self.config.temporality;
        let reclaim = self.reclaim_enabled();
        let max_size = self.exponential_max_size();
        let upper = self.cursor.load(Ordering::Acquire).min(self.points.len());
        let mut collected = Vec::new();

        for index in 0..upper {
            let point = &self.points[index];
            if point.is_reclaimed() || !point.is_touched() {
                continue;
            }
            if output == Temporality::Delta && !point.is_pending() {
                // No update across a full cycle.
                if reclaim && index >= FIRST_DYNAMIC_INDEX {
                    if let Some(tags) = point.try_reclaim() {
                        self.lookup.remove(&tags);
                        let _ = self.free.push(index);
                    }
                }
                continue;
            }
            let Some(attributes) = point.tags() else {
                continue;
            };
            let value = point.collect(output, max_size);
            let exemplars = point.collect_exemplars(output == Temporality::Delta);
            collected.push(CollectedPoint {
                attributes,
                value,
                exemplars,
            });
        }

        let end = SystemTime::now();
        let start = match output {
            Temporality::Delta => {
                let mut start = self.interval_start.lock();
                std::mem::replace(&mut *start, end)
            }
            Temporality::Cumulative => *self.interval_start.lock(),
        };
        (collected, start, end)
    }

    /// Number of live dynamically-claimed series.
    #[cfg(test)]
    fn live_series(&self) -> usize {
        self.lookup.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(limit: usize, emit_overflow: bool, reclaim: bool) -> AggregatorStore {
        AggregatorStore::new(
            StoreConfig {
                kind: AggregateKind::Sum { monotonic: true },
                number: NumberKind::I64,
                temporality: Temporality::Delta,
                cardinality_limit: limit,
                emit_overflow,
                reclaim,
                reservoir: None,
            },
            Arc::new(Diagnostics::new()),
        )
    }

    fn attrs(value: &str) -> AttributeSet {
        AttributeSet::new([("k", value)]).unwrap()
    }

    fn sum_for<'a>(
        points: &'a [CollectedPoint],
        wanted: &AttributeSet,
    ) -> Option<&'a CollectedPoint> {
        points.iter().find(|p| &p.attributes == wanted)
    }

    #[test]
    fn test_zero_tag_series() {
        let store = store(4, true, false);
        store.update(Number::I64(3), &AttributeSet::empty(), None);
        let (points, _, _) = store.collect();
        assert_eq!(points.len(), 1);
        assert!(points[0].attributes.is_empty());
    }

    #[test]
    fn test_overflow_routing() {
        let store = store(2, true, false);
        store.update(Number::I64(1), &attrs("a"), None);
        store.update(Number::I64(1), &attrs("b"), None);
        store.update(Number::I64(1), &attrs("c"), None);

        let (points, _, _) = store.collect();
        assert_eq!(points.len(), 3);
        let overflow = sum_for(&points, &AttributeSet::overflow()).unwrap();
        match overflow.value {
            PointValue::Sum(Number::I64(v)) => assert_eq!(v, 1),
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.live_series(), 2);
    }

    #[test]
    fn test_drop_without_overflow() {
        let store = store(1, false, false);
        store.update(Number::I64(1), &attrs("a"), None);
        store.update(Number::I64(1), &attrs("b"), None);
        let (points, _, _) = store.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(
            store.diagnostics.count(DropKind::CardinalityLimit),
            1
        );
    }

    #[test]
    fn test_negative_rejected_by_monotonic() {
        let store = store(4, true, false);
        store.update(Number::I64(-1), &attrs("a"), None);
        let (points, _, _) = store.collect();
        assert!(points.is_empty());
        assert_eq!(store.diagnostics.count(DropKind::NegativeValue), 1);
    }

    #[test]
    fn test_reclaim_frees_slot_for_new_series() {
        let store = store(1, true, true);
        store.update(Number::I64(1), &attrs("a"), None);
        let (points, _, _) = store.collect();
        assert_eq!(points.len(), 1);

        // Idle across a full cycle: reclaimed here.
        let (points, _, _) = store.collect();
        assert!(points.is_empty());
        assert_eq!(store.live_series(), 0);

        // The freed slot accepts a brand new series without overflowing.
        store.update(Number::I64(1), &attrs("b"), None);
        let (points, _, _) = store.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].attributes, attrs("b"));
        assert_eq!(store.diagnostics.count(DropKind::Overflow), 0);
    }

    #[test]
    fn test_series_updated_every_cycle_is_not_reclaimed() {
        let store = store(1, true, true);
        for _ in 0..3 {
            store.update(Number::I64(1), &attrs("a"), None);
            let (points, _, _) = store.collect();
            assert_eq!(points.len(), 1);
        }
        assert_eq!(store.live_series(), 1);
    }

    #[test]
    fn test_concurrent_updates_all_counted() {
        let store = Arc::new(store(8, true, false));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let set = attrs("shared");
                for _ in 0..1000 {
                    store.update(Number::I64(1), &set, None);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let (points, _, _) = store.collect();
        let point = sum_for(&points, &attrs("shared")).unwrap();
        match point.value {
            PointValue::Sum(Number::I64(v)) => assert_eq!(v, 4000),
            ref other => panic!("unexpected {other:?}"),
        }
    }
}
