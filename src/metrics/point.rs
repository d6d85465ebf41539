//! One live aggregation cell.
//!
//! A `MetricPoint` pairs lock-free (or briefly locked) running state
//! mutated by recorders with collector-owned snapshot state used for
//! temporality conversion. The status flag marks points with pending
//! updates; the reference count arbitrates the race between recorders and
//! slot reclamation.

use crate::attributes::AttributeSet;
use crate::core::types::SpanContext;
use crate::metrics::data::{Exemplar, Number, NumberKind, Temporality};
use crate::metrics::exemplar::{ExemplarMeasurement, ExemplarReservoir, ReservoirFactory};
use crate::metrics::exponential::{ExponentialCell, ExponentialSnapshot};
use crate::metrics::histogram::{HistogramCell, HistogramSnapshot};
use crate::metrics::kernels::AtomicF64;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

/// Aggregation configured for a whole store.
#[derive(Debug, Clone)]
pub(crate) enum AggregateKind {
    /// Delta-input sum: recorders add increments.
    Sum { monotonic: bool },
    /// Cumulative-input sum: callbacks report running totals.
    ObservableSum { monotonic: bool },
    /// Last write wins.
    LastValue,
    /// Explicit-bucket histogram.
    Histogram {
        boundaries: Arc<[f64]>,
        record_min_max: bool,
    },
    /// Base-2 exponential histogram.
    Exponential {
        max_size: usize,
        max_scale: i32,
        record_min_max: bool,
    },
}

impl AggregateKind {
    pub(crate) fn is_monotonic(&self) -> bool {
        matches!(
            self,
            AggregateKind::Sum { monotonic: true } | AggregateKind::ObservableSum { monotonic: true }
        )
    }
}

const NO_COLLECT_PENDING: u8 = 0;
const COLLECT_PENDING: u8 = 1;

/// Sentinel reference count of a reclaimed point.
pub(crate) const RECLAIMED: i32 = i32::MIN;

#[derive(Debug)]
enum RunState {
    SumI64(AtomicI64),
    SumF64(AtomicF64),
    LastI64(AtomicI64),
    LastF64(AtomicF64),
    Histogram(HistogramCell),
    Exponential(ExponentialCell),
}

#[derive(Debug)]
enum SnapState {
    SumI64 { acc: i64 },
    SumF64 { acc: f64 },
    ObservableI64 { last: i64 },
    ObservableF64 { last: f64 },
    Gauge,
    Histogram { acc: Option<HistogramSnapshot> },
    Exponential { acc: Option<ExponentialSnapshot> },
}

/// A snapshot taken from one point during collection.
#[derive(Debug)]
pub(crate) enum PointValue {
    Sum(Number),
    Gauge(Number),
    Histogram(HistogramSnapshot),
    Exponential(ExponentialSnapshot),
}

/// One aggregation cell keyed by an attribute set.
pub(crate) struct MetricPoint {
    status: AtomicU8,
    ref_count: AtomicI32,
    touched: AtomicBool,
    tags: RwLock<Option<AttributeSet>>,
    run: RunState,
    snap: Mutex<SnapState>,
    reservoir: Option<Box<dyn ExemplarReservoir>>,
}

impl MetricPoint {
    pub(crate) fn new(
        kind: &AggregateKind,
        number: NumberKind,
        reservoir: Option<&Arc<ReservoirFactory>>,
    ) -> Self {
        Self {
            status: AtomicU8::new(NO_COLLECT_PENDING),
            ref_count: AtomicI32::new(0),
            touched: AtomicBool::new(false),
            tags: RwLock::new(None),
            run: Self::run_state(kind, number),
            snap: Mutex::new(Self::snap_state(kind, number)),
            reservoir: reservoir.map(|factory| factory()),
        }
    }

    fn run_state(kind: &AggregateKind, number: NumberKind) -> RunState {
        match (kind, number) {
            (AggregateKind::Sum { .. }, NumberKind::I64) => RunState::SumI64(AtomicI64::new(0)),
            (AggregateKind::Sum { .. }, NumberKind::F64) => RunState::SumF64(AtomicF64::new(0.0)),
            (AggregateKind::ObservableSum { .. } | AggregateKind::LastValue, NumberKind::I64) => {
                RunState::LastI64(AtomicI64::new(0))
            }
            (AggregateKind::ObservableSum { .. } | AggregateKind::LastValue, NumberKind::F64) => {
                RunState::LastF64(AtomicF64::new(0.0))
            }
            (
                AggregateKind::Histogram {
                    boundaries,
                    record_min_max,
                },
                _,
            ) => RunState::Histogram(HistogramCell::new(Arc::clone(boundaries), *record_min_max)),
            (
                AggregateKind::Exponential {
                    max_size,
                    max_scale,
                    record_min_max,
                },
                _,
            ) => RunState::Exponential(ExponentialCell::new(*max_size, *max_scale, *record_min_max)),
        }
    }

    fn snap_state(kind: &AggregateKind, number: NumberKind) -> SnapState {
        match (kind, number) {
            (AggregateKind::Sum { .. }, NumberKind::I64) => SnapState::SumI64 { acc: 0 },
            (AggregateKind::Sum { .. }, NumberKind::F64) => SnapState::SumF64 { acc: 0.0 },
            (AggregateKind::ObservableSum { .. }, NumberKind::I64) => {
                SnapState::ObservableI64 { last: 0 }
            }
            (AggregateKind::ObservableSum { .. }, NumberKind::F64) => {
                SnapState::ObservableF64 { last: 0.0 }
            }
            (AggregateKind::LastValue, _) => SnapState::Gauge,
            (AggregateKind::Histogram { .. }, _) => SnapState::Histogram { acc: None },
            (AggregateKind::Exponential { .. }, _) => SnapState::Exponential { acc: None },
        }
    }

    /// The attribute set this point is keyed by, once claimed.
    pub(crate) fn tags(&self) -> Option<AttributeSet> {
        self.tags.read().clone()
    }

    pub(crate) fn set_tags(&self, attrs: AttributeSet) {
        *self.tags.write() = Some(attrs);
    }

    pub(crate) fn is_touched(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.status.load(Ordering::Acquire) == COLLECT_PENDING
    }

    pub(crate) fn is_reclaimed(&self) -> bool {
        self.ref_count.load(Ordering::Acquire) == RECLAIMED
    }

    /// Registers a recorder before it touches the point. Fails when the
    /// point has been reclaimed, in which case the recorder must retry
    /// its lookup.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut count = self.ref_count.load(Ordering::Acquire);
        loop {
            if count < 0 {
                return false;
            }
            match self.ref_count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => count = observed,
            }
        }
    }

    pub(crate) fn release(&self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Reclaims an idle point: CAS the reference count from zero to the
    /// sentinel and hand back the tags so the caller can drop the lookup
    /// entry. Fails when a recorder currently holds the point.
    pub(crate) fn try_reclaim(&self) -> Option<AttributeSet> {
        if self
            .ref_count
            .compare_exchange(0, RECLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.touched.store(false, Ordering::Release);
        self.tags.write().take()
    }

    /// Reinitializes a fresh or reclaimed slot for `attrs`. Must complete
    /// before the index is published in the lookup map.
    pub(crate) fn reset_for(&self, attrs: AttributeSet, kind: &AggregateKind, number: NumberKind) {
        match &self.run {
            RunState::SumI64(cell) | RunState::LastI64(cell) => cell.store(0, Ordering::Release),
            RunState::SumF64(cell) | RunState::LastF64(cell) => cell.store(0.0),
            RunState::Histogram(cell) => cell.reset(),
            RunState::Exponential(cell) => cell.reset(),
        }
        *self.snap.lock() = Self::snap_state(kind, number);
        if let Some(reservoir) = &self.reservoir {
            let _ = reservoir.collect(true);
        }
        self.status.store(NO_COLLECT_PENDING, Ordering::Release);
        self.set_tags(attrs);
        self.touched.store(false, Ordering::Release);
        self.ref_count.store(0, Ordering::Release);
    }

    /// Applies one measurement. Returns the histogram bucket index for
    /// exemplar alignment, when applicable.
    pub(crate) fn record(&self, value: Number) -> Option<usize> {
        let bucket = match &self.run {
            RunState::SumI64(cell) => {
                if let Number::I64(v) = value {
                    cell.fetch_add(v, Ordering::AcqRel);
                }
                None
            }
            RunState::SumF64(cell) => {
                cell.add(value.as_f64());
                None
            }
            RunState::LastI64(cell) => {
                if let Number::I64(v) = value {
                    cell.store(v, Ordering::Release);
                }
                None
            }
            RunState::LastF64(cell) => {
                cell.store(value.as_f64());
                None
            }
            RunState::Histogram(cell) => cell.record(value.as_f64()),
            RunState::Exponential(cell) => {
                cell.record(value.as_f64());
                None
            }
        };
        self.touched.store(true, Ordering::Release);
        self.status.store(COLLECT_PENDING, Ordering::Release);
        bucket
    }

    /// Offers the raw measurement to the reservoir, shielding the update
    /// path from reservoir panics. Returns false when the reservoir
    /// panicked.
    pub(crate) fn offer_exemplar(
        &self,
        value: f64,
        attributes: &AttributeSet,
        span_context: Option<&SpanContext>,
        bucket_index: Option<usize>,
    ) -> bool {
        let Some(reservoir) = &self.reservoir else {
            return true;
        };
        catch_unwind(AssertUnwindSafe(|| {
            reservoir.offer(ExemplarMeasurement {
                value,
                attributes,
                span_context,
                bucket_index,
            });
        }))
        .is_ok()
    }

    pub(crate) fn collect_exemplars(&self, reset: bool) -> Vec<Exemplar> {
        match &self.reservoir {
            Some(reservoir) => reservoir.collect(reset),
            None => Vec::new(),
        }
    }

    /// Snapshots this point for the collector.
    ///
    /// Delta-input kernels take-and-reset their running state; after the
    /// status flag is cleared the running value is re-checked and the flag
    /// restored if a concurrent update slipped in between, so no update is
    /// ever lost (at worst one zero-delta follow-up point is emitted).
    pub(crate) fn collect(&self, output: Temporality, max_size: usize) -> PointValue {
        match &self.run {
            RunState::SumI64(cell) => {
                let taken = cell.swap(0, Ordering::AcqRel);
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                if cell.load(Ordering::Acquire) != 0 {
                    self.status.store(COLLECT_PENDING, Ordering::Release);
                }
                let mut snap = self.snap.lock();
                match (&mut *snap, output) {
                    (SnapState::SumI64 { acc }, Temporality::Cumulative) => {
                        *acc += taken;
                        PointValue::Sum(Number::I64(*acc))
                    }
                    _ => PointValue::Sum(Number::I64(taken)),
                }
            }
            RunState::SumF64(cell) => {
                let taken = cell.swap(0.0);
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                if cell.load().to_bits() != 0 {
                    self.status.store(COLLECT_PENDING, Ordering::Release);
                }
                let mut snap = self.snap.lock();
                match (&mut *snap, output) {
                    (SnapState::SumF64 { acc }, Temporality::Cumulative) => {
                        *acc += taken;
                        PointValue::Sum(Number::F64(*acc))
                    }
                    _ => PointValue::Sum(Number::F64(taken)),
                }
            }
            RunState::LastI64(cell) => {
                let current = cell.load(Ordering::Acquire);
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                let mut snap = self.snap.lock();
                match (&mut *snap, output) {
                    (SnapState::ObservableI64 { last }, Temporality::Delta) => {
                        let delta = current - *last;
                        *last = current;
                        PointValue::Sum(Number::I64(delta))
                    }
                    (SnapState::ObservableI64 { .. }, Temporality::Cumulative) => {
                        PointValue::Sum(Number::I64(current))
                    }
                    _ => PointValue::Gauge(Number::I64(current)),
                }
            }
            RunState::LastF64(cell) => {
                let current = cell.load();
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                let mut snap = self.snap.lock();
                match (&mut *snap, output) {
                    (SnapState::ObservableF64 { last }, Temporality::Delta) => {
                        let delta = current - *last;
                        *last = current;
                        PointValue::Sum(Number::F64(delta))
                    }
                    (SnapState::ObservableF64 { .. }, Temporality::Cumulative) => {
                        PointValue::Sum(Number::F64(current))
                    }
                    _ => PointValue::Gauge(Number::F64(current)),
                }
            }
            RunState::Histogram(cell) => {
                let taken = cell.take();
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                if cell.pending_count() != 0 {
                    self.status.store(COLLECT_PENDING, Ordering::Release);
                }
                match output {
                    Temporality::Delta => PointValue::Histogram(taken),
                    Temporality::Cumulative => {
                        let mut snap = self.snap.lock();
                        if let SnapState::Histogram { acc } = &mut *snap {
                            match acc {
                                Some(acc) => acc.merge(&taken),
                                None => *acc = Some(taken),
                            }
                            PointValue::Histogram(acc.clone().expect("accumulator just set"))
                        } else {
                            PointValue::Histogram(taken)
                        }
                    }
                }
            }
            RunState::Exponential(cell) => {
                let taken = cell.take();
                self.status.store(NO_COLLECT_PENDING, Ordering::Release);
                if cell.pending_count() != 0 {
                    self.status.store(COLLECT_PENDING, Ordering::Release);
                }
                match output {
                    Temporality::Delta => PointValue::Exponential(taken),
                    Temporality::Cumulative => {
                        let mut snap = self.snap.lock();
                        if let SnapState::Exponential { acc } = &mut *snap {
                            match acc {
                                Some(acc) => acc.merge(&taken, max_size),
                                None => *acc = Some(taken),
                            }
                            PointValue::Exponential(acc.clone().expect("accumulator just set"))
                        } else {
                            PointValue::Exponential(taken)
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for MetricPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricPoint")
            .field("status", &self.status.load(Ordering::Relaxed))
            .field("ref_count", &self.ref_count.load(Ordering::Relaxed))
            .field("touched", &self.touched.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
