//! Read-only metric snapshots produced by collection.

use crate::attributes::AttributeSet;
use crate::core::types::{SpanId, TraceId};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Whether aggregated values report running totals or per-interval
/// differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Temporality {
    /// Per-interval differences; state resets at each collection.
    Delta,
    /// Running totals since the stream started.
    Cumulative,
}

/// The kind of instrument that produced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    /// Monotonic, synchronous counter.
    Counter,
    /// Non-monotonic, synchronous counter.
    UpDownCounter,
    /// Synchronous distribution recorder.
    Histogram,
    /// Synchronous last-value instrument.
    Gauge,
    /// Callback-driven monotonic counter reporting running totals.
    ObservableCounter,
    /// Callback-driven non-monotonic counter reporting running totals.
    ObservableUpDownCounter,
    /// Callback-driven last-value instrument.
    ObservableGauge,
}

impl InstrumentKind {
    /// True for the callback-driven kinds.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter
                | InstrumentKind::ObservableGauge
        )
    }
}

/// Identity of an instrument within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    /// Name of the meter that created the instrument.
    pub meter_name: String,
    /// Version of the meter, if any.
    pub meter_version: Option<String>,
    /// Instrument name.
    pub name: String,
    /// Unit of measure.
    pub unit: Option<String>,
    /// Human description.
    pub description: Option<String>,
    /// Instrument kind.
    pub kind: InstrumentKind,
}

/// Number kind of an instrument: every measurement it takes is either a
/// signed 64-bit integer or a double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberKind {
    /// Signed 64-bit integer measurements.
    I64,
    /// Double measurements.
    F64,
}

/// A recorded numeric value, preserving the instrument's number kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    /// Signed 64-bit integer measurement.
    I64(i64),
    /// Double measurement.
    F64(f64),
}

impl Number {
    /// Lossy promotion to double.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::I64(v) => *v as f64,
            Number::F64(v) => *v,
        }
    }

    /// True for values below zero.
    pub fn is_negative(&self) -> bool {
        match self {
            Number::I64(v) => *v < 0,
            Number::F64(v) => *v < 0.0,
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::I64(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::F64(v)
    }
}

/// A sampled raw measurement retained for diagnostic linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemplar {
    /// The raw measurement.
    pub value: f64,
    /// When it was recorded.
    pub timestamp: SystemTime,
    /// Attributes recorded with the measurement.
    pub filtered_attributes: AttributeSet,
    /// Trace active at record time.
    pub trace_id: Option<TraceId>,
    /// Span active at record time.
    pub span_id: Option<SpanId>,
}

/// One sum data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumPoint {
    /// Series attributes.
    pub attributes: AttributeSet,
    /// Aggregated value.
    pub value: Number,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar>,
}

/// One gauge data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaugePoint {
    /// Series attributes.
    pub attributes: AttributeSet,
    /// Last observed value.
    pub value: Number,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar>,
}

/// One explicit-bucket histogram data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramPoint {
    /// Series attributes.
    pub attributes: AttributeSet,
    /// Number of recorded values.
    pub count: u64,
    /// Arithmetic sum of recorded values.
    pub sum: f64,
    /// Smallest recorded value, when min/max recording is enabled.
    pub min: Option<f64>,
    /// Largest recorded value, when min/max recording is enabled.
    pub max: Option<f64>,
    /// Upper-inclusive bucket boundaries.
    pub boundaries: Vec<f64>,
    /// Per-bucket counts; `boundaries.len() + 1` entries, or empty when
    /// no boundaries are configured.
    pub bucket_counts: Vec<u64>,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar>,
}

/// One contiguous run of base-2 exponential buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExponentialBuckets {
    /// Index of the first bucket in `counts`.
    pub offset: i32,
    /// Consecutive bucket counts starting at `offset`.
    pub counts: Vec<u64>,
}

/// One base-2 exponential histogram data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialHistogramPoint {
    /// Series attributes.
    pub attributes: AttributeSet,
    /// Resolution: bucket boundaries grow by `2^(2^-scale)`.
    pub scale: i32,
    /// Values with magnitude below the zero threshold.
    pub zero_count: u64,
    /// Number of recorded values.
    pub count: u64,
    /// Arithmetic sum of recorded values.
    pub sum: f64,
    /// Smallest recorded value, when min/max recording is enabled.
    pub min: Option<f64>,
    /// Largest recorded value, when min/max recording is enabled.
    pub max: Option<f64>,
    /// Buckets for positive magnitudes.
    pub positive: ExponentialBuckets,
    /// Buckets for negative magnitudes.
    pub negative: ExponentialBuckets,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar>,
}

/// Aggregated points of one instrument stream, by aggregation shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricPoints {
    /// Sum aggregation.
    Sum {
        /// True when the sum only ever grows.
        monotonic: bool,
        /// Per-series points.
        points: Vec<SumPoint>,
    },
    /// Last-value aggregation.
    Gauge {
        /// Per-series points.
        points: Vec<GaugePoint>,
    },
    /// Explicit-bucket histogram aggregation.
    Histogram {
        /// Per-series points.
        points: Vec<HistogramPoint>,
    },
    /// Base-2 exponential histogram aggregation.
    ExponentialHistogram {
        /// Per-series points.
        points: Vec<ExponentialHistogramPoint>,
    },
}

impl MetricPoints {
    /// Number of series in this snapshot.
    pub fn len(&self) -> usize {
        match self {
            MetricPoints::Sum { points, .. } => points.len(),
            MetricPoints::Gauge { points } => points.len(),
            MetricPoints::Histogram { points } => points.len(),
            MetricPoints::ExponentialHistogram { points } => points.len(),
        }
    }

    /// True when no series were collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One instrument's collected snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricData {
    /// Instrument identity (post-view renames applied).
    pub identity: InstrumentIdentity,
    /// Reporting temporality of the points.
    pub temporality: Temporality,
    /// Start of the aggregation window.
    pub start_time: SystemTime,
    /// End of the aggregation window.
    pub time: SystemTime,
    /// The aggregated points.
    pub points: MetricPoints,
}
