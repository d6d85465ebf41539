//! Metric aggregation engine.
//!
//! The hot path is lock-light and bounded: every measurement resolves its
//! attribute set to one aggregation cell inside a preallocated slab, with
//! a hard cardinality cap and an overflow series for everything beyond
//! it. Collection snapshots every live cell, converts temporality, and
//! hands immutable batches to the exporter.
//!
//! - `store`: the cardinality-bounded attribute-set → cell mapping
//! - `point`: one aggregation cell with its concurrency protocol
//! - `kernels`, `histogram`, `exponential`: per-aggregation update logic
//! - `stream`, `view`: instrument identity and view resolution
//! - `pipeline`, `instruments`: provider, meters, periodic collection

pub mod data;
pub mod exemplar;
pub mod instruments;
pub mod pipeline;
pub mod view;

mod exponential;
mod histogram;
mod kernels;
mod point;
mod store;
mod stream;

pub use data::{
    Exemplar, ExponentialBuckets, ExponentialHistogramPoint, GaugePoint, HistogramPoint,
    InstrumentIdentity, InstrumentKind, MetricData, MetricPoints, Number, NumberKind, SumPoint,
    Temporality,
};
pub use exemplar::{
    AlignedHistogramReservoir, ExemplarMeasurement, ExemplarReservoir, SimpleFixedSizeReservoir,
};
pub use instruments::{
    Counter, Gauge, Histogram, MeasurementSink, MeasurementValue, Meter, ObservableInstrument,
    Observer, UpDownCounter,
};
pub use pipeline::{MeterProvider, MeterProviderBuilder, MetricExporter};
pub use view::{Aggregation, ExemplarSampling, View};
