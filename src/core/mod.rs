//! Domain types, configuration, errors and self-diagnostics shared by all
//! three signals.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod types;

pub use config::{
    MetricsConfig, ProcessorConfig, TelemetryConfig, TemporalityPreference,
    DEFAULT_HISTOGRAM_BOUNDARIES,
};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot, DropKind};
pub use error::{KerroError, Result};
pub use types::{
    InstrumentationScope, Severity, SpanContext, SpanData, SpanEvent, SpanId, SpanKind, SpanStatus,
    TraceFlags, TraceId, TraceState,
};
