//! Configuration for the telemetry pipelines.
//!
//! All knobs carry sensible defaults and can be deserialized from any serde
//! source. `validate()` must pass before a configuration is handed to a
//! provider builder.

use crate::core::{KerroError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reporting temporality preferred by an exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TemporalityPreference {
    /// Running totals since the start of the stream.
    #[default]
    Cumulative,
    /// Per-interval differences.
    Delta,
    /// Delta for high-volume streams, cumulative where delta would
    /// misrepresent the value (up-down counters).
    LowMemory,
}

/// Complete configuration for an SDK instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Metric aggregation configuration.
    pub metrics: MetricsConfig,
    /// Span batch-export configuration.
    pub spans: ProcessorConfig,
    /// Log batch-export configuration.
    pub logs: ProcessorConfig,
}

impl TelemetryConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.metrics.validate()?;
        self.spans.validate()?;
        self.logs.validate()?;
        Ok(())
    }
}

/// Metric aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Maximum number of distinct attribute sets tracked per instrument
    /// stream before measurements are routed to the overflow series.
    pub cardinality_limit: usize,
    /// Whether excess-cardinality measurements land on a dedicated series
    /// tagged `otel.metric.overflow=true` instead of being dropped.
    pub emit_overflow_attribute: bool,
    /// Return idle series slots to a free list under delta temporality.
    pub reclaim_unused_metric_points: bool,
    /// Temporality requested from aggregation at collect time.
    pub temporality_preference: TemporalityPreference,
    /// Default explicit-bucket histogram boundaries.
    pub default_histogram_boundaries: Vec<f64>,
    /// Starting scale for base-2 exponential histograms.
    pub max_scale: i32,
    /// Maximum number of active buckets per side of a base-2 exponential
    /// histogram.
    pub max_size: usize,
    /// Interval between periodic collections.
    #[serde(with = "humantime_serde")]
    pub collect_interval: Duration,
}

/// Default explicit-bucket histogram boundaries.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: &[f64] = &[
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cardinality_limit: 2000,
            emit_overflow_attribute: true,
            reclaim_unused_metric_points: false,
            temporality_preference: TemporalityPreference::Cumulative,
            default_histogram_boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
            max_scale: 20,
            max_size: 160,
            collect_interval: Duration::from_secs(60),
        }
    }
}

impl MetricsConfig {
    /// Validates limits and histogram parameters.
    pub fn validate(&self) -> Result<()> {
        if self.cardinality_limit < 1 {
            return Err(KerroError::config("cardinality_limit must be at least 1"));
        }
        if !(-10..=20).contains(&self.max_scale) {
            return Err(KerroError::config(format!(
                "max_scale must be within -10..=20, got {}",
                self.max_scale
            )));
        }
        if self.max_size < 2 {
            return Err(KerroError::config("max_size must be at least 2"));
        }
        if self.collect_interval.is_zero() {
            return Err(KerroError::config("collect_interval must be non-zero"));
        }
        validate_boundaries(&self.default_histogram_boundaries)?;
        Ok(())
    }
}

/// Checks that histogram boundaries are finite and strictly increasing.
pub fn validate_boundaries(boundaries: &[f64]) -> Result<()> {
    for pair in boundaries.windows(2) {
        if pair[0] >= pair[1] {
            return Err(KerroError::config(
                "histogram boundaries must be strictly increasing",
            ));
        }
    }
    if boundaries.iter().any(|b| !b.is_finite()) {
        return Err(KerroError::config("histogram boundaries must be finite"));
    }
    Ok(())
}

/// Batch export processor configuration, shared by the span and log
/// pipelines. One instance per signal; there is no signal-generic form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Bounded queue capacity; a full queue drops the incoming item.
    pub max_queue_size: usize,
    /// Interval between scheduled exports.
    #[serde(with = "humantime_serde")]
    pub scheduled_delay: Duration,
    /// Maximum number of items handed to the exporter in one batch.
    pub max_export_batch_size: usize,
    /// Deadline applied to each exporter call.
    #[serde(with = "humantime_serde")]
    pub exporter_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            scheduled_delay: Duration::from_millis(5000),
            max_export_batch_size: 512,
            exporter_timeout: Duration::from_millis(30000),
        }
    }
}

impl ProcessorConfig {
    /// Validates queue and batch sizing.
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            return Err(KerroError::config("max_queue_size must be at least 1"));
        }
        if self.max_export_batch_size == 0 {
            return Err(KerroError::config(
                "max_export_batch_size must be at least 1",
            ));
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(KerroError::config(
                "max_export_batch_size cannot exceed max_queue_size",
            ));
        }
        if self.scheduled_delay.is_zero() {
            return Err(KerroError::config("scheduled_delay must be non-zero"));
        }
        Ok(())
    }
}
