//! Kerro - in-process telemetry SDK core.
//!
//! Kerro collects, aggregates and emits the three telemetry signals
//! (traces, metrics, logs) from instrumented code to pluggable
//! exporters. The heart of the crate is a lock-light, bounded-cardinality
//! metric aggregation engine; around it sit batching export pipelines
//! and ambient context propagation.
//!
//! # Features
//!
//! - **Bounded aggregation**: hard cardinality cap per instrument stream
//!   with an overflow series, never unbounded memory
//! - **Lock-light hot path**: atomic sums and gauges, short adaptive
//!   locks only where histograms need multi-field consistency
//! - **Delta and cumulative**: temporality conversion at collect time,
//!   with optional reclamation of idle series
//! - **At-least-once handoff**: bounded queues, scheduled flush and
//!   graceful shutdown in front of every exporter
//! - **No wire formats**: encoders, transports and instrumentation
//!   adapters stay behind typed interfaces
//!
//! # Architecture
//!
//! - `metrics`: aggregation engine, meters, periodic collection
//! - `trace`: tracers, spans, sampling
//! - `logs`: log records and emission
//! - `export`: batches, exporter traits, batching processor
//! - `context`: ambient context, baggage, propagation boundaries
//! - `core`: domain types, config, errors, self-diagnostics
//!
//! # Example
//!
//! ```no_run
//! use kerro::attributes::AttributeSet;
//! use kerro::metrics::MeterProvider;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = MeterProvider::builder().build()?;
//!     let meter = provider.meter("app");
//!     let requests = meter.create_counter::<i64>("http.requests", Some("1"), None)?;
//!     requests.add(1, &AttributeSet::new([("route", "/health")])?);
//!
//!     let snapshot = provider.collect()?;
//!     println!("collected {} instruments", snapshot.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod attributes;
pub mod context;
pub mod core;
pub mod export;
pub mod logs;
pub mod metrics;
pub mod trace;

use crate::context::{NoopPropagator, TextMapPropagator};
use crate::core::{KerroError, Result};
use crate::logs::LoggerProvider;
use crate::metrics::MeterProvider;
use crate::trace::TracerProvider;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static GLOBAL: OnceLock<Sdk> = OnceLock::new();

/// The assembled SDK: providers for each signal plus the default
/// propagator. Nothing is initialized implicitly; build one explicitly
/// and, if a process-wide handle is wanted, [`install`](Sdk::install) it.
pub struct Sdk {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<MeterProvider>,
    logger_provider: Option<LoggerProvider>,
    propagator: Arc<dyn TextMapPropagator>,
}

impl Sdk {
    /// Starts a builder.
    pub fn builder() -> SdkBuilder {
        SdkBuilder {
            tracer_provider: None,
            meter_provider: None,
            logger_provider: None,
            propagator: None,
        }
    }

    /// The installed process-wide SDK, if any.
    pub fn global() -> Option<&'static Sdk> {
        GLOBAL.get()
    }

    /// Installs this SDK as the process-wide instance. Fails if one is
    /// already installed.
    pub fn install(self) -> Result<()> {
        GLOBAL
            .set(self)
            .map_err(|_| KerroError::config("an SDK is already installed"))
    }

    /// The trace provider, when configured.
    pub fn tracer_provider(&self) -> Option<&TracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// The meter provider, when configured.
    pub fn meter_provider(&self) -> Option<&MeterProvider> {
        self.meter_provider.as_ref()
    }

    /// The logger provider, when configured.
    pub fn logger_provider(&self) -> Option<&LoggerProvider> {
        self.logger_provider.as_ref()
    }

    /// The default text-map propagator.
    pub fn propagator(&self) -> &dyn TextMapPropagator {
        self.propagator.as_ref()
    }

    /// Flushes every configured provider.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let mut ok = true;
        if let Some(provider) = &self.tracer_provider {
            ok &= provider.force_flush(timeout).await;
        }
        if let Some(provider) = &self.meter_provider {
            ok &= provider.force_flush(timeout).await;
        }
        if let Some(provider) = &self.logger_provider {
            ok &= provider.force_flush(timeout).await;
        }
        ok
    }

    /// Shuts every configured provider down. Afterwards new telemetry is
    /// silently discarded.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        let mut ok = true;
        if let Some(provider) = &self.tracer_provider {
            ok &= provider.shutdown(timeout).await;
        }
        if let Some(provider) = &self.meter_provider {
            ok &= provider.shutdown(timeout).await;
        }
        if let Some(provider) = &self.logger_provider {
            ok &= provider.shutdown(timeout).await;
        }
        ok
    }
}

/// Builder for [`Sdk`].
pub struct SdkBuilder {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<MeterProvider>,
    logger_provider: Option<LoggerProvider>,
    propagator: Option<Arc<dyn TextMapPropagator>>,
}

impl SdkBuilder {
    /// Sets the trace provider.
    pub fn with_tracer_provider(mut self, provider: TracerProvider) -> Self {
        self.tracer_provider = Some(provider);
        self
    }

    /// Sets the meter provider.
    pub fn with_meter_provider(mut self, provider: MeterProvider) -> Self {
        self.meter_provider = Some(provider);
        self
    }

    /// Sets the logger provider.
    pub fn with_logger_provider(mut self, provider: LoggerProvider) -> Self {
        self.logger_provider = Some(provider);
        self
    }

    /// Sets the default propagator; defaults to a no-op.
    pub fn with_propagator(mut self, propagator: Arc<dyn TextMapPropagator>) -> Self {
        self.propagator = Some(propagator);
        self
    }

    /// Assembles the SDK.
    pub fn build(self) -> Sdk {
        Sdk {
            tracer_provider: self.tracer_provider,
            meter_provider: self.meter_provider,
            logger_provider: self.logger_provider,
            propagator: self
                .propagator
                .unwrap_or_else(|| Arc::new(NoopPropagator)),
        }
    }
}
