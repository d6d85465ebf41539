//! Metric pipeline orchestration.
//!
//! The [`MeterProvider`] owns every instrument stream, the registered
//! observable callbacks and the collection cadence. Collection is
//! single-threaded by construction: the periodic worker and on-demand
//! [`MeterProvider::collect`] both serialize on one lock.

use crate::core::config::{MetricsConfig, TemporalityPreference};
use crate::core::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::core::{KerroError, Result};
use crate::export::Batch;
use crate::metrics::data::{
    InstrumentIdentity, InstrumentKind, MetricData, NumberKind, Temporality,
};
use crate::metrics::instruments::Meter;
use crate::metrics::stream::InstrumentStream;
use crate::metrics::view::View;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Deadline applied around every exporter call made by the pipeline.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Takes collected metric batches and delivers them somewhere.
#[async_trait]
pub trait MetricExporter: Send + Sync {
    /// Delivers one non-empty batch.
    async fn export(&self, batch: Batch<MetricData>, deadline: Duration) -> Result<()>;

    /// Flushes exporter-internal buffering.
    async fn force_flush(&self, _deadline: Duration) -> bool {
        true
    }

    /// Releases exporter resources. No further calls follow.
    async fn shutdown(&self, _deadline: Duration) -> bool {
        true
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct PipelineInner {
    config: MetricsConfig,
    views: Vec<View>,
    streams: RwLock<Vec<Arc<InstrumentStream>>>,
    callbacks: RwLock<Vec<Callback>>,
    registry: Mutex<HashMap<String, InstrumentIdentity>>,
    diagnostics: Arc<Diagnostics>,
    shutdown: AtomicBool,
    collect_lock: Mutex<()>,
}

impl PipelineInner {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Registers an instrument and returns its streams, one per matching
    /// view (or one default stream). A case-insensitive name collision
    /// with a different identity is a warning, never an error.
    pub(crate) fn register_instrument(
        &self,
        identity: InstrumentIdentity,
        number: NumberKind,
    ) -> Arc<Vec<Arc<InstrumentStream>>> {
        {
            let mut registry = self.registry.lock();
            match registry.get(&identity.name.to_lowercase()) {
                Some(existing) if existing != &identity => {
                    tracing::warn!(
                        instrument = %identity.name,
                        "duplicate instrument registration with conflicting identity"
                    );
                }
                Some(_) => {}
                None => {
                    registry.insert(identity.name.to_lowercase(), identity.clone());
                }
            }
        }

        let temporality =
            resolve_temporality(self.config.temporality_preference, identity.kind);
        let matching: Vec<&View> = self
            .views
            .iter()
            .filter(|view| view.matches(&identity.name))
            .collect();

        let streams: Vec<Arc<InstrumentStream>> = if matching.is_empty() {
            vec![Arc::new(InstrumentStream::new(
                identity,
                number,
                None,
                &self.config,
                temporality,
                Arc::clone(&self.diagnostics),
            ))]
        } else {
            matching
                .into_iter()
                .map(|view| {
                    Arc::new(InstrumentStream::new(
                        identity.clone(),
                        number,
                        Some(view),
                        &self.config,
                        temporality,
                        Arc::clone(&self.diagnostics),
                    ))
                })
                .collect()
        };

        self.streams.write().extend(streams.iter().cloned());
        Arc::new(streams)
    }

    pub(crate) fn register_callback(&self, callback: Callback) {
        self.callbacks.write().push(callback);
    }

    /// Runs one collection: observable callbacks first, then a snapshot
    /// of every stream.
    pub(crate) fn collect_now(&self) -> Vec<MetricData> {
        let _collector = self.collect_lock.lock();
        let callbacks: Vec<Callback> = self.callbacks.read().clone();
        for callback in &callbacks {
            callback();
        }
        let streams: Vec<Arc<InstrumentStream>> = self.streams.read().clone();
        streams.iter().filter_map(|stream| stream.collect()).collect()
    }
}

fn resolve_temporality(
    preference: TemporalityPreference,
    kind: InstrumentKind,
) -> Temporality {
    match preference {
        TemporalityPreference::Cumulative => Temporality::Cumulative,
        TemporalityPreference::Delta => match kind {
            InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
                Temporality::Cumulative
            }
            _ => Temporality::Delta,
        },
        TemporalityPreference::LowMemory => match kind {
            InstrumentKind::Counter | InstrumentKind::Histogram => Temporality::Delta,
            _ => Temporality::Cumulative,
        },
    }
}

enum Command {
    Flush(oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<bool>),
}

/// Owns the metric pipeline; hands out meters.
#[derive(Clone)]
pub struct MeterProvider {
    inner: Arc<PipelineInner>,
    ctrl: Option<mpsc::UnboundedSender<Command>>,
}

impl MeterProvider {
    /// Starts a builder.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder {
            config: MetricsConfig::default(),
            views: Vec::new(),
            exporter: None,
        }
    }

    /// Creates a meter for the named instrumentation scope.
    pub fn meter(&self, name: impl Into<String>) -> Meter {
        Meter::new(name.into(), None, Arc::clone(&self.inner))
    }

    /// Creates a meter with an explicit version.
    pub fn meter_with_version(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Meter {
        Meter::new(name.into(), Some(version.into()), Arc::clone(&self.inner))
    }

    /// Takes a read-only snapshot of every instrument stream, on demand.
    pub fn collect(&self) -> Result<Vec<MetricData>> {
        if self.inner.is_shutdown() {
            return Err(KerroError::ShuttingDown);
        }
        Ok(self.inner.collect_now())
    }

    /// Recording-path drop counters.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.inner.diagnostics.snapshot()
    }

    /// Collects and exports immediately, short-circuiting the next tick.
    /// Returns false on export failure or timeout expiry; in-flight
    /// exports are not interrupted.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let Some(ctrl) = &self.ctrl else {
            return true;
        };
        if self.inner.is_shutdown() {
            return true;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if ctrl.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        await_ack(ack_rx, timeout).await
    }

    /// Flushes once, then disables further updates: subsequent records
    /// become silent no-ops.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.inner.is_shutdown() {
            return true;
        }
        let Some(ctrl) = &self.ctrl else {
            self.inner.shutdown.store(true, Ordering::Release);
            return true;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if ctrl.send(Command::Shutdown(ack_tx)).is_err() {
            self.inner.shutdown.store(true, Ordering::Release);
            return true;
        }
        await_ack(ack_rx, timeout).await
    }
}

async fn await_ack(ack: oneshot::Receiver<bool>, timeout: Option<Duration>) -> bool {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, ack).await {
            Ok(result) => result.unwrap_or(false),
            Err(_) => false,
        },
        None => ack.await.unwrap_or(false),
    }
}

/// Builder for [`MeterProvider`].
pub struct MeterProviderBuilder {
    config: MetricsConfig,
    views: Vec<View>,
    exporter: Option<Box<dyn MetricExporter>>,
}

impl MeterProviderBuilder {
    /// Replaces the metric configuration.
    pub fn with_config(mut self, config: MetricsConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a view.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Attaches an exporter and enables the periodic collection worker.
    /// Without an exporter the provider is pull-only via
    /// [`MeterProvider::collect`].
    pub fn with_exporter(mut self, exporter: Box<dyn MetricExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Validates the configuration and builds the provider. When an
    /// exporter is attached this spawns the worker task and must be
    /// called within a Tokio runtime.
    pub fn build(self) -> Result<MeterProvider> {
        self.config.validate()?;
        let inner = Arc::new(PipelineInner {
            config: self.config,
            views: self.views,
            streams: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            registry: Mutex::new(HashMap::new()),
            diagnostics: Arc::new(Diagnostics::new()),
            shutdown: AtomicBool::new(false),
            collect_lock: Mutex::new(()),
        });

        let ctrl = self.exporter.map(|exporter| {
            let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
            tokio::spawn(run_worker(Arc::clone(&inner), exporter, ctrl_rx));
            ctrl_tx
        });

        Ok(MeterProvider { inner, ctrl })
    }
}

async fn run_worker(
    inner: Arc<PipelineInner>,
    exporter: Box<dyn MetricExporter>,
    mut ctrl: mpsc::UnboundedReceiver<Command>,
) {
    let interval = inner.config.collect_interval;
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                export_once(&inner, exporter.as_ref()).await;
            }
            cmd = ctrl.recv() => match cmd {
                Some(Command::Flush(ack)) => {
                    let mut ok = export_once(&inner, exporter.as_ref()).await;
                    ok &= exporter.force_flush(EXPORT_TIMEOUT).await;
                    let _ = ack.send(ok);
                }
                Some(Command::Shutdown(ack)) => {
                    let mut ok = export_once(&inner, exporter.as_ref()).await;
                    inner.shutdown.store(true, Ordering::Release);
                    ok &= exporter.shutdown(EXPORT_TIMEOUT).await;
                    let _ = ack.send(ok);
                    break;
                }
                None => break,
            },
        }
    }
}

async fn export_once(inner: &PipelineInner, exporter: &dyn MetricExporter) -> bool {
    let metrics = inner.collect_now();
    if metrics.is_empty() {
        return true;
    }
    match tokio::time::timeout(
        EXPORT_TIMEOUT,
        exporter.export(Batch::new(metrics), EXPORT_TIMEOUT),
    )
    .await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "metric export failed");
            false
        }
        Err(_) => {
            tracing::warn!("metric export timed out");
            false
        }
    }
}
