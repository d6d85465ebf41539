//! Batching export processor.
//!
//! Producers enqueue finished items onto a bounded queue and never block;
//! a dedicated worker drains FIFO into batches and drives the exporter.
//! Control messages (flush/shutdown sentinels) travel on a separate
//! unbounded channel so a saturated data queue cannot drop them.

use crate::core::config::ProcessorConfig;
use crate::export::{Batch, Exporter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Outcome of an export filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Hand the item to the exporter.
    Export,
    /// Drop the item without enqueuing it.
    Ignore,
}

/// Filter hook applied before enqueuing. A panicking filter fails open:
/// the item is exported.
pub type ExportFilter<T> = Box<dyn Fn(&T) -> FilterDecision + Send + Sync>;

/// Counters exposed by a processor.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    dropped: AtomicU64,
    filtered: AtomicU64,
    exported: AtomicU64,
    failed_batches: AtomicU64,
}

impl ProcessorStats {
    /// Items lost to a full queue or a failed export.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Items rejected by the filter hook.
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Items successfully handed to the exporter.
    pub fn exported(&self) -> u64 {
        self.exported.load(Ordering::Relaxed)
    }

    /// Batches the exporter failed or timed out on.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }
}

enum Control {
    /// Queue crossed half-full; export what is ready.
    Hint,
    Flush(oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<bool>),
}

/// Bounded-queue batching processor for spans and log records.
pub struct BatchExportProcessor<T: Send + 'static> {
    queue: mpsc::Sender<T>,
    ctrl: mpsc::UnboundedSender<Control>,
    queued: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ProcessorStats>,
    filter: Option<ExportFilter<T>>,
    filter_warned: AtomicBool,
    config: ProcessorConfig,
}

impl<T: Send + 'static> BatchExportProcessor<T> {
    /// Spawns the worker task. Must be called within a Tokio runtime.
    pub fn new(exporter: Box<dyn Exporter<T>>, config: ProcessorConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.max_queue_size);
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let stats = Arc::new(ProcessorStats::default());

        let worker = Worker {
            queue: queue_rx,
            ctrl: ctrl_rx,
            exporter,
            queued: Arc::clone(&queued),
            stats: Arc::clone(&stats),
            config: config.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            queue: queue_tx,
            ctrl: ctrl_tx,
            queued,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats,
            filter: None,
            filter_warned: AtomicBool::new(false),
            config,
        }
    }

    /// Installs an export filter. Applies to items enqueued afterwards.
    pub fn with_filter(mut self, filter: ExportFilter<T>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    /// Enqueues one finished item. Never blocks; a full queue drops the
    /// incoming item and counts it. A no-op after shutdown.
    pub fn on_end(&self, item: T) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Some(filter) = &self.filter {
            let decision = catch_unwind(AssertUnwindSafe(|| filter(&item))).unwrap_or_else(|_| {
                if !self.filter_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!("export filter panicked; failing open");
                }
                FilterDecision::Export
            });
            if decision == FilterDecision::Ignore {
                self.stats.filtered.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        match self.queue.try_send(item) {
            Ok(()) => {
                let depth = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
                if depth == self.config.max_queue_size / 2 {
                    let _ = self.ctrl.send(Control::Hint);
                }
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drains everything enqueued before this call and waits for the
    /// exporter to take it, up to `timeout` (`None` waits indefinitely).
    /// Idempotent; returns false on expiry or export failure.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return true;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.ctrl.send(Control::Flush(ack_tx)).is_err() {
            return false;
        }
        await_ack(ack_rx, timeout).await
    }

    /// Drains, exports, shuts the exporter down and closes the queue.
    /// Afterwards `on_end` is a no-op and the exporter is never invoked
    /// again.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.ctrl.send(Control::Shutdown(ack_tx)).is_err() {
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

struct Worker<T: Send + 'static> {
    queue: mpsc::Receiver<T>,
    ctrl: mpsc::UnboundedReceiver<Control>,
    exporter: Box<dyn Exporter<T>>,
    queued: Arc<AtomicUsize>,
    stats: Arc<ProcessorStats>,
    config: ProcessorConfig,
}

impl<T: Send + 'static> Worker<T> {
    async fn run(mut self) {
        let mut batch: Vec<T> = Vec::with_capacity(self.config.max_export_batch_size);
        let delay = self.config.scheduled_delay;
        let mut ticker = interval_at(Instant::now() + delay, delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                item = self.queue.recv() => match item {
                    Some(item) => {
                        self.queued.fetch_sub(1, Ordering::AcqRel);
                        batch.push(item);
                        if batch.len() >= self.config.max_export_batch_size {
                            self.export_batch(&mut batch).await;
                        }
                    }
                    None => {
                        self.drain(&mut batch).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.export_batch(&mut batch).await;
                    }
                },
                cmd = self.ctrl.recv() => match cmd {
                    Some(Control::Hint) => {
                        self.pull_ready(&mut batch);
                        if !batch.is_empty() {
                            self.export_batch(&mut batch).await;
                        }
                    }
                    Some(Control::Flush(ack)) => {
                        let mut ok = self.drain(&mut batch).await;
                        ok &= self
                            .exporter
                            .force_flush(self.config.exporter_timeout)
                            .await;
                        let _ = ack.send(ok);
                    }
                    Some(Control::Shutdown(ack)) => {
                        let mut ok = self.drain(&mut batch).await;
                        ok &= self.exporter.shutdown(self.config.exporter_timeout).await;
                        let _ = ack.send(ok);
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    /// Moves whatever is already queued into the local batch, up to the
    /// batch size.
    fn pull_ready(&mut self, batch: &mut Vec<T>) {
        while batch.len() < self.config.max_export_batch_size {
            match self.queue.try_recv() {
                Ok(item) => {
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    batch.push(item);
                }
                Err(_) => break,
            }
        }
    }

    /// Exports until the queue and the local batch are both empty.
    async fn drain(&mut self, batch: &mut Vec<T>) -> bool {
        let mut ok = true;
        loop {
            self.pull_ready(batch);
            if batch.is_empty() {
                return ok;
            }
            ok &= self.export_batch(batch).await;
        }
    }

    async fn export_batch(&mut self, batch: &mut Vec<T>) -> bool {
        if batch.is_empty() {
            return true;
        }
        let items = std::mem::replace(
            batch,
            Vec::with_capacity(self.config.max_export_batch_size),
        );
        let count = items.len() as u64;
        let deadline = self.config.exporter_timeout;
        match tokio::time::timeout(deadline, self.exporter.export(Batch::new(items), deadline))
            .await
        {
            Ok(Ok(())) => {
                self.stats.exported.fetch_add(count, Ordering::Relaxed);
                true
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, dropped = count, "export failed; batch discarded");
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                false
            }
            Err(_) => {
                tracing::warn!(dropped = count, "export timed out; batch discarded");
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                false
            }
        }
    }
}
