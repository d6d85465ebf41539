//! Processor boundaries for finished spans and log records.

use crate::context::Context;
use crate::core::types::{SpanContext, SpanData};
use crate::export::batch::BatchExportProcessor;
use crate::logs::LogRecord;
use async_trait::async_trait;
use std::time::Duration;

/// Receives spans as they start and finish.
#[async_trait]
pub trait SpanProcessor: Send + Sync {
    /// Called when a recording span starts.
    fn on_start(&self, _span: &SpanContext, _parent: &Context) {}

    /// Called with the finished, immutable span.
    fn on_end(&self, span: SpanData);

    /// Flushes queued spans through to the exporter.
    async fn force_flush(&self, timeout: Option<Duration>) -> bool;

    /// Flushes and stops; `on_end` becomes a no-op afterwards.
    async fn shutdown(&self, timeout: Option<Duration>) -> bool;
}

#[async_trait]
impl SpanProcessor for BatchExportProcessor<SpanData> {
    fn on_end(&self, span: SpanData) {
        BatchExportProcessor::on_end(self, span);
    }

    async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        BatchExportProcessor::force_flush(self, timeout).await
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        BatchExportProcessor::shutdown(self, timeout).await
    }
}

/// Receives emitted log records.
#[async_trait]
pub trait LogProcessor: Send + Sync {
    /// Called with each emitted record.
    fn on_emit(&self, record: LogRecord);

    /// Flushes queued records through to the exporter.
    async fn force_flush(&self, timeout: Option<Duration>) -> bool;

    /// Flushes and stops; `on_emit` becomes a no-op afterwards.
    async fn shutdown(&self, timeout: Option<Duration>) -> bool;
}

#[async_trait]
impl LogProcessor for BatchExportProcessor<LogRecord> {
    fn on_emit(&self, record: LogRecord) {
        BatchExportProcessor::on_end(self, record);
    }

    async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        BatchExportProcessor::force_flush(self, timeout).await
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        BatchExportProcessor::shutdown(self, timeout).await
    }
}
