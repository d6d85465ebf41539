//! Shared test doubles: capture exporters for each signal.

#![allow(dead_code)]

use async_trait::async_trait;
use kerro::core::{KerroError, Result, SpanData};
use kerro::export::{Batch, Exporter};
use kerro::logs::LogRecord;
use kerro::metrics::{MetricData, MetricExporter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Span exporter that appends every batch to a shared vector.
#[derive(Debug, Default, Clone)]
pub struct CaptureSpanExporter {
    batches: Arc<Mutex<Vec<Vec<SpanData>>>>,
}

impl CaptureSpanExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<SpanData>> {
        self.batches.lock().clone()
    }

    pub fn span_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl Exporter<SpanData> for CaptureSpanExporter {
    async fn export(&self, batch: Batch<SpanData>, _deadline: Duration) -> Result<()> {
        self.batches.lock().push(batch.into_vec());
        Ok(())
    }
}

/// Log exporter that appends every batch to a shared vector.
#[derive(Debug, Default, Clone)]
pub struct CaptureLogExporter {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
}

impl CaptureLogExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl Exporter<LogRecord> for CaptureLogExporter {
    async fn export(&self, batch: Batch<LogRecord>, _deadline: Duration) -> Result<()> {
        self.batches.lock().push(batch.into_vec());
        Ok(())
    }
}

/// Metric exporter that appends every batch to a shared vector.
#[derive(Debug, Default, Clone)]
pub struct CaptureMetricExporter {
    batches: Arc<Mutex<Vec<Vec<MetricData>>>>,
}

impl CaptureMetricExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<MetricData>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl MetricExporter for CaptureMetricExporter {
    async fn export(&self, batch: Batch<MetricData>, _deadline: Duration) -> Result<()> {
        self.batches.lock().push(batch.into_vec());
        Ok(())
    }
}

/// Span exporter that always fails, for failure-path tests.
#[derive(Debug, Default, Clone)]
pub struct FailingSpanExporter;

#[async_trait]
impl Exporter<SpanData> for FailingSpanExporter {
    async fn export(&self, _batch: Batch<SpanData>, _deadline: Duration) -> Result<()> {
        Err(KerroError::export("failing test exporter"))
    }
}
