//! Log record emission.
//!
//! A [`Logger`] hands typed [`LogRecord`]s to its processors; the heavy
//! lifting (queueing, batching, export) happens behind the
//! [`LogProcessor`](crate::export::LogProcessor) boundary.

use crate::attributes::{AttributeSet, AttributeValue};
use crate::context::Context;
use crate::core::types::{InstrumentationScope, Severity, SpanContext};
use crate::export::LogProcessor;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// One structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the logged event occurred, if the caller knows.
    pub timestamp: Option<SystemTime>,
    /// When the SDK observed the record.
    pub observed_timestamp: SystemTime,
    /// Severity, if any.
    pub severity: Option<Severity>,
    /// The record body.
    pub body: Option<AttributeValue>,
    /// Record attributes.
    pub attributes: AttributeSet,
    /// Trace active when the record was emitted.
    pub trace_context: Option<SpanContext>,
}

impl LogRecord {
    /// Starts building a record.
    pub fn builder() -> LogRecordBuilder {
        LogRecordBuilder::default()
    }
}

/// Builder for [`LogRecord`].
#[derive(Debug, Default)]
pub struct LogRecordBuilder {
    timestamp: Option<SystemTime>,
    severity: Option<Severity>,
    body: Option<AttributeValue>,
    attributes: Option<AttributeSet>,
    trace_context: Option<SpanContext>,
}

impl LogRecordBuilder {
    /// Sets the event timestamp.
    pub fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<AttributeValue>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the attributes.
    pub fn attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Pins an explicit trace context instead of capturing the ambient
    /// one at emit time.
    pub fn trace_context(mut self, trace_context: SpanContext) -> Self {
        self.trace_context = Some(trace_context);
        self
    }

    /// Finishes the record.
    pub fn build(self) -> LogRecord {
        LogRecord {
            timestamp: self.timestamp,
            observed_timestamp: SystemTime::now(),
            severity: self.severity,
            body: self.body,
            attributes: self.attributes.unwrap_or_default(),
            trace_context: self.trace_context,
        }
    }
}

struct LoggerShared {
    processors: Vec<Box<dyn LogProcessor>>,
    shutdown: AtomicBool,
}

/// Owns log processors; hands out loggers.
#[derive(Clone)]
pub struct LoggerProvider {
    shared: Arc<LoggerShared>,
}

impl LoggerProvider {
    /// Starts a builder.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder {
            processors: Vec::new(),
        }
    }

    /// Creates a logger for the named instrumentation scope.
    pub fn logger(&self, name: impl Into<String>) -> Logger {
        Logger {
            scope: InstrumentationScope::new(name),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Flushes every processor.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let mut ok = true;
        for processor in &self.shared.processors {
            ok &= processor.force_flush(timeout).await;
        }
        ok
    }

    /// Flushes and shuts every processor down; further emits are no-ops.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        let mut ok = true;
        for processor in &self.shared.processors {
            ok &= processor.shutdown(timeout).await;
        }
        ok
    }
}

/// Builder for [`LoggerProvider`].
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
}

impl LoggerProviderBuilder {
    /// Adds a log processor.
    pub fn with_processor(mut self, processor: Box<dyn LogProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Builds the provider.
    pub fn build(self) -> LoggerProvider {
        LoggerProvider {
            shared: Arc::new(LoggerShared {
                processors: self.processors,
                shutdown: AtomicBool::new(false),
            }),
        }
    }
}

/// Emits log records for one instrumentation scope.
#[derive(Clone)]
pub struct Logger {
    scope: InstrumentationScope,
    shared: Arc<LoggerShared>,
}

impl Logger {
    /// The scope this logger writes for.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Emits one record. When the record carries no trace context, the
    /// ambient one is captured here.
    pub fn emit(&self, mut record: LogRecord) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        if record.trace_context.is_none() {
            record.trace_context = Context::current().span_context().cloned();
        }
        for processor in &self.shared.processors {
            processor.on_emit(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{SpanId, TraceFlags, TraceId};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CaptureProcessor {
        records: Arc<Mutex<Vec<LogRecord>>>,
    }

    #[async_trait]
    impl LogProcessor for CaptureProcessor {
        fn on_emit(&self, record: LogRecord) {
            self.records.lock().push(record);
        }

        async fn force_flush(&self, _timeout: Option<Duration>) -> bool {
            true
        }

        async fn shutdown(&self, _timeout: Option<Duration>) -> bool {
            true
        }
    }

    fn provider_with_capture() -> (LoggerProvider, Arc<Mutex<Vec<LogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let provider = LoggerProvider::builder()
            .with_processor(Box::new(CaptureProcessor {
                records: Arc::clone(&records),
            }))
            .build();
        (provider, records)
    }

    #[test]
    fn test_emit_reaches_processor() {
        let (provider, records) = provider_with_capture();
        let logger = provider.logger("test");
        logger.emit(
            LogRecord::builder()
                .severity(Severity::Info)
                .body("server started")
                .build(),
        );

        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Some(Severity::Info));
        assert_eq!(records[0].body, Some(AttributeValue::from("server started")));
    }

    #[test]
    fn test_emit_captures_ambient_trace_context() {
        let (provider, records) = provider_with_capture();
        let logger = provider.logger("test");
        let span_context = SpanContext::new(
            TraceId::generate(),
            SpanId::generate(),
            TraceFlags::default().with_sampled(true),
        );
        {
            let _guard = Context::new()
                .with_span_context(span_context.clone())
                .attach();
            logger.emit(LogRecord::builder().body("inside span").build());
        }
        logger.emit(LogRecord::builder().body("outside span").build());

        let records = records.lock();
        assert_eq!(records[0].trace_context.as_ref(), Some(&span_context));
        assert!(records[1].trace_context.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_emission() {
        let (provider, records) = provider_with_capture();
        let logger = provider.logger("test");
        assert!(provider.shutdown(None).await);
        logger.emit(LogRecord::builder().body("late").build());
        assert!(records.lock().is_empty());
    }
}
