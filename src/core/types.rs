//! Shared domain types for the trace and log signals.

use crate::attributes::AttributeSet;
use crate::core::error::{KerroError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Unique identifier for a trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

/// Unique identifier for a span within a trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(String);

impl TraceId {
    /// Creates a new TraceId after validation
    pub fn new(id: String) -> Result<Self> {
        if id.is_empty() {
            return Err(KerroError::invalid_attribute("TraceId cannot be empty"));
        }
        // OTEL trace IDs are 16 bytes = 32 hex characters
        if id.len() > 32 {
            return Err(KerroError::invalid_attribute(format!(
                "TraceId cannot exceed 32 characters, got {}",
                id.len()
            )));
        }
        Ok(TraceId(id))
    }

    /// Generates a random, non-zero trace ID.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let hi: u64 = rng.gen();
        let lo: u64 = loop {
            let candidate: u64 = rng.gen();
            if candidate != 0 {
                break candidate;
            }
        };
        TraceId(format!("{:016x}{:016x}", hi, lo))
    }

    /// Returns the string representation of the trace ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns false for the all-zero invalid ID.
    pub fn is_valid(&self) -> bool {
        self.0.bytes().any(|b| b != b'0')
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SpanId {
    /// Creates a new SpanId after validation
    pub fn new(id: String) -> Result<Self> {
        if id.is_empty() {
            return Err(KerroError::invalid_attribute("SpanId cannot be empty"));
        }
        // OTEL span IDs are 8 bytes = 16 hex characters
        if id.len() > 16 {
            return Err(KerroError::invalid_attribute(format!(
                "SpanId cannot exceed 16 characters, got {}",
                id.len()
            )));
        }
        Ok(SpanId(id))
    }

    /// Generates a random, non-zero span ID.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id: u64 = loop {
            let candidate: u64 = rng.gen();
            if candidate != 0 {
                break candidate;
            }
        };
        SpanId(format!("{:016x}", id))
    }

    /// Returns the string representation of the span ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns false for the all-zero invalid ID.
    pub fn is_valid(&self) -> bool {
        self.0.bytes().any(|b| b != b'0')
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-span flags carried alongside the IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// The sampled bit.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Creates flags from the raw byte.
    pub fn new(bits: u8) -> Self {
        TraceFlags(bits)
    }

    /// Returns true if the sampled bit is set.
    pub fn is_sampled(&self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Returns the flags with the sampled bit set or cleared.
    pub fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | 0x01)
        } else {
            TraceFlags(self.0 & !0x01)
        }
    }

    /// Raw byte value.
    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Vendor-specific key/value pairs carried with the trace.
///
/// Immutable: `insert` produces a new value, leaving prior snapshots
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a new trace state with the entry prepended, replacing any
    /// existing entry for the key.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> TraceState {
        let key = key.into();
        let mut entries: Vec<(String, String)> =
            self.0.iter().filter(|(k, _)| *k != key).cloned().collect();
        entries.insert(0, (key, value.into()));
        TraceState(entries)
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The identifying part of a span, propagated across process boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// The span itself.
    pub span_id: SpanId,
    /// Sampling and vendor flags.
    pub trace_flags: TraceFlags,
    /// True when extracted from a remote carrier.
    pub is_remote: bool,
    /// Vendor trace state.
    pub trace_state: TraceState,
}

impl SpanContext {
    /// Creates a local span context.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            trace_flags,
            is_remote: false,
            trace_state: TraceState::default(),
        }
    }

    /// Both IDs are structurally valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Returns true if the sampled flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }
}

/// Relationship of a span to its surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpanKind {
    /// Internal operation.
    #[default]
    Internal,
    /// Handles an inbound request.
    Server,
    /// Issues an outbound request.
    Client,
    /// Publishes to a broker.
    Producer,
    /// Consumes from a broker.
    Consumer,
}

/// Status of a span execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum SpanStatus {
    /// No status has been set.
    #[default]
    Unset,
    /// Span completed successfully
    Ok,
    /// Span completed with an error
    Error(String),
}

impl SpanStatus {
    /// Returns true if the span status indicates an error
    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error(_))
    }

    /// Returns true if the span completed successfully
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanStatus::Ok)
    }

    /// Returns the error message if this is an error status
    pub fn error_message(&self) -> Option<&str> {
        match self {
            SpanStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// Event attributes.
    pub attributes: AttributeSet,
}

/// The library that produced a signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentationScope {
    /// Scope name, typically the instrumented crate.
    pub name: String,
    /// Scope version.
    pub version: Option<String>,
}

impl InstrumentationScope {
    /// Creates a scope with no version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }
}

/// An immutable, finished span as handed to processors and exporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanData {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's ID.
    pub span_id: SpanId,
    /// Parent span ID if this is a child span.
    pub parent_span_id: Option<SpanId>,
    /// Operation name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// When the span started.
    pub start_time: SystemTime,
    /// When the span ended.
    pub end_time: SystemTime,
    /// Final status.
    pub status: SpanStatus,
    /// Span attributes.
    pub attributes: AttributeSet,
    /// Timestamped events.
    pub events: Vec<SpanEvent>,
    /// Producing scope.
    pub scope: InstrumentationScope,
}

impl SpanData {
    /// Span duration; zero if the clock went backwards.
    pub fn duration(&self) -> std::time::Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Fine-grained debugging.
    Trace,
    /// Debugging.
    Debug,
    /// Routine information.
    Info,
    /// Unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
    /// An unrecoverable failure.
    Fatal,
}

impl Severity {
    /// Numeric severity per the OTEL log data model.
    pub fn number(&self) -> u8 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
            Severity::Fatal => 21,
        }
    }

    /// Canonical short text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_validation() {
        assert!(TraceId::new("4bf92f3577b34da6a3ce929d0e0e4736".to_string()).is_ok());
        assert!(TraceId::new("".to_string()).is_err());
        assert!(TraceId::new("a".repeat(33)).is_err());
    }

    #[test]
    fn test_generated_ids_are_valid() {
        let trace_id = TraceId::generate();
        assert_eq!(trace_id.as_str().len(), 32);
        assert!(trace_id.is_valid());

        let span_id = SpanId::generate();
        assert_eq!(span_id.as_str().len(), 16);
        assert!(span_id.is_valid());
    }

    #[test]
    fn test_zero_ids_are_invalid() {
        let trace_id = TraceId::new("0".repeat(32)).unwrap();
        assert!(!trace_id.is_valid());
    }

    #[test]
    fn test_trace_flags_sampled() {
        let flags = TraceFlags::default();
        assert!(!flags.is_sampled());
        assert!(flags.with_sampled(true).is_sampled());
        assert!(!flags.with_sampled(true).with_sampled(false).is_sampled());
    }

    #[test]
    fn test_trace_state_immutability() {
        let state = TraceState::default();
        let updated = state.insert("vendor", "a=1");
        assert!(state.get("vendor").is_none());
        assert_eq!(updated.get("vendor"), Some("a=1"));

        let replaced = updated.insert("vendor", "a=2");
        assert_eq!(updated.get("vendor"), Some("a=1"));
        assert_eq!(replaced.get("vendor"), Some("a=2"));
        assert_eq!(replaced.len(), 1);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!(Severity::Info.number(), 9);
        assert_eq!(Severity::Warn.as_str(), "WARN");
    }
}
