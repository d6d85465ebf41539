//! Span creation and sampling.
//!
//! A [`TracerProvider`] owns the span processors and the sampling policy;
//! [`Tracer`]s hand out recording [`Span`]s whose `end` assembles an
//! immutable [`SpanData`] and fans it out to every processor.

use crate::attributes::{AttributeSet, AttributeValue};
use crate::context::Context;
use crate::core::diagnostics::{Diagnostics, DiagnosticsSnapshot, DropKind};
use crate::core::types::{
    InstrumentationScope, SpanContext, SpanData, SpanEvent, SpanId, SpanKind, SpanStatus,
    TraceFlags, TraceId, TraceState,
};
use crate::core::{KerroError, Result};
use crate::export::SpanProcessor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Sampling verdict for a span about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Do not record; the span is a cheap pass-through.
    Drop,
    /// Record attributes and events, but do not export.
    RecordOnly,
    /// Record and export.
    RecordAndSample,
}

/// Decision plus any trace-state additions.
#[derive(Debug, Clone)]
pub struct SamplingResult {
    /// The verdict.
    pub decision: SamplingDecision,
    /// Replacement trace state, when the sampler adds entries.
    pub trace_state: Option<TraceState>,
}

impl SamplingResult {
    /// A plain verdict with no trace-state changes.
    pub fn decision(decision: SamplingDecision) -> Self {
        Self {
            decision,
            trace_state: None,
        }
    }
}

/// Pluggable sampling policy.
pub trait Sampler: Send + Sync {
    /// Decides the fate of a span before it is created.
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: &TraceId,
        name: &str,
        kind: SpanKind,
    ) -> SamplingResult;
}

/// Samples everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOn;

impl Sampler for AlwaysOn {
    fn should_sample(
        &self,
        _parent: Option<&SpanContext>,
        _trace_id: &TraceId,
        _name: &str,
        _kind: SpanKind,
    ) -> SamplingResult {
        SamplingResult::decision(SamplingDecision::RecordAndSample)
    }
}

/// Samples nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOff;

impl Sampler for AlwaysOff {
    fn should_sample(
        &self,
        _parent: Option<&SpanContext>,
        _trace_id: &TraceId,
        _name: &str,
        _kind: SpanKind,
    ) -> SamplingResult {
        SamplingResult::decision(SamplingDecision::Drop)
    }
}

/// Samples a deterministic fraction of traces keyed on the trace ID, so
/// every participant in a trace reaches the same verdict.
#[derive(Debug, Clone, Copy)]
pub struct TraceIdRatio {
    ratio: f64,
    threshold: u64,
}

impl TraceIdRatio {
    /// Creates the sampler; the ratio must lie in `0.0..=1.0`.
    pub fn new(ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) || ratio.is_nan() {
            return Err(KerroError::InvalidSamplingRate(ratio));
        }
        Ok(Self {
            ratio,
            threshold: (ratio * u64::MAX as f64) as u64,
        })
    }

    /// The configured ratio.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Sampler for TraceIdRatio {
    fn should_sample(
        &self,
        _parent: Option<&SpanContext>,
        trace_id: &TraceId,
        _name: &str,
        _kind: SpanKind,
    ) -> SamplingResult {
        let id = trace_id.as_str();
        let tail = &id[id.len().saturating_sub(16)..];
        let value = u64::from_str_radix(tail, 16).unwrap_or(0);
        let decision = if self.ratio >= 1.0 || value < self.threshold {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };
        SamplingResult::decision(decision)
    }
}

/// Follows the parent's sampled flag; defers to `root` for root spans.
pub struct ParentBased {
    root: Box<dyn Sampler>,
}

impl ParentBased {
    /// Wraps the sampler used for root spans.
    pub fn new(root: Box<dyn Sampler>) -> Self {
        Self { root }
    }
}

impl Sampler for ParentBased {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: &TraceId,
        name: &str,
        kind: SpanKind,
    ) -> SamplingResult {
        match parent {
            Some(parent) if parent.is_valid() => {
                let decision = if parent.is_sampled() {
                    SamplingDecision::RecordAndSample
                } else {
                    SamplingDecision::Drop
                };
                SamplingResult::decision(decision)
            }
            _ => self.root.should_sample(parent, trace_id, name, kind),
        }
    }
}

struct TracerShared {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Box<dyn Sampler>,
    diagnostics: Arc<Diagnostics>,
    shutdown: AtomicBool,
}

/// Owns span processors and sampling; hands out tracers.
#[derive(Clone)]
pub struct TracerProvider {
    shared: Arc<TracerShared>,
}

impl TracerProvider {
    /// Starts a builder.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder {
            processors: Vec::new(),
            sampler: None,
        }
    }

    /// Creates a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<String>) -> Tracer {
        Tracer {
            scope: InstrumentationScope::new(name),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Recording-path drop counters.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Flushes every processor. Returns false if any flush failed or the
    /// timeout expired.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let mut ok = true;
        for processor in &self.shared.processors {
            ok &= processor.force_flush(timeout).await;
        }
        ok
    }

    /// Flushes and shuts every processor down. Further spans end as
    /// no-ops.
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

/// Builder for [`TracerProvider`].
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Option<Box<dyn Sampler>>,
}

impl TracerProviderBuilder {
    /// Adds a span processor. Processors are notified in registration
    /// order.
    pub fn with_processor(mut self, processor: Box<dyn SpanProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Sets the sampling policy; defaults to [`AlwaysOn`].
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Builds the provider.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            shared: Arc::new(TracerShared {
                processors: self.processors,
                sampler: self.sampler.unwrap_or_else(|| Box::new(AlwaysOn)),
                diagnostics: Arc::new(Diagnostics::new()),
                shutdown: AtomicBool::new(false),
            }),
        }
    }
}

/// Creates spans for one instrumentation scope.
#[derive(Clone)]
pub struct Tracer {
    scope: InstrumentationScope,
    shared: Arc<TracerShared>,
}

impl Tracer {
    /// Starts a span parented to the current context.
    pub fn start_span(&self, name: impl Into<String>, kind: SpanKind) -> Span {
        self.span_builder(name).with_kind(kind).start()
    }

    /// Starts building a span.
    pub fn span_builder(&self, name: impl Into<String>) -> SpanBuilder<'_> {
        SpanBuilder {
            tracer: self,
            name: name.into(),
            kind: SpanKind::Internal,
            parent: None,
            attributes: Vec::new(),
        }
    }
}

/// Configures and starts a span.
pub struct SpanBuilder<'a> {
    tracer: &'a Tracer,
    name: String,
    kind: SpanKind,
    parent: Option<Context>,
    attributes: Vec<(String, AttributeValue)>,
}

impl SpanBuilder<'_> {
    /// Sets the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Parents the span to an explicit context instead of the current
    /// one.
    pub fn with_parent(mut self, parent: Context) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an initial attribute. An empty key drops the attribute and
    /// increments the invalid-attribute counter.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        let key = key.into();
        if key.is_empty() {
            self.tracer.shared.diagnostics.note(DropKind::InvalidAttribute);
            return self;
        }
        self.attributes.push((key, value.into()));
        self
    }

    /// Consults the sampler and starts the span.
    pub fn start(self) -> Span {
        let shared = Arc::clone(&self.tracer.shared);
        let parent_context = self.parent.unwrap_or_else(Context::current);
        let parent = parent_context
            .span_context()
            .filter(|sc| sc.is_valid())
            .cloned();

        let trace_id = parent
            .as_ref()
            .map(|sc| sc.trace_id.clone())
            .unwrap_or_else(TraceId::generate);
        let result = shared
            .sampler
            .should_sample(parent.as_ref(), &trace_id, &self.name, self.kind);
        let sampled = result.decision == SamplingDecision::RecordAndSample;
        let recording =
            result.decision != SamplingDecision::Drop && !shared.shutdown.load(Ordering::Acquire);

        let trace_state = result
            .trace_state
            .or_else(|| parent.as_ref().map(|sc| sc.trace_state.clone()))
            .unwrap_or_default();
        let context = SpanContext {
            trace_id,
            span_id: SpanId::generate(),
            trace_flags: TraceFlags::default().with_sampled(sampled),
            is_remote: false,
            trace_state,
        };

        if recording {
            for processor in &shared.processors {
                processor.on_start(&context, &parent_context);
            }
        }

        Span {
            shared,
            scope: self.tracer.scope.clone(),
            context,
            parent_span_id: parent.map(|sc| sc.span_id),
            name: self.name,
            kind: self.kind,
            start_time: SystemTime::now(),
            attributes: self.attributes,
            events: Vec::new(),
            status: SpanStatus::Unset,
            recording,
            sampled,
            ended: false,
        }
    }
}

/// A live span. Ends explicitly via [`Span::end`], or implicitly on drop.
pub struct Span {
    shared: Arc<TracerShared>,
    scope: InstrumentationScope,
    context: SpanContext,
    parent_span_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    start_time: SystemTime,
    attributes: Vec<(String, AttributeValue)>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    recording: bool,
    sampled: bool,
    ended: bool,
}

impl Span {
    /// The span's identifying context.
    pub fn span_context(&self) -> &SpanContext {
        &self.context
    }

    /// True when attribute and event writes are retained.
    pub fn is_recording(&self) -> bool {
        self.recording && !self.ended
    }

    /// Sets or replaces an attribute. An empty key drops the attribute
    /// and increments the invalid-attribute counter.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if !self.is_recording() {
            return;
        }
        let key = key.into();
        if key.is_empty() {
            self.shared.diagnostics.note(DropKind::InvalidAttribute);
            return;
        }
        self.attributes.push((key, value.into()));
    }

    /// Sets the span status.
    pub fn set_status(&mut self, status: SpanStatus) {
        if self.is_recording() {
            self.status = status;
        }
    }

    /// Appends a timestamped event.
    pub fn add_event(&mut self, name: impl Into<String>, attributes: AttributeSet) {
        if !self.is_recording() {
            return;
        }
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        });
    }

    /// A context carrying this span, for parenting children or attaching.
    pub fn context(&self) -> Context {
        Context::current().with_span_context(self.context.clone())
    }

    /// Ends the span now.
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if !self.recording || !self.sampled || self.shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let attributes = match AttributeSet::new(self.attributes.drain(..)) {
            Ok(attributes) => attributes,
            Err(_) => {
                self.shared.diagnostics.note(DropKind::InvalidAttribute);
                AttributeSet::empty()
            }
        };
        let data = SpanData {
            trace_id: self.context.trace_id.clone(),
            span_id: self.context.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            name: std::mem::take(&mut self.name),
            kind: self.kind,
            start_time: self.start_time,
            end_time: SystemTime::now(),
            status: std::mem::take(&mut self.status),
            attributes,
            events: std::mem::take(&mut self.events),
            scope: self.scope.clone(),
        };
        for processor in &self.shared.processors {
            processor.on_end(data.clone());
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish();
    }
}
