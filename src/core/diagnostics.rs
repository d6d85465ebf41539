//! Self-diagnostics for the recording hot paths.
//!
//! Recording never fails visibly to the application. Invalid input,
//! overflow routing and dropped measurements are counted here, with a
//! single warning log per kind so a misbehaving caller cannot flood the
//! process log.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Kinds of silently-handled recording problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    /// Measurement discarded: cardinality limit reached and the overflow
    /// series is disabled.
    CardinalityLimit,
    /// Measurement routed to the overflow series.
    Overflow,
    /// Negative increment on a monotonic counter.
    NegativeValue,
    /// Attribute input that failed validation.
    InvalidAttribute,
    /// An exemplar reservoir panicked during `offer`.
    ReservoirPanic,
}

const KIND_COUNT: usize = 5;

impl DropKind {
    fn index(self) -> usize {
        match self {
            DropKind::CardinalityLimit => 0,
            DropKind::Overflow => 1,
            DropKind::NegativeValue => 2,
            DropKind::InvalidAttribute => 3,
            DropKind::ReservoirPanic => 4,
        }
    }

    fn message(self) -> &'static str {
        match self {
            DropKind::CardinalityLimit => {
                "cardinality limit reached; measurements are being dropped"
            }
            DropKind::Overflow => {
                "cardinality limit reached; measurements are routed to the overflow series"
            }
            DropKind::NegativeValue => "negative value rejected by a monotonic counter",
            DropKind::InvalidAttribute => "invalid attributes; measurement dropped",
            DropKind::ReservoirPanic => "exemplar reservoir panicked; exemplars suppressed",
        }
    }
}

/// Atomic counters shared by every store of a pipeline.
#[derive(Debug, Default)]
pub struct Diagnostics {
    counters: [AtomicU64; KIND_COUNT],
    warned: [AtomicBool; KIND_COUNT],
}

impl Diagnostics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one occurrence, logging a warning the first time this kind
    /// is seen.
    pub fn note(&self, kind: DropKind) {
        let idx = kind.index();
        self.counters[idx].fetch_add(1, Ordering::Relaxed);
        if !self.warned[idx].swap(true, Ordering::Relaxed) {
            tracing::warn!(kind = ?kind, "{}", kind.message());
        }
    }

    /// Current count for one kind.
    pub fn count(&self, kind: DropKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    /// Copies all counters out for inspection.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            dropped: self.count(DropKind::CardinalityLimit),
            overflow: self.count(DropKind::Overflow),
            rejected: self.count(DropKind::NegativeValue),
            invalid_attributes: self.count(DropKind::InvalidAttribute),
            reservoir_panics: self.count(DropKind::ReservoirPanic),
        }
    }
}

/// Point-in-time copy of the diagnostics counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    /// Measurements discarded at the cardinality limit.
    pub dropped: u64,
    /// Measurements routed to the overflow series.
    pub overflow: u64,
    /// Negative values rejected by monotonic counters.
    pub rejected: u64,
    /// Attribute inputs that failed validation.
    pub invalid_attributes: u64,
    /// Reservoir panics caught on the update path.
    pub reservoir_panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let diag = Diagnostics::new();
        diag.note(DropKind::Overflow);
        diag.note(DropKind::Overflow);
        diag.note(DropKind::NegativeValue);

        let snap = diag.snapshot();
        assert_eq!(snap.overflow, 2);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.dropped, 0);
    }

    #[test]
    fn test_warned_only_once() {
        let diag = Diagnostics::new();
        diag.note(DropKind::InvalidAttribute);
        assert!(diag.warned[DropKind::InvalidAttribute.index()].load(Ordering::Relaxed));
        // A second note must not reset the latch.
        diag.note(DropKind::InvalidAttribute);
        assert_eq!(diag.count(DropKind::InvalidAttribute), 2);
    }
}
