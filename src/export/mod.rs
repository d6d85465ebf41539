//! Export boundary: batches, exporter traits and the batching processor.
//!
//! The SDK hands finished items to collaborators through these types.
//! Wire formats and transports live outside the crate; an exporter only
//! has to turn a [`Batch`] into a success/failure signal.

pub mod batch;
pub mod processor;

pub use batch::{BatchExportProcessor, ExportFilter, FilterDecision, ProcessorStats};
pub use processor::{LogProcessor, SpanProcessor};

use crate::core::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A finite, known-length sequence of items, safe to iterate once.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
}

impl<T> Batch<T> {
    /// Wraps the items in a batch.
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no items are present.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrows the items.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Unwraps the items.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> From<Vec<T>> for Batch<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// Takes a batch of finished items and delivers it somewhere.
///
/// The processor applies `deadline` around every call; an exporter that
/// wants to cooperate can also observe it directly. Failure means the
/// batch is discarded; retry policy belongs to the exporter.
#[async_trait]
pub trait Exporter<T: Send + 'static>: Send + Sync {
    /// Delivers one non-empty batch.
    async fn export(&self, batch: Batch<T>, deadline: Duration) -> Result<()>;

    /// Flushes any exporter-internal buffering.
    async fn force_flush(&self, _deadline: Duration) -> bool {
        true
    }

    /// Releases exporter resources. No further calls follow.
    async fn shutdown(&self, _deadline: Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_len_and_iteration() {
        let batch = Batch::new(vec![1, 2, 3]);
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
        let collected: Vec<i32> = batch.into_iter().collect();
        assert_eq!(collected, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_batch() {
        let batch: Batch<i32> = Batch::new(Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
