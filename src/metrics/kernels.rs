//! Lock-free scalar aggregation primitives.
//!
//! Integer sums ride on `AtomicI64::fetch_add`. Double sums cannot use a
//! hardware add, so they loop a compare-exchange over the bit pattern of
//! the value, the same technique the min/max tracking uses.

use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` cell supporting lock-free add, store and swap via its bit
/// pattern.
#[derive(Debug)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Atomically replaces the value, returning the previous one.
    #[inline]
    pub(crate) fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.0.swap(value.to_bits(), Ordering::AcqRel))
    }

    /// Adds `delta` with a compare-exchange loop.
    #[inline]
    pub(crate) fn add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_and_load() {
        let cell = AtomicF64::new(0.0);
        cell.add(1.5);
        cell.add(2.5);
        assert_eq!(cell.load(), 4.0);
    }

    #[test]
    fn test_swap_resets() {
        let cell = AtomicF64::new(10.0);
        assert_eq!(cell.swap(0.0), 10.0);
        assert_eq!(cell.load(), 0.0);
    }

    #[test]
    fn test_concurrent_adds_are_lossless() {
        let cell = Arc::new(AtomicF64::new(0.0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    cell.add(1.0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cell.load(), 40_000.0);
    }
}
