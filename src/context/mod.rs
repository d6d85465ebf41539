//! Ambient context and propagation boundaries.
//!
//! A [`Context`] is an immutable typed value map. The current context
//! lives in a thread-local stack; [`Context::attach`] pushes a new
//! current and returns a guard that restores the prior one on every exit
//! path, including panics. Crossing a task boundary is explicit: capture
//! [`Context::current`] and re-attach it inside the task.

use crate::core::types::SpanContext;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// An immutable bag of typed values carried across call boundaries.
#[derive(Debug, Clone, Default)]
pub struct Context {
    entries: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    /// The empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The context most recently attached on this thread, or empty.
    pub fn current() -> Context {
        CURRENT.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Reads a typed value.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns a new context with `value` set; this context is unchanged.
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Context {
        let mut entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>> =
            self.entries.as_ref().clone();
        entries.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            entries: Arc::new(entries),
        }
    }

    /// The span context carried here, if any.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.value::<SpanContext>()
    }

    /// Returns a new context carrying `span_context`.
    pub fn with_span_context(&self, span_context: SpanContext) -> Context {
        self.with_value(span_context)
    }

    /// The baggage carried here, or empty.
    pub fn baggage(&self) -> Baggage {
        self.value::<Baggage>().cloned().unwrap_or_default()
    }

    /// Returns a new context carrying `baggage`.
    pub fn with_baggage(&self, baggage: Baggage) -> Context {
        self.with_value(baggage)
    }

    /// Makes this context current on this thread until the returned
    /// guard drops. Guards restore in LIFO order.
    pub fn attach(self) -> ContextGuard {
        CURRENT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard {
            _not_send: PhantomData,
        }
    }
}

/// Restores the previously-current context when dropped.
#[must_use = "dropping the guard immediately detaches the context"]
pub struct ContextGuard {
    // Thread-local bookkeeping pins the guard to its thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Copy-on-write ordered map of baggage entries.
///
/// Keys compare case-insensitively. Every mutation produces a new value;
/// snapshots observed earlier never change.
#[derive(Debug, Clone, Default)]
pub struct Baggage {
    entries: Arc<Vec<(String, String)>>,
}

impl Baggage {
    /// The empty baggage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a value up by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let needle = key.to_lowercase();
        self.entries
            .binary_search_by(|(k, _)| k.to_lowercase().cmp(&needle))
            .ok()
            .map(|idx| self.entries[idx].1.as_str())
    }

    /// Returns a new baggage with the entry set, replacing any entry
    /// whose key matches case-insensitively.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Baggage {
        let key = key.into();
        let lower = key.to_lowercase();
        let mut entries: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(k, _)| k.to_lowercase() != lower)
            .cloned()
            .collect();
        entries.push((key, value.into()));
        entries.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
        Baggage {
            entries: Arc::new(entries),
        }
    }

    /// Returns a new baggage without the entry.
    pub fn remove(&self, key: &str) -> Baggage {
        let lower = key.to_lowercase();
        let entries: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(k, _)| k.to_lowercase() != lower)
            .cloned()
            .collect();
        Baggage {
            entries: Arc::new(entries),
        }
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes propagation fields into a carrier.
pub trait Injector {
    /// Sets one field.
    fn set(&mut self, key: &str, value: String);
}

/// Reads propagation fields from a carrier.
pub trait Extractor {
    /// Reads one field.
    fn get(&self, key: &str) -> Option<&str>;

    /// Lists available field keys.
    fn keys(&self) -> Vec<&str>;
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        HashMap::keys(self).map(String::as_str).collect()
    }
}

/// Encodes and decodes context into text carriers. Concrete wire formats
/// are supplied by collaborators.
pub trait TextMapPropagator: Send + Sync {
    /// Writes `context` into the carrier.
    fn inject(&self, context: &Context, carrier: &mut dyn Injector);

    /// Builds on `base`, adding whatever this propagator finds in the
    /// carrier.
    fn extract_with_context(&self, base: &Context, carrier: &dyn Extractor) -> Context;

    /// Builds a context from the carrier, starting from the current one.
    fn extract(&self, carrier: &dyn Extractor) -> Context {
        self.extract_with_context(&Context::current(), carrier)
    }

    /// Fields this propagator reads and writes.
    fn fields(&self) -> Vec<String>;
}

/// Runs several propagators in sequence; extraction folds left to right.
pub struct CompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator>>,
}

impl CompositePropagator {
    /// Combines the given propagators.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator>>) -> Self {
        Self { propagators }
    }
}

impl TextMapPropagator for CompositePropagator {
    fn inject(&self, context: &Context, carrier: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject(context, carrier);
        }
    }

    fn extract_with_context(&self, base: &Context, carrier: &dyn Extractor) -> Context {
        // Later propagators start from the accumulated result.
        let mut context = base.clone();
        for propagator in &self.propagators {
            context = propagator.extract_with_context(&context, carrier);
        }
        context
    }

    fn fields(&self) -> Vec<String> {
        self.propagators
            .iter()
            .flat_map(|p| p.fields())
            .collect()
    }
}

/// A propagator that carries nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPropagator;

impl TextMapPropagator for NoopPropagator {
    fn inject(&self, _context: &Context, _carrier: &mut dyn Injector) {}

    fn extract_with_context(&self, base: &Context, _carrier: &dyn Extractor) -> Context {
        base.clone()
    }

    fn fields(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{SpanId, TraceFlags, TraceId};

    fn span_context() -> SpanContext {
        SpanContext::new(
            TraceId::generate(),
            SpanId::generate(),
            TraceFlags::default().with_sampled(true),
        )
    }

    #[test]
    fn test_attach_restores_on_drop() {
        assert!(Context::current().span_context().is_none());
        let sc = span_context();
        {
            let _guard = Context::new().with_span_context(sc.clone()).attach();
            assert_eq!(Context::current().span_context(), Some(&sc));
        }
        assert!(Context::current().span_context().is_none());
    }

    #[test]
    fn test_nested_attach_lifo() {
        let outer = span_context();
        let inner = span_context();
        let _outer_guard = Context::new().with_span_context(outer.clone()).attach();
        {
            let _inner_guard = Context::new().with_span_context(inner.clone()).attach();
            assert_eq!(Context::current().span_context(), Some(&inner));
        }
        assert_eq!(Context::current().span_context(), Some(&outer));
    }

    #[test]
    fn test_attach_restores_across_panic() {
        let sc = span_context();
        let result = std::panic::catch_unwind(|| {
            let _guard = Context::new().with_span_context(sc.clone()).attach();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(Context::current().span_context().is_none());
    }

    #[test]
    fn test_with_value_does_not_mutate() {
        let base = Context::new();
        let derived = base.with_value(42u32);
        assert!(base.value::<u32>().is_none());
        assert_eq!(derived.value::<u32>(), Some(&42));
    }

    #[test]
    fn test_baggage_snapshot_immutability() {
        let baggage = Baggage::new().set("tenant", "acme");
        let snapshot = baggage.clone();
        let updated = baggage.set("tenant", "globex");
        assert_eq!(snapshot.get("tenant"), Some("acme"));
        assert_eq!(updated.get("tenant"), Some("globex"));
    }

    #[test]
    fn test_baggage_case_insensitive_keys() {
        let baggage = Baggage::new().set("Tenant-Id", "acme");
        assert_eq!(baggage.get("tenant-id"), Some("acme"));
        assert_eq!(baggage.get("TENANT-ID"), Some("acme"));

        let replaced = baggage.set("TENANT-ID", "globex");
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced.get("tenant-id"), Some("globex"));
    }

    #[test]
    fn test_baggage_remove() {
        let baggage = Baggage::new().set("a", "1").set("b", "2");
        let removed = baggage.remove("A");
        assert_eq!(removed.len(), 1);
        assert_eq!(baggage.len(), 2);
    }

    #[test]
    fn test_baggage_iterates_in_key_order() {
        let baggage = Baggage::new().set("b", "2").set("a", "1").set("c", "3");
        let keys: Vec<&str> = baggage.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
