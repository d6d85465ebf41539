//! Meters and typed instruments.
//!
//! Instruments are cheap cloneable handles onto their streams. Recording
//! never fails visibly: invalid input is dropped and counted, and after
//! provider shutdown every record call is a silent no-op.

use crate::attributes::{AttributeSet, AttributeValue};
use crate::context::Context;
use crate::core::diagnostics::DropKind;
use crate::core::{KerroError, Result};
use crate::metrics::data::{InstrumentIdentity, InstrumentKind, Number, NumberKind};
use crate::metrics::pipeline::PipelineInner;
use crate::metrics::stream::InstrumentStream;
use std::marker::PhantomData;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// Value types instruments accept.
pub trait MeasurementValue: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Converts into the SDK's number representation.
    fn into_number(self) -> Number;

    /// The number kind of this type.
    fn number_kind() -> NumberKind;
}

impl MeasurementValue for i64 {
    fn into_number(self) -> Number {
        Number::I64(self)
    }

    fn number_kind() -> NumberKind {
        NumberKind::I64
    }
}

impl MeasurementValue for f64 {
    fn into_number(self) -> Number {
        Number::F64(self)
    }

    fn number_kind() -> NumberKind {
        NumberKind::F64
    }
}

/// Anything that accepts `(value, attribute-set)` updates.
pub trait MeasurementSink<T: MeasurementValue> {
    /// Records one measurement against the attribute set.
    fn record_measurement(&self, value: T, attributes: &AttributeSet);
}

/// Shared guts of every synchronous instrument handle.
struct InstrumentCore<T: MeasurementValue> {
    pipeline: Arc<PipelineInner>,
    streams: Arc<Vec<Arc<InstrumentStream>>>,
    wants_exemplars: bool,
    _number: PhantomData<fn(T) -> T>,
}

impl<T: MeasurementValue> InstrumentCore<T> {
    fn new(pipeline: Arc<PipelineInner>, streams: Arc<Vec<Arc<InstrumentStream>>>) -> Self {
        let wants_exemplars = streams.iter().any(|stream| stream.wants_exemplars());
        Self {
            pipeline,
            streams,
            wants_exemplars,
            _number: PhantomData,
        }
    }

    fn record_pairs<K, V, I>(&self, value: T, pairs: I)
    where
        K: Into<String>,
        V: Into<AttributeValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        if self.pipeline.is_shutdown() {
            return;
        }
        match AttributeSet::new(pairs) {
            Ok(attributes) => self.record(value, &attributes),
            Err(_) => self.pipeline.diagnostics().note(DropKind::InvalidAttribute),
        }
    }

    fn record(&self, value: T, attributes: &AttributeSet) {
        if self.pipeline.is_shutdown() {
            return;
        }
        let number = value.into_number();
        if self.wants_exemplars {
            // The ambient span context only matters when a reservoir will
            // retain it; skip the thread-local read otherwise.
            let context = Context::current();
            let span_context = context.span_context();
            for stream in self.streams.iter() {
                stream.record(number, attributes, span_context);
            }
        } else {
            for stream in self.streams.iter() {
                stream.record(number, attributes, None);
            }
        }
    }
}

impl<T: MeasurementValue> Clone for InstrumentCore<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            streams: Arc::clone(&self.streams),
            wants_exemplars: self.wants_exemplars,
            _number: PhantomData,
        }
    }
}

macro_rules! sync_instrument {
    ($(#[$doc:meta])* $name:ident, $method:ident, $method_with:ident, $(#[$method_doc:meta])*) => {
        $(#[$doc])*
        pub struct $name<T: MeasurementValue> {
            core: InstrumentCore<T>,
        }

        impl<T: MeasurementValue> $name<T> {
            $(#[$method_doc])*
            pub fn $method(&self, value: T, attributes: &AttributeSet) {
                self.core.record(value, attributes);
            }

            /// Same as the borrowing form, building the attribute set
            /// from raw key/value pairs. Pairs that fail validation drop
            /// the measurement and increment the invalid-attribute
            /// counter.
            pub fn $method_with<K, V, I>(&self, value: T, attributes: I)
            where
                K: Into<String>,
                V: Into<AttributeValue>,
                I: IntoIterator<Item = (K, V)>,
            {
                self.core.record_pairs(value, attributes);
            }
        }

        impl<T: MeasurementValue> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self {
                    core: self.core.clone(),
                }
            }
        }

        impl<T: MeasurementValue> MeasurementSink<T> for $name<T> {
            fn record_measurement(&self, value: T, attributes: &AttributeSet) {
                self.core.record(value, attributes);
            }
        }
    };
}

sync_instrument!(
    /// Monotonic counter. Negative increments are rejected with a
    /// diagnostics counter increment.
    Counter,
    add,
    add_with,
    /// Adds an increment to the series keyed by `attributes`.
);

sync_instrument!(
    /// Counter that can go up and down.
    UpDownCounter,
    add,
    add_with,
    /// Adds a (possibly negative) increment.
);

sync_instrument!(
    /// Records a distribution of values.
    Histogram,
    record,
    record_with,
    /// Records one value into the distribution.
);

sync_instrument!(
    /// Last-value instrument.
    Gauge,
    record,
    record_with,
    /// Records the current value; the last write wins.
);

/// Reports observations from inside an observable callback.
pub struct Observer<T: MeasurementValue> {
    streams: Arc<Vec<Arc<InstrumentStream>>>,
    _number: PhantomData<fn(T) -> T>,
}

impl<T: MeasurementValue> Observer<T> {
    /// Reports one observation. Observable counters report running
    /// totals, not increments.
    pub fn observe(&self, value: T, attributes: &AttributeSet) {
        let number = value.into_number();
        for stream in self.streams.iter() {
            stream.record(number, attributes, None);
        }
    }
}

/// Handle for a registered observable instrument. Dropping the handle
/// does not unregister the callback.
pub struct ObservableInstrument<T: MeasurementValue> {
    _streams: Arc<Vec<Arc<InstrumentStream>>>,
    _number: PhantomData<fn(T) -> T>,
}

/// Creates instruments for one instrumentation scope.
#[derive(Clone)]
pub struct Meter {
    name: String,
    version: Option<String>,
    pipeline: Arc<PipelineInner>,
}

impl Meter {
    pub(crate) fn new(
        name: String,
        version: Option<String>,
        pipeline: Arc<PipelineInner>,
    ) -> Self {
        Self {
            name,
            version,
            pipeline,
        }
    }

    fn identity(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        kind: InstrumentKind,
    ) -> Result<InstrumentIdentity> {
        if name.is_empty() {
            return Err(KerroError::config("instrument name is empty"));
        }
        Ok(InstrumentIdentity {
            meter_name: self.name.clone(),
            meter_version: self.version.clone(),
            name: name.to_string(),
            unit: unit.map(str::to_string),
            description: description.map(str::to_string),
            kind,
        })
    }

    fn register<T: MeasurementValue>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        kind: InstrumentKind,
    ) -> Result<InstrumentCore<T>> {
        let identity = self.identity(name, unit, description, kind)?;
        let streams = self
            .pipeline
            .register_instrument(identity, T::number_kind());
        Ok(InstrumentCore::new(Arc::clone(&self.pipeline), streams))
    }

    /// Creates a monotonic counter.
    pub fn create_counter<T: MeasurementValue>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> Result<Counter<T>> {
        Ok(Counter {
            core: self.register(name, unit, description, InstrumentKind::Counter)?,
        })
    }

    /// Creates an up-down counter.
    pub fn create_up_down_counter<T: MeasurementValue>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> Result<UpDownCounter<T>> {
        Ok(UpDownCounter {
            core: self.register(name, unit, description, InstrumentKind::UpDownCounter)?,
        })
    }

    /// Creates a histogram.
    pub fn create_histogram<T: MeasurementValue>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> Result<Histogram<T>> {
        Ok(Histogram {
            core: self.register(name, unit, description, InstrumentKind::Histogram)?,
        })
    }

    /// Creates a gauge.
    pub fn create_gauge<T: MeasurementValue>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
    ) -> Result<Gauge<T>> {
        Ok(Gauge {
            core: self.register(name, unit, description, InstrumentKind::Gauge)?,
        })
    }

    fn register_observable<T, F>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        kind: InstrumentKind,
        callback: F,
    ) -> Result<ObservableInstrument<T>>
    where
        T: MeasurementValue,
        F: Fn(&Observer<T>) + Send + Sync + 'static,
    {
        let identity = self.identity(name, unit, description, kind)?;
        let streams = self
            .pipeline
            .register_instrument(identity, T::number_kind());
        let observer = Observer {
            streams: Arc::clone(&streams),
            _number: PhantomData,
        };
        self.pipeline
            .register_callback(Arc::new(move || callback(&observer)));
        Ok(ObservableInstrument {
            _streams: streams,
            _number: PhantomData,
        })
    }

    /// Creates an observable counter; the callback reports running
    /// totals at every collection.
    pub fn create_observable_counter<T, F>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        callback: F,
    ) -> Result<ObservableInstrument<T>>
    where
        T: MeasurementValue,
        F: Fn(&Observer<T>) + Send + Sync + 'static,
    {
        self.register_observable(
            name,
            unit,
            description,
            InstrumentKind::ObservableCounter,
            callback,
        )
    }

    /// Creates an observable up-down counter.
    pub fn create_observable_up_down_counter<T, F>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        callback: F,
    ) -> Result<ObservableInstrument<T>>
    where
        T: MeasurementValue,
        F: Fn(&Observer<T>) + Send + Sync + 'static,
    {
        self.register_observable(
            name,
            unit,
            description,
            InstrumentKind::ObservableUpDownCounter,
            callback,
        )
    }

    /// Creates an observable gauge.
    pub fn create_observable_gauge<T, F>(
        &self,
        name: &str,
        unit: Option<&str>,
        description: Option<&str>,
        callback: F,
    ) -> Result<ObservableInstrument<T>>
    where
        T: MeasurementValue,
        F: Fn(&Observer<T>) + Send + Sync + 'static,
    {
        self.register_observable(
            name,
            unit,
            description,
            InstrumentKind::ObservableGauge,
            callback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{MetricPoints, Number};
    use crate::metrics::pipeline::MeterProvider;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_empty_instrument_name_rejected() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        assert!(meter.create_counter::<i64>("", None, None).is_err());
    }

    #[test]
    fn test_f64_counter() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let counter = meter
            .create_counter::<f64>("bytes", Some("By"), None)
            .unwrap();
        let attrs = AttributeSet::empty();
        counter.add(1.5, &attrs);
        counter.add(2.5, &attrs);

        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Sum { points, .. } => {
                assert_eq!(points[0].value, Number::F64(4.0));
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_up_down_counter_accepts_negative() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let updown = meter
            .create_up_down_counter::<i64>("in_flight", None, None)
            .unwrap();
        let attrs = AttributeSet::empty();
        updown.add(5, &attrs);
        updown.add(-2, &attrs);

        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Sum { monotonic, points } => {
                assert!(!monotonic);
                assert_eq!(points[0].value, Number::I64(3));
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_observable_counter_reports_totals() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let total = Arc::new(AtomicI64::new(100));
        let reported = Arc::clone(&total);
        let _handle = meter
            .create_observable_counter::<i64, _>("connections.total", None, None, move |observer| {
                observer.observe(
                    reported.load(Ordering::Relaxed),
                    &AttributeSet::empty(),
                );
            })
            .unwrap();

        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Sum { points, .. } => {
                assert_eq!(points[0].value, Number::I64(100));
            }
            other => panic!("unexpected points {other:?}"),
        }

        total.store(150, Ordering::Relaxed);
        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Sum { points, .. } => {
                assert_eq!(points[0].value, Number::I64(150));
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_pair_entry_point_records() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let counter = meter.create_counter::<i64>("requests", None, None).unwrap();
        counter.add_with(2, [("route", "/")]);
        counter.add_with(3, [("route", "/")]);

        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Sum { points, .. } => {
                assert_eq!(points[0].value, Number::I64(5));
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pairs_dropped_and_counted() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let counter = meter.create_counter::<i64>("requests", None, None).unwrap();

        counter.add_with(1, [("", "bad")]);
        assert!(provider.collect().unwrap().is_empty());
        assert_eq!(provider.diagnostics().invalid_attributes, 1);

        // The counter keeps accumulating; the warning is only one-time.
        counter.add_with(1, [("", "still bad")]);
        assert_eq!(provider.diagnostics().invalid_attributes, 2);
    }

    #[test]
    fn test_measurement_sink_boundary() {
        let provider = MeterProvider::builder().build().unwrap();
        let meter = provider.meter("test");
        let histogram = meter
            .create_histogram::<f64>("latency", Some("ms"), None)
            .unwrap();
        let sink: &dyn MeasurementSink<f64> = &histogram;
        sink.record_measurement(12.5, &AttributeSet::empty());

        let metrics = provider.collect().unwrap();
        match &metrics[0].points {
            MetricPoints::Histogram { points } => assert_eq!(points[0].count, 1),
            other => panic!("unexpected points {other:?}"),
        }
    }
}
