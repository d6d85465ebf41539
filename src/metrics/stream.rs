//! Instrument streams.
//!
//! An [`InstrumentStream`] binds one instrument identity plus resolved
//! view configuration to exactly one aggregator store, and assembles that
//! store's snapshots into export-ready metric data.

use crate::attributes::AttributeSet;
use crate::core::config::MetricsConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::types::SpanContext;
use crate::metrics::data::{
    ExponentialBuckets, ExponentialHistogramPoint, GaugePoint, HistogramPoint, InstrumentIdentity,
    InstrumentKind, MetricData, MetricPoints, Number, NumberKind, SumPoint, Temporality,
};
use crate::metrics::exemplar::{
    AlignedHistogramReservoir, ReservoirFactory, SimpleFixedSizeReservoir,
};
use crate::metrics::point::{AggregateKind, PointValue};
use crate::metrics::store::{AggregatorStore, StoreConfig};
use crate::metrics::view::{Aggregation, ExemplarSampling, View};
use std::sync::Arc;

pub(crate) struct InstrumentStream {
    identity: InstrumentIdentity,
    store: AggregatorStore,
}

impl InstrumentStream {
    /// Resolves the instrument against an optional matching view and
    /// builds the backing store.
    pub(crate) fn new(
        identity: InstrumentIdentity,
        number: NumberKind,
        view: Option<&View>,
        config: &MetricsConfig,
        temporality: Temporality,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let mut identity = identity;
        if let Some(view) = view {
            if let Some(name) = view.rename() {
                identity.name = name.to_string();
            }
            if let Some(description) = view.description() {
                identity.description = Some(description.to_string());
            }
        }

        let kind = resolve_aggregation(identity.kind, view.map(View::aggregation), config);
        let reservoir = view
            .and_then(View::exemplars)
            .map(|sampling| reservoir_factory(sampling, &kind));
        let cardinality_limit = view
            .and_then(View::cardinality_limit)
            .unwrap_or(config.cardinality_limit);

        let store = AggregatorStore::new(
            StoreConfig {
                kind,
                number,
                temporality,
                cardinality_limit,
                emit_overflow: config.emit_overflow_attribute,
                reclaim: config.reclaim_unused_metric_points,
                reservoir,
            },
            diagnostics,
        );
        Self { identity, store }
    }

    pub(crate) fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    /// True when the stream's store retains exemplars, so recorders know
    /// to capture the ambient span context.
    pub(crate) fn wants_exemplars(&self) -> bool {
        self.store.wants_exemplars()
    }

    /// Routes one measurement into the store.
    pub(crate) fn record(
        &self,
        value: Number,
        attrs: &AttributeSet,
        span_context: Option<&SpanContext>,
    ) {
        self.store.update(value, attrs, span_context);
    }

    /// Snapshots the store into one export-ready metric. Returns `None`
    /// when no series had anything to report.
    pub(crate) fn collect(&self) -> Option<MetricData> {
        let (collected, start_time, time) = self.store.collect();
        if collected.is_empty() {
            return None;
        }

        let temporality = self.store.temporality();
        let points = match self.store.kind() {
            AggregateKind::Sum { monotonic } | AggregateKind::ObservableSum { monotonic } => {
                MetricPoints::Sum {
                    monotonic: *monotonic,
                    points: collected
                        .into_iter()
                        .filter_map(|point| match point.value {
                            PointValue::Sum(value) => Some(SumPoint {
                                attributes: point.attributes,
                                value,
                                exemplars: point.exemplars,
                            }),
                            _ => None,
                        })
                        .collect(),
                }
            }
            AggregateKind::LastValue => MetricPoints::Gauge {
                points: collected
                    .into_iter()
                    .filter_map(|point| match point.value {
                        PointValue::Gauge(value) => Some(GaugePoint {
                            attributes: point.attributes,
                            value,
                            exemplars: point.exemplars,
                        }),
                        _ => None,
                    })
                    .collect(),
            },
            AggregateKind::Histogram { boundaries, .. } => MetricPoints::Histogram {
                points: collected
                    .into_iter()
                    .filter_map(|point| match point.value {
                        PointValue::Histogram(snapshot) => Some(HistogramPoint {
                            attributes: point.attributes,
                            count: snapshot.count,
                            sum: snapshot.sum,
                            min: snapshot.min_opt(),
                            max: snapshot.max_opt(),
                            boundaries: boundaries.to_vec(),
                            bucket_counts: snapshot.bucket_counts,
                            exemplars: point.exemplars,
                        }),
                        _ => None,
                    })
                    .collect(),
            },
            AggregateKind::Exponential { .. } => MetricPoints::ExponentialHistogram {
                points: collected
                    .into_iter()
                    .filter_map(|point| match point.value {
                        PointValue::Exponential(snapshot) => {
                            Some(ExponentialHistogramPoint {
                                attributes: point.attributes,
                                scale: snapshot.scale,
                                zero_count: snapshot.zero_count,
                                count: snapshot.count,
                                sum: snapshot.sum,
                                min: snapshot.min_opt(),
                                max: snapshot.max_opt(),
                                positive: ExponentialBuckets {
                                    offset: snapshot.positive.offset(),
                                    counts: snapshot.positive.counts().to_vec(),
                                },
                                negative: ExponentialBuckets {
                                    offset: snapshot.negative.offset(),
                                    counts: snapshot.negative.counts().to_vec(),
                                },
                                exemplars: point.exemplars,
                            })
                        }
                        _ => None,
                    })
                    .collect(),
            },
        };

        Some(MetricData {
            identity: self.identity.clone(),
            temporality,
            start_time,
            time,
            points,
        })
    }
}

fn resolve_aggregation(
    kind: InstrumentKind,
    requested: Option<&Aggregation>,
    config: &MetricsConfig,
) -> AggregateKind {
    let default_for_kind = || match kind {
        InstrumentKind::Counter => AggregateKind::Sum { monotonic: true },
        InstrumentKind::UpDownCounter => AggregateKind::Sum { monotonic: false },
        InstrumentKind::Histogram => AggregateKind::Histogram {
            boundaries: config.default_histogram_boundaries.clone().into(),
            record_min_max: true,
        },
        InstrumentKind::Gauge | InstrumentKind::ObservableGauge => AggregateKind::LastValue,
        InstrumentKind::ObservableCounter => AggregateKind::ObservableSum { monotonic: true },
        InstrumentKind::ObservableUpDownCounter => {
            AggregateKind::ObservableSum { monotonic: false }
        }
    };

    match requested {
        None | Some(Aggregation::Default) => default_for_kind(),
        Some(Aggregation::Sum) => match kind {
            InstrumentKind::ObservableCounter => AggregateKind::ObservableSum { monotonic: true },
            InstrumentKind::ObservableUpDownCounter | InstrumentKind::ObservableGauge => {
                AggregateKind::ObservableSum { monotonic: false }
            }
            InstrumentKind::UpDownCounter => AggregateKind::Sum { monotonic: false },
            _ => AggregateKind::Sum { monotonic: true },
        },
        Some(Aggregation::LastValue) => AggregateKind::LastValue,
        Some(Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max,
        }) => AggregateKind::Histogram {
            boundaries: boundaries.clone().into(),
            record_min_max: *record_min_max,
        },
        Some(Aggregation::Base2ExponentialHistogram {
            max_size,
            max_scale,
            record_min_max,
        }) => AggregateKind::Exponential {
            max_size: *max_size,
            max_scale: *max_scale,
            record_min_max: *record_min_max,
        },
    }
}

fn reservoir_factory(sampling: &ExemplarSampling, kind: &AggregateKind) -> Arc<ReservoirFactory> {
    match sampling {
        ExemplarSampling::SimpleFixedSize(size) => {
            let size = *size;
            Arc::new(move || Box::new(SimpleFixedSizeReservoir::new(size)))
        }
        ExemplarSampling::AlignedHistogram => {
            let buckets = match kind {
                AggregateKind::Histogram { boundaries, .. } => boundaries.len() + 1,
                _ => 1,
            };
            Arc::new(move || Box::new(AlignedHistogramReservoir::new(buckets)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(kind: InstrumentKind) -> InstrumentIdentity {
        InstrumentIdentity {
            meter_name: "test".to_string(),
            meter_version: None,
            name: "requests".to_string(),
            unit: None,
            description: None,
            kind,
        }
    }

    fn stream(kind: InstrumentKind, view: Option<&View>) -> InstrumentStream {
        InstrumentStream::new(
            identity(kind),
            NumberKind::I64,
            view,
            &MetricsConfig::default(),
            Temporality::Cumulative,
            Arc::new(Diagnostics::new()),
        )
    }

    #[test]
    fn test_counter_produces_monotonic_sum() {
        let stream = stream(InstrumentKind::Counter, None);
        let attrs = AttributeSet::new([("route", "/")]).unwrap();
        stream.record(Number::I64(2), &attrs, None);
        stream.record(Number::I64(3), &attrs, None);

        let data = stream.collect().unwrap();
        match data.points {
            MetricPoints::Sum { monotonic, points } => {
                assert!(monotonic);
                assert_eq!(points.len(), 1);
                assert_eq!(points[0].value, Number::I64(5));
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_empty_stream_collects_nothing() {
        let stream = stream(InstrumentKind::Counter, None);
        assert!(stream.collect().is_none());
    }

    #[test]
    fn test_view_rename_applies() {
        let view = View::new("requests").with_name("http.requests");
        let stream = stream(InstrumentKind::Counter, Some(&view));
        assert_eq!(stream.identity().name, "http.requests");
    }

    #[test]
    fn test_view_switches_histogram_boundaries() {
        let view = View::new("requests").with_aggregation(Aggregation::ExplicitBucketHistogram {
            boundaries: vec![1.0, 2.0],
            record_min_max: false,
        });
        let stream = stream(InstrumentKind::Histogram, Some(&view));
        let attrs = AttributeSet::empty();
        stream.record(Number::I64(1), &attrs, None);

        let data = stream.collect().unwrap();
        match data.points {
            MetricPoints::Histogram { points } => {
                assert_eq!(points[0].boundaries, vec![1.0, 2.0]);
                assert_eq!(points[0].bucket_counts, vec![1, 0, 0]);
                assert_eq!(points[0].min, None);
            }
            other => panic!("unexpected points {other:?}"),
        }
    }

    #[test]
    fn test_gauge_reports_last_value() {
        let stream = stream(InstrumentKind::Gauge, None);
        let attrs = AttributeSet::empty();
        stream.record(Number::I64(5), &attrs, None);
        stream.record(Number::I64(9), &attrs, None);

        let data = stream.collect().unwrap();
        match data.points {
            MetricPoints::Gauge { points } => assert_eq!(points[0].value, Number::I64(9)),
            other => panic!("unexpected points {other:?}"),
        }
    }
}
