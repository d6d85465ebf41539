//! Configuration defaults, validation and serde round-trips.

use kerro::core::config::{
    MetricsConfig, ProcessorConfig, TelemetryConfig, TemporalityPreference,
};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let config = TelemetryConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_json_round_trip() {
    let config = TelemetryConfig {
        metrics: MetricsConfig {
            cardinality_limit: 500,
            reclaim_unused_metric_points: true,
            temporality_preference: TemporalityPreference::Delta,
            collect_interval: Duration::from_secs(15),
            ..Default::default()
        },
        spans: ProcessorConfig {
            max_queue_size: 1024,
            max_export_batch_size: 256,
            ..Default::default()
        },
        logs: ProcessorConfig::default(),
    };

    let encoded = serde_json::to_string(&config).unwrap();
    let decoded: TelemetryConfig = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.metrics.cardinality_limit, 500);
    assert!(decoded.metrics.reclaim_unused_metric_points);
    assert_eq!(
        decoded.metrics.temporality_preference,
        TemporalityPreference::Delta
    );
    assert_eq!(decoded.metrics.collect_interval, Duration::from_secs(15));
    assert_eq!(decoded.spans.max_queue_size, 1024);
    assert_eq!(decoded.logs.max_queue_size, 2048);
    assert!(decoded.validate().is_ok());
}

#[test]
fn test_partial_json_fills_defaults() {
    let decoded: TelemetryConfig =
        serde_json::from_str(r#"{"metrics": {"cardinality_limit": 100}}"#).unwrap();
    assert_eq!(decoded.metrics.cardinality_limit, 100);
    assert!(decoded.metrics.emit_overflow_attribute);
    assert_eq!(decoded.spans.max_export_batch_size, 512);
}

#[test]
fn test_temporality_preference_kebab_case() {
    let decoded: TemporalityPreference = serde_json::from_str(r#""low-memory""#).unwrap();
    assert_eq!(decoded, TemporalityPreference::LowMemory);
    let encoded = serde_json::to_string(&TemporalityPreference::Delta).unwrap();
    assert_eq!(encoded, r#""delta""#);
}

#[test]
fn test_humantime_durations() {
    let decoded: MetricsConfig =
        serde_json::from_str(r#"{"collect_interval": "30s"}"#).unwrap();
    assert_eq!(decoded.collect_interval, Duration::from_secs(30));
}

#[test]
fn test_invalid_configs_rejected() {
    let zero_cardinality = MetricsConfig {
        cardinality_limit: 0,
        ..Default::default()
    };
    assert!(zero_cardinality.validate().is_err());

    let bad_scale = MetricsConfig {
        max_scale: 25,
        ..Default::default()
    };
    assert!(bad_scale.validate().is_err());

    let tiny_exponential = MetricsConfig {
        max_size: 1,
        ..Default::default()
    };
    assert!(tiny_exponential.validate().is_err());

    let oversized_batch = ProcessorConfig {
        max_queue_size: 8,
        max_export_batch_size: 16,
        ..Default::default()
    };
    assert!(oversized_batch.validate().is_err());
}
