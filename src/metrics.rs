//! Lightweight metrics helpers for Warden.
//!
//! Instruments are created lazily from the global OpenTelemetry meter, so they
//! bind to whatever provider [`init_metrics`] installed (or to the no-op
//! provider in tests and when no collector is configured).
//!
//! Provided metrics:
//! * `warden_requests_total` (counter, label `outcome`)
//! * `warden_interruptions_total` (counter, labels `phase`, `action`)
//! * `warden_faults_total` (counter, label `kind`)
//! * `warden_egress_rejections_total` (counter)
//! * `warden_upstream_duration_seconds` (histogram)
//!
//! [`UpstreamTimer`] leverages `Drop` to record durations even when the
//! upstream call errors out.
use std::time::Instant;

use eyre::WrapErr;
use once_cell::sync::Lazy;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider};

use crate::config::MetricsConfig;

pub const WARDEN_REQUESTS_TOTAL: &str = "warden_requests_total";
pub const WARDEN_INTERRUPTIONS_TOTAL: &str = "warden_interruptions_total";
pub const WARDEN_FAULTS_TOTAL: &str = "warden_faults_total";
pub const WARDEN_EGRESS_REJECTIONS_TOTAL: &str = "warden_egress_rejections_total";
pub const WARDEN_UPSTREAM_DURATION_SECONDS: &str = "warden_upstream_duration_seconds";

struct Instruments {
    requests: Counter<u64>,
    interruptions: Counter<u64>,
    faults: Counter<u64>,
    egress_rejections: Counter<u64>,
    upstream_duration: Histogram<f64>,
}

static INSTRUMENTS: Lazy<Instruments> = Lazy::new(|| {
    let meter = global::meter("warden");
    Instruments {
        requests: meter
            .u64_counter(WARDEN_REQUESTS_TOTAL)
            .with_description("Total number of requests handled, by final outcome.")
            .build(),
        interruptions: meter
            .u64_counter(WARDEN_INTERRUPTIONS_TOTAL)
            .with_description("Interruptions raised by the inspection engine.")
            .build(),
        faults: meter
            .u64_counter(WARDEN_FAULTS_TOTAL)
            .with_description("Requests terminated by an engine, upstream or body fault.")
            .build(),
        egress_rejections: meter
            .u64_counter(WARDEN_EGRESS_REJECTIONS_TOTAL)
            .with_description(
                "Responses rejected after the upstream had already processed the request.",
            )
            .build(),
        upstream_duration: meter
            .f64_histogram(WARDEN_UPSTREAM_DURATION_SECONDS)
            .with_unit("s")
            .with_description("Latency of requests forwarded to the upstream.")
            .build(),
    }
});

/// Install the meter provider. With an OTLP endpoint configured, metrics are
/// exported periodically over gRPC; otherwise they stay with the no-op provider.
pub fn init_metrics(config: &MetricsConfig) -> eyre::Result<Option<SdkMeterProvider>> {
    tracing::info!("Initializing Warden metrics system");

    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("No OTLP endpoint configured; metrics export disabled");
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .wrap_err_with(|| format!("Failed to build OTLP metric exporter for {endpoint}"))?;

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(Resource::builder().with_service_name("warden").build())
        .build();
    global::set_meter_provider(provider.clone());

    tracing::info!(endpoint = %endpoint, "Warden metrics exporting via OTLP");
    Ok(Some(provider))
}

/// Flush and stop the provider returned by [`init_metrics`].
pub fn shutdown_metrics(provider: Option<SdkMeterProvider>) {
    if let Some(provider) = provider
        && let Err(e) = provider.shutdown()
    {
        tracing::warn!("Metrics provider shutdown failed: {}", e);
    }
}

/// Count a finished request by outcome (`relayed`, `interrupted`, `fault`).
pub fn increment_request_total(outcome: &'static str) {
    INSTRUMENTS
        .requests
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn increment_interruption(phase: &'static str, action: &'static str) {
    INSTRUMENTS.interruptions.add(
        1,
        &[KeyValue::new("phase", phase), KeyValue::new("action", action)],
    );
}

pub fn increment_fault(kind: &'static str) {
    INSTRUMENTS.faults.add(1, &[KeyValue::new("kind", kind)]);
}

pub fn increment_egress_rejection() {
    INSTRUMENTS.egress_rejections.add(1, &[]);
}

/// RAII helper measuring the upstream exchange duration.
pub struct UpstreamTimer {
    start: Instant,
    method: String,
}

impl UpstreamTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for UpstreamTimer {
    fn drop(&mut self) {
        INSTRUMENTS.upstream_duration.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("method", self.method.clone())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_without_endpoint() {
        let provider = init_metrics(&MetricsConfig::default()).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn test_counters_with_noop_provider() {
        increment_request_total("relayed");
        increment_interruption("request_headers", "deny");
        increment_fault("upstream");
        increment_egress_rejection();
    }

    #[test]
    fn test_upstream_timer() {
        let timer = UpstreamTimer::new("POST");
        // Timer will record duration when dropped
        drop(timer);
    }
}
