//! # Metrics Collection
//!
//! Prometheus exporter setup and the in-process token statistics behind
//! `metrics_report`.

use crate::errors::{Error, Result};
use crate::telemetry::MetricsTelemetry;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

#[cfg(feature = "prometheus")]
use crate::telemetry::constants::{
    DURATION_BUCKETS_MS, METRIC_TOKEN_DURATION, METRIC_UPSTREAM_AUTH_DURATION,
};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
#[cfg(feature = "prometheus")]
use tracing::info;

/// Install the Prometheus recorder with an HTTP scrape listener.
#[cfg(feature = "prometheus")]
pub fn init_metrics(listen: &str, service_name: &str) -> Result<()> {
    let socket_addr: SocketAddr = listen
        .parse()
        .map_err(|e| Error::config(format!("Invalid metrics bind address '{}': {}", listen, e)))?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", service_name)
        .set_buckets_for_metric(Matcher::Full(METRIC_TOKEN_DURATION.to_string()), DURATION_BUCKETS_MS)
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full(METRIC_UPSTREAM_AUTH_DURATION.to_string()),
                DURATION_BUCKETS_MS,
            )
        })
        .map_err(|e| Error::config(format!("Invalid histogram buckets: {}", e)))?;

    builder
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsTelemetry::describe();

    info!(metrics_addr = %socket_addr, service_name, "Metrics collection initialized");
    Ok(())
}

/// Describe metrics for a recorder the host installed itself.
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_listen: &str, _service_name: &str) -> Result<()> {
    MetricsTelemetry::describe();
    Ok(())
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    token_generations: u64,
    token_errors: u64,
    total_response_time: Duration,
}

/// Token issuance outcomes since start or the last [`TokenStats::reset`].
#[derive(Debug, Default)]
pub struct TokenStats {
    counters: RwLock<Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub token_generations: u64,
    pub token_errors: u64,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
}

impl TokenStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration: Duration, success: bool) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.total_requests += 1;
        counters.total_response_time += duration;
        if success {
            counters.token_generations += 1;
        } else {
            counters.token_errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        let (avg_response_time_ms, error_rate) = if counters.total_requests > 0 {
            let requests = counters.total_requests as f64;
            (
                counters.total_response_time.as_millis() as f64 / requests,
                counters.token_errors as f64 / requests,
            )
        } else {
            (0.0, 0.0)
        };

        MetricsSnapshot {
            total_requests: counters.total_requests,
            token_generations: counters.token_generations,
            token_errors: counters.token_errors,
            avg_response_time_ms,
            error_rate,
        }
    }

    pub fn reset(&self) {
        *self.counters.write().unwrap_or_else(PoisonError::into_inner) = Counters::default();
    }
}
