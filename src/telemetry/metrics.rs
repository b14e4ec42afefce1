//! Counter and histogram sink.
//!
//! Records through the `metrics` facade, so values go to whichever recorder
//! the host installed (see [`crate::observability::metrics::init_metrics`]).

use super::constants::*;
use super::*;
use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Increments counters and records latency histograms for broker events.
///
/// `MetricsTelemetry::default()` is disabled and records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry {
    enabled: bool,
}

impl MetricsTelemetry {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Register descriptions for every broker metric.
    pub fn describe() {
        describe_counter!(
            METRIC_TOKEN_GENERATES,
            Unit::Count,
            "Token generation requests by role and outcome"
        );
        describe_counter!(METRIC_TOKEN_ERRORS, Unit::Count, "Token generation errors by error type");
        describe_counter!(METRIC_CONFIG_WRITES, Unit::Count, "Backend configuration writes");
        describe_counter!(METRIC_CONFIG_READS, Unit::Count, "Backend configuration reads");
        describe_counter!(METRIC_ROLE_WRITES, Unit::Count, "Role writes and deletes");
        describe_counter!(METRIC_ROLE_READS, Unit::Count, "Role reads");
        describe_histogram!(
            METRIC_TOKEN_DURATION,
            Unit::Milliseconds,
            "End-to-end token generation latency"
        );
        describe_histogram!(
            METRIC_UPSTREAM_AUTH_DURATION,
            Unit::Milliseconds,
            "Latency of a single upstream authentication attempt"
        );
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

impl Telemetry for MetricsTelemetry {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_token_request(&self, cx: &Context, _event: &TokenRequestEvent<'_>) -> Context {
        cx.clone()
    }

    fn on_token_generate(&self, _cx: &Context, event: &TokenGenerateEvent<'_>) {
        if !self.enabled {
            return;
        }
        let labels = [("role", event.role.to_string()), ("success", event.success.to_string())];
        counter!(METRIC_TOKEN_GENERATES, &labels).increment(1);
        histogram!(METRIC_TOKEN_DURATION, &labels).record(millis(event.duration));

        if !event.success {
            let error_type = event.error.map(Error::kind).unwrap_or("unknown");
            let error_labels = [("role", event.role.to_string()), ("error_type", error_type.to_string())];
            counter!(METRIC_TOKEN_ERRORS, &error_labels).increment(1);
        }
    }

    fn on_upstream_auth_start(&self, cx: &Context, _event: &UpstreamAuthStartEvent<'_>) -> Context {
        cx.clone()
    }

    fn on_upstream_auth(&self, _cx: &Context, event: &UpstreamAuthEvent<'_>) {
        if !self.enabled {
            return;
        }
        let labels = [
            ("credential_type", event.credential_type.to_string()),
            ("success", event.success.to_string()),
        ];
        histogram!(METRIC_UPSTREAM_AUTH_DURATION, &labels).record(millis(event.duration));
    }

    fn on_config_write(&self, cx: &Context, event: &ConfigWriteEvent) -> Context {
        if self.enabled {
            let labels = [
                ("operation", event.operation.to_string()),
                ("success", event.success.to_string()),
            ];
            counter!(METRIC_CONFIG_WRITES, &labels).increment(1);
        }
        cx.clone()
    }

    fn on_config_read(&self, _cx: &Context, event: &ConfigReadEvent) {
        if self.enabled {
            counter!(METRIC_CONFIG_READS, "found" => event.found.to_string()).increment(1);
        }
    }

    fn on_role_write(&self, cx: &Context, event: &RoleWriteEvent<'_>) -> Context {
        if self.enabled {
            let labels = [("role", event.role.to_string()), ("operation", event.operation.to_string())];
            counter!(METRIC_ROLE_WRITES, &labels).increment(1);
        }
        cx.clone()
    }

    fn on_role_read(&self, _cx: &Context, event: &RoleReadEvent<'_>) {
        if self.enabled {
            counter!(METRIC_ROLE_READS, "found" => event.found.to_string()).increment(1);
        }
    }

    fn on_role_list(&self, _cx: &Context, _event: &RoleListEvent) {}

    fn on_health_check(&self, _cx: &Context, _event: &HealthCheckEvent<'_>) {}

    fn on_error(&self, _cx: &Context, _event: &ErrorEvent<'_>) {}

    fn end_span(&self, _cx: &Context) {}
}
