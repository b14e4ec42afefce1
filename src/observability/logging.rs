//! # Structured Logging
//!
//! Subscriber setup and the audit trail.
//!
//! When a tracer provider is supplied, the `tracing-opentelemetry` bridge is
//! installed so log lines emitted inside a span carry its trace context.
//! Credentials and tokens never reach the log: both are [`SecretString`]s and
//! render as `[REDACTED]`.
//!
//! [`SecretString`]: crate::secrets::SecretString

use crate::config::LoggingSettings;
use crate::errors::{Error, Result};
use crate::telemetry::constants::TRACER_NAME;
use chrono::{DateTime, Utc};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const AUDIT_TARGET: &str = "credbroker::audit";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `settings.level`. Fails instead of
/// panicking when a subscriber is already installed.
pub fn init_logging(
    settings: &LoggingSettings,
    tracer_provider: Option<&SdkTracerProvider>,
) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", settings.level, e)))?;

    let otel = tracer_provider
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME)));

    let registry = tracing_subscriber::registry().with(filter).with(otel);
    let result = if settings.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}

/// One audited broker operation.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub timestamp: DateTime<Utc>,
    pub operation: &'a str,
    pub role: Option<&'a str>,
    pub success: bool,
    pub duration: Duration,
    pub client_addr: Option<&'a str>,
    pub error: Option<String>,
}

impl<'a> AuditEvent<'a> {
    pub fn new(operation: &'a str, success: bool, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            role: None,
            success,
            duration,
            client_addr: None,
            error: None,
        }
    }

    pub fn role(mut self, role: &'a str) -> Self {
        self.role = Some(role);
        self
    }

    pub fn client_addr(mut self, addr: Option<&'a str>) -> Self {
        self.client_addr = addr;
        self
    }

    pub fn error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Write an audit entry. Failures log at warn, successes at info.
pub fn audit(event: &AuditEvent<'_>) {
    let timestamp = event.timestamp.to_rfc3339();
    let duration_ms = event.duration.as_millis() as u64;
    let role = event.role.unwrap_or("");
    let client_addr = event.client_addr.unwrap_or("");

    match &event.error {
        None => tracing::info!(
            target: AUDIT_TARGET,
            timestamp = %timestamp,
            operation = event.operation,
            role,
            success = event.success,
            duration_ms,
            client_addr,
            "audit"
        ),
        Some(error) => tracing::warn!(
            target: AUDIT_TARGET,
            timestamp = %timestamp,
            operation = event.operation,
            role,
            success = event.success,
            duration_ms,
            client_addr,
            error = %error,
            "audit"
        ),
    }
}
