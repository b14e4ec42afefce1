//! Telemetry configuration resolution.
//!
//! Values resolve in order: explicit [`TelemetryInput`], then the environment
//! lookup, then the per-environment endpoint table, then defaults. The lookup
//! is passed in so resolution has no ambient state and tests can supply a map.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SERVICE_NAME: &str = "credbroker";
pub const DEFAULT_SERVICE_NAMESPACE: &str = "credential-broker";
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

/// Default OTLP traces endpoint per deployment environment.
fn default_traces_endpoint(environment: &str) -> Option<&'static str> {
    match environment {
        "dev" => Some("https://otel-dev.example.com/otlp/v1/traces"),
        "uat" => Some("https://otel-uat.example.com/otlp/v1/traces"),
        "cug" => Some("https://otel-cug.example.com/otlp/v1/traces"),
        "prod" => Some("https://otel.example.com/otlp/v1/traces"),
        _ => None,
    }
}

/// Environments where `RUNTIME_LOCAL` is ignored and real export stays on.
fn is_protected(environment: &str) -> bool {
    matches!(environment, "cug" | "prod")
}

/// Values supplied by the embedding host. Empty fields fall through to the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct TelemetryInput {
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub environment: Option<String>,
    pub service_namespace: Option<String>,
    pub sample_rate: Option<f64>,
}

/// Fully resolved, immutable telemetry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Master switch.
    pub enabled: bool,
    /// Run with no-op sinks and no exporter.
    pub use_noop: bool,

    pub service_name: String,
    pub service_namespace: String,
    pub service_version: String,
    pub environment: String,

    /// Empty when trace export is disabled.
    pub traces_endpoint: String,
    pub traces_headers: HashMap<String, String>,
    /// Export over plain HTTP. Defaults to the endpoint's own scheme.
    pub traces_insecure: bool,
    pub traces_timeout: Duration,

    pub metrics_enabled: bool,
    /// Prometheus listener address, `host:port`.
    pub metrics_listen: Option<String>,

    pub sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_noop: false,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_namespace: DEFAULT_SERVICE_NAMESPACE.to_string(),
            service_version: "unknown".to_string(),
            environment: "unknown".to_string(),
            traces_endpoint: String::new(),
            traces_headers: HashMap::new(),
            traces_insecure: false,
            traces_timeout: DEFAULT_EXPORT_TIMEOUT,
            metrics_enabled: true,
            metrics_listen: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_disabled(value: &str) -> bool {
    value.eq_ignore_ascii_case("false") || value == "0"
}

/// Parse `k=v,k=v`; pairs without `=` are skipped.
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn clamp_sample_rate(rate: f64) -> f64 {
    rate.clamp(0.0, 1.0)
}

impl TelemetryConfig {
    pub fn resolve<F>(input: TelemetryInput, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| non_empty(lookup(key));

        let environment = non_empty(input.environment)
            .or_else(|| env("ENV"))
            .unwrap_or_else(|| "unknown".to_string());

        let runtime_local = env("RUNTIME_LOCAL").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let use_noop = if is_protected(&environment) {
            if runtime_local {
                warn!(
                    environment = %environment,
                    "RUNTIME_LOCAL=true ignored, telemetry remains enabled"
                );
            }
            false
        } else {
            if runtime_local {
                warn!(environment = %environment, "telemetry disabled via RUNTIME_LOCAL=true");
            }
            runtime_local
        };

        let enabled = env("TELEMETRY_ENABLED").map(|v| parse_flag(&v)).unwrap_or(true);

        let service_name = non_empty(input.service_name)
            .or_else(|| env("OTEL_SERVICE_NAME"))
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let service_namespace = non_empty(input.service_namespace)
            .or_else(|| env("SERVICE_NAMESPACE"))
            .unwrap_or_else(|| DEFAULT_SERVICE_NAMESPACE.to_string());
        let service_version =
            non_empty(input.service_version).unwrap_or_else(|| "unknown".to_string());

        let mut traces_endpoint = env("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
            .or_else(|| default_traces_endpoint(&environment).map(str::to_string))
            .unwrap_or_default();
        if env("TELEMETRY_TRACES_ENABLED").is_some_and(|v| parse_disabled(&v)) {
            traces_endpoint.clear();
        }

        let traces_insecure = env("OTEL_EXPORTER_OTLP_INSECURE")
            .map(|v| parse_flag(&v))
            .unwrap_or_else(|| traces_endpoint.starts_with("http://"));
        let traces_headers =
            env("OTEL_EXPORTER_OTLP_HEADERS").map(|raw| parse_headers(&raw)).unwrap_or_default();
        let traces_timeout = env("OTEL_EXPORTER_OTLP_TIMEOUT")
            .and_then(|raw| humantime::parse_duration(&raw).ok())
            .unwrap_or(DEFAULT_EXPORT_TIMEOUT);

        let metrics_enabled =
            !env("TELEMETRY_METRICS_ENABLED").is_some_and(|v| parse_disabled(&v));
        let metrics_listen = env("TELEMETRY_METRICS_LISTEN");

        let sample_rate = match input.sample_rate {
            Some(rate) if rate > 0.0 => clamp_sample_rate(rate),
            _ => env("TELEMETRY_SAMPLE_RATE")
                .and_then(|raw| raw.parse::<f64>().ok())
                .map(clamp_sample_rate)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
        };

        Self {
            enabled,
            use_noop,
            service_name,
            service_namespace,
            service_version,
            environment,
            traces_endpoint,
            traces_headers,
            traces_insecure,
            traces_timeout,
            metrics_enabled,
            metrics_listen,
            sample_rate,
        }
    }

    /// Resolve against the process environment.
    pub fn from_env(input: TelemetryInput) -> Self {
        Self::resolve(input, |key| std::env::var(key).ok())
    }

    /// Tracing requires the master switch, no noop override and an endpoint.
    pub fn traces_enabled(&self) -> bool {
        self.enabled && !self.use_noop && !self.traces_endpoint.is_empty()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.enabled && !self.use_noop && self.metrics_enabled
    }

    /// Endpoint handed to the exporter, with its scheme forced to match
    /// `traces_insecure`. Bare `host:port/path` endpoints gain a scheme.
    pub fn export_endpoint(&self) -> String {
        let rest = self
            .traces_endpoint
            .strip_prefix("https://")
            .or_else(|| self.traces_endpoint.strip_prefix("http://"))
            .unwrap_or(&self.traces_endpoint);
        let scheme = if self.traces_insecure { "http" } else { "https" };
        format!("{scheme}://{rest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn resolve_with(input: TelemetryInput, vars: &[(&str, &str)]) -> TelemetryConfig {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        TelemetryConfig::resolve(input, |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_empty_environment() {
        let config = resolve_with(TelemetryInput::default(), &[]);
        assert!(config.enabled);
        assert!(!config.use_noop);
        assert_eq!(config.environment, "unknown");
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.traces_endpoint, "");
        assert_eq!(config.traces_timeout, DEFAULT_EXPORT_TIMEOUT);
        assert_eq!(config.sample_rate, 1.0);
        assert!(!config.traces_enabled());
        assert!(config.metrics_enabled());
    }

    #[test]
    fn environment_selects_default_endpoint() {
        let config = resolve_with(TelemetryInput::default(), &[("ENV", "uat")]);
        assert_eq!(config.traces_endpoint, "https://otel-uat.example.com/otlp/v1/traces");
        assert!(!config.traces_insecure);
        assert!(config.traces_enabled());
    }

    #[test]
    fn explicit_input_beats_environment() {
        let input = TelemetryInput {
            environment: Some("prod".to_string()),
            service_name: Some("broker-a".to_string()),
            ..Default::default()
        };
        let config =
            resolve_with(input, &[("ENV", "dev"), ("OTEL_SERVICE_NAME", "from-env")]);
        assert_eq!(config.environment, "prod");
        assert_eq!(config.service_name, "broker-a");
    }

    #[test]
    fn runtime_local_selects_noop_outside_protected_environments() {
        let config = resolve_with(TelemetryInput::default(), &[("ENV", "dev"), ("RUNTIME_LOCAL", "TRUE")]);
        assert!(config.use_noop);
        assert!(!config.traces_enabled());
        assert!(!config.metrics_enabled());
    }

    #[traced_test]
    #[test]
    fn runtime_local_is_ignored_in_prod() {
        let config = resolve_with(TelemetryInput::default(), &[("ENV", "prod"), ("RUNTIME_LOCAL", "true")]);
        assert!(!config.use_noop);
        assert!(config.traces_enabled());
        assert!(logs_contain("RUNTIME_LOCAL=true ignored"));
    }

    #[test]
    fn master_switch_and_traces_override() {
        let off = resolve_with(TelemetryInput::default(), &[("ENV", "dev"), ("TELEMETRY_ENABLED", "0")]);
        assert!(!off.enabled);
        assert!(!off.traces_enabled());

        let no_traces = resolve_with(
            TelemetryInput::default(),
            &[("ENV", "dev"), ("TELEMETRY_TRACES_ENABLED", "false")],
        );
        assert_eq!(no_traces.traces_endpoint, "");
    }

    #[test]
    fn endpoint_headers_and_timeout_from_environment() {
        let config = resolve_with(
            TelemetryInput::default(),
            &[
                ("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", "http://collector:4318/v1/traces"),
                ("OTEL_EXPORTER_OTLP_HEADERS", "authorization=Bearer abc, x-team = broker,junk"),
                ("OTEL_EXPORTER_OTLP_TIMEOUT", "5s"),
            ],
        );
        assert!(config.traces_insecure);
        assert_eq!(config.export_endpoint(), "http://collector:4318/v1/traces");
        assert_eq!(config.traces_headers.len(), 2);
        assert_eq!(config.traces_headers["authorization"], "Bearer abc");
        assert_eq!(config.traces_headers["x-team"], "broker");
        assert_eq!(config.traces_timeout, Duration::from_secs(5));
    }

    #[test]
    fn insecure_flag_decides_export_scheme() {
        let forced_plain = resolve_with(
            TelemetryInput::default(),
            &[("ENV", "uat"), ("OTEL_EXPORTER_OTLP_INSECURE", "true")],
        );
        assert!(forced_plain.traces_insecure);
        assert_eq!(forced_plain.export_endpoint(), "http://otel-uat.example.com/otlp/v1/traces");

        let forced_tls = resolve_with(
            TelemetryInput::default(),
            &[
                ("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", "http://collector:4318/v1/traces"),
                ("OTEL_EXPORTER_OTLP_INSECURE", "false"),
            ],
        );
        assert!(!forced_tls.traces_insecure);
        assert_eq!(forced_tls.export_endpoint(), "https://collector:4318/v1/traces");

        let bare = resolve_with(
            TelemetryInput::default(),
            &[("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", "collector:4318/v1/traces")],
        );
        assert!(!bare.traces_insecure);
        assert_eq!(bare.export_endpoint(), "https://collector:4318/v1/traces");
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let config =
            resolve_with(TelemetryInput::default(), &[("OTEL_EXPORTER_OTLP_TIMEOUT", "soon")]);
        assert_eq!(config.traces_timeout, DEFAULT_EXPORT_TIMEOUT);
    }

    #[test]
    fn sample_rate_is_clamped() {
        let high = resolve_with(TelemetryInput::default(), &[("TELEMETRY_SAMPLE_RATE", "4.5")]);
        assert_eq!(high.sample_rate, 1.0);

        let low = resolve_with(TelemetryInput::default(), &[("TELEMETRY_SAMPLE_RATE", "-1")]);
        assert_eq!(low.sample_rate, 0.0);

        let input = TelemetryInput { sample_rate: Some(0.25), ..Default::default() };
        let explicit = resolve_with(input, &[("TELEMETRY_SAMPLE_RATE", "0.9")]);
        assert_eq!(explicit.sample_rate, 0.25);
    }

    #[test]
    fn metrics_can_be_disabled() {
        let config = resolve_with(
            TelemetryInput::default(),
            &[("TELEMETRY_METRICS_ENABLED", "false"), ("TELEMETRY_METRICS_LISTEN", "127.0.0.1:9464")],
        );
        assert!(!config.metrics_enabled());
        assert_eq!(config.metrics_listen.as_deref(), Some("127.0.0.1:9464"));
    }
}
