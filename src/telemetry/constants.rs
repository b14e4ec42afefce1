//! Instrumentation names shared by the span and metric sinks.

/// Instrumentation scope for spans created by this crate.
pub const TRACER_NAME: &str = "credbroker";

// Span names
pub const SPAN_TOKEN_GENERATE: &str = "Broker.Token.Generate";
pub const SPAN_UPSTREAM_AUTH: &str = "Broker.Upstream.Auth";
pub const SPAN_CONFIG_WRITE: &str = "Broker.Config.Write";
pub const SPAN_CONFIG_READ: &str = "Broker.Config.Read";
pub const SPAN_ROLE_WRITE: &str = "Broker.Role.Write";
pub const SPAN_ROLE_READ: &str = "Broker.Role.Read";
pub const SPAN_ROLE_LIST: &str = "Broker.Role.List";
pub const SPAN_ROLE_DELETE: &str = "Broker.Role.Delete";
pub const SPAN_HEALTH_CHECK: &str = "Broker.Health.Check";

// Span events
pub const EVENT_TOKEN_GENERATED: &str = "token.generated";
pub const EVENT_TOKEN_FAILED: &str = "token.failed";
pub const EVENT_UPSTREAM_AUTH_START: &str = "upstream.auth.start";
pub const EVENT_UPSTREAM_AUTH_SUCCESS: &str = "upstream.auth.success";
pub const EVENT_UPSTREAM_AUTH_FAILED: &str = "upstream.auth.failed";
pub const EVENT_CONFIG_UPDATED: &str = "config.updated";
pub const EVENT_ROLE_UPDATED: &str = "role.updated";
pub const EVENT_ERROR: &str = "error";

// Span attributes
pub const ATTR_ROLE: &str = "broker.role";
pub const ATTR_OPERATION: &str = "operation";
pub const ATTR_FOUND: &str = "found";
pub const ATTR_DURATION_MS: &str = "duration_ms";
pub const ATTR_CREDENTIAL_TYPE: &str = "credential_type";
pub const ATTR_ROLE_IDS_COUNT: &str = "role_ids_count";
pub const ATTR_ATTEMPT: &str = "attempt";
pub const ATTR_SDK_DURATION_MS: &str = "sdk_duration_ms";
pub const ATTR_ROLE_COUNT: &str = "role_count";
pub const ATTR_HEALTHY: &str = "healthy";
pub const ATTR_ERROR_OPERATION: &str = "error.operation";
pub const ATTR_ERROR_SEVERITY: &str = "error.severity";

// Metric names
pub const METRIC_TOKEN_GENERATES: &str = "credbroker_token_generates_total";
pub const METRIC_TOKEN_ERRORS: &str = "credbroker_token_errors_total";
pub const METRIC_CONFIG_WRITES: &str = "credbroker_config_writes_total";
pub const METRIC_CONFIG_READS: &str = "credbroker_config_reads_total";
pub const METRIC_ROLE_WRITES: &str = "credbroker_role_writes_total";
pub const METRIC_ROLE_READS: &str = "credbroker_role_reads_total";
pub const METRIC_TOKEN_DURATION: &str = "credbroker_token_generate_duration_ms";
pub const METRIC_UPSTREAM_AUTH_DURATION: &str = "credbroker_upstream_auth_duration_ms";

/// Histogram buckets for millisecond latencies, 1ms to 10s.
pub const DURATION_BUCKETS_MS: &[f64] =
    &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];
