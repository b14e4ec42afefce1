//! Fan-out of broker events to the configured sinks.

use super::constants::TRACER_NAME;
use super::*;
use opentelemetry::trace::TracerProvider as _;
use std::sync::Arc;

/// Dispatches every event to each sink in order.
///
/// Start operations thread the context through the sinks, so a span sink's
/// context is what later events are recorded against.
#[derive(Debug, Clone)]
pub struct Emitter {
    sinks: Vec<Arc<dyn Telemetry>>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::noop()
    }
}

impl Emitter {
    pub fn new(sinks: Vec<Arc<dyn Telemetry>>) -> Self {
        if sinks.is_empty() {
            return Self::noop();
        }
        Self { sinks }
    }

    pub fn noop() -> Self {
        Self { sinks: vec![Arc::new(NoopTelemetry)] }
    }

    /// Pick sinks once at startup from resolved configuration.
    pub fn from_providers(config: &TelemetryConfig, providers: &TelemetryProviders) -> Self {
        let mut sinks: Vec<Arc<dyn Telemetry>> = Vec::new();
        if let Some(provider) = &providers.tracer_provider {
            sinks.push(Arc::new(SpanTelemetry::new(provider.tracer(TRACER_NAME))));
        }
        if config.metrics_enabled() {
            sinks.push(Arc::new(MetricsTelemetry::new()));
        }
        Self::new(sinks)
    }

    pub fn is_enabled(&self) -> bool {
        self.sinks.iter().any(|sink| sink.is_enabled())
    }

    fn fold(&self, cx: &Context, start: impl Fn(&dyn Telemetry, &Context) -> Context) -> Context {
        self.sinks.iter().fold(cx.clone(), |cx, sink| start(sink.as_ref(), &cx))
    }

    fn each(&self, record: impl Fn(&dyn Telemetry)) {
        for sink in &self.sinks {
            record(sink.as_ref());
        }
    }

    pub fn emit_token_request(&self, cx: &Context, role: &str) -> Context {
        let event = TokenRequestEvent { role };
        self.fold(cx, |sink, cx| sink.on_token_request(cx, &event))
    }

    pub fn emit_token_success(&self, cx: &Context, role: &str, duration: Duration) {
        let event = TokenGenerateEvent { role, success: true, duration, error: None };
        self.each(|sink| sink.on_token_generate(cx, &event));
    }

    pub fn emit_token_failure(&self, cx: &Context, role: &str, duration: Duration, error: &Error) {
        let event = TokenGenerateEvent { role, success: false, duration, error: Some(error) };
        self.each(|sink| sink.on_token_generate(cx, &event));
    }

    pub fn emit_upstream_auth_start(&self, cx: &Context, event: &UpstreamAuthStartEvent<'_>) -> Context {
        self.fold(cx, |sink, cx| sink.on_upstream_auth_start(cx, event))
    }

    pub fn emit_upstream_auth(&self, cx: &Context, event: &UpstreamAuthEvent<'_>) {
        self.each(|sink| sink.on_upstream_auth(cx, event));
    }

    pub fn emit_config_write(&self, cx: &Context, operation: WriteOperation, success: bool) -> Context {
        let event = ConfigWriteEvent { operation, success };
        self.fold(cx, |sink, cx| sink.on_config_write(cx, &event))
    }

    pub fn emit_config_read(&self, cx: &Context, found: bool) {
        let event = ConfigReadEvent { found };
        self.each(|sink| sink.on_config_read(cx, &event));
    }

    pub fn emit_role_write(
        &self,
        cx: &Context,
        role: &str,
        operation: WriteOperation,
        success: bool,
    ) -> Context {
        let event = RoleWriteEvent { role, operation, success };
        self.fold(cx, |sink, cx| sink.on_role_write(cx, &event))
    }

    pub fn emit_role_read(&self, cx: &Context, role: &str, found: bool) {
        let event = RoleReadEvent { role, found };
        self.each(|sink| sink.on_role_read(cx, &event));
    }

    pub fn emit_role_list(&self, cx: &Context, count: usize) {
        let event = RoleListEvent { count };
        self.each(|sink| sink.on_role_list(cx, &event));
    }

    pub fn emit_health_check(
        &self,
        cx: &Context,
        healthy: bool,
        duration: Duration,
        error: Option<&str>,
    ) {
        let event = HealthCheckEvent { healthy, duration, error };
        self.each(|sink| sink.on_health_check(cx, &event));
    }

    pub fn emit_error(&self, cx: &Context, operation: &str, error: EventError<'_>, severity: Severity) {
        let event = ErrorEvent { operation, error, severity };
        self.each(|sink| sink.on_error(cx, &event));
    }

    pub fn end_span(&self, cx: &Context) {
        self.each(|sink| sink.end_span(cx));
    }
}
