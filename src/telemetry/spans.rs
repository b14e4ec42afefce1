//! Span-based sink: one OpenTelemetry span per broker phase.

use super::constants::*;
use super::*;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracer;

/// Creates nested spans for token generation, upstream attempts and the
/// config/role lifecycle.
///
/// `SpanTelemetry::default()` holds no tracer and behaves as a no-op.
#[derive(Clone, Default)]
pub struct SpanTelemetry {
    tracer: Option<SdkTracer>,
}

impl fmt::Debug for SpanTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanTelemetry").field("enabled", &self.tracer.is_some()).finish()
    }
}

impl SpanTelemetry {
    pub fn new(tracer: SdkTracer) -> Self {
        Self { tracer: Some(tracer) }
    }

    fn start(
        &self,
        cx: &Context,
        name: &'static str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Option<Context> {
        let tracer = self.tracer.as_ref()?;
        let span = tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(tracer, cx);
        Some(cx.with_span(span))
    }

    /// Start and immediately close a span for an instantaneous operation.
    fn record(&self, cx: &Context, name: &'static str, attributes: Vec<KeyValue>, status: Status) {
        if let Some(span_cx) = self.start(cx, name, SpanKind::Internal, attributes) {
            let span = span_cx.span();
            span.set_status(status);
            span.end();
        }
    }
}

fn status_for(success: bool, message: impl Into<String>) -> Status {
    if success {
        Status::Ok
    } else {
        Status::error(message.into())
    }
}

impl Telemetry for SpanTelemetry {
    fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    fn on_token_request(&self, cx: &Context, event: &TokenRequestEvent<'_>) -> Context {
        self.start(
            cx,
            SPAN_TOKEN_GENERATE,
            SpanKind::Server,
            vec![KeyValue::new(ATTR_ROLE, event.role.to_string())],
        )
        .unwrap_or_else(|| cx.clone())
    }

    fn on_token_generate(&self, cx: &Context, event: &TokenGenerateEvent<'_>) {
        if self.tracer.is_none() {
            return;
        }
        let span = cx.span();
        let duration_ms = event.duration.as_millis() as i64;
        span.set_attribute(KeyValue::new(ATTR_DURATION_MS, duration_ms));

        match event.error {
            None if event.success => {
                span.add_event(
                    EVENT_TOKEN_GENERATED,
                    vec![KeyValue::new(ATTR_ROLE, event.role.to_string())],
                );
                span.set_status(Status::Ok);
            }
            error => {
                let message = error.map(ToString::to_string).unwrap_or_else(|| "token generation failed".into());
                span.add_event(
                    EVENT_TOKEN_FAILED,
                    vec![
                        KeyValue::new(ATTR_ROLE, event.role.to_string()),
                        KeyValue::new("error.type", error.map(Error::kind).unwrap_or("unknown")),
                    ],
                );
                if let Some(err) = error {
                    span.record_error(err);
                }
                span.set_status(Status::error(message));
            }
        }
    }

    fn on_upstream_auth_start(&self, cx: &Context, event: &UpstreamAuthStartEvent<'_>) -> Context {
        let Some(span_cx) = self.start(
            cx,
            SPAN_UPSTREAM_AUTH,
            SpanKind::Client,
            vec![
                KeyValue::new(ATTR_ROLE, event.role.to_string()),
                KeyValue::new(ATTR_CREDENTIAL_TYPE, event.credential_type.to_string()),
                KeyValue::new(ATTR_ROLE_IDS_COUNT, event.role_ids_count as i64),
                KeyValue::new(ATTR_ATTEMPT, i64::from(event.attempt)),
            ],
        ) else {
            return cx.clone();
        };
        span_cx.span().add_event(EVENT_UPSTREAM_AUTH_START, vec![]);
        span_cx
    }

    fn on_upstream_auth(&self, cx: &Context, event: &UpstreamAuthEvent<'_>) {
        if self.tracer.is_none() {
            return;
        }
        let span = cx.span();
        span.set_attribute(KeyValue::new(ATTR_SDK_DURATION_MS, event.duration.as_millis() as i64));
        if event.success {
            span.add_event(EVENT_UPSTREAM_AUTH_SUCCESS, vec![]);
            span.set_status(Status::Ok);
        } else {
            span.add_event(EVENT_UPSTREAM_AUTH_FAILED, vec![]);
            let message = match event.error {
                Some(err) => {
                    span.record_error(err);
                    err.to_string()
                }
                None => "upstream authentication failed".to_string(),
            };
            span.set_status(Status::error(message));
        }
        span.end();
    }

    fn on_config_write(&self, cx: &Context, event: &ConfigWriteEvent) -> Context {
        let Some(span_cx) = self.start(
            cx,
            SPAN_CONFIG_WRITE,
            SpanKind::Internal,
            vec![KeyValue::new(ATTR_OPERATION, event.operation.as_str())],
        ) else {
            return cx.clone();
        };
        let span = span_cx.span();
        if event.success {
            span.add_event(
                EVENT_CONFIG_UPDATED,
                vec![KeyValue::new(ATTR_OPERATION, event.operation.as_str())],
            );
        }
        span.set_status(status_for(event.success, "config write failed"));
        span_cx
    }

    fn on_config_read(&self, cx: &Context, event: &ConfigReadEvent) {
        self.record(cx, SPAN_CONFIG_READ, vec![KeyValue::new(ATTR_FOUND, event.found)], Status::Ok);
    }

    fn on_role_write(&self, cx: &Context, event: &RoleWriteEvent<'_>) -> Context {
        let name =
            if event.operation == WriteOperation::Delete { SPAN_ROLE_DELETE } else { SPAN_ROLE_WRITE };
        let Some(span_cx) = self.start(
            cx,
            name,
            SpanKind::Internal,
            vec![
                KeyValue::new(ATTR_ROLE, event.role.to_string()),
                KeyValue::new(ATTR_OPERATION, event.operation.as_str()),
            ],
        ) else {
            return cx.clone();
        };
        let span = span_cx.span();
        if event.success {
            span.add_event(
                EVENT_ROLE_UPDATED,
                vec![KeyValue::new(ATTR_OPERATION, event.operation.as_str())],
            );
        }
        span.set_status(status_for(event.success, "role write failed"));
        span_cx
    }

    fn on_role_read(&self, cx: &Context, event: &RoleReadEvent<'_>) {
        self.record(
            cx,
            SPAN_ROLE_READ,
            vec![KeyValue::new(ATTR_ROLE, event.role.to_string()), KeyValue::new(ATTR_FOUND, event.found)],
            Status::Ok,
        );
    }

    fn on_role_list(&self, cx: &Context, event: &RoleListEvent) {
        self.record(
            cx,
            SPAN_ROLE_LIST,
            vec![KeyValue::new(ATTR_ROLE_COUNT, event.count as i64)],
            Status::Ok,
        );
    }

    fn on_health_check(&self, cx: &Context, event: &HealthCheckEvent<'_>) {
        let status = match event.error {
            Some(message) if !event.healthy => Status::error(message.to_string()),
            _ => status_for(event.healthy, "unhealthy"),
        };
        self.record(
            cx,
            SPAN_HEALTH_CHECK,
            vec![
                KeyValue::new(ATTR_HEALTHY, event.healthy),
                KeyValue::new(ATTR_DURATION_MS, event.duration.as_millis() as i64),
            ],
            status,
        );
    }

    fn on_error(&self, cx: &Context, event: &ErrorEvent<'_>) {
        if self.tracer.is_none() {
            return;
        }
        let span = cx.span();
        span.add_event(
            EVENT_ERROR,
            vec![
                KeyValue::new(ATTR_ERROR_OPERATION, event.operation.to_string()),
                KeyValue::new(ATTR_ERROR_SEVERITY, event.severity.as_str()),
            ],
        );
        span.record_error(event.error);
        span.set_status(Status::error(event.error.to_string()));
    }

    fn end_span(&self, cx: &Context) {
        if self.tracer.is_some() {
            cx.span().end();
        }
    }
}
