use super::*;

/// Sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn is_enabled(&self) -> bool {
        false
    }

    fn on_token_request(&self, cx: &Context, _event: &TokenRequestEvent<'_>) -> Context {
        cx.clone()
    }

    fn on_token_generate(&self, _cx: &Context, _event: &TokenGenerateEvent<'_>) {}

    fn on_upstream_auth_start(&self, cx: &Context, _event: &UpstreamAuthStartEvent<'_>) -> Context {
        cx.clone()
    }

    fn on_upstream_auth(&self, _cx: &Context, _event: &UpstreamAuthEvent<'_>) {}

    fn on_config_write(&self, cx: &Context, _event: &ConfigWriteEvent) -> Context {
        cx.clone()
    }

    fn on_config_read(&self, _cx: &Context, _event: &ConfigReadEvent) {}

    fn on_role_write(&self, cx: &Context, _event: &RoleWriteEvent<'_>) -> Context {
        cx.clone()
    }

    fn on_role_read(&self, _cx: &Context, _event: &RoleReadEvent<'_>) {}

    fn on_role_list(&self, _cx: &Context, _event: &RoleListEvent) {}

    fn on_health_check(&self, _cx: &Context, _event: &HealthCheckEvent<'_>) {}

    fn on_error(&self, _cx: &Context, _event: &ErrorEvent<'_>) {}

    fn end_span(&self, _cx: &Context) {}
}
