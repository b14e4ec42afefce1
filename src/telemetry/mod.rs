//! # Instrumentation
//!
//! Every broker operation reports through one event vocabulary. Sinks implement
//! [`Telemetry`]; the [`Emitter`] fans each event out to the sinks chosen at
//! startup so call sites never know which ones are active.
//!
//! - [`SpanTelemetry`] creates nested OpenTelemetry spans per phase
//! - [`MetricsTelemetry`] increments counters and records latency histograms
//! - [`NoopTelemetry`] does nothing and is the default
//!
//! Sinks must never fail or panic: a disabled or default-constructed sink
//! returns the input context unchanged from every start operation and ignores
//! every record operation.

pub mod config;
pub mod constants;
pub mod emitter;
pub mod init;
pub mod metrics;
pub mod noop;
pub mod spans;

use crate::errors::Error;
use opentelemetry::Context;
use std::fmt;
use std::time::Duration;

pub use config::{TelemetryConfig, TelemetryInput};
pub use emitter::Emitter;
pub use init::{init_telemetry, TelemetryProviders};
pub use self::metrics::MetricsTelemetry;
pub use noop::NoopTelemetry;
pub use spans::SpanTelemetry;

/// Borrowed error carried by events.
pub type EventError<'a> = &'a (dyn std::error::Error + Send + Sync + 'static);

#[derive(Debug, Clone, Copy)]
pub struct TokenRequestEvent<'a> {
    pub role: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenGenerateEvent<'a> {
    pub role: &'a str,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<&'a Error>,
}

/// One attempt against the upstream token endpoint is about to start.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamAuthStartEvent<'a> {
    pub role: &'a str,
    pub credential_type: &'a str,
    pub role_ids_count: usize,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamAuthEvent<'a> {
    pub credential_type: &'a str,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<EventError<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

impl WriteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::Create => "create",
            WriteOperation::Update => "update",
            WriteOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigWriteEvent {
    pub operation: WriteOperation,
    pub success: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigReadEvent {
    pub found: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleWriteEvent<'a> {
    pub role: &'a str,
    pub operation: WriteOperation,
    pub success: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleReadEvent<'a> {
    pub role: &'a str,
    pub found: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleListEvent {
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthCheckEvent<'a> {
    pub healthy: bool,
    pub duration: Duration,
    pub error: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorEvent<'a> {
    pub operation: &'a str,
    pub error: EventError<'a>,
    pub severity: Severity,
}

/// A telemetry sink.
///
/// Start operations return the context later events should be recorded
/// against. Write spans stay open until [`Telemetry::end_span`] so outcome and
/// error events can be attached; read, list and health spans are closed
/// immediately.
pub trait Telemetry: Send + Sync + fmt::Debug {
    /// Whether this sink records anything at all.
    fn is_enabled(&self) -> bool;

    fn on_token_request(&self, cx: &Context, event: &TokenRequestEvent<'_>) -> Context;
    fn on_token_generate(&self, cx: &Context, event: &TokenGenerateEvent<'_>);

    fn on_upstream_auth_start(&self, cx: &Context, event: &UpstreamAuthStartEvent<'_>) -> Context;
    /// Records the attempt outcome and closes the attempt's span.
    fn on_upstream_auth(&self, cx: &Context, event: &UpstreamAuthEvent<'_>);

    fn on_config_write(&self, cx: &Context, event: &ConfigWriteEvent) -> Context;
    fn on_config_read(&self, cx: &Context, event: &ConfigReadEvent);

    fn on_role_write(&self, cx: &Context, event: &RoleWriteEvent<'_>) -> Context;
    fn on_role_read(&self, cx: &Context, event: &RoleReadEvent<'_>);
    fn on_role_list(&self, cx: &Context, event: &RoleListEvent);

    fn on_health_check(&self, cx: &Context, event: &HealthCheckEvent<'_>);

    fn on_error(&self, cx: &Context, event: &ErrorEvent<'_>);

    fn end_span(&self, cx: &Context);
}
