//! Credential broker service
//!
//! The host-facing façade: backend configuration and role lifecycle, token
//! issuance, health and metrics read-outs. Every operation emits telemetry
//! through the shared [`Emitter`].

use chrono::{DateTime, Utc};
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::BreakerSettings,
    domain::{
        resolve_credentials, BearerToken, BrokerConfig, ConfigMetadata, ConfigWrite,
        IssuanceRequest, Role, RoleMetadata, RoleWrite, TokenRequest,
    },
    errors::{Error, Result},
    exchange::CredentialExchange,
    observability::{audit, AuditEvent, MetricsSnapshot, TokenStats},
    resilience::{BreakerStats, CircuitBreaker, TimeoutGovernor},
    services::token_issuer::TokenIssuer,
    storage::{ConfigRepository, RoleRepository, Storage},
    telemetry::{Emitter, Severity, WriteOperation},
};

/// Outcome of [`CredentialBroker::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub healthy: bool,
    /// `ok`, `not_configured` or `error`.
    pub configuration_status: &'static str,
    /// `ok` or `failed`; absent when no check was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub circuit_breaker: BreakerStats,
}

/// Outcome of [`CredentialBroker::metrics_report`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub tokens: MetricsSnapshot,
    pub circuit_breaker: BreakerStats,
}

/// Service owning the broker's storage, breaker and issuance pipeline.
#[derive(Debug, Clone)]
pub struct CredentialBroker {
    configs: ConfigRepository,
    roles: RoleRepository,
    issuer: TokenIssuer,
    emitter: Emitter,
    stats: Arc<TokenStats>,
}

impl CredentialBroker {
    pub fn new(
        storage: Arc<dyn Storage>,
        exchange: Arc<dyn CredentialExchange>,
        breaker: &BreakerSettings,
        emitter: Emitter,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(breaker.max_failures, breaker.reset_timeout));
        Self {
            configs: ConfigRepository::new(Arc::clone(&storage)),
            roles: RoleRepository::new(storage),
            issuer: TokenIssuer::new(breaker, exchange, emitter.clone()),
            emitter,
            stats: Arc::new(TokenStats::new()),
        }
    }

    /// Override the retry backoff base (one second by default).
    pub fn with_retry_base_delay(mut self, base_delay: Duration) -> Self {
        self.issuer = self.issuer.with_base_delay(base_delay);
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn stats(&self) -> &TokenStats {
        &self.stats
    }

    /// Create or update the backend configuration.
    ///
    /// Returns the stored metadata. The write is rejected without touching
    /// storage if validation or the optional credential check fails.
    pub async fn write_config(&self, write: ConfigWrite) -> Result<ConfigMetadata> {
        let started = Instant::now();
        let cx = Context::current();

        let existing = self.configs.get().await?;
        let operation = if existing.is_some() { WriteOperation::Update } else { WriteOperation::Create };
        let result = self.store_config(existing, write).await;

        let span_cx = self.emitter.emit_config_write(&cx, operation, result.is_ok());
        if let Err(e) = &result {
            self.emitter.emit_error(&span_cx, "config write", e, Severity::Error);
        }
        self.emitter.end_span(&span_cx);

        let mut event = AuditEvent::new("config_write", result.is_ok(), started.elapsed());
        if let Err(e) = &result {
            event = event.error(e);
        }
        audit(&event);

        result.map(|config| ConfigMetadata::from(&config))
    }

    async fn store_config(
        &self,
        existing: Option<BrokerConfig>,
        write: ConfigWrite,
    ) -> Result<BrokerConfig> {
        let validate_credentials = write.validate_credentials.unwrap_or(true);
        let previous_version = existing.as_ref().map_or(0, |c| c.version);

        let mut config = existing.unwrap_or_default();
        config.apply(write)?;
        config.validate()?;

        if validate_credentials {
            self.verify_credentials(&config).await?;
        }

        config.version = previous_version + 1;
        config.last_updated = Utc::now();
        self.configs.put(&config).await?;

        if let Err(e) = self.configs.put_history(&config).await {
            warn!(version = config.version, error = %e, "failed to record configuration history");
        }

        self.issuer.breaker().reset();
        info!(
            version = config.version,
            credentials_type = config.credentials_type(),
            "Backend configuration updated"
        );
        Ok(config)
    }

    async fn verify_credentials(&self, config: &BrokerConfig) -> Result<()> {
        let credentials = resolve_credentials(None, config)?;
        let issuer = self.issuer.clone();

        TimeoutGovernor::new(config.request_timeout())
            .run(move |cancel| async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = issuer.verify_credentials(&credentials) => result,
                }
            })
            .await
            .map_err(|e| {
                Error::validation_field(format!("credential validation failed: {}", e), "credentials")
            })
    }

    /// Current configuration metadata. Inline credentials are never returned.
    pub async fn read_config(&self) -> Result<Option<ConfigMetadata>> {
        let config = self.configs.get().await?;
        self.emitter.emit_config_read(&Context::current(), config.is_some());
        Ok(config.as_ref().map(ConfigMetadata::from))
    }

    pub async fn delete_config(&self) -> Result<()> {
        let cx = Context::current();
        let result = self.configs.delete().await;

        let span_cx = self.emitter.emit_config_write(&cx, WriteOperation::Delete, result.is_ok());
        self.emitter.end_span(&span_cx);
        audit(&AuditEvent::new("config_delete", result.is_ok(), Duration::ZERO));

        if result.is_ok() {
            info!("Backend configuration deleted");
        }
        result
    }

    /// Create or update a role, merging `write` onto the stored role.
    pub async fn write_role(&self, name: &str, write: RoleWrite) -> Result<RoleMetadata> {
        let started = Instant::now();
        let cx = Context::current();

        let existing = self.roles.get(name).await?;
        let operation = if existing.is_some() { WriteOperation::Update } else { WriteOperation::Create };

        let result: Result<Role> = async {
            let mut role = existing.unwrap_or_else(|| Role::new(name));
            role.apply(write)?;
            role.validate()?;
            self.roles.put(&role).await?;
            Ok(role)
        }
        .await;

        let span_cx = self.emitter.emit_role_write(&cx, name, operation, result.is_ok());
        if let Err(e) = &result {
            self.emitter.emit_error(&span_cx, "role write", e, Severity::Warning);
        }
        self.emitter.end_span(&span_cx);

        let mut event = AuditEvent::new("role_write", result.is_ok(), started.elapsed()).role(name);
        if let Err(e) = &result {
            event = event.error(e);
        }
        audit(&event);

        let role = result?;
        info!(role = %role.name, operation = %operation, "Role written");
        Ok(RoleMetadata::from(&role))
    }

    pub async fn read_role(&self, name: &str) -> Result<Option<RoleMetadata>> {
        let role = self.roles.get(name).await?;
        self.emitter.emit_role_read(&Context::current(), name, role.is_some());
        Ok(role.as_ref().map(RoleMetadata::from))
    }

    pub async fn delete_role(&self, name: &str) -> Result<()> {
        let cx = Context::current();
        let result = self.roles.delete(name).await;

        let span_cx = self.emitter.emit_role_write(&cx, name, WriteOperation::Delete, result.is_ok());
        self.emitter.end_span(&span_cx);
        audit(&AuditEvent::new("role_delete", result.is_ok(), Duration::ZERO).role(name));

        if result.is_ok() {
            info!(role = %name, "Role deleted");
        }
        result
    }

    /// Role names in sorted order.
    pub async fn list_roles(&self) -> Result<Vec<String>> {
        let names = self.roles.list().await?;
        self.emitter.emit_role_list(&Context::current(), names.len());
        Ok(names)
    }

    /// Issue a bearer token for the role named in `request`.
    pub async fn generate_token(&self, request: TokenRequest) -> Result<BearerToken> {
        let started = Instant::now();
        let cx = self.emitter.emit_token_request(&Context::current(), &request.role);

        let result = self.issue(&request, &cx).await;
        let duration = started.elapsed();

        match &result {
            Ok(_) => self.emitter.emit_token_success(&cx, &request.role, duration),
            Err(e) => self.emitter.emit_token_failure(&cx, &request.role, duration, e),
        }
        self.emitter.end_span(&cx);

        let mut event = AuditEvent::new("token_generate", result.is_ok(), duration)
            .role(&request.role)
            .client_addr(request.client_addr.as_deref());
        if let Err(e) = &result {
            event = event.error(e);
        }
        audit(&event);

        result
    }

    async fn issue(&self, request: &TokenRequest, cx: &Context) -> Result<BearerToken> {
        let started = Instant::now();
        let role = self
            .roles
            .get(&request.role)
            .await?
            .ok_or_else(|| Error::not_found("role", &request.role))?;
        let config = self.configs.get().await?.ok_or(Error::NotConfigured)?;
        let issuance = IssuanceRequest::build(&config, &role, request.context.as_deref())?;

        let issuer = self.issuer.clone();
        let task_cx = cx.clone();
        let result = TimeoutGovernor::new(issuance.request_timeout)
            .run(move |cancel| async move { issuer.issue(&issuance, &cancel, &task_cx).await })
            .await;

        let duration = started.elapsed();
        self.stats.record(duration, result.is_ok());
        debug!(
            role = %request.role,
            duration_ms = duration.as_millis() as u64,
            success = result.is_ok(),
            "token issuance finished"
        );
        result
    }

    /// Check configuration and upstream connectivity.
    ///
    /// Never fails; problems are reported in the returned value.
    pub async fn health(&self) -> HealthReport {
        let started = Instant::now();
        let mut report = HealthReport {
            timestamp: Utc::now(),
            healthy: false,
            configuration_status: "ok",
            connectivity_status: None,
            response_time_ms: None,
            error: None,
            circuit_breaker: self.issuer.breaker().stats(),
        };

        match self.configs.get().await {
            Err(e) => {
                report.configuration_status = "error";
                report.error = Some(format!("failed to load configuration: {}", e));
            }
            Ok(None) => {
                report.configuration_status = "not_configured";
                report.error = Some(Error::NotConfigured.to_string());
            }
            Ok(Some(config)) => {
                let check_started = Instant::now();
                let issuer = self.issuer.clone();
                let result = TimeoutGovernor::new(config.request_timeout())
                    .run(move |cancel| async move { issuer.check_connectivity(&config, &cancel).await })
                    .await;

                report.response_time_ms = Some(check_started.elapsed().as_millis() as u64);
                match result {
                    Ok(()) => {
                        report.healthy = true;
                        report.connectivity_status = Some("ok");
                    }
                    Err(e) => {
                        report.connectivity_status = Some("failed");
                        report.error = Some(e.to_string());
                    }
                }
                report.circuit_breaker = self.issuer.breaker().stats();
            }
        }

        self.emitter.emit_health_check(
            &Context::current(),
            report.healthy,
            started.elapsed(),
            report.error.as_deref(),
        );
        report
    }

    /// Token counters accumulated since start (or the last reset) plus breaker state.
    pub fn metrics_report(&self) -> MetricsReport {
        MetricsReport { tokens: self.stats.snapshot(), circuit_breaker: self.issuer.breaker().stats() }
    }
}
