//! Common test utilities for all integration tests.
//!
//! Provides a mock upstream token endpoint, service-account credential
//! builders and broker construction helpers.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use credbroker::config::BreakerSettings;
use credbroker::domain::{BearerToken, ConfigWrite, CredentialSource, RoleWrite};
use credbroker::exchange::{CredentialExchange, ExchangeError, ServiceAccountExchange};
use credbroker::secrets::SecretString;
use credbroker::storage::InMemoryStorage;
use credbroker::telemetry::Emitter;
use credbroker::CredentialBroker;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/v1/auth/sa/oauth/token";
pub const TEST_KEY: &str = include_str!("../fixtures/service_account_key.pem");

/// Service-account JSON pointing at `token_uri`.
pub fn service_account_json(token_uri: &str) -> String {
    json!({
        "clientID": "client-1",
        "keyID": "key-1",
        "tokenURI": token_uri,
        "privateKey": TEST_KEY,
    })
    .to_string()
}

/// Write service-account JSON to a temporary file that lives as long as the handle.
pub fn service_account_file(token_uri: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(service_account_json(token_uri).as_bytes()).expect("write credentials");
    file
}

/// Mock token endpoint answering every POST with `access_token`.
pub async fn token_server(access_token: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": access_token,
            "tokenType": "Bearer",
        })))
        .mount(&server)
        .await;
    server
}

/// Mock token endpoint rejecting every request with `status`.
pub async fn failing_token_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string("rejected"))
        .mount(&server)
        .await;
    server
}

pub fn token_uri(server: &MockServer) -> String {
    format!("{}{}", server.uri(), TOKEN_PATH)
}

pub fn inline_config(token_uri: &str, max_retries: u32) -> ConfigWrite {
    ConfigWrite {
        credentials_json: Some(SecretString::new(service_account_json(token_uri))),
        max_retries: Some(max_retries),
        ..Default::default()
    }
}

pub fn role(role_id: &str) -> RoleWrite {
    RoleWrite { role_ids: Some(vec![role_id.to_string()]), ..Default::default() }
}

pub fn breaker_settings(max_failures: u32, reset_timeout: Duration) -> BreakerSettings {
    BreakerSettings { max_failures, reset_timeout }
}

/// Broker over in-memory storage with a real service-account exchange and a
/// 1ms retry backoff base.
pub fn broker(settings: &BreakerSettings) -> CredentialBroker {
    let exchange = ServiceAccountExchange::new().expect("build http client");
    broker_with_exchange(Arc::new(exchange), settings)
}

pub fn broker_with_exchange(
    exchange: Arc<dyn CredentialExchange>,
    settings: &BreakerSettings,
) -> CredentialBroker {
    CredentialBroker::new(Arc::new(InMemoryStorage::new()), exchange, settings, Emitter::noop())
        .with_retry_base_delay(Duration::from_millis(1))
}

/// Exchange that panics on every call.
#[derive(Debug, Default)]
pub struct PanickingExchange {
    pub calls: AtomicU32,
}

#[async_trait]
impl CredentialExchange for PanickingExchange {
    async fn exchange(
        &self,
        _credentials: &CredentialSource,
        _role_ids: &[String],
        _context: Option<&str>,
    ) -> Result<BearerToken, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("upstream client crashed");
    }
}

/// Exchange that never completes.
#[derive(Debug, Default)]
pub struct HangingExchange;

#[async_trait]
impl CredentialExchange for HangingExchange {
    async fn exchange(
        &self,
        _credentials: &CredentialSource,
        _role_ids: &[String],
        _context: Option<&str>,
    ) -> Result<BearerToken, ExchangeError> {
        std::future::pending::<()>().await;
        Err(ExchangeError::Other("unreachable".to_string()))
    }
}
