//! Token issuance orchestration.
//!
//! One request runs the whole retry loop as a single circuit-breaker
//! operation: the breaker counts exhausted requests, the retry loop counts
//! attempts. Every call into the upstream exchange runs behind a panic
//! boundary so a faulty exchange implementation fails the request instead of
//! the host.

use crate::domain::{
    resolve_credentials, BearerToken, BrokerConfig, CredentialSource, IssuanceRequest, Role,
};
use crate::errors::{Error, Result};
use crate::exchange::{CredentialExchange, ExchangeError};
use crate::resilience::{AttemptFailure, CircuitBreaker, RetryPolicy};
use crate::resilience::retry::DEFAULT_BASE_DELAY;
use crate::telemetry::{Emitter, EventError, Severity, UpstreamAuthEvent, UpstreamAuthStartEvent};
use futures::FutureExt;
use opentelemetry::Context;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Role name reported for connectivity checks.
pub const HEALTH_CHECK_ROLE: &str = "health-check";

const EXCHANGE_OPERATION: &str = "credential exchange";

#[derive(Clone)]
pub struct TokenIssuer {
    breaker: Arc<CircuitBreaker>,
    exchange: Arc<dyn CredentialExchange>,
    emitter: Emitter,
    base_delay: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("breaker", &self.breaker)
            .field("emitter", &self.emitter)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl TokenIssuer {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        exchange: Arc<dyn CredentialExchange>,
        emitter: Emitter,
    ) -> Self {
        Self { breaker, exchange, emitter, base_delay: DEFAULT_BASE_DELAY }
    }

    /// Base of the exponential backoff between attempts.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Validate `role`, resolve its credential and issue a token.
    ///
    /// Validation failures return before the breaker is consulted and never
    /// count as breaker failures.
    pub async fn generate_token(
        &self,
        config: &BrokerConfig,
        role: &Role,
        context: Option<&str>,
    ) -> Result<BearerToken> {
        let request = IssuanceRequest::build(config, role, context)?;
        self.issue(&request, &CancellationToken::new(), &Context::current()).await
    }

    /// Run the retry loop for an already validated request through the breaker.
    pub async fn issue(
        &self,
        request: &IssuanceRequest,
        cancel: &CancellationToken,
        cx: &Context,
    ) -> Result<BearerToken> {
        let policy = RetryPolicy::new(request.max_retries).with_base_delay(self.base_delay);
        let policy = &policy;
        let this = self;

        self.breaker
            .call(move || {
                policy.run(cancel, move |attempt| this.attempt(request, attempt, cx))
            })
            .await
    }

    /// One contained exchange with no retries and no breaker, used to check
    /// credentials before a config write is accepted.
    pub async fn verify_credentials(&self, credentials: &CredentialSource) -> Result<()> {
        match self.exchange_contained(credentials, &[], None).await {
            Ok(_) => Ok(()),
            Err(AttemptFailure::Exchange(last_error)) => {
                Err(Error::Issuance { attempts: 1, last_error })
            }
            Err(AttemptFailure::Abort(error)) => Err(error),
        }
    }

    /// Single-attempt connectivity check through the breaker using the backend credential.
    pub async fn check_connectivity(
        &self,
        config: &BrokerConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = IssuanceRequest {
            role_name: HEALTH_CHECK_ROLE.to_string(),
            role_ids: Vec::new(),
            credentials: resolve_credentials(None, config)?,
            context: None,
            max_retries: 0,
            request_timeout: config.request_timeout(),
        };
        self.issue(&request, cancel, &Context::current()).await.map(|_| ())
    }

    async fn attempt(
        &self,
        request: &IssuanceRequest,
        attempt: u32,
        cx: &Context,
    ) -> std::result::Result<BearerToken, AttemptFailure> {
        let credential_type = request.credentials.kind();
        let attempt_cx = self.emitter.emit_upstream_auth_start(
            cx,
            &UpstreamAuthStartEvent {
                role: &request.role_name,
                credential_type,
                role_ids_count: request.role_ids.len(),
                attempt,
            },
        );

        let started = Instant::now();
        let outcome = self
            .exchange_contained(&request.credentials, &request.role_ids, request.context.as_deref())
            .await;
        let duration = started.elapsed();

        let error: Option<EventError<'_>> = match &outcome {
            Ok(_) => None,
            Err(AttemptFailure::Exchange(e)) => Some(e as EventError<'_>),
            Err(AttemptFailure::Abort(e)) => Some(e as EventError<'_>),
        };
        self.emitter.emit_upstream_auth(
            &attempt_cx,
            &UpstreamAuthEvent { credential_type, success: outcome.is_ok(), duration, error },
        );
        if let Err(AttemptFailure::Abort(e)) = &outcome {
            self.emitter.emit_error(cx, EXCHANGE_OPERATION, e, Severity::Critical);
        }

        debug!(
            role = %request.role_name,
            attempt = attempt + 1,
            duration_ms = duration.as_millis() as u64,
            success = outcome.is_ok(),
            "upstream exchange finished"
        );
        outcome
    }

    async fn exchange_contained(
        &self,
        credentials: &CredentialSource,
        role_ids: &[String],
        context: Option<&str>,
    ) -> std::result::Result<BearerToken, AttemptFailure> {
        let exchange = self.exchange.exchange(credentials, role_ids, context);
        match AssertUnwindSafe(exchange).catch_unwind().await {
            Ok(Ok(token)) if token.access_token.is_blank() => {
                Err(AttemptFailure::Exchange(ExchangeError::EmptyToken))
            }
            Ok(Ok(token)) => Ok(token),
            Ok(Err(e)) => Err(AttemptFailure::Exchange(e)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    credential_type = credentials.kind(),
                    panic = %message,
                    "recovered from panic in credential exchange"
                );
                Err(AttemptFailure::Abort(Error::panic_recovered(EXCHANGE_OPERATION, message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use crate::secrets::SecretString;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Empty,
        FailTimes(u32),
    }

    #[derive(Debug)]
    struct FakeExchange {
        behaviour: Behaviour,
        calls: AtomicU32,
    }

    impl FakeExchange {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { behaviour, calls: AtomicU32::new(0) })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialExchange for FakeExchange {
        async fn exchange(
            &self,
            _credentials: &CredentialSource,
            role_ids: &[String],
            _context: Option<&str>,
        ) -> std::result::Result<BearerToken, ExchangeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(BearerToken::new(format!("token-{}", role_ids.len()), "Bearer")),
                Behaviour::Fail => Err(ExchangeError::Upstream { status: 503, body: "down".into() }),
                Behaviour::Panic => panic!("exchange exploded"),
                Behaviour::Empty => Ok(BearerToken::new("", "Bearer")),
                Behaviour::FailTimes(n) if call < n => Err(ExchangeError::Other("flaky".into())),
                Behaviour::FailTimes(_) => Ok(BearerToken::new("eventually", "Bearer")),
            }
        }
    }

    fn issuer(exchange: Arc<FakeExchange>, max_failures: u32) -> TokenIssuer {
        let breaker = Arc::new(CircuitBreaker::new(max_failures, Duration::from_secs(3600)));
        TokenIssuer::new(breaker, exchange, Emitter::default()).with_base_delay(Duration::from_millis(1))
    }

    fn config(max_retries: u32) -> BrokerConfig {
        BrokerConfig {
            credentials_json: Some(SecretString::new(r#"{"clientID":"c"}"#)),
            max_retries,
            ..Default::default()
        }
    }

    fn role() -> Role {
        let mut role = Role::new("reader");
        role.role_ids = vec!["r-1".to_string()];
        role
    }

    #[tokio::test]
    async fn success_returns_token_on_first_attempt() {
        let exchange = FakeExchange::new(Behaviour::Succeed);
        let issuer = issuer(Arc::clone(&exchange), 5);

        let token = issuer.generate_token(&config(3), &role(), None).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "token-1");
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let exchange = FakeExchange::new(Behaviour::FailTimes(2));
        let issuer = issuer(Arc::clone(&exchange), 5);

        let token = issuer.generate_token(&config(3), &role(), None).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "eventually");
        assert_eq!(exchange.calls(), 3);
        assert_eq!(issuer.breaker().stats().failures, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_count_as_one_breaker_failure() {
        let exchange = FakeExchange::new(Behaviour::Fail);
        let issuer = issuer(Arc::clone(&exchange), 5);

        let err = issuer.generate_token(&config(2), &role(), None).await.unwrap_err();
        match err {
            Error::Issuance { attempts, ref last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.to_string().contains("down"));
            }
            ref other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(exchange.calls(), 3);
        assert_eq!(issuer.breaker().stats().failures, 1);
    }

    #[tokio::test]
    async fn panic_is_contained_and_not_retried() {
        let exchange = FakeExchange::new(Behaviour::Panic);
        let issuer = issuer(Arc::clone(&exchange), 5);

        let err = issuer.generate_token(&config(3), &role(), None).await.unwrap_err();
        match err {
            Error::PanicRecovered { operation, message } => {
                assert_eq!(operation, EXCHANGE_OPERATION);
                assert_eq!(message, "exchange exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn empty_token_is_an_attempt_failure() {
        let exchange = FakeExchange::new(Behaviour::Empty);
        let issuer = issuer(Arc::clone(&exchange), 5);

        let err = issuer.generate_token(&config(1), &role(), None).await.unwrap_err();
        assert!(matches!(err, Error::Issuance { attempts: 2, last_error: ExchangeError::EmptyToken }));
    }

    #[tokio::test]
    async fn validation_failures_skip_the_exchange_and_the_breaker() {
        let exchange = FakeExchange::new(Behaviour::Succeed);
        let issuer = issuer(Arc::clone(&exchange), 1);

        let mut two_ids = role();
        two_ids.role_ids.push("r-2".to_string());
        let err = issuer.generate_token(&config(3), &two_ids, None).await.unwrap_err();
        assert!(err.to_string().contains("contact plugin admin"));

        let no_credentials = BrokerConfig::default();
        let err = issuer.generate_token(&no_credentials, &role(), None).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        assert_eq!(exchange.calls(), 0);
        assert_eq!(issuer.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_calling_exchange() {
        let exchange = FakeExchange::new(Behaviour::Fail);
        let issuer = issuer(Arc::clone(&exchange), 1);

        assert!(issuer.generate_token(&config(0), &role(), None).await.is_err());
        assert_eq!(issuer.breaker().state(), CircuitState::Open);

        let err = issuer.generate_token(&config(0), &role(), None).await.unwrap_err();
        assert!(matches!(err, Error::CircuitOpen));
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn verify_credentials_makes_one_attempt() {
        let exchange = FakeExchange::new(Behaviour::Fail);
        let issuer = issuer(Arc::clone(&exchange), 1);
        let source = CredentialSource::Inline(SecretString::new("{}"));

        let err = issuer.verify_credentials(&source).await.unwrap_err();
        assert!(matches!(err, Error::Issuance { attempts: 1, .. }));
        assert_eq!(exchange.calls(), 1);
        assert_eq!(issuer.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn connectivity_check_sends_no_role_ids() {
        let exchange = FakeExchange::new(Behaviour::Succeed);
        let issuer = issuer(Arc::clone(&exchange), 1);
        issuer.check_connectivity(&config(3), &CancellationToken::new()).await.unwrap();
        assert_eq!(exchange.calls(), 1);
    }

    #[test]
    fn panic_payloads_are_described() {
        let text: Box<dyn Any + Send> = Box::new("static text");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned text"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(text.as_ref()), "static text");
        assert_eq!(panic_message(owned.as_ref()), "owned text");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
