//! Circuit breaker guarding the upstream token exchange.
//!
//! # States
//! ```text
//! Closed    → Open:      failures >= max_failures
//! Open      → Half-Open: reset_timeout elapsed since the last failure
//! Half-Open → Closed:    the trial call succeeds
//! Half-Open → Open:      the trial call fails (failures is still >= max_failures)
//! ```
//!
//! One breaker failure is one failed *request*; the retry loop underneath counts attempts.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerInner {
    fn closed() -> Self {
        Self { state: CircuitState::Closed, failures: 0, last_failure: None, last_failure_at: None }
    }
}

/// Read-only snapshot for health and metrics read-outs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failures: u32,
    pub max_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_since_failure_secs: Option<f64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    inner: RwLock<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT)
    }
}

impl CircuitBreaker {
    /// `max_failures` of zero is treated as one.
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self { max_failures: max_failures.max(1), reset_timeout, inner: RwLock::new(BreakerInner::closed()) }
    }

    /// Run `operation` unless the breaker is open.
    ///
    /// The lock is held only for the pre-check and the bookkeeping afterwards,
    /// never across the operation itself. Errors from `operation` are returned
    /// unchanged; [`Error::CircuitOpen`] is only produced when short-circuiting.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.before_call()?;

        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.read().state
    }

    /// Force the breaker closed and forget failure history.
    pub fn reset(&self) {
        *self.write() = BreakerInner::closed();
        info!("circuit breaker reset");
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.read();
        BreakerStats {
            state: inner.state,
            failures: inner.failures,
            max_failures: self.max_failures,
            last_failure: inner.last_failure_at,
            time_since_failure_secs: inner.last_failure.map(|at| at.elapsed().as_secs_f64()),
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    fn before_call(&self) -> Result<()> {
        let mut inner = self.write();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let cooled_down =
            inner.last_failure.map_or(true, |at| at.elapsed() > self.reset_timeout);
        if cooled_down {
            inner.state = CircuitState::HalfOpen;
            debug!(failures = inner.failures, "circuit breaker half-open, probing upstream");
            Ok(())
        } else {
            Err(Error::CircuitOpen)
        }
    }

    fn on_success(&self) {
        let mut inner = self.write();
        if inner.state == CircuitState::HalfOpen {
            info!("circuit breaker closed after successful trial call");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.write();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        if inner.failures >= self.max_failures && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            warn!(
                failures = inner.failures,
                max_failures = self.max_failures,
                reset_timeout_secs = self.reset_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BreakerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BreakerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
