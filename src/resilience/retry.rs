//! Bounded retry loop with exponential backoff.
//!
//! `max_retries = N` means up to `N + 1` attempts. Between attempts the loop
//! sleeps `base_delay * 2^attempt` (attempt is zero-indexed: 1s, 2s, 4s, ...),
//! Both an in-flight attempt and the sleep are abandoned as soon as the
//! cancellation token fires.

use crate::errors::{Error, Result};
use crate::exchange::ExchangeError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Why a single attempt did not produce a token.
#[derive(Debug)]
pub enum AttemptFailure {
    /// Upstream said no; back off and try again while budget remains.
    Exchange(ExchangeError),
    /// Stop the loop and return this error as-is.
    Abort(Error),
}

impl From<ExchangeError> for AttemptFailure {
    fn from(error: ExchangeError) -> Self {
        Self::Exchange(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, base_delay: DEFAULT_BASE_DELAY }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept after the zero-indexed `attempt` fails.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `attempt_fn` until it succeeds, aborts, or the budget is spent.
    ///
    /// Attempts are strictly sequential. Exhaustion yields [`Error::Issuance`]
    /// carrying the last upstream error and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptFailure>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = attempt_fn(attempt) => outcome,
            };
            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(AttemptFailure::Abort(error)) => return Err(error),
                Err(AttemptFailure::Exchange(error)) => error,
            };

            warn!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                error = %error,
                "token generation attempt failed"
            );

            if attempt >= self.max_retries {
                return Err(Error::Issuance { attempts: attempt + 1, last_error: error });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.backoff(attempt)) => {}
            }
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::domain::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.max_attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_makes_n_plus_one_attempts_with_growing_backoff() {
        let policy = RetryPolicy::new(3);
        let started = Instant::now();
        let seen: Arc<Mutex<Vec<Duration>>> = Arc::default();

        let result: Result<()> = policy
            .run(&CancellationToken::new(), |_| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(started.elapsed());
                    Err::<(), _>(AttemptFailure::from(ExchangeError::Other("denied".into())))
                }
            })
            .await;

        match result {
            Err(Error::Issuance { attempts, last_error }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error.to_string(), "denied");
            }
            other => panic!("expected issuance error, got {:?}", other),
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];
        for (gap, floor) in gaps.iter().zip(expected) {
            assert!(*gap >= floor, "gap {:?} shorter than {:?}", gap, floor);
        }
        assert!(gaps.windows(2).all(|w| w[1] > w[0]));
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_immediately() {
        let policy = RetryPolicy::new(3);
        let calls = Arc::new(Mutex::new(0u32));

        let value = policy
            .run(&CancellationToken::new(), |attempt| {
                let calls = Arc::clone(&calls);
                async move {
                    *calls.lock().unwrap() += 1;
                    if attempt == 0 {
                        Err(AttemptFailure::from(ExchangeError::EmptyToken))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_skips_remaining_attempts() {
        let policy = RetryPolicy::new(5);
        let started = Instant::now();

        let result: Result<()> = policy
            .run(&CancellationToken::new(), |_| async {
                Err::<(), _>(AttemptFailure::Abort(Error::panic_recovered("exchange", "boom")))
            })
            .await;

        assert!(matches!(result, Err(Error::PanicRecovered { .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let result: Result<()> = RetryPolicy::new(0)
            .run(&CancellationToken::new(), |_| async {
                Err::<(), _>(AttemptFailure::from(ExchangeError::EmptyToken))
            })
            .await;
        assert!(matches!(result, Err(Error::Issuance { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy::new(10);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<()> = policy
            .run(&cancel, |_| async {
                Err::<(), _>(AttemptFailure::from(ExchangeError::EmptyToken))
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();
        let started = Instant::now();
        let result: Result<()> = RetryPolicy::new(3)
            .run(&cancel, move |_| {
                *counter.lock().unwrap() += 1;
                std::future::pending::<std::result::Result<(), AttemptFailure>>()
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }
}
