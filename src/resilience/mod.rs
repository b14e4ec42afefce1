//! Resilience primitives for the upstream token exchange.
//!
//! ```text
//! TimeoutGovernor (deadline, cancellation)
//!     → CircuitBreaker (request-level failure tracking)
//!         → RetryPolicy (attempt-level backoff)
//!             → credential exchange
//! ```

pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use retry::{AttemptFailure, RetryPolicy};
pub use timeout::TimeoutGovernor;
