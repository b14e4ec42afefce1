//! # Observability Infrastructure
//!
//! Structured logging, the audit trail, the Prometheus exporter and the
//! in-process token statistics.

pub mod logging;
pub mod metrics;

pub use logging::{audit, init_logging, AuditEvent};
pub use self::metrics::{init_metrics, MetricsSnapshot, TokenStats};
