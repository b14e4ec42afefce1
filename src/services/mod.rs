//! Business logic services
//!
//! [`TokenIssuer`] runs the resilient issuance pipeline; [`CredentialBroker`]
//! wraps it with storage, configuration and role lifecycle for the host.

pub mod broker;
pub mod token_issuer;

pub use broker::{CredentialBroker, HealthReport, MetricsReport};
pub use token_issuer::{TokenIssuer, HEALTH_CHECK_ROLE};
