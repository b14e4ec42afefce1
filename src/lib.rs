//! # credbroker
//!
//! A credential broker that exchanges stored service-account credentials for
//! short-lived, role-scoped bearer tokens.
//!
//! ## Architecture
//!
//! ```text
//! CredentialBroker (config, roles, health, metrics)
//!     → TimeoutGovernor → CircuitBreaker → RetryPolicy → CredentialExchange
//!          ↓                                                  ↓
//!     Storage (config, history, roles)              Telemetry (spans, metrics)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use credbroker::config::BrokerSettings;
//! use credbroker::domain::{ConfigWrite, RoleWrite, TokenRequest};
//! use credbroker::exchange::ServiceAccountExchange;
//! use credbroker::services::CredentialBroker;
//! use credbroker::storage::InMemoryStorage;
//! use credbroker::telemetry::Emitter;
//!
//! #[tokio::main]
//! async fn main() -> credbroker::Result<()> {
//!     let settings = BrokerSettings::from_env()?;
//!     let exchange = ServiceAccountExchange::new().map_err(|e| credbroker::Error::config(e.to_string()))?;
//!     let broker = CredentialBroker::new(
//!         Arc::new(InMemoryStorage::new()),
//!         Arc::new(exchange),
//!         &settings.breaker,
//!         Emitter::noop(),
//!     );
//!
//!     broker
//!         .write_config(ConfigWrite {
//!             credentials_file_path: Some("/etc/credbroker/sa.json".into()),
//!             ..Default::default()
//!         })
//!         .await?;
//!     broker
//!         .write_role("reader", RoleWrite { role_ids: Some(vec!["r-1".into()]), ..Default::default() })
//!         .await?;
//!
//!     let token = broker.generate_token(TokenRequest::for_role("reader")).await?;
//!     println!("{}", token.token_type);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod domain;
pub mod errors;
pub mod exchange;
pub mod observability;
pub mod resilience;
pub mod secrets;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use errors::{Error, Result};
pub use services::{CredentialBroker, TokenIssuer};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
