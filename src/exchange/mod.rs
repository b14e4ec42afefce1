//! Upstream credential exchange.
//!
//! The broker only depends on [`CredentialExchange`]: trade a long-lived
//! credential plus scoped identifiers for a short-lived bearer token. The
//! operation is fallible, may be slow, and is not trusted to fail cleanly;
//! callers contain panics at their own boundary.

pub mod service_account;

use crate::domain::{BearerToken, CredentialSource};
use async_trait::async_trait;

pub use service_account::ServiceAccountExchange;

/// Failure of a single exchange attempt.
#[derive(thiserror::Error, Debug)]
pub enum ExchangeError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("failed to read credentials file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("token endpoint returned an empty access token")]
    EmptyToken,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Exchange `credentials` for a bearer token scoped to `role_ids`.
    ///
    /// `role_ids` may be empty for connectivity checks.
    async fn exchange(
        &self,
        credentials: &CredentialSource,
        role_ids: &[String],
        context: Option<&str>,
    ) -> Result<BearerToken, ExchangeError>;
}
