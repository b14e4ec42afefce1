//! # Error Types
//!
//! Error taxonomy for the token-issuance path and the storage/config plumbing around it.

use crate::exchange::ExchangeError;
use std::time::Duration;

/// Custom result type for broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the credential broker
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed role or configuration. Never retried.
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The circuit breaker is shedding load; the upstream was not called.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Every attempt against the upstream failed. The last attempt's error is
    /// part of the message and is not repeated as the error source.
    #[error("failed to generate bearer token after {attempts} attempts: {last_error}")]
    Issuance { attempts: u32, last_error: ExchangeError },

    /// The deadline fired before issuance produced a result.
    #[error("token generation timeout after {timeout:?}: {cause}")]
    Timeout { timeout: Duration, cause: String },

    /// A panic raised inside the credential exchange, caught at the issuer boundary.
    #[error("recovered from panic during {operation}: {message}")]
    PanicRecovered { operation: String, message: String },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// No backend configuration has been written yet
    #[error("backend not configured")]
    NotConfigured,

    /// Storage backend errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Process-level configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The request was abandoned by its caller before completing
    #[error("operation cancelled")]
    Cancelled,

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Create a recovered-panic error
    pub fn panic_recovered<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::PanicRecovered { operation: operation.into(), message: message.into() }
    }

    /// Stable label used for the `error_type` metric dimension and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::CircuitOpen => "circuit_open",
            Error::Issuance { .. } => "issuance",
            Error::Timeout { .. } => "timeout",
            Error::PanicRecovered { .. } => "panic_recovered",
            Error::NotFound { .. } => "not_found",
            Error::NotConfigured => "not_configured",
            Error::Storage { .. } => "storage",
            Error::Serialization { .. } => "serialization",
            Error::Config { .. } => "config",
            Error::Cancelled => "cancelled",
            Error::Internal { .. } => "internal",
        }
    }

    /// Whether a caller may reasonably repeat the request later.
    ///
    /// Only exhausted upstream failures qualify. Hangs and recovered panics are
    /// not retried, and a validation error will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Issuance { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        let field = fields.first().map(|(field, _)| field.to_string());
        Self::Validation { message: format!("Validation failed: {}", message), field }
    }
}
