//! Domain layer
//!
//! Backend configuration, roles and the per-request issuance values built from
//! them. Validation lives with the types; nothing here touches storage or the
//! network.

pub mod config;
pub mod role;
pub mod token;

pub use config::{
    BrokerConfig, ConfigMetadata, ConfigWrite, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use role::{Role, RoleMetadata, RoleWrite, MULTIPLE_ROLE_IDS_MESSAGE};
pub use token::{resolve_credentials, BearerToken, CredentialSource, IssuanceRequest, TokenRequest};
