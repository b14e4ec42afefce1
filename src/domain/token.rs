//! Per-request issuance values. Nothing here is persisted.

use crate::domain::config::BrokerConfig;
use crate::domain::role::Role;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the long-lived service credential comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    FilePath(PathBuf),
    Inline(SecretString),
}

impl CredentialSource {
    /// File path wins when both are present; callers validate before that can happen.
    pub fn from_parts(file_path: Option<&PathBuf>, json: Option<&SecretString>) -> Option<Self> {
        match (file_path, json) {
            (Some(path), _) => Some(Self::FilePath(path.clone())),
            (None, Some(blob)) if !blob.is_blank() => Some(Self::Inline(blob.clone())),
            _ => None,
        }
    }

    /// `file_path` or `json`; used as a telemetry attribute and in read-outs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FilePath(_) => "file_path",
            Self::Inline(_) => "json",
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::FilePath(path) => Some(path),
            Self::Inline(_) => None,
        }
    }
}

/// Pick the credential for a request: role override first, then the backend credential.
pub fn resolve_credentials(role: Option<&Role>, config: &BrokerConfig) -> Result<CredentialSource> {
    role.and_then(Role::credential_override)
        .or_else(|| config.credential_source())
        .ok_or_else(|| Error::validation_field("no credentials configured", "credentials"))
}

/// Everything one token request needs, snapshotted from config and role at call time.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub role_name: String,
    pub role_ids: Vec<String>,
    pub credentials: CredentialSource,
    pub context: Option<String>,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl IssuanceRequest {
    /// Validate the role and resolve exactly one credential source.
    ///
    /// `context` overrides the role's default context when present.
    pub fn build(config: &BrokerConfig, role: &Role, context: Option<&str>) -> Result<Self> {
        role.validate()?;
        let credentials = resolve_credentials(Some(role), config)?;
        let context = context
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| role.context.clone());

        Ok(Self {
            role_name: role.name.clone(),
            role_ids: role.role_ids.clone(),
            credentials,
            context,
            max_retries: config.max_retries,
            request_timeout: config.request_timeout(),
        })
    }
}

/// Token returned by the upstream exchange.
///
/// `Debug` redacts the access token but `Serialize` writes it in clear, so a
/// host can return the token as its response body. Never serialize one into
/// logs or audit records.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BearerToken {
    #[serde(serialize_with = "crate::secrets::exposed::serialize_required")]
    pub access_token: SecretString,
    pub token_type: String,
}

impl BearerToken {
    pub fn new(access_token: impl Into<SecretString>, token_type: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), token_type: token_type.into() }
    }
}

/// Host-facing token request.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub role: String,
    pub context: Option<String>,
    /// Remote address of the caller, recorded in the audit entry.
    pub client_addr: Option<String>,
}

impl TokenRequest {
    pub fn for_role(role: impl Into<String>) -> Self {
        Self { role: role.into(), ..Default::default() }
    }
}
