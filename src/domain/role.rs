//! Roles map a logical name to the scoped identifiers a token is issued for.

use crate::domain::config::validate_credential_pair;
use crate::domain::token::CredentialSource;
use crate::errors::{Error, Result};
use crate::secrets::{exposed, SecretString};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Message returned when a role names more than one scoped identifier.
pub const MULTIPLE_ROLE_IDS_MESSAGE: &str =
    "only one role_id is supported. for multiple roles please contact plugin admin";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Role {
    #[validate(length(min = 1, message = "role name is required"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub role_ids: Vec<String>,

    /// Per-role credential override; takes precedence over the backend credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file_path: Option<PathBuf>,

    #[serde(default, with = "exposed", skip_serializing_if = "Option::is_none")]
    pub credentials_json: Option<SecretString>,

    /// Context string sent with every token request unless the request carries its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: String::new(),
            role_ids: Vec::new(),
            credentials_file_path: None,
            credentials_json: None,
            context: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Exactly one scoped identifier, and at most one valid credential override.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        match self.role_ids.as_slice() {
            [] => return Err(Error::validation_field("role_ids is required", "role_ids")),
            [id] if id.trim().is_empty() => {
                return Err(Error::validation_field("role_id cannot be empty", "role_ids"))
            }
            [_] => {}
            _ => return Err(Error::validation_field(MULTIPLE_ROLE_IDS_MESSAGE, "role_ids")),
        }

        validate_credential_pair(self.credentials_file_path.as_ref(), self.credentials_json.as_ref())?;
        Ok(())
    }

    pub fn credential_override(&self) -> Option<CredentialSource> {
        CredentialSource::from_parts(self.credentials_file_path.as_ref(), self.credentials_json.as_ref())
    }

    /// Merge a write request onto this role. Setting one credential source clears the other.
    pub fn apply(&mut self, write: RoleWrite) -> Result<()> {
        if write.credentials_file_path.is_some() && write.credentials_json.is_some() {
            return Err(Error::validation_field(
                "only one of credentials_file_path or credentials_json can be provided",
                "credentials",
            ));
        }
        if let Some(description) = write.description {
            self.description = description;
        }
        if let Some(role_ids) = write.role_ids {
            self.role_ids = role_ids;
        }
        if let Some(path) = write.credentials_file_path {
            self.credentials_file_path = Some(path);
            self.credentials_json = None;
        }
        if let Some(json) = write.credentials_json {
            self.credentials_json = Some(json);
            self.credentials_file_path = None;
        }
        if let Some(context) = write.context {
            self.context = Some(context).filter(|c| !c.is_empty());
        }
        if let Some(tags) = write.tags {
            self.tags = tags;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Fields accepted by a role write. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleWrite {
    pub description: Option<String>,
    pub role_ids: Option<Vec<String>>,
    pub credentials_file_path: Option<PathBuf>,
    pub credentials_json: Option<SecretString>,
    /// An empty string clears the stored context.
    pub context: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Operator-facing view of a role. Never carries credentials.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoleMetadata {
    pub name: String,
    pub description: String,
    pub role_ids: Vec<String>,
    pub tags: Vec<String>,
    pub has_credentials_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Role> for RoleMetadata {
    fn from(role: &Role) -> Self {
        let credentials = role.credential_override();
        Self {
            name: role.name.clone(),
            description: role.description.clone(),
            role_ids: role.role_ids.clone(),
            tags: role.tags.clone(),
            has_credentials_override: credentials.is_some(),
            credentials_type: credentials.as_ref().map(CredentialSource::kind),
            context: role.context.clone(),
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}
