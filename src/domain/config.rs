//! Backend configuration: the service credential plus the retry and timeout budget.

use crate::domain::token::CredentialSource;
use crate::errors::{Error, Result};
use crate::secrets::{exposed, SecretString};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Stored backend configuration.
///
/// Exactly one of `credentials_file_path` and `credentials_json` must be set
/// once the config has passed [`BrokerConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct BrokerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file_path: Option<PathBuf>,

    #[serde(default, with = "exposed", skip_serializing_if = "Option::is_none")]
    pub credentials_json: Option<SecretString>,

    #[validate(range(max = 10, message = "max_retries must be between 0 and 10"))]
    pub max_retries: u32,

    #[validate(range(
        min = 1,
        max = 300,
        message = "request_timeout must be between 1 and 300 seconds"
    ))]
    #[serde(rename = "request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub version: u64,

    pub last_updated: DateTime<Utc>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            credentials_file_path: None,
            credentials_json: None,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            description: String::new(),
            tags: Vec::new(),
            version: 0,
            last_updated: Utc::now(),
        }
    }
}

impl BrokerConfig {
    /// Validate ranges and the exactly-one-credential-source rule.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        validate_credential_pair(
            self.credentials_file_path.as_ref(),
            self.credentials_json.as_ref(),
        )?
        .ok_or_else(|| {
            Error::validation_field(
                "either credentials_file_path or credentials_json must be provided",
                "credentials",
            )
        })?;
        Ok(())
    }

    /// The configured credential, if any.
    pub fn credential_source(&self) -> Option<CredentialSource> {
        CredentialSource::from_parts(
            self.credentials_file_path.as_ref(),
            self.credentials_json.as_ref(),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn credentials_type(&self) -> &'static str {
        if self.credentials_file_path.is_some() {
            "file_path"
        } else {
            "json"
        }
    }

    /// Merge a write request onto this config. Setting one credential source clears the other.
    pub fn apply(&mut self, write: ConfigWrite) -> Result<()> {
        if write.credentials_file_path.is_some() && write.credentials_json.is_some() {
            return Err(Error::validation_field(
                "only one of credentials_file_path or credentials_json can be provided",
                "credentials",
            ));
        }
        if let Some(path) = write.credentials_file_path {
            self.credentials_file_path = Some(path);
            self.credentials_json = None;
        }
        if let Some(json) = write.credentials_json {
            self.credentials_json = Some(json);
            self.credentials_file_path = None;
        }
        if let Some(max_retries) = write.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(timeout) = write.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(description) = write.description {
            self.description = description;
        }
        if let Some(tags) = write.tags {
            self.tags = tags;
        }
        Ok(())
    }
}

/// Fields accepted by a config write. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigWrite {
    pub credentials_file_path: Option<PathBuf>,
    pub credentials_json: Option<SecretString>,
    pub max_retries: Option<u32>,
    #[serde(rename = "request_timeout")]
    pub request_timeout_secs: Option<u64>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Perform one exchange before accepting the write. Defaults to true.
    pub validate_credentials: Option<bool>,
}

/// Operator-facing view of the stored config. Never carries the inline blob.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigMetadata {
    pub credentials_configured: bool,
    pub credentials_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file_path: Option<PathBuf>,
    pub description: String,
    pub tags: Vec<String>,
    pub max_retries: u32,
    pub request_timeout: u64,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
}

impl From<&BrokerConfig> for ConfigMetadata {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            credentials_configured: config.credential_source().is_some(),
            credentials_type: config.credentials_type(),
            credentials_file_path: config.credentials_file_path.clone(),
            description: config.description.clone(),
            tags: config.tags.clone(),
            max_retries: config.max_retries,
            request_timeout: config.request_timeout_secs,
            version: config.version,
            last_updated: config.last_updated,
        }
    }
}

/// Shared by config and role validation: at most one source, and inline JSON must parse.
///
/// Returns `Ok(None)` when neither source is set.
pub(crate) fn validate_credential_pair(
    file_path: Option<&PathBuf>,
    json: Option<&SecretString>,
) -> Result<Option<CredentialSource>> {
    match (file_path, json) {
        (Some(_), Some(_)) => Err(Error::validation_field(
            "only one of credentials_file_path or credentials_json can be provided",
            "credentials",
        )),
        (Some(path), None) if path.as_os_str().is_empty() => Err(Error::validation_field(
            "credentials_file_path cannot be empty",
            "credentials_file_path",
        )),
        (None, Some(blob)) => {
            serde_json::from_str::<serde_json::Value>(blob.expose_secret()).map_err(|e| {
                Error::validation_field(
                    format!("credentials_json must be valid JSON: {}", e),
                    "credentials_json",
                )
            })?;
            Ok(CredentialSource::from_parts(None, Some(blob)))
        }
        (path, None) => Ok(CredentialSource::from_parts(path, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_file() -> BrokerConfig {
        BrokerConfig {
            credentials_file_path: Some(PathBuf::from("/etc/broker/sa.json")),
            ..Default::default()
        }
    }

    #[test]
    fn exactly_one_credential_source_passes() {
        assert!(with_file().validate().is_ok());

        let inline = BrokerConfig {
            credentials_json: Some(SecretString::new(r#"{"clientID":"c"}"#)),
            ..Default::default()
        };
        assert!(inline.validate().is_ok());
    }

    #[test]
    fn both_credential_sources_rejected() {
        let config = BrokerConfig {
            credentials_json: Some(SecretString::new("{}")),
            ..with_file()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("only one of"));
    }

    #[test]
    fn missing_credential_source_rejected() {
        let err = BrokerConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("must be provided"));
    }

    #[test]
    fn malformed_inline_json_rejected() {
        let config = BrokerConfig {
            credentials_json: Some(SecretString::new("not json")),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("credentials_json must be valid JSON"));
    }

    #[test]
    fn retry_and_timeout_ranges() {
        assert!(BrokerConfig { max_retries: 0, ..with_file() }.validate().is_ok());
        assert!(BrokerConfig { max_retries: 10, ..with_file() }.validate().is_ok());
        assert!(BrokerConfig { max_retries: 11, ..with_file() }.validate().is_err());

        assert!(BrokerConfig { request_timeout_secs: 0, ..with_file() }.validate().is_err());
        assert!(BrokerConfig { request_timeout_secs: 1, ..with_file() }.validate().is_ok());
        assert!(BrokerConfig { request_timeout_secs: 300, ..with_file() }.validate().is_ok());
        let err = BrokerConfig { request_timeout_secs: 301, ..with_file() }.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout must be between 1 and 300"));
    }

    #[test]
    fn apply_switches_credential_source() {
        let mut config = with_file();
        config
            .apply(ConfigWrite {
                credentials_json: Some(SecretString::new("{}")),
                max_retries: Some(5),
                ..Default::default()
            })
            .unwrap();
        assert!(config.credentials_file_path.is_none());
        assert!(config.credentials_json.is_some());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.credentials_type(), "json");

        config
            .apply(ConfigWrite {
                credentials_file_path: Some(PathBuf::from("/tmp/sa.json")),
                ..Default::default()
            })
            .unwrap();
        assert!(config.credentials_json.is_none());
        assert_eq!(config.credentials_type(), "file_path");
    }

    #[test]
    fn apply_rejects_both_sources_in_one_write() {
        let mut config = with_file();
        let err = config
            .apply(ConfigWrite {
                credentials_file_path: Some(PathBuf::from("/a")),
                credentials_json: Some(SecretString::new("{}")),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn storage_round_trip_keeps_inline_blob_but_metadata_hides_it() {
        let config = BrokerConfig {
            credentials_json: Some(SecretString::new(r#"{"clientID":"c"}"#)),
            ..Default::default()
        };
        let stored = serde_json::to_string(&config).unwrap();
        assert!(stored.contains("clientID"));
        let back: BrokerConfig = serde_json::from_str(&stored).unwrap();
        assert_eq!(back, config);

        let metadata = serde_json::to_value(ConfigMetadata::from(&config)).unwrap();
        assert_eq!(metadata["credentials_type"], "json");
        assert!(!metadata.to_string().contains("clientID"));
    }
}
