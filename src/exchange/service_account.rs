//! Service-account JWT bearer exchange.
//!
//! The credential is a JSON document with `clientID`, `keyID`, `tokenURI` and
//! `privateKey` (PEM, RSA). Each exchange signs a short-lived RS256 assertion
//! and posts it to `tokenURI` as a `jwt-bearer` grant.

use super::{CredentialExchange, ExchangeError};
use crate::domain::{BearerToken, CredentialSource};
use crate::secrets::SecretString;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ServiceAccountCredentials {
    #[serde(rename = "clientID")]
    client_id: String,
    #[serde(rename = "keyID")]
    key_id: String,
    #[serde(rename = "tokenURI")]
    token_uri: String,
    #[serde(rename = "privateKey")]
    private_key: SecretString,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    key: &'a str,
    aud: &'a str,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ctx: Option<&'a str>,
}

#[derive(Serialize)]
struct TokenGrant<'a> {
    grant_type: &'static str,
    assertion: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Clone)]
pub struct ServiceAccountExchange {
    client: reqwest::Client,
}

impl ServiceAccountExchange {
    pub fn new() -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_HTTP_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn load(credentials: &CredentialSource) -> Result<ServiceAccountCredentials, ExchangeError> {
        let raw = match credentials {
            CredentialSource::FilePath(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|source| {
                    ExchangeError::Io { path: path.display().to_string(), source }
                })?;
                SecretString::new(contents)
            }
            CredentialSource::Inline(blob) => blob.clone(),
        };

        let parsed: ServiceAccountCredentials = serde_json::from_str(raw.expose_secret())
            .map_err(|e| ExchangeError::InvalidCredentials(e.to_string()))?;

        if parsed.client_id.is_empty() || parsed.key_id.is_empty() || parsed.private_key.is_blank() {
            return Err(ExchangeError::InvalidCredentials(
                "clientID, keyID and privateKey must be non-empty".to_string(),
            ));
        }
        Url::parse(&parsed.token_uri).map_err(|e| {
            ExchangeError::InvalidCredentials(format!("tokenURI is not a valid URL: {}", e))
        })?;

        Ok(parsed)
    }

    fn sign_assertion(
        credentials: &ServiceAccountCredentials,
        context: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let claims = AssertionClaims {
            iss: &credentials.client_id,
            sub: &credentials.client_id,
            key: &credentials.key_id,
            aud: &credentials.token_uri,
            exp: chrono::Utc::now().timestamp() + ASSERTION_TTL_SECS,
            ctx: context,
        };
        let key = EncodingKey::from_rsa_pem(credentials.private_key.expose_secret().as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

#[async_trait]
impl CredentialExchange for ServiceAccountExchange {
    async fn exchange(
        &self,
        credentials: &CredentialSource,
        role_ids: &[String],
        context: Option<&str>,
    ) -> Result<BearerToken, ExchangeError> {
        let credentials = Self::load(credentials).await?;
        let assertion = Self::sign_assertion(&credentials, context)?;

        let scope = (!role_ids.is_empty()).then(|| {
            role_ids.iter().map(|id| format!("role:{}", id)).collect::<Vec<_>>().join(" ")
        });
        let grant = TokenGrant { grant_type: GRANT_TYPE, assertion: &assertion, scope };

        let response = self.client.post(&credentials.token_uri).json(&grant).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Upstream { status: status.as_u16(), body });
        }

        let token: TokenResponse = response.json().await?;
        Ok(BearerToken::new(token.access_token, token.token_type))
    }
}
