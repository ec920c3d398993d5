//! Google service-account credential and OAuth token exchange.
//!
//! The credential is loaded once at startup, wrapped in an `Arc` and never
//! mutated. Each remote call exchanges a freshly signed RS256 assertion for
//! a bearer token scoped to that call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::SinkError;

/// Scope for creating files in Drive folders the account can see.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Scope for reading and writing spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion. Google caps this at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Errors loading or using a service-account credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The key file could not be read.
    #[error("failed to read credential file {path}: {source}")]
    Read {
        /// Path to the key file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The key material is not valid JSON.
    #[error("credential is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required key field is absent or empty.
    #[error("credential is missing '{0}'")]
    MissingField(&'static str),

    /// The key is not a service-account key.
    #[error("expected a service_account credential, got '{0}'")]
    WrongType(String),

    /// The private key could not be parsed or used for signing.
    #[error("invalid private key: {0}")]
    Key(String),
}

#[derive(Deserialize)]
struct RawCredential {
    #[serde(rename = "type")]
    kind: Option<String>,
    project_id: Option<String>,
    private_key_id: Option<String>,
    private_key: Option<String>,
    client_email: Option<String>,
    token_uri: Option<String>,
}

/// A Google service-account identity.
#[derive(Clone)]
pub struct BackupCredential {
    project_id: Option<String>,
    private_key_id: String,
    private_key: String,
    client_email: String,
    token_uri: String,
}

impl std::fmt::Debug for BackupCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupCredential")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, CredentialError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(CredentialError::MissingField(field))
}

impl BackupCredential {
    /// Parse a service-account JSON key.
    ///
    /// The private key is checked for usability here so a bad secret fails
    /// at startup rather than on the first upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a field is missing, or the
    /// private key is not an RSA PEM key.
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        let raw: RawCredential = serde_json::from_str(json)?;

        if let Some(kind) = raw.kind.as_deref() {
            if kind != "service_account" {
                return Err(CredentialError::WrongType(kind.to_string()));
            }
        }

        let credential = Self {
            project_id: raw.project_id,
            private_key_id: required(raw.private_key_id, "private_key_id")?,
            private_key: required(raw.private_key, "private_key")?,
            client_email: required(raw.client_email, "client_email")?,
            token_uri: required(raw.token_uri, "token_uri")?,
        };
        credential.encoding_key()?;
        Ok(credential)
    }

    /// Read and parse a service-account JSON key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The service account's e-mail address.
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// The OAuth token endpoint.
    #[must_use]
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    fn encoding_key(&self) -> Result<EncodingKey, CredentialError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| CredentialError::Key(e.to_string()))
    }

    /// Sign a JWT-bearer assertion for `scope`, issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_assertion(&self, scope: &str, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.private_key_id.clone());

        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.encoding_key()?)
            .map_err(|e| CredentialError::Key(e.to_string()))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Source of OAuth bearer tokens.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    /// Obtain a bearer token valid for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Auth`] if the exchange is refused, or a transport
    /// error if the token endpoint cannot be reached.
    async fn access_token(&self, scope: &str) -> Result<String, SinkError>;
}

/// Exchanges signed service-account assertions for access tokens.
#[derive(Debug, Clone)]
pub struct ServiceAccountTokens {
    credential: Arc<BackupCredential>,
    http: reqwest::Client,
}

impl ServiceAccountTokens {
    /// Create a token provider for `credential`.
    #[must_use]
    pub fn new(credential: Arc<BackupCredential>, http: reqwest::Client) -> Self {
        Self { credential, http }
    }
}

#[async_trait::async_trait]
impl TokenProvider for ServiceAccountTokens {
    async fn access_token(&self, scope: &str) -> Result<String, SinkError> {
        let assertion = self.credential.sign_assertion(scope, Utc::now())?;

        debug!(scope, account = %self.credential.client_email, "exchanging assertion");
        let resp = self
            .http
            .post(&self.credential.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::auth(format!(
                "token exchange returned {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token.access_token)
    }
}

/// A fixed token, for exercising API clients without a token endpoint.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct StaticToken(pub(crate) &'static str);

#[cfg(test)]
#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self, _scope: &str) -> Result<String, SinkError> {
        Ok(self.0.to_string())
    }
}

#[cfg(test)]
pub(crate) fn test_credential() -> BackupCredential {
    BackupCredential::from_json(include_str!("testdata/service_account.json"))
        .expect("fixture credential should parse")
}
