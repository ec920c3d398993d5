//! Error types for synchrogen.
//!
//! Only [`ValidationError`] and [`RenderError`] are ever shown to the person
//! who submitted the form. [`SinkError`] covers the remote side effects
//! (Drive backup and Sheets usage log) and is reported to the operator log
//! instead of failing the request.

use std::path::PathBuf;
use thiserror::Error;

use crate::credential::CredentialError;

/// The main error type for synchrogen operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    /// A submitted field was missing or out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A validated request could not be turned into output files.
    #[error(transparent)]
    Render(#[from] RenderError),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// The service-account credential could not be loaded.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    // === Network Errors ===
    /// An HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The HTTP server could not bind its listen address.
    #[error("failed to bind {addr}: {message}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for synchrogen operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is something the submitter can fix.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A form field was missing, malformed, or outside its allowed range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for '{field}': {message}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `lanes` or `intersections[1].speed`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// A required field was not supplied.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "field is required")
    }
}

/// A request value could not be mapped onto the network file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot render '{field}': {message}")]
pub struct RenderError {
    /// The request field that could not be rendered.
    pub field: String,
    /// Why it could not be rendered.
    pub message: String,
}

impl RenderError {
    /// Create a render error for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a remote side effect (backup upload or usage-log append).
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink has no credential or target configured.
    #[error("{sink} is not configured")]
    Disabled {
        /// Name of the sink.
        sink: &'static str,
    },

    /// The service rejected our credential or token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service refused the call for quota or rate-limit reasons.
    #[error("quota exceeded ({status}): {message}")]
    Quota {
        /// HTTP status code returned.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The service returned some other non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not finish within the configured timeout.
    #[error("timed out after {after_secs}s")]
    Timeout {
        /// Timeout that elapsed.
        after_secs: u64,
    },

    /// A request body or response could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SinkError {
    /// Create an authentication error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Check if this error is an authentication failure.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Check if this error is a quota or rate-limit refusal.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }
}

impl From<CredentialError> for SinkError {
    fn from(err: CredentialError) -> Self {
        Self::Auth(err.to_string())
    }
}
