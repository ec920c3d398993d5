//! Remote backup of generated files to Google Drive.
//!
//! Uploads go through the Drive v3 `multipart/related` create call: one
//! request carries both the JSON metadata (name, parent folder) and the file
//! bytes. Every failure is returned as a [`SinkError`] for the pipeline to
//! report; nothing here can fail a user's request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::credential::{TokenProvider, DRIVE_FILE_SCOPE};
use crate::error::SinkError;
use crate::google;

/// Drive v3 media upload endpoint.
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Requester segment used in backup names when no e-mail was given.
pub const ANONYMOUS_REQUESTER: &str = "anonymous";

/// A file to back up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Name the file gets in the backup folder.
    pub name: String,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl BackupFile {
    /// Create a backup file named `<requester>_<YYYYmmdd_HHMMSS>_<filename>`.
    #[must_use]
    pub fn named(
        requester: Option<&str>,
        at: DateTime<Utc>,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Self {
        Self {
            name: backup_name(requester, at, filename),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }
}

/// Name a backup copy after its requester and upload time.
#[must_use]
pub fn backup_name(requester: Option<&str>, at: DateTime<Utc>, filename: &str) -> String {
    format!(
        "{}_{}_{filename}",
        requester.unwrap_or(ANONYMOUS_REQUESTER),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Where a backup copy ended up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredFile {
    /// Drive file id.
    pub id: String,
    /// Shareable view link, when the service returned one.
    #[serde(rename = "webViewLink", default)]
    pub link: Option<String>,
}

/// Durable storage for generated files.
#[async_trait::async_trait]
pub trait StorageSink: Send + Sync + std::fmt::Debug {
    /// Store one file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Disabled`] if the sink is not configured, or the
    /// auth, quota, or transport error that stopped the upload.
    async fn store(&self, file: &BackupFile) -> Result<StoredFile, SinkError>;
}

/// Sink used when the Google integration is not configured.
///
/// Every call fails with [`SinkError::Disabled`], which the pipeline reports
/// as a skipped step.
#[derive(Debug, Clone, Copy)]
pub struct DisabledSink {
    name: &'static str,
}

impl DisabledSink {
    /// Disabled Drive backup.
    pub const BACKUP: Self = Self {
        name: "drive backup",
    };

    /// Disabled Sheets usage log.
    pub const USAGE_LOG: Self = Self {
        name: "usage log",
    };

    pub(crate) fn error(self) -> SinkError {
        SinkError::Disabled { sink: self.name }
    }
}

#[async_trait::async_trait]
impl StorageSink for DisabledSink {
    async fn store(&self, _file: &BackupFile) -> Result<StoredFile, SinkError> {
        Err(self.error())
    }
}

/// Uploads files into one Drive folder.
#[derive(Debug, Clone)]
pub struct DriveBackup {
    tokens: Arc<dyn TokenProvider>,
    http: reqwest::Client,
    folder_id: String,
    upload_url: String,
}

#[derive(serde::Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    parents: [&'a str; 1],
}

impl DriveBackup {
    /// Create a backup client for `folder_id`.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenProvider>, http: reqwest::Client, folder_id: impl Into<String>) -> Self {
        Self {
            tokens,
            http,
            folder_id: folder_id.into(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
        }
    }

    /// Use a different upload endpoint.
    #[must_use]
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    /// Build the `multipart/related` body and its boundary.
    fn multipart_body(&self, file: &BackupFile) -> Result<(String, Vec<u8>), SinkError> {
        let metadata = serde_json::to_vec(&FileMetadata {
            name: &file.name,
            parents: [self.folder_id.as_str()],
        })?;
        // derived from the content, so it cannot appear inside it
        let boundary = format!("synchrogen-{}", &blake3::hash(&file.bytes).to_hex()[..32]);

        let mut body = Vec::with_capacity(metadata.len() + file.bytes.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(&metadata);
        body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Ok((boundary, body))
    }
}

#[async_trait::async_trait]
impl StorageSink for DriveBackup {
    async fn store(&self, file: &BackupFile) -> Result<StoredFile, SinkError> {
        let token = self.tokens.access_token(DRIVE_FILE_SCOPE).await?;
        let (boundary, body) = self.multipart_body(file)?;

        debug!(name = %file.name, bytes = file.bytes.len(), "uploading backup");
        let resp = self
            .http
            .post(&self.upload_url)
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        let resp = google::check_response(resp).await?;
        Ok(resp.json().await?)
    }
}
