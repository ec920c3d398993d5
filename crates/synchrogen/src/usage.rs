//! Usage log rows appended to a Google Sheet.
//!
//! The log is append-only with no deduplication: recording the same entry
//! twice appends two rows. Cells are sent with `valueInputOption=RAW`, so a
//! requester or intersection name that looks like a formula is stored as
//! text.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::backup::{DisabledSink, ANONYMOUS_REQUESTER};
use crate::credential::{TokenProvider, SPREADSHEETS_SCOPE};
use crate::error::SinkError;
use crate::google;

/// Sheets v4 API root.
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Link column value when no backup link exists.
const NO_LINK: &str = "N/A";

/// Outcome recorded in the status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    /// Files were generated and, if configured, backed up.
    Success,
    /// Files were generated but the backup upload failed.
    BackupFailed,
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "Success",
            Self::BackupFailed => "Backup failed",
        })
    }
}

/// One usage log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLogEntry {
    /// When the files were generated.
    pub timestamp: DateTime<Utc>,
    /// Requester e-mail, if one was given.
    pub requester: Option<String>,
    /// Intersection names in request order.
    pub intersections: Vec<String>,
    /// Network text filename.
    pub filename: String,
    /// Backup link of the network text file.
    pub backup_link: Option<String>,
    /// Generation outcome.
    pub status: UsageStatus,
}

impl UsageLogEntry {
    /// Cells for columns A to F.
    #[must_use]
    pub fn row(&self) -> [String; 6] {
        [
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.requester.clone().unwrap_or_else(|| ANONYMOUS_REQUESTER.to_string()),
            self.intersections.join(", "),
            self.filename.clone(),
            self.backup_link.clone().unwrap_or_else(|| NO_LINK.to_string()),
            self.status.to_string(),
        ]
    }
}

/// Append-only record of generations.
#[async_trait::async_trait]
pub trait LogSink: Send + Sync + std::fmt::Debug {
    /// Append `entry` as a new row.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Disabled`] if the sink is not configured, or the
    /// auth, quota, or transport error that stopped the append.
    async fn append(&self, entry: &UsageLogEntry) -> Result<(), SinkError>;
}

#[async_trait::async_trait]
impl LogSink for DisabledSink {
    async fn append(&self, _entry: &UsageLogEntry) -> Result<(), SinkError> {
        Err(self.error())
    }
}

/// Appends rows with `spreadsheets.values.append`.
#[derive(Debug, Clone)]
pub struct SheetsLog {
    tokens: Arc<dyn TokenProvider>,
    http: reqwest::Client,
    sheet_id: String,
    range: String,
    api_url: String,
}

impl SheetsLog {
    /// Create a log writing to `range` (e.g. `Sheet1!A:F`) of `sheet_id`.
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        http: reqwest::Client,
        sheet_id: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            http,
            sheet_id: sheet_id.into(),
            range: range.into(),
            api_url: SHEETS_API_URL.to_string(),
        }
    }

    /// Use a different API root.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn append_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_url,
            urlencoding::encode(&self.sheet_id),
            urlencoding::encode(&self.range)
        )
    }
}

#[async_trait::async_trait]
impl LogSink for SheetsLog {
    async fn append(&self, entry: &UsageLogEntry) -> Result<(), SinkError> {
        let token = self.tokens.access_token(SPREADSHEETS_SCOPE).await?;

        debug!(range = %self.range, filename = %entry.filename, "appending usage row");
        let resp = self
            .http
            .post(self.append_url())
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&json!({ "values": [entry.row()] }))
            .send()
            .await?;

        google::check_response(resp).await?;
        Ok(())
    }
}
