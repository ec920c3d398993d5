//! Request pipeline: geocode, render, then back up and log.
//!
//! [`Generator::prepare`] is on the request path and only fails with a
//! [`RenderError`]. [`Generator::record`] runs the remote side effects after
//! the files are already delivered; its failures end up in a
//! [`SideEffectReport`] and the operator log, never in the response.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::artifact::GeneratedArtifact;
use crate::backup::{BackupFile, DisabledSink, DriveBackup, StorageSink, StoredFile};
use crate::config::Config;
use crate::credential::{ServiceAccountTokens, TokenProvider};
use crate::error::{RenderError, Result, SinkError};
use crate::geocode::{ArcGisGeocoder, DisabledGeocoder, Geocoder, Site};
use crate::google;
use crate::intake::GenerationRequest;
use crate::synchro;
use crate::usage::{LogSink, SheetsLog, UsageLogEntry, UsageStatus};

/// How one side-effect step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step completed.
    Done {
        /// What was produced, e.g. a backup link.
        detail: String,
    },
    /// The step is not configured.
    Skipped,
    /// The step failed; the files were still delivered.
    Failed {
        /// Description of the failure.
        error: String,
    },
}

impl StepOutcome {
    /// Check if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn from_error(err: &SinkError) -> Self {
        match err {
            SinkError::Disabled { .. } => Self::Skipped,
            other => Self::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// Outcomes of the backup and usage-log steps for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectReport {
    /// Drive backup of both files.
    pub backup: StepOutcome,
    /// Usage log append.
    pub usage: StepOutcome,
}

/// Turns validated requests into artifacts and records them.
///
/// Members are read-only, so one `Arc<Generator>` is shared by every request.
#[derive(Debug, Clone)]
pub struct Generator {
    geocoder: Arc<dyn Geocoder>,
    storage: Arc<dyn StorageSink>,
    log: Arc<dyn LogSink>,
    timeout: Duration,
}

impl Generator {
    /// Create a generator from its collaborators.
    #[must_use]
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        storage: Arc<dyn StorageSink>,
        log: Arc<dyn LogSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            geocoder,
            storage,
            log,
            timeout,
        }
    }

    /// A generator with no geocoding, backup or usage log.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(
            Arc::new(DisabledGeocoder),
            Arc::new(DisabledSink::BACKUP),
            Arc::new(DisabledSink::USAGE_LOG),
            Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Build a generator from configuration.
    ///
    /// Sinks whose credential or target id is missing are replaced by
    /// [`DisabledSink`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a configured
    /// credential cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.remote_timeout();
        let http = google::http_client(timeout)?;

        let geocoder = build_geocoder(config, &http);

        let settings = &config.google;
        let tokens: Option<Arc<dyn TokenProvider>> = if settings.enabled {
            settings.load_credential()?.map(|credential| {
                info!(account = %credential.client_email(), "loaded service account");
                Arc::new(ServiceAccountTokens::new(Arc::new(credential), http.clone()))
                    as Arc<dyn TokenProvider>
            })
        } else {
            None
        };

        let storage: Arc<dyn StorageSink> =
            match (&tokens, settings.drive_folder_id.as_deref(), settings.backup_enabled()) {
                (Some(tokens), Some(folder), true) => {
                    Arc::new(DriveBackup::new(Arc::clone(tokens), http.clone(), folder))
                }
                _ => {
                    info!("drive backup disabled");
                    Arc::new(DisabledSink::BACKUP)
                }
            };

        let log: Arc<dyn LogSink> =
            match (&tokens, settings.sheet_id.as_deref(), settings.usage_enabled()) {
                (Some(tokens), Some(sheet), true) => Arc::new(SheetsLog::new(
                    Arc::clone(tokens),
                    http,
                    sheet,
                    settings.sheet_range.clone(),
                )),
                _ => {
                    info!("usage log disabled");
                    Arc::new(DisabledSink::USAGE_LOG)
                }
            };

        Ok(Self::new(geocoder, storage, log, timeout))
    }

    /// Replace the geocoder.
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    /// Geocode every intersection concurrently.
    ///
    /// Lookups that fail or time out yield `None` for that intersection.
    pub async fn locate_all(&self, request: &GenerationRequest) -> Vec<Option<Site>> {
        let mut lookups = JoinSet::new();
        for (index, name) in request.intersection_names().into_iter().enumerate() {
            let geocoder = Arc::clone(&self.geocoder);
            let name = name.to_string();
            let timeout = self.timeout;
            lookups.spawn(async move {
                let site = match tokio::time::timeout(timeout, geocoder.locate(&name)).await {
                    Ok(Ok(site)) => site,
                    Ok(Err(e)) => {
                        warn!(step = "geocode", intersection = %name, error = %e, "geocoding failed");
                        None
                    }
                    Err(_) => {
                        warn!(step = "geocode", intersection = %name, "geocoding timed out");
                        None
                    }
                };
                (index, site)
            });
        }

        let mut sites = vec![None; request.intersections().len()];
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((index, site)) => sites[index] = site,
                Err(e) => warn!(step = "geocode", error = %e, "geocoding task failed"),
            }
        }
        sites
    }

    /// Geocode and render `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be rendered.
    pub async fn prepare(&self, request: &GenerationRequest) -> std::result::Result<GeneratedArtifact, RenderError> {
        let sites = self.locate_all(request).await;
        let artifact = synchro::render(request, &sites)?;
        info!(
            stem = %artifact.stem(),
            intersections = request.intersections().len(),
            digest = %artifact.digest(),
            "rendered network"
        );
        Ok(artifact)
    }

    /// Back up both files, then append the usage row.
    pub async fn record(
        &self,
        request: &GenerationRequest,
        artifact: &GeneratedArtifact,
        at: DateTime<Utc>,
    ) -> SideEffectReport {
        let (backup, link) = self.backup(request, artifact, at).await;

        let entry = UsageLogEntry {
            timestamp: at,
            requester: request.requester().map(str::to_string),
            intersections: request
                .intersection_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            filename: artifact.text_filename(),
            backup_link: link,
            status: if backup.is_failed() {
                UsageStatus::BackupFailed
            } else {
                UsageStatus::Success
            },
        };
        let usage = match self.bounded(self.log.append(&entry)).await {
            Ok(()) => StepOutcome::Done {
                detail: "row appended".to_string(),
            },
            Err(e) => StepOutcome::from_error(&e),
        };
        report("usage", &entry.filename, &usage);

        SideEffectReport { backup, usage }
    }

    /// Run [`Generator::record`] on a detached task.
    pub fn spawn_record(
        self: &Arc<Self>,
        request: GenerationRequest,
        artifact: GeneratedArtifact,
        at: DateTime<Utc>,
    ) -> JoinHandle<SideEffectReport> {
        let generator = Arc::clone(self);
        tokio::spawn(async move { generator.record(&request, &artifact, at).await })
    }

    /// Upload both files. Returns the outcome and the text file's link.
    async fn backup(
        &self,
        request: &GenerationRequest,
        artifact: &GeneratedArtifact,
        at: DateTime<Utc>,
    ) -> (StepOutcome, Option<String>) {
        let mut stored: Vec<StoredFile> = Vec::with_capacity(2);
        for (filename, content_type, bytes) in artifact.files() {
            let file = BackupFile::named(request.requester(), at, &filename, content_type, bytes);
            match self.bounded(self.storage.store(&file)).await {
                Ok(copy) => {
                    debug!(step = "backup", filename = %file.name, id = %copy.id, "stored");
                    stored.push(copy);
                }
                Err(e) => {
                    let outcome = StepOutcome::from_error(&e);
                    report("backup", &filename, &outcome);
                    return (outcome, None);
                }
            }
        }

        let link = stored.first().and_then(|f| f.link.clone());
        let detail = link
            .clone()
            .or_else(|| stored.first().map(|f| f.id.clone()))
            .unwrap_or_default();
        let outcome = StepOutcome::Done { detail };
        report("backup", &artifact.text_filename(), &outcome);
        (outcome, link)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, SinkError>>,
    ) -> std::result::Result<T, SinkError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(SinkError::Timeout {
                    after_secs: self.timeout.as_secs(),
                })
            })
    }
}

/// The geocoder described by `config`, with its own HTTP client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn geocoder_from_config(config: &Config) -> Result<Arc<dyn Geocoder>> {
    let http = google::http_client(config.remote_timeout())?;
    Ok(build_geocoder(config, &http))
}

fn build_geocoder(config: &Config, http: &reqwest::Client) -> Arc<dyn Geocoder> {
    if config.geocoder.enabled {
        Arc::new(ArcGisGeocoder::new(http.clone(), config.geocoder.endpoint.clone()))
    } else {
        Arc::new(DisabledGeocoder)
    }
}

fn report(step: &'static str, filename: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Done { detail } => info!(step, filename, detail = %detail, "side effect done"),
        StepOutcome::Skipped => debug!(step, filename, "side effect skipped"),
        StepOutcome::Failed { error } => warn!(step, filename, error = %error, "side effect failed"),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::intake::{from_submission, IntersectionForm, SubmissionForm};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap()
    }

    fn request(names: &[&str]) -> GenerationRequest {
        from_submission(&SubmissionForm {
            email: Some("planner@example.com".to_string()),
            intersections: names
                .iter()
                .map(|name| IntersectionForm {
                    name: Some((*name).to_string()),
                    lanes: Some(4),
                    cycle_length: Some(90),
                    ..IntersectionForm::default()
                })
                .collect(),
        })
        .unwrap()
    }

    fn generator(storage: Arc<dyn StorageSink>, log: Arc<dyn LogSink>) -> Generator {
        Generator::new(Arc::new(DisabledGeocoder), storage, log, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_record_backs_up_and_logs() {
        let storage = Arc::new(MemoryStorage::default());
        let log = Arc::new(MemoryLog::default());
        let generator = generator(storage.clone(), log.clone());
        let request = request(&["Intersection A"]);

        let artifact = generator.prepare(&request).await.unwrap();
        let report = generator.record(&request, &artifact, at()).await;

        assert_eq!(
            report,
            SideEffectReport {
                backup: StepOutcome::Done {
                    detail: "https://drive.example/file-1".to_string()
                },
                usage: StepOutcome::Done {
                    detail: "row appended".to_string()
                },
            }
        );

        let files = storage.files.lock().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "planner@example.com_20250307_140509_synchro_intersection_a.txt",
                "planner@example.com_20250307_140509_synchro_intersection_a.csv",
            ]
        );
        assert_eq!(files[0].bytes, artifact.network_text());
        assert_eq!(files[1].bytes, artifact.summary_csv());

        let entries = log.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].row(),
            [
                "2025-03-07 14:05:09",
                "planner@example.com",
                "Intersection A",
                "synchro_intersection_a.txt",
                "https://drive.example/file-1",
                "Success",
            ]
        );
    }

    #[tokio::test]
    async fn test_backup_auth_failure_still_logs() {
        crate::logging::init_test_logging();
        let storage = Arc::new(RejectingStorage::default());
        let log = Arc::new(MemoryLog::default());
        let generator = generator(storage.clone(), log.clone());
        let request = request(&["Intersection A"]);

        let artifact = generator.prepare(&request).await.unwrap();
        let report = generator.record(&request, &artifact, at()).await;

        assert!(report.backup.is_failed());
        assert!(!report.usage.is_failed());
        // stops after the first rejected upload
        assert_eq!(*storage.calls.lock().unwrap(), 1);

        let entries = log.entries.lock().unwrap();
        assert_eq!(entries[0].status, UsageStatus::BackupFailed);
        assert_eq!(entries[0].row()[3], "synchro_intersection_a.txt");
        assert_eq!(entries[0].row()[4], "N/A");
    }

    #[tokio::test]
    async fn test_disabled_sinks_are_skipped() {
        let generator = Generator::offline();
        let request = request(&["Intersection A"]);

        let artifact = generator.prepare(&request).await.unwrap();
        let report = generator.record(&request, &artifact, at()).await;

        assert_eq!(report.backup, StepOutcome::Skipped);
        assert_eq!(report.usage, StepOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_backup_timeout_is_a_failure() {
        let log = Arc::new(MemoryLog::default());
        let generator = Generator::new(
            Arc::new(DisabledGeocoder),
            Arc::new(HangingStorage),
            log.clone(),
            Duration::from_millis(50),
        );
        let request = request(&["Intersection A"]);

        let artifact = generator.prepare(&request).await.unwrap();
        let report = generator.record(&request, &artifact, at()).await;

        match &report.backup {
            StepOutcome::Failed { error } => assert!(error.starts_with("timed out")),
            other => panic!("expected a failed backup, got {other:?}"),
        }
        assert_eq!(log.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_geocoding_failure_falls_back_to_grid() {
        let generator = Generator::new(
            Arc::new(FailingGeocoder),
            Arc::new(DisabledSink::BACKUP),
            Arc::new(DisabledSink::USAGE_LOG),
            Duration::from_secs(5),
        );
        let request = request(&["A", "B"]);

        assert_eq!(generator.locate_all(&request).await, vec![None, None]);
        let artifact = generator.prepare(&request).await.unwrap();
        assert_eq!(artifact, synchro::render(&request, &[]).unwrap());
    }

    #[tokio::test]
    async fn test_sites_keep_request_order() {
        let site = |lat: f64| Site {
            lat,
            lon: -83.0,
            address: String::new(),
        };
        let generator = Generator::new(
            Arc::new(FixedGeocoder(vec![("B", site(42.01)), ("A", site(42.0))])),
            Arc::new(DisabledSink::BACKUP),
            Arc::new(DisabledSink::USAGE_LOG),
            Duration::from_secs(5),
        );

        let sites = generator.locate_all(&request(&["A", "C", "B"])).await;
        assert_eq!(sites, vec![Some(site(42.0)), None, Some(site(42.01))]);
    }

    #[tokio::test]
    async fn test_spawn_record_runs_detached() {
        let log = Arc::new(MemoryLog::default());
        let generator = Arc::new(generator(Arc::new(MemoryStorage::default()), log.clone()));
        let request = request(&["Intersection A"]);
        let artifact = generator.prepare(&request).await.unwrap();

        let report = generator
            .spawn_record(request, artifact, at())
            .await
            .unwrap();
        assert!(!report.backup.is_failed());
        assert_eq!(log.entries.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_step_outcome_serialization() {
        let json = serde_json::to_value(StepOutcome::Failed {
            error: "quota".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "failed", "error": "quota"}));
        assert_eq!(
            serde_json::to_value(StepOutcome::Skipped).unwrap(),
            serde_json::json!({"outcome": "skipped"})
        );
    }
}
