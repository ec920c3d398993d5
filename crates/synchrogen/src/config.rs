//! Configuration management for synchrogen.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults. All
//! Google identifiers and key material arrive through here; nothing secret
//! is compiled into the binary.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::credential::BackupCredential;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "synchrogen";

/// Environment variable prefix.
const ENV_PREFIX: &str = "SYNCHROGEN_";

/// Default per-call timeout for remote services, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// ArcGIS World geocoding service.
const DEFAULT_GEOCODER_ENDPOINT: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (`SYNCHROGEN_<SECTION>__<KEY>`)
/// 2. TOML config file at `~/.config/synchrogen/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Google Drive / Sheets integration.
    pub google: GoogleConfig,
    /// Intersection geocoding.
    pub geocoder: GeocoderConfig,
    /// Limits applied to every remote call.
    pub remote: RemoteConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

/// Google service-account integration.
///
/// Backup is active when enabled, a credential is present and
/// `drive_folder_id` is set. Usage logging likewise needs `sheet_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Master switch for both remote side effects.
    pub enabled: bool,
    /// Path to a service-account JSON key file.
    pub credentials_path: Option<PathBuf>,
    /// Inline service-account JSON. Takes precedence over the path.
    #[serde(skip_serializing)]
    pub credentials_json: Option<String>,
    /// Drive folder that receives backup copies.
    pub drive_folder_id: Option<String>,
    /// Spreadsheet that receives usage rows.
    pub sheet_id: Option<String>,
    /// A1 range rows are appended to.
    pub sheet_range: String,
}

/// Geocoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Look intersection names up to place them on real coordinates.
    pub enabled: bool,
    /// `findAddressCandidates` endpoint.
    pub endpoint: String,
}

/// Remote call limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Per-call timeout in seconds for geocoding, token, Drive and Sheets calls.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            credentials_path: None,
            credentials_json: None,
            drive_folder_id: None,
            sheet_id: None,
            sheet_range: "Sheet1!A:F".to_string(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GoogleConfig {
    /// Whether any credential source is configured.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.credentials_json
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
            || self.credentials_path.is_some()
    }

    /// Whether Drive backup should run.
    #[must_use]
    pub fn backup_enabled(&self) -> bool {
        self.enabled && self.has_credential() && non_blank(self.drive_folder_id.as_deref())
    }

    /// Whether the Sheets usage log should run.
    #[must_use]
    pub fn usage_enabled(&self) -> bool {
        self.enabled && self.has_credential() && non_blank(self.sheet_id.as_deref())
    }

    /// Load the service-account credential, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured credential cannot be read or parsed.
    pub fn load_credential(&self) -> Result<Option<BackupCredential>> {
        if let Some(json) = self.credentials_json.as_deref() {
            if !json.trim().is_empty() {
                return Ok(Some(BackupCredential::from_json(json)?));
            }
        }
        match &self.credentials_path {
            Some(path) => Ok(Some(BackupCredential::from_file(path)?)),
            None => Ok(None),
        }
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config_path` and also load the Google credential it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not load, fails validation, or
    /// points at a credential that cannot be parsed.
    pub fn check(config_path: PathBuf) -> Result<Self> {
        let config = Self::load_from(Some(config_path))?;
        config.google.load_credential()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.remote.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "remote.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if !self.google.sheet_range.contains('!') {
            return Err(Error::ConfigValidation {
                message: format!(
                    "google.sheet_range must name a sheet, e.g. Sheet1!A:F (got {})",
                    self.google.sheet_range
                ),
            });
        }

        if self.geocoder.enabled
            && !(self.geocoder.endpoint.starts_with("https://")
                || self.geocoder.endpoint.starts_with("http://"))
        {
            return Err(Error::ConfigValidation {
                message: format!("invalid geocoder endpoint: {}", self.geocoder.endpoint),
            });
        }

        Ok(())
    }

    /// The `host:port` the server listens on.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    /// Get the remote call timeout as a Duration.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}
