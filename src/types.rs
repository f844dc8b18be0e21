use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Spreadsheet read when neither the config file nor `GOOGLE_SHEET_ID` names one.
pub const DEFAULT_SHEET_ID: &str = "1IzRN7J-0XDJbGQGFmom-7RutxOtgcwVM0oo6d4z5dWc";

/// Credentials file used when no path is configured, relative to the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Configuration stored in ~/.leadboard/config.json
///
/// Every field has a default, so an empty object (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_sheet_id")]
    pub sheet_id: String,
    /// Path to a credential bundle. Defaults to `credentials.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub auto_refresh: AutoRefreshConfig,
    /// Inline credential bundle from `GOOGLE_CREDENTIALS`. Never written to disk.
    #[serde(skip)]
    pub credentials_json: Option<String>,
}

fn default_sheet_id() -> String {
    DEFAULT_SHEET_ID.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheet_id: default_sheet_id(),
            credentials_path: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            auto_refresh: AutoRefreshConfig::default(),
            credentials_json: None,
        }
    }
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Clamped to at least one second.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.credentials_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE))
    }
}

/// Background re-fetch of the sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRefreshConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    60
}

impl Default for AutoRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl AutoRefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
