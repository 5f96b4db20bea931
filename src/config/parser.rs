use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub platform: PlatformConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_token: String,
    pub destination: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    pub channel_file: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintSource {
    /// Download the media and hash its bytes.
    #[default]
    Bytes,
    /// Hash the platform-stable media reference without downloading.
    Reference,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Fixed,
    Exponential {
        #[serde(default = "default_backoff_initial_secs")]
        initial_secs: u64,
        #[serde(default = "default_backoff_max_secs")]
        max_secs: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Fixed
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_first_run_limit")]
    pub first_run_limit: usize,
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: usize,
    #[serde(default = "default_max_caption_chars")]
    pub max_caption_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub fingerprint_source: FingerprintSource,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            first_run_limit: default_first_run_limit(),
            backfill_limit: default_backfill_limit(),
            max_caption_chars: default_max_caption_chars(),
            concurrency: default_concurrency(),
            fingerprint_source: FingerprintSource::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Page size for a channel fetch: a short first look at never-ingested
    /// channels, a deep catch-up for channels that already have a cursor.
    pub fn fetch_limit(&self, cursor: i64) -> usize {
        if cursor <= 0 {
            self.first_run_limit
        } else {
            self.backfill_limit
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        let url = self.connection_string();
        if url.is_empty() {
            return None;
        }
        Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_bind_address")]
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            bind_address: default_metrics_bind_address(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("REPOSTER_PLATFORM_API_TOKEN") {
            self.platform.api_token = value;
        }
        if let Ok(value) = std::env::var("REPOSTER_PLATFORM_API_URL") {
            self.platform.api_url = value;
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    5 * 60
}

fn default_first_run_limit() -> usize {
    10
}

fn default_backfill_limit() -> usize {
    3000
}

fn default_max_caption_chars() -> usize {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_backoff_initial_secs() -> u64 {
    30
}

fn default_backoff_max_secs() -> u64 {
    30 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_port() -> u16 {
    9001
}

fn default_metrics_bind_address() -> String {
    "127.0.0.1".to_string()
}
