use thiserror::Error;
use url::Url;

use super::parser::{BackoffConfig, Config};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.api_url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "platform.api_url cannot be empty".to_string(),
            ));
        }

        if let Err(err) = Url::parse(&self.platform.api_url) {
            return Err(ConfigError::InvalidConfig(format!(
                "platform.api_url is not a valid URL: {err}"
            )));
        }

        if self.platform.destination.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "platform.destination cannot be empty".to_string(),
            ));
        }

        if self.sources.channel_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "sources.channel_file cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        let sync = &self.sync;
        if sync.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync.interval_secs must be greater than 0".to_string(),
            ));
        }

        if sync.first_run_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync.first_run_limit must be greater than 0".to_string(),
            ));
        }

        if sync.backfill_limit < sync.first_run_limit {
            return Err(ConfigError::InvalidConfig(
                "sync.backfill_limit cannot be smaller than sync.first_run_limit".to_string(),
            ));
        }

        if sync.concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }

        if let BackoffConfig::Exponential {
            initial_secs,
            max_secs,
        } = sync.backoff
            && (initial_secs == 0 || max_secs < initial_secs)
        {
            return Err(ConfigError::InvalidConfig(
                "sync.backoff needs 0 < initial_secs <= max_secs".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidConfig(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "metrics.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::ConfigError;
    use crate::config::Config;

    const BASE: &str = r#"
platform:
  api_url: "http://127.0.0.1:8081"
  destination: "memes_digest"
sources:
  channel_file: "channels.txt"
database:
  filename: "reposter.db"
"#;

    fn load(extra: &str) -> Result<Config, ConfigError> {
        Config::load_from_str(&format!("{BASE}{extra}"))
    }

    #[test]
    fn base_config_is_valid() {
        assert!(load("").is_ok());
    }

    #[test_case("sync:\n  interval_secs: 0\n" ; "zero interval")]
    #[test_case("sync:\n  first_run_limit: 0\n" ; "zero first run limit")]
    #[test_case("sync:\n  first_run_limit: 20\n  backfill_limit: 5\n" ; "backfill below first run")]
    #[test_case("sync:\n  concurrency: 0\n" ; "zero concurrency")]
    #[test_case("sync:\n  backoff:\n    kind: exponential\n    initial_secs: 60\n    max_secs: 10\n" ; "inverted backoff")]
    #[test_case("logging:\n  format: xml\n" ; "unknown log format")]
    fn rejects_invalid_values(extra: &str) {
        let err = load(extra).expect_err("config should be rejected");
        assert!(matches!(err, ConfigError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn rejects_unparseable_api_url() {
        let yaml = BASE.replace("http://127.0.0.1:8081", "not a url");
        let err = Config::load_from_str(&yaml).expect_err("config should be rejected");
        assert!(err.to_string().contains("platform.api_url"));
    }

    #[test]
    fn rejects_blank_destination() {
        let yaml = BASE.replace("memes_digest", "  ");
        assert!(matches!(
            Config::load_from_str(&yaml),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reports_yaml_errors_as_parse_errors() {
        assert!(matches!(
            Config::load_from_str("platform: ["),
            Err(ConfigError::Parse(_))
        ));
    }
}
