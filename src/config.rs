pub use self::parser::{
    BackoffConfig, Config, DatabaseConfig, FingerprintSource, LoggingConfig, MetricsConfig,
    PlatformConfig, SourcesConfig, SyncConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
