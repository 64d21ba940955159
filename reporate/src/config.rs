use rating_api::config::Config as RatingApiConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub rating_api: RatingApiConfig,
}

impl Config {
    /// Loads the YAML file at `path` and applies environment overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let mut config: Config = serde_yaml::from_reader(file)?;
        config
            .rating_api
            .apply_env_overrides(|key| std::env::var(key).ok());
        config.rating_api.validate()?;

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] rating_api::config::ValidationError),
}
