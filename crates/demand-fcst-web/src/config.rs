//! Service configuration loaded from a TOML file.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration. Unknown keys are rejected.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use demand_fcst_core::{
    BoostingParams, ForecastOptions, MissingMonths, PipelineOptions, Scope, Technique,
    DEFAULT_GLOBAL_LABEL,
};

use crate::logging::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.body_limit_bytes must be positive".into(),
            ));
        }
        if self.downloads.max_entries == 0 {
            return Err(ConfigError::Validation(
                "downloads.max_entries must be positive".into(),
            ));
        }
        self.forecast
            .pipeline_options()
            .forecast
            .validate()
            .map_err(|e| ConfigError::Validation(format!("forecast: {}", e)))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes (uploads included).
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

/// Defaults applied to every forecast request. Form fields override
/// technique, scope and horizon per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    #[serde(default)]
    pub technique: Technique,

    #[serde(default)]
    pub scope: Scope,

    /// Months to forecast; unset means the technique default.
    #[serde(default)]
    pub horizon: Option<usize>,

    #[serde(default = "default_min_history")]
    pub min_history: usize,

    #[serde(default = "default_season_length")]
    pub season_length: usize,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    #[serde(default = "default_true")]
    pub clip_negative: bool,

    #[serde(default)]
    pub missing_months: MissingMonths,

    /// Label of the all-items row.
    #[serde(default = "default_global_label")]
    pub global_label: String,

    #[serde(default)]
    pub boosting: BoostingParams,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            technique: Technique::default(),
            scope: Scope::default(),
            horizon: None,
            min_history: default_min_history(),
            season_length: default_season_length(),
            confidence_level: default_confidence_level(),
            clip_negative: true,
            missing_months: MissingMonths::default(),
            global_label: default_global_label(),
            boosting: BoostingParams::default(),
        }
    }
}

impl ForecastConfig {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            scope: self.scope,
            forecast: ForecastOptions {
                technique: self.technique,
                horizon: self.horizon,
                min_history: self.min_history,
                season_length: self.season_length,
                confidence_level: self.confidence_level,
                clip_negative: self.clip_negative,
                boosting: self.boosting,
                ..ForecastOptions::default()
            },
            missing_months: self.missing_months,
            global_label: self.global_label.clone(),
        }
    }
}

fn default_min_history() -> usize {
    6
}

fn default_season_length() -> usize {
    12
}

fn default_confidence_level() -> f64 {
    0.95
}

fn default_true() -> bool {
    true
}

fn default_global_label() -> String {
    DEFAULT_GLOBAL_LABEL.to_string()
}

/// In-memory cache of generated reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadsConfig {
    /// Seconds a report stays downloadable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Reports kept at most; the oldest is evicted first.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    900
}

fn default_max_entries() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// PostHog project key; nothing is sent without one.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
        }
    }
}
