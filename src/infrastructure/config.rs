//! Configuration infrastructure
//!
//! Contains configuration loading and management for the catalog import.
//!
//! Every tunable of the pipeline lives here and is handed to the components
//! explicitly: retry budget, jitter bounds, pacing range, user-agent pool,
//! extraction selectors and the optional RNG seed used by tests.

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, Context};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Invalid configuration values, detected before the run starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Retry budget must be at least 1")]
    ZeroRetryBudget,

    #[error("Jitter range is empty: min {min}s must be below max {max}s")]
    InvalidJitterRange { min: String, max: String },

    #[error("Pacing range is invalid: min {min}s must not exceed max {max}s")]
    InvalidPacingRange { min: String, max: String },

    #[error("User-agent pool is empty")]
    EmptyUserAgentPool,

    #[error("Request timeout must be greater than 0")]
    ZeroTimeout,

    #[error("Negative or non-finite duration for '{field}'")]
    InvalidDuration { field: String },

    #[error("No logging output configured")]
    NoLogOutput,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub extractor: ExtractorConfig,
    pub logging: LoggingConfig,
    /// Fixed seed for user-agent rotation, jitter and pacing; `None` seeds from entropy
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/catalog.db".to_string() }
    }
}

/// Where downloaded images are stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub root: PathBuf,
    /// Sub-directory of `root` holding perfume images
    pub upload_dir: String,
    /// Appended when an image URL ends in a name without extension
    pub default_extension: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            upload_dir: "perfumes".to_string(),
            default_extension: "jpg".to_string(),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub accept_language: String,
    pub referer: String,
    /// Pool of browser signatures; one is picked per request
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            max_redirects: 10,
            accept_language: "en-US,en;q=0.9".to_string(),
            referer: "https://www.google.com/".to_string(),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0".to_string(),
            ],
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Backoff policy for one logical page fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per logical fetch (rate-limited and transport failures share it)
    pub max_retries: u32,
    /// Wait before attempt n+1 is `backoff_base_seconds * 2^n + jitter`
    pub backoff_base_seconds: f64,
    pub jitter_min_seconds: f64,
    pub jitter_max_seconds: f64,
    /// Fixed wait after a transport error
    pub transport_cooldown_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_base_seconds: 1.0,
            jitter_min_seconds: 1.0,
            jitter_max_seconds: 3.0,
            transport_cooldown_seconds: 5.0,
        }
    }
}

/// Mandatory pause after every row that hit the network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { min_delay_seconds: 8.0, max_delay_seconds: 15.0 }
    }
}

/// CSS selectors and URL rewrite used on perfume pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub image_selector: String,
    pub og_image_selector: String,
    pub og_description_selector: String,
    pub description_selector: String,
    pub fallback_description_selector: String,
    /// Path segment of thumbnail images
    pub low_res_segment: String,
    /// Replacement segment pointing at the full-size image
    pub high_res_segment: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            image_selector: r#"img[itemprop="image"]"#.to_string(),
            og_image_selector: r#"meta[property="og:image"]"#.to_string(),
            og_description_selector: r#"meta[property="og:description"]"#.to_string(),
            description_selector: r#"div[itemprop="description"]"#.to_string(),
            fallback_description_selector: ".pgridCell p".to_string(),
            low_res_segment: "perfume-thumbs".to_string(),
            high_res_segment: "perfume".to_string(),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output (daily rotated)
    pub file_output: bool,

    /// Directory for log files
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

fn check_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field: field.to_string() })
    }
}

impl AppConfig {
    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        check_seconds("retry.backoff_base_seconds", self.retry.backoff_base_seconds)?;
        check_seconds("retry.jitter_min_seconds", self.retry.jitter_min_seconds)?;
        check_seconds("retry.jitter_max_seconds", self.retry.jitter_max_seconds)?;
        check_seconds("retry.transport_cooldown_seconds", self.retry.transport_cooldown_seconds)?;
        check_seconds("pacing.min_delay_seconds", self.pacing.min_delay_seconds)?;
        check_seconds("pacing.max_delay_seconds", self.pacing.max_delay_seconds)?;

        if self.retry.jitter_min_seconds >= self.retry.jitter_max_seconds {
            return Err(ConfigError::InvalidJitterRange {
                min: self.retry.jitter_min_seconds.to_string(),
                max: self.retry.jitter_max_seconds.to_string(),
            });
        }
        if self.pacing.min_delay_seconds > self.pacing.max_delay_seconds {
            return Err(ConfigError::InvalidPacingRange {
                min: self.pacing.min_delay_seconds.to_string(),
                max: self.pacing.max_delay_seconds.to_string(),
            });
        }
        if self.fetch.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::EmptyUserAgentPool);
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !self.logging.console_output && !self.logging.file_output {
            return Err(ConfigError::NoLogOutput);
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("perfume-import");

        Ok(config_dir)
    }

    /// Configuration manager for the default location
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self { config_path: config_dir.join("config.json") })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { config_path: path.into() }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path).await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content).await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(15));
        assert_eq!(config.fetch.user_agents.len(), 4);
    }

    #[test]
    fn rejects_inverted_jitter() {
        let mut config = AppConfig::default();
        config.retry.jitter_min_seconds = 3.0;
        config.retry.jitter_max_seconds = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJitterRange { .. })));
    }

    #[test]
    fn rejects_empty_pool_and_zero_budget() {
        let mut config = AppConfig::default();
        config.fetch.user_agents = vec!["  ".into()];
        assert_eq!(config.validate(), Err(ConfigError::EmptyUserAgentPool));

        let mut config = AppConfig::default();
        config.retry.max_retries = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetryBudget));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "retry": { "max_retries": 3 }, "rng_seed": 7 }"#).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.transport_cooldown_seconds, 5.0);
        assert_eq!(config.pacing.max_delay_seconds, 15.0);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[tokio::test]
    async fn load_creates_default_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = ConfigManager::with_path(dir.path().join("nested/config.json"));

        let created = manager.load_config().await?;
        assert!(manager.config_path().exists());

        let reloaded = manager.load_config().await?;
        assert_eq!(created.database.url, reloaded.database.url);
        Ok(())
    }
}
