//! Configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional, `basic` feature)
//! - Runtime defaults
//! - Validation and type safety
//!
//! The loaded [`Config`] is handed to [`crate::app::App`] once at startup;
//! nothing reads configuration through a global.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Upper bound for any timeout setting, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Local document store
    pub storage: StorageConfig,

    /// Comparison run settings
    pub comparison: ComparisonConfig,

    /// Metrics log settings
    pub metrics: MetricsConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Provider endpoints
    pub providers: ProvidersConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Largest single document the store accepts.
    pub max_value_kb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Shared deadline for all model calls in one run.
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub weights: ScoreWeights,
}

/// Relative weights of the "best overall" score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub speed: f64,
    pub cost: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistral_base_url: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|d| d.join("modelviz"))
                .unwrap_or_else(|| {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join(".modelviz")
                }),
            max_value_kb: 5 * 1024,
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_tokens: 1024,
            temperature: 0.7,
            weights: ScoreWeights::default(),
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            speed: 0.4,
            cost: 0.4,
            output: 0.2,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { json_pretty: true }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_base_url: None,
            anthropic_base_url: None,
            google_base_url: None,
            mistral_base_url: None,
            request_timeout_secs: 120,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: dirs::data_dir()
                .map(|d| d.join("modelviz").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`Config::load`], but an explicit path replaces the file search.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let config_paths = [
                    PathBuf::from("modelviz.toml"),
                    PathBuf::from(".modelviz.toml"),
                    dirs::config_dir()
                        .map(|d| d.join("modelviz").join("config.toml"))
                        .unwrap_or_default(),
                ];

                match config_paths.iter().find(|p| p.is_file()) {
                    Some(path) => {
                        info!(config_file = %path.display(), "Loading configuration from file");
                        Self::load_from_file(path)?
                    }
                    None => Config::default(),
                }
            }
        };

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    #[cfg(feature = "basic")]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    #[cfg(not(feature = "basic"))]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        anyhow::bail!(
            "Config file {} found but TOML support is disabled (enable the `basic` feature)",
            path.display()
        )
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("MODELVIZ_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(val);
        }

        // Comparison overrides
        if let Ok(val) = env::var("MODELVIZ_TIMEOUT_SECS") {
            self.comparison.timeout_secs = val.parse().context("Invalid MODELVIZ_TIMEOUT_SECS")?;
        }
        if let Ok(val) = env::var("MODELVIZ_MAX_TOKENS") {
            self.comparison.max_tokens = val.parse().context("Invalid MODELVIZ_MAX_TOKENS")?;
        }

        // Metrics overrides
        if let Ok(val) = env::var("MODELVIZ_RETENTION_DAYS") {
            self.metrics.retention_days = val.parse().context("Invalid MODELVIZ_RETENTION_DAYS")?;
        }

        // Provider endpoint overrides
        if let Ok(val) = env::var("MODELVIZ_OPENAI_BASE_URL") {
            self.providers.openai_base_url = Some(val);
        }
        if let Ok(val) = env::var("MODELVIZ_ANTHROPIC_BASE_URL") {
            self.providers.anthropic_base_url = Some(val);
        }
        if let Ok(val) = env::var("MODELVIZ_GOOGLE_BASE_URL") {
            self.providers.google_base_url = Some(val);
        }
        if let Ok(val) = env::var("MODELVIZ_MISTRAL_BASE_URL") {
            self.providers.mistral_base_url = Some(val);
        }

        // Path overrides
        if let Ok(val) = env::var("MODELVIZ_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.comparison.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Comparison timeout must be greater than 0"));
        }
        if self.comparison.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow::anyhow!(
                "Comparison timeout must be at most {}s, got {}s",
                MAX_TIMEOUT_SECS,
                self.comparison.timeout_secs
            ));
        }

        if self.comparison.max_tokens == 0 {
            return Err(anyhow::anyhow!("max_tokens must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.comparison.temperature) {
            return Err(anyhow::anyhow!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.comparison.temperature
            ));
        }

        let weights = &self.comparison.weights;
        if weights.speed < 0.0 || weights.cost < 0.0 || weights.output < 0.0 {
            return Err(anyhow::anyhow!("Score weights cannot be negative"));
        }
        if weights.speed + weights.cost + weights.output <= 0.0 {
            return Err(anyhow::anyhow!("At least one score weight must be positive"));
        }

        if self.metrics.retention_days <= 0 {
            return Err(anyhow::anyhow!("Metrics retention must be at least one day"));
        }
        if self.metrics.retention_days > 3650 {
            warn!(
                retention_days = self.metrics.retention_days,
                "Metrics retention is very long, the log may grow large"
            );
        }

        if self.storage.max_value_kb == 0 {
            return Err(anyhow::anyhow!("Storage quota must be greater than 0KB"));
        }

        if self.providers.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Provider request timeout must be greater than 0"));
        }
        if self.providers.request_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow::anyhow!(
                "Provider request timeout must be at most {}s, got {}s",
                MAX_TIMEOUT_SECS,
                self.providers.request_timeout_secs
            ));
        }

        // Create the log directory only when something will write to it
        if matches!(self.logging.output.as_str(), "file" | "both") && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory).context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Save current configuration to file
    #[cfg(feature = "basic")]
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}
