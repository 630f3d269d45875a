//! Crispen configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::SizeToken;

/// Main Crispen configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API configuration
    pub api: ApiConfig,

    /// Retry and backoff limits
    pub retry: RetryConfig,

    /// Output size preference
    pub size: SizeConfig,

    /// Progress estimator timing
    pub progress: ProgressConfig,

    /// Work folder for input/output/key files
    #[serde(rename = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration: the explicit path, else the first readable search path, else defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Config::load: skipping unreadable config"),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `./.crispen.yml`, then `~/.config/crispen/crispen.yml`
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".crispen.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("crispen").join("crispen.yml"));
        }
        paths
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config is reported by the full `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        let base = path.as_ref().parent().unwrap_or_else(|| Path::new(""));
        Ok(config.anchor_work_dir(base))
    }

    /// Expand `~/` and anchor a relative `work-dir` at the config file's directory
    fn anchor_work_dir(mut self, base: &Path) -> Self {
        if let Some(dir) = self.work_dir.take() {
            let expanded = match (dir.strip_prefix("~"), dirs::home_dir()) {
                (Ok(rest), Some(home)) => home.join(rest),
                _ => dir,
            };
            self.work_dir = Some(if expanded.is_relative() {
                base.join(expanded)
            } else {
                expanded
            });
        }
        self
    }

    /// Work folder, defaulting to ~/.local/share/crispen/work
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("crispen")
                .join("work")
        })
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Quality token sent with every request
    pub quality: String,

    /// Environment variable consulted when no key has been saved
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-image-1.5".to_string(),
            quality: "high".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 300_000,
        }
    }
}

/// Retry and backoff limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per size candidate
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Starting delay for the exponential track
    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the exponential track
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Upper bound of random jitter added to every wait
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 16_000,
            jitter_ms: 250,
        }
    }
}

/// Output size preference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeConfig {
    /// Requested size: "auto" or WIDTHxHEIGHT
    pub preference: SizeToken,

    /// Size tried after "auto" fails
    pub fallback: SizeToken,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            preference: SizeToken::Auto,
            fallback: SizeToken::SQUARE_1024,
        }
    }
}

/// Progress estimator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Poll interval in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,

    /// Nominal duration of a generation in milliseconds
    #[serde(rename = "estimated-duration-ms")]
    pub estimated_duration_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_ms: 150,
            estimated_duration_ms: 90_000,
        }
    }
}

impl ProgressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_duration_ms.max(1))
    }
}
