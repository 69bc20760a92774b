use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HeraldError, Result};

/// Largest batch any triage call may request.
pub const MAX_BATCH_LIMIT: usize = 50;

/// Top-level configuration for Herald.
///
/// Loaded from `~/.herald/config.toml` by default. Every section falls back
/// to its defaults when missing, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

impl HeraldConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HeraldConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, using defaults when the file does not exist.
    ///
    /// A file that exists but cannot be parsed or fails validation is an
    /// error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the triage and action layers cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.triage;
        if t.block_threshold == 0 {
            return Err(HeraldError::Config(
                "triage.block_threshold must be at least 1".to_string(),
            ));
        }
        if t.overfetch_factor == 0 {
            return Err(HeraldError::Config(
                "triage.overfetch_factor must be at least 1".to_string(),
            ));
        }
        if t.source_fetch_factor == 0 {
            return Err(HeraldError::Config(
                "triage.source_fetch_factor must be at least 1".to_string(),
            ));
        }
        if t.max_limit == 0 || t.max_limit > MAX_BATCH_LIMIT {
            return Err(HeraldError::Config(format!(
                "triage.max_limit must be within 1..={}",
                MAX_BATCH_LIMIT
            )));
        }
        if t.default_limit == 0 || t.default_limit > t.max_limit {
            return Err(HeraldError::Config(format!(
                "triage.default_limit must be within 1..={}",
                t.max_limit
            )));
        }
        if self.actions.executor_timeout_secs == 0 {
            return Err(HeraldError::Config(
                "actions.executor_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.actions.max_text_chars == 0 {
            return Err(HeraldError::Config(
                "actions.max_text_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the API server binds to.
    pub host: String,
    /// API server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.herald/data".to_string(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Triage engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Skipped items an author may accumulate before being blocked.
    pub block_threshold: u64,
    /// Candidate window scanned per call, as a multiple of the limit.
    pub overfetch_factor: usize,
    /// Largest batch a caller may request.
    pub max_limit: usize,
    /// Batch size used when a caller does not specify one.
    pub default_limit: usize,
    /// Items requested from the content source, as a multiple of the limit.
    pub source_fetch_factor: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            block_threshold: 10,
            overfetch_factor: 3,
            max_limit: 50,
            default_limit: 5,
            source_fetch_factor: 2,
        }
    }
}

/// Action execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Upper bound on a single executor call; expiry counts as a failure.
    pub executor_timeout_secs: u64,
    /// Maximum reply/quote length in characters.
    pub max_text_chars: usize,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            executor_timeout_secs: 30,
            max_text_chars: 280,
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Requests allowed per second across the API.
    pub rate_limit_per_sec: u64,
    /// Maximum accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_sec: 100,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Content source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON feed file read by the file-backed content source.
    pub feed_path: Option<String>,
}
