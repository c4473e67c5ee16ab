//! Configuration file parser for ~/.config/inkwell/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::timeline::TimelineConfig;

/// Environment variable that overrides `api_token`.
pub const TOKEN_ENV_VAR: &str = "INKWELL_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// Every field has a default so any subset of keys can be specified.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the feed service.
    pub api_base_url: String,

    /// API token. `INKWELL_TOKEN` takes precedence.
    pub api_token: Option<String>,

    /// Background refresh period in minutes. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,

    /// Quiet period before read state is written back to the server.
    pub read_sync_delay_secs: u64,

    pub entries_per_page: u32,

    /// Entries older than this are not fetched.
    pub max_entry_age_days: i64,

    pub request_timeout_secs: u64,

    /// Override for the local database location.
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://micro.blog".to_string(),
            api_token: None,
            refresh_interval_minutes: 5,
            read_sync_delay_secs: 3,
            entries_per_page: 50,
            max_entry_age_days: 7,
            request_timeout_secs: 30,
            database_path: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_interval_minutes", &self.refresh_interval_minutes)
            .field("read_sync_delay_secs", &self.read_sync_delay_secs)
            .field("entries_per_page", &self.entries_per_page)
            .field("max_entry_age_days", &self.max_entry_age_days)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "api_base_url",
        "api_token",
        "refresh_interval_minutes",
        "read_sync_delay_secs",
        "entries_per_page",
        "max_entry_age_days",
        "request_timeout_secs",
        "database_path",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            api_base_url = %config.api_base_url,
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The API token, preferring `INKWELL_TOKEN` over the config file.
    pub fn token(&self) -> Option<SecretString> {
        token_from(std::env::var(TOKEN_ENV_VAR).ok(), self.api_token.as_deref())
    }

    pub fn timeline_config(&self) -> TimelineConfig {
        TimelineConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_minutes * 60),
            read_sync_delay: Duration::from_secs(self.read_sync_delay_secs),
            ..TimelineConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn token_from(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|t| !t.trim().is_empty())
        .or_else(|| file.map(str::to_string).filter(|t| !t.trim().is_empty()))
        .map(|t| SecretString::from(t.trim().to_string()))
}

// ============================================================================
// Tests
// ============================================================================
