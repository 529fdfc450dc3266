//! Configuration for the fetch and cache layers.
//!
//! Configuration is an explicit value handed to [`Fetcher::new`](crate::feed::Fetcher::new);
//! nothing is process-global. It can be built in code or loaded from a TOML
//! file, where every key is optional and a missing file yields
//! `Config::default()` (caching disabled).
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::ParseOptions;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Fetcher configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for cached responses. `None` disables caching.
    pub cache_dir: Option<PathBuf>,

    /// How long a cached response counts as fresh, in seconds.
    pub cache_expire_secs: u64,

    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,

    /// Whether HTTP redirects are followed.
    pub follow_redirects: bool,

    /// Maximum accepted response body size in bytes.
    pub max_feed_size: usize,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,

    /// Whether recoverable XML errors are tolerated.
    pub lenient_parsing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_expire_secs: Self::DEFAULT_CACHE_EXPIRE_SECS,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            follow_redirects: true,
            max_feed_size: Self::DEFAULT_MAX_FEED_SIZE,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            lenient_parsing: true,
        }
    }
}

impl Config {
    /// One day.
    pub const DEFAULT_CACHE_EXPIRE_SECS: u64 = 86_400;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
    pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "cache_dir",
        "cache_expire_secs",
        "timeout_secs",
        "follow_redirects",
        "max_feed_size",
        "user_agent",
        "lenient_parsing",
    ];

    /// Returns a copy with caching enabled in `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Returns a copy with a different freshness window.
    pub fn with_cache_expire(mut self, expire: Duration) -> Self {
        self.cache_expire_secs = expire.as_secs();
        self
    }

    pub fn cache_expire(&self) -> Duration {
        Duration::from_secs(self.cache_expire_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            lenient: self.lenient_parsing,
            ..ParseOptions::default()
        }
    }

    /// Reads settings from a TOML file.
    ///
    /// A missing or blank file yields [`Config::default`]. Unknown keys are
    /// logged and ignored. Files over 1 MiB are rejected unread.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_config_file(path)? else {
            tracing::debug!(path = %path.display(), "No feed config file, using defaults");
            return Ok(Self::default());
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Blank feed config file, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, path = %path.display(), "Ignoring unknown config key");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            cache_dir = ?config.cache_dir,
            cache_expire_secs = config.cache_expire_secs,
            "Loaded configuration"
        );
        Ok(config)
    }
}

/// File contents, or `None` when there is no file. The file may vanish
/// between the size check and the read; that also counts as absent.
fn read_config_file(path: &Path) -> Result<Option<String>, ConfigError> {
    // SEC-014: size cap
    let len = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Io(e)),
    };
    if len > Config::MAX_FILE_SIZE {
        return Err(ConfigError::TooLarge(format!(
            "{} is {len} bytes, limit is {}",
            path.display(),
            Config::MAX_FILE_SIZE
        )));
    }

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

// ============================================================================
// Tests
// ============================================================================
