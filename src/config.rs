//! Configuration file parser for ~/.config/newsline/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::api::{NewsQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE};

/// Environment variable that overrides `api_key` from the config file
pub const API_KEY_ENV: &str = "NEWSLINE_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Platform Profiles
// ============================================================================

/// Target environment the client runs on.
///
/// Android's networking stack is the least reliable of the targets, so it
/// gets more retries, a longer timeout and stricter reachability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    #[default]
    Default,
}

impl Platform {
    /// Retry and timeout policy for this platform.
    pub fn sync_profile(self) -> SyncConfig {
        match self {
            Platform::Android => SyncConfig {
                max_retries: 3,
                request_timeout: Duration::from_millis(15_000),
            },
            Platform::Ios | Platform::Default => SyncConfig {
                max_retries: 1,
                request_timeout: Duration::from_millis(10_000),
            },
        }
    }

    /// Whether "connected" additionally requires internet reachability.
    pub fn strict_reachability(self) -> bool {
        matches!(self, Platform::Android)
    }

    /// Background connectivity re-check interval, if this platform needs one.
    pub fn connectivity_poll_interval(self) -> Option<Duration> {
        match self {
            Platform::Android => Some(Duration::from_secs(10)),
            Platform::Ios | Platform::Default => None,
        }
    }
}

/// Retry/timeout policy consumed by the sync engine. Resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Retries allowed after the first attempt for retryable failures
    pub max_retries: u32,
    /// Bound on a single fetch attempt
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Platform::Default.sync_profile()
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Feed filters applied to every request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub query: Option<String>,
    pub country: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the news endpoint (without the `/news` path).
    pub api_base_url: String,

    /// API key sent as `apikey`. The env var takes precedence.
    pub api_key: Option<String>,

    /// Articles per page (1-100).
    pub page_size: u32,

    /// Platform profile for retry, timeout and connectivity policy.
    pub platform: Platform,

    /// Overrides the platform's retry count.
    pub max_retries: Option<u32>,

    /// Overrides the platform's request timeout.
    pub request_timeout_ms: Option<u64>,

    /// Minutes before the persisted news snapshot counts as expired.
    pub cache_ttl_minutes: u64,

    /// Capacity of the repository's in-memory response cache.
    pub memory_cache_entries: usize,

    /// Feed filters.
    pub filter: FilterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            platform: Platform::Default,
            max_retries: None,
            request_timeout_ms: None,
            cache_ttl_minutes: 30,
            memory_cache_entries: 32,
            filter: FilterConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("page_size", &self.page_size)
            .field("platform", &self.platform)
            .field("max_retries", &self.max_retries)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("cache_ttl_minutes", &self.cache_ttl_minutes)
            .field("memory_cache_entries", &self.memory_cache_entries)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "api_base_url",
        "api_key",
        "page_size",
        "platform",
        "max_retries",
        "request_timeout_ms",
        "cache_ttl_minutes",
        "memory_cache_entries",
        "filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
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
            platform = ?config.platform,
            base_url = %config.api_base_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Retry/timeout policy: platform profile with explicit overrides applied.
    pub fn sync_config(&self) -> SyncConfig {
        let profile = self.platform.sync_profile();
        SyncConfig {
            max_retries: self.max_retries.unwrap_or(profile.max_retries),
            request_timeout: self
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(profile.request_timeout),
        }
    }

    /// Page size clamped to what the endpoint accepts.
    pub fn page_size(&self) -> u32 {
        let clamped = self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        if clamped != self.page_size {
            tracing::warn!(
                requested = self.page_size,
                used = clamped,
                "page_size out of range, clamping"
            );
        }
        clamped
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }

    /// API key from the environment, falling back to the config file.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }

    /// Base query built from the `[filter]` table and page size.
    pub fn base_query(&self) -> NewsQuery {
        NewsQuery {
            query: self.filter.query.clone(),
            country: self.filter.country.clone(),
            category: self.filter.category.clone(),
            language: self.filter.language.clone(),
            page: None,
            size: Some(self.page_size()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
