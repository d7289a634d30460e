//! Configuration for the digest service.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables (`OPML_URL`, `REFRESH_MINUTES`, `N_ITEMS`, `NAME`,
//! `PORT`, `STATIC_DIR`, `ALLOW_PRIVATE_ADDRESSES`). Command-line flags are
//! applied last by `main`.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::content::{DEFAULT_CONTENT_SELECTOR, DEFAULT_MIN_SUMMARY_LEN};
use crate::digest::DEFAULT_MAX_ITEMS;
use crate::util::AddressPolicy;

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

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the OPML outline listing the feeds. Required.
    pub opml_url: Option<String>,

    /// Minutes between refresh cycles.
    pub refresh_interval_minutes: u64,

    /// Maximum number of items per digest folder.
    pub max_items: usize,

    /// Display name returned by the data endpoint.
    pub name: String,

    pub port: u16,

    /// Directory of static front-end files served at `/`.
    pub static_dir: PathBuf,

    /// Summaries shorter than this (in characters) are scraped from the page.
    pub min_summary_len: usize,

    /// CSS selector of the article body element.
    pub content_selector: String,

    pub fetch_timeout_secs: u64,

    pub render_timeout_secs: u64,

    /// Upper bound on feed requests in flight at once.
    pub max_concurrent_fetches: usize,

    /// Whether to launch a headless browser to scrape short summaries.
    pub scrape_summaries: bool,

    /// Chromium binary to launch instead of the auto-detected one.
    pub chrome_executable: Option<PathBuf>,

    /// Lets feeds and article pages live on loopback or private-network
    /// hosts. Off by default (SEC-001).
    pub allow_private_addresses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opml_url: None,
            refresh_interval_minutes: 5,
            max_items: DEFAULT_MAX_ITEMS,
            name: "FeedPage".to_string(),
            port: 8000,
            static_dir: PathBuf::from("build"),
            min_summary_len: DEFAULT_MIN_SUMMARY_LEN,
            content_selector: DEFAULT_CONTENT_SELECTOR.to_string(),
            fetch_timeout_secs: 30,
            render_timeout_secs: 30,
            max_concurrent_fetches: 256,
            scrape_summaries: true,
            chrome_executable: None,
            allow_private_addresses: false,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "opml_url",
    "refresh_interval_minutes",
    "max_items",
    "name",
    "port",
    "static_dir",
    "min_summary_len",
    "content_selector",
    "fetch_timeout_secs",
    "render_timeout_secs",
    "max_concurrent_fetches",
    "scrape_summaries",
    "chrome_executable",
    "allow_private_addresses",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
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
                // Race condition: file deleted between metadata and read
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
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overrides fields from environment variables.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("OPML_URL") {
            self.opml_url = Some(url);
        }
        if let Some(minutes) = lookup("REFRESH_MINUTES") {
            self.refresh_interval_minutes = parse_env("REFRESH_MINUTES", &minutes)?;
        }
        if let Some(items) = lookup("N_ITEMS") {
            self.max_items = parse_env("N_ITEMS", &items)?;
        }
        if let Some(name) = lookup("NAME") {
            self.name = name;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.static_dir = PathBuf::from(dir);
        }
        if let Some(allow) = lookup("ALLOW_PRIVATE_ADDRESSES") {
            self.allow_private_addresses = parse_env("ALLOW_PRIVATE_ADDRESSES", &allow)?;
        }
        Ok(())
    }

    /// Checks cross-field constraints and returns the OPML address.
    pub fn validate(&self) -> Result<&str, ConfigError> {
        let opml_url = self
            .opml_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid("opml_url is required (set OPML_URL)".to_string())
            })?;
        if self.refresh_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }
        Ok(opml_url)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn address_policy(&self) -> AddressPolicy {
        AddressPolicy::from_allow_private(self.allow_private_addresses)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} has invalid value {value:?}")))
}

// ============================================================================
// Tests
// ============================================================================
