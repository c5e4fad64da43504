//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. the TOML config file (`--config`, or the platform config directory)
//! 3. `THUMBCACHE_` environment variables, `__` separating nested keys
//!    (e.g. `THUMBCACHE_ICONS__THEME=Adwaita`)
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::hashing::DEFAULT_MAX_HASH_SIZE;
use crate::media::{default_search_paths, DirectoryIconTheme};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "THUMBCACHE_";

/// Icon theme settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    /// Theme consulted first.
    pub theme: String,
    /// Theme consulted when the first one lacks an icon.
    pub fallback_theme: String,
    /// Directories holding icon themes.
    pub search_paths: Vec<PathBuf>,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            theme: "hicolor".to_string(),
            fallback_theme: "hicolor".to_string(),
            search_paths: default_search_paths(),
        }
    }
}

impl IconConfig {
    /// Build the directory theme resolver these settings describe.
    #[must_use]
    pub fn resolver(&self) -> DirectoryIconTheme {
        DirectoryIconTheme::new(self.search_paths.clone(), &self.theme, &self.fallback_theme)
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache directory; the platform cache directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Files above this many bytes are not hashed or sniffed.
    pub max_hash_size: u64,
    /// Idle sleep of the background loops, in milliseconds.
    pub idle_interval_ms: u64,
    /// Keep jumbo executable icons.
    pub extract_jumbo_icons: bool,
    /// Icon theme settings.
    pub icons: IconConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_hash_size: DEFAULT_MAX_HASH_SIZE,
            idle_interval_ms: 100,
            extract_jumbo_icons: true,
            icons: IconConfig::default(),
        }
    }
}

impl Config {
    /// Load the layered configuration.
    ///
    /// `path` overrides the default config file location. A missing file is
    /// not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path(),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            log::debug!("Reading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().context("Invalid configuration")
    }

    /// Default platform-specific config file path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "thumbcache", "thumbcache")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Effective cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("org", "thumbcache", "thumbcache")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Failed to determine the platform cache directory"))
    }

    /// Runtime settings handed to the caches.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_hash_size: self.max_hash_size,
            idle_interval: Duration::from_millis(self.idle_interval_ms),
            jumbo_icons: self.extract_jumbo_icons,
        }
    }

    /// Serialize as TOML, the format [`Config::load`] reads.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
