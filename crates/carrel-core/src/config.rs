//! Carrel configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CarrelError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrelConfig {
    /// Store root directory (tilde-expanded by the binary).
    #[serde(default = "default_store_root")]
    pub store_root: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_store_root() -> String {
    "~/.carrel/store".into()
}

impl Default for CarrelConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl CarrelConfig {
    /// Load config from the default path (~/.carrel/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CarrelError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CarrelError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CarrelError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Carrel home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carrel")
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Trash container name inside the store root. Dot-prefixed so the
    /// scanner's hidden-directory rule needs an explicit exception for it.
    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,
    /// Container that restore falls back to when an item's original
    /// location no longer exists.
    #[serde(default = "default_container")]
    pub default_container: String,
    /// Bounded retry budget for the rename/delete contention fallback.
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    /// Base of the linear backoff between retry attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_trash_dir() -> String {
    ".trash".into()
}
fn default_container() -> String {
    "inbox".into()
}
fn default_retry_attempts() -> u32 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            trash_dir: default_trash_dir(),
            default_container: default_container(),
            retry_max_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval while the workbench window is visible.
    #[serde(default = "default_foreground_secs")]
    pub foreground_check_secs: u64,
    /// Tick interval while hidden/backgrounded. Must exceed the foreground
    /// interval for visibility switching to mean anything.
    #[serde(default = "default_background_secs")]
    pub background_check_secs: u64,
    /// Ticks inside this window after start() evaluate nothing, so a
    /// restart does not burst notifications while the store settles.
    #[serde(default = "default_grace_secs")]
    pub startup_grace_secs: u64,
}

fn default_foreground_secs() -> u64 {
    30
}
fn default_background_secs() -> u64 {
    300
}
fn default_grace_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            foreground_check_secs: default_foreground_secs(),
            background_check_secs: default_background_secs(),
            startup_grace_secs: default_grace_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CarrelConfig::default();
        assert_eq!(config.store.trash_dir, ".trash");
        assert_eq!(config.scheduler.foreground_check_secs, 30);
        assert!(config.scheduler.background_check_secs > config.scheduler.foreground_check_secs);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CarrelConfig =
            toml::from_str("store_root = \"/tmp/store\"\n[scheduler]\nforeground_check_secs = 10\n")
                .unwrap();
        assert_eq!(config.store_root, "/tmp/store");
        assert_eq!(config.scheduler.foreground_check_secs, 10);
        assert_eq!(config.scheduler.background_check_secs, 300);
        assert_eq!(config.store.retry_max_attempts, 5);
    }
}
