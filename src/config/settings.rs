//! Daemon settings
//!
//! Loaded once at startup from JSON. Every field has a default so partial or
//! older files keep working.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants::{config, logging, outputs, timing};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long geometry notifications are coalesced before re-checking redundancy
    #[serde(default = "default_reconsider_delay_ms")]
    pub reconsider_delay_ms: u64,

    /// Minimum spacing between writes of the connector mapping
    #[serde(default = "default_save_cooldown_secs")]
    pub save_cooldown_secs: u64,

    /// Connector names that never represent real hardware
    #[serde(default = "default_fake_output_names")]
    pub fake_output_names: Vec<String>,

    /// Print logical screen events as JSON lines on stdout
    #[serde(default)]
    pub print_events: bool,
}

/// Runtime knobs of a `ScreenPool`, derived from `Settings`
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub reconsider_delay: Duration,
    pub save_cooldown: Duration,
    pub fake_output_names: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    logging::DEFAULT_LOG_LEVEL.to_string()
}

fn default_reconsider_delay_ms() -> u64 {
    timing::RECONSIDER_OUTPUTS_MS
}

fn default_save_cooldown_secs() -> u64 {
    timing::CONFIG_SAVE_COOLDOWN_SECS
}

fn default_fake_output_names() -> Vec<String> {
    vec![outputs::X11_FAKE_OUTPUT_NAME.to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconsider_delay_ms: default_reconsider_delay_ms(),
            save_cooldown_secs: default_save_cooldown_secs(),
            fake_output_names: default_fake_output_names(),
            print_events: false,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Settings::default().pool_settings()
    }
}

impl Settings {
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path
    }

    pub fn path() -> PathBuf {
        Self::config_dir().join(config::SETTINGS_FILENAME)
    }

    /// Load settings from `path`, writing defaults there if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, creating default settings");
            let settings = Settings::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings JSON from {:?}", path))?;

        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            reconsider_delay: Duration::from_millis(self.reconsider_delay_ms),
            save_cooldown: Duration::from_secs(self.save_cooldown_secs),
            fake_output_names: self.fake_output_names.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.reconsider_delay_ms, 250);
        assert_eq!(settings.save_cooldown_secs, 30);
        assert_eq!(settings.fake_output_names, vec![":0.0".to_string()]);
        assert!(!settings.print_events);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "reconsider_delay_ms": 100 }"#).unwrap();
        assert_eq!(settings.reconsider_delay_ms, 100);
        assert_eq!(settings.save_cooldown_secs, 30);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_pool_settings_conversion() {
        let settings = Settings {
            reconsider_delay_ms: 500,
            save_cooldown_secs: 5,
            fake_output_names: vec!["VIRTUAL-1".to_string()],
            ..Settings::default()
        };
        let pool = settings.pool_settings();
        assert_eq!(pool.reconsider_delay, Duration::from_millis(500));
        assert_eq!(pool.save_cooldown, Duration::from_secs(5));
        assert_eq!(pool.fake_output_names, vec!["VIRTUAL-1".to_string()]);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        // Second load reads the written file back
        let again = Settings::load_from(&path).unwrap();
        assert_eq!(again, settings);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Settings::load_from(&path).is_err());
    }
}
