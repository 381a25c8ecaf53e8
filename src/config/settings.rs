//! Client configuration persistence
//!
//! Stored as JSON in ~/.config/tunemirror/config.json. Missing fields fall
//! back to their defaults so older files keep loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::utils::VOLUME_BASE;

/// Persistent client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Config format version
    pub version: u32,
    /// Server base URL
    pub server_url: Option<String>,
    /// Seconds before an automatic reconnect
    pub reconnect_secs: u32,
    /// Press duration that promotes a gesture (milliseconds)
    pub hold_ms: u64,
    /// Accepted upload file extensions
    pub extensions: Vec<String>,
    /// Base of the logarithmic volume curve
    pub volume_base: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server_url: None,
            reconnect_secs: 5,
            hold_ms: 500,
            extensions: vec!["mp3".to_string()],
            volume_base: VOLUME_BASE,
        }
    }
}

impl ClientConfig {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No client config found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read client config from {:?}", path))?;

        let config: Self =
            serde_json::from_str(&contents).with_context(|| "Failed to parse client config")?;

        debug!("Loaded client config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize client config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write client config to {:?}", path))?;

        debug!("Saved client config to {:?}", path);
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(super::config_dir()?.join("config.json"))
    }

    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.hold_threshold(), Duration::from_millis(500));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ClientConfig {
            server_url: Some("http://music.local".to_string()),
            reconnect_secs: 10,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"hold_ms": 300}"#).unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.hold_ms, 300);
        assert_eq!(config.reconnect_secs, 5);
        assert_eq!(config.extensions, vec!["mp3"]);
    }
}
