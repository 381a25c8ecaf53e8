//! Session memory that survives restarts
//!
//! Remembers what was playing, the queue, the playback position, the volume
//! and the UI language. Saved to ~/.config/tunemirror/session.json.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::library::{PlaylistId, TrackKey};
use crate::utils::{log_volume, real_volume};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryData {
    pub last_src: Option<TrackKey>,
    pub last_playlist: Option<PlaylistId>,
    /// Comma-joined track keys of the explicit queue
    pub last_playback: Option<String>,
    /// Playback position in seconds
    pub last_playback_state: Option<f64>,
    /// Volume on the 0..100 scale
    pub last_volume: Option<u8>,
    pub last_lang: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Session memory bound to its backing file
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    data: MemoryData,
    path: Option<PathBuf>,
}

impl SessionMemory {
    /// Memory without a backing file
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Ok(Self::load_from(&Self::memory_path()?))
    }

    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load_from(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring corrupt session memory: {}", e);
                MemoryData::default()
            }),
            Err(_) => {
                debug!("No session memory at {:?}", path);
                MemoryData::default()
            }
        };

        Self {
            data,
            path: Some(path.to_path_buf()),
        }
    }

    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        self.data.updated_at = Some(Utc::now());
        let contents =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize session memory")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write session memory to {:?}", path))?;
        Ok(())
    }

    pub fn memory_path() -> Result<PathBuf> {
        Ok(super::config_dir()?.join("session.json"))
    }

    pub fn data(&self) -> &MemoryData {
        &self.data
    }

    pub fn last_src(&self) -> Option<&str> {
        self.data.last_src.as_deref()
    }

    pub fn set_last_src(&mut self, key: Option<&str>) {
        self.data.last_src = key.map(str::to_string);
    }

    pub fn last_playlist(&self) -> Option<PlaylistId> {
        self.data.last_playlist
    }

    pub fn set_last_playlist(&mut self, id: PlaylistId) {
        self.data.last_playlist = Some(id);
    }

    /// The saved explicit queue, if one was stored
    /// Saved queue; an empty one counts as none
    pub fn playback(&self) -> Option<Vec<TrackKey>> {
        let joined = self.data.last_playback.as_deref()?;
        let keys: Vec<TrackKey> = joined
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        (!keys.is_empty()).then_some(keys)
    }

    pub fn set_playback(&mut self, keys: &[TrackKey]) {
        self.data.last_playback = (!keys.is_empty()).then(|| keys.join(","));
    }

    pub fn position(&self) -> Option<f64> {
        self.data.last_playback_state
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.data.last_playback_state = Some(seconds.max(0.0));
    }

    pub fn volume(&self) -> Option<u8> {
        self.data.last_volume
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.data.last_volume = Some(volume.min(100));
    }

    /// Remembered volume on the 0..1 device scale
    pub fn device_volume(&self, base: f64) -> f64 {
        log_volume(f64::from(self.data.last_volume.unwrap_or(100)), base)
    }

    /// Store a 0..1 device gain as a slider value
    pub fn set_device_volume(&mut self, gain: f64, base: f64) {
        let volume = real_volume(gain.clamp(0.0, 1.0), base).round();
        self.set_volume(volume as u8);
    }

    pub fn lang(&self) -> Option<&str> {
        self.data.last_lang.as_deref()
    }

    pub fn set_lang(&mut self, lang: &str) {
        self.data.last_lang = Some(lang.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::VOLUME_BASE;

    #[test]
    fn test_playback_is_comma_joined() {
        let mut memory = SessionMemory::in_memory();
        assert_eq!(memory.playback(), None);

        memory.set_playback(&["a".to_string(), "b".to_string()]);
        assert_eq!(memory.data().last_playback.as_deref(), Some("a,b"));
        assert_eq!(memory.playback(), Some(vec!["a".to_string(), "b".to_string()]));

        memory.set_playback(&[]);
        assert_eq!(memory.data().last_playback, None);
        assert_eq!(memory.playback(), None);
    }

    #[test]
    fn test_blank_saved_queue_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"last_playback": " , "}"#).unwrap();

        let memory = SessionMemory::load_from(&path);
        assert_eq!(memory.playback(), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut memory = SessionMemory::load_from(&path);
        memory.set_last_src(Some("abc"));
        memory.set_last_playlist(4);
        memory.set_volume(250);
        memory.set_lang("ru");
        memory.save().unwrap();

        let reloaded = SessionMemory::load_from(&path);
        assert_eq!(reloaded.last_src(), Some("abc"));
        assert_eq!(reloaded.last_playlist(), Some(4));
        assert_eq!(reloaded.volume(), Some(100));
        assert_eq!(reloaded.lang(), Some("ru"));
        assert!(reloaded.data().updated_at.is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let memory = SessionMemory::load_from(&path);
        assert_eq!(memory.data(), &MemoryData::default());
    }

    #[test]
    fn test_device_volume() {
        let mut memory = SessionMemory::in_memory();
        assert!((memory.device_volume(VOLUME_BASE) - 1.0).abs() < 1e-9);
        memory.set_volume(0);
        assert!(memory.device_volume(VOLUME_BASE).abs() < 1e-9);

        memory.set_device_volume(log_volume(42.0, VOLUME_BASE), VOLUME_BASE);
        assert_eq!(memory.volume(), Some(42));
    }
}
