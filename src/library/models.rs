//! Library data model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content hash identifying a track
pub type TrackKey = String;

/// Client-local playlist identifier
pub type PlaylistId = i64;

/// Reserved id of the "all tracks" playlist
pub const LIBRARY_PLAYLIST_ID: PlaylistId = -1;

/// Track from the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub md5: TrackKey,
    pub artist: String,
    pub title: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub has_image: bool,
    /// Creation time (unix seconds)
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub lyrics: String,
}

impl Track {
    /// "Artist - Title" display form, also used for search matching
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// Ordered playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    /// Server-side id, -1 when the playlist was never persisted
    pub db_id: i64,
    pub name: String,
    pub tracks: Vec<TrackKey>,
}

impl Playlist {
    pub fn is_library(&self) -> bool {
        self.id == LIBRARY_PLAYLIST_ID
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t == key)
    }
}

/// User-defined color theme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserTheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

/// Signed-in user and preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub nickname: String,
    pub lang: String,
    pub theme: String,
    pub themes: BTreeMap<String, UserTheme>,
    pub is_admin: bool,
    pub is_root: bool,
    pub rem_ip: bool,
    pub autoplay: bool,
    pub has_avatar: bool,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: -1,
            nickname: String::new(),
            lang: "en".to_string(),
            theme: String::new(),
            themes: BTreeMap::new(),
            is_admin: false,
            is_root: false,
            rem_ip: false,
            autoplay: false,
            has_avatar: false,
        }
    }
}

/// Ordering applied to the displayed track list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackSort {
    /// Playlist order
    #[default]
    Custom,
    TimestampAsc,
    TimestampDesc,
    ArtistAsc,
    ArtistDesc,
    TitleAsc,
    TitleDesc,
    DurationAsc,
    DurationDesc,
}

/// What happens when the current track ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepeatMode {
    #[default]
    All,
    One,
    Shuffle,
}

impl RepeatMode {
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Shuffle,
            RepeatMode::Shuffle => RepeatMode::All,
        }
    }
}

/// Effect of a store mutation on the now-playing track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackChange {
    Unchanged,
    Stopped,
    Switched(TrackKey),
}
