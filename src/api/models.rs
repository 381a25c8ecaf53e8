//! Wire models for the server API and the push channel

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use crate::library::{Track, TrackKey};

/// Wrapper for all mutation endpoint responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub error: String,
}

impl ApiResponse {
    fn check(&self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            let key = if self.key.is_empty() { "unknown" } else { self.key.as_str() };
            Err(ApiError::new(key, Some(self.error.clone())))
        }
    }

    /// Decode the `data` field of a successful response
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        self.check()?;
        serde_json::from_value(self.data).map_err(ApiError::invalid_response)
    }

    /// Succeeds when the server reported success, ignoring `data`
    pub fn into_unit(self) -> Result<(), ApiError> {
        self.check()
    }
}

/// Push channel envelope, `{"type": ..., "data": ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Playlist as stored server-side, with a JSON-encoded order
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlaylist {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tracks: String,
}

/// User record as stored server-side, with a JSON-encoded theme map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUser {
    pub id: i64,
    pub nickname: String,
    pub lang: String,
    pub theme: String,
    pub themes: String,
    pub is_admin: bool,
    pub is_root: bool,
    pub rem_ip: bool,
    pub autoplay: bool,
    pub has_avatar: bool,
}

/// Full hydration payload of the `init` message
#[derive(Debug, Clone, Deserialize)]
pub struct InitPayload {
    #[serde(default)]
    pub playlists: Vec<RawPlaylist>,
    #[serde(default)]
    pub u: RawUser,
    /// Name of the server-side all-tracks playlist
    #[serde(default)]
    pub apk: String,
    /// Library map, either JSON-encoded or inline
    #[serde(default)]
    pub lib: Value,
    #[serde(default)]
    pub custom_app_title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackAddPayload {
    pub track: Track,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracksRemovePayload {
    #[serde(default)]
    pub hashes: Vec<TrackKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackUpdatePayload {
    pub hash: TrackKey,
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackLyricsPayload {
    pub hash: TrackKey,
    pub lyrics: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FtpStartPayload {
    pub files: i64,
}

/// One file reported by a server-side FTP import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtpFile {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub key: String,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    pub key: String,
    pub error: String,
}

/// User row in the admin user table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInTable {
    pub id: i64,
    pub nickname: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerVars {
    pub default_language: String,
    pub session_time: i64,
    pub custom_app_title: String,
}

/// Server configuration as returned by `getserverdata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerData {
    #[serde(default)]
    pub users: Vec<UserInTable>,
    #[serde(default)]
    pub vars: ServerVars,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordData {
    #[serde(rename = "newPassword")]
    pub new_password: String,
}
