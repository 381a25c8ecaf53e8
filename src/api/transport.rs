//! Transport seams used by the engine
//!
//! The session only talks to the server through these traits, so tests can
//! substitute in-process fakes for the HTTP client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use super::error::{ApiError, ChannelError};
use crate::library::{TrackKey, UserTheme};
use crate::upload::UploadFile;

/// Stream of raw push-channel frames (one JSON envelope per item)
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Upload progress callback, called with cumulative bytes sent
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Source of the one-directional push channel
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<FrameStream, ChannelError>;
}

/// Request/response endpoints that mutate server state
#[async_trait]
pub trait MutationApi: Send + Sync {
    /// Persist a playlist order; returns the playlist's server id (newly
    /// allocated when the all-tracks playlist had never been saved)
    async fn update_playlist(&self, db_id: i64, tracks: &[TrackKey]) -> Result<i64, ApiError>;

    /// Create a playlist, returning its server id
    async fn add_playlist(&self, name: &str, tracks: &[TrackKey]) -> Result<i64, ApiError>;

    async fn rename_playlist(&self, db_id: i64, name: &str) -> Result<(), ApiError>;

    async fn remove_playlist(&self, db_id: i64) -> Result<(), ApiError>;

    async fn update_track(&self, hash: &str, artist: &str, title: &str) -> Result<(), ApiError>;

    async fn set_lyrics(&self, hash: &str, lyrics: &str) -> Result<(), ApiError>;

    async fn remove_tracks(&self, hashes: &[TrackKey]) -> Result<(), ApiError>;

    async fn upload_track(&self, file: &UploadFile, progress: ProgressFn) -> Result<(), ApiError>;

    /// Ask the server to drop the other tab's channel for this user
    async fn close_other_session(&self) -> Result<(), ApiError>;

    async fn update_theme(&self, theme_id: &str) -> Result<(), ApiError>;

    async fn update_themes(&self, themes: &[UserTheme]) -> Result<(), ApiError>;

    /// Start a server-side import of files dropped into the FTP directory
    async fn request_ftp_upload(&self) -> Result<(), ApiError>;
}
