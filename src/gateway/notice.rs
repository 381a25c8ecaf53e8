//! User-facing notifications produced by the engine

use std::fmt;

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PlaylistCreated { name: String },
    PlaylistRenamed { old_name: String, new_name: String },
    PlaylistNameEmpty,
    PlaylistRemoved { name: String },
    PlaylistTracksAdded { playlist: String, count: usize },
    PlaylistTracksRemoved { playlist: String, count: usize },
    NoNewTracksAdded,
    TracksRemoved { count: usize },
    TrackUpdated { name: String },
    LyricsUpdated { name: String },
    FtpNoValidFiles,
    FtpImportDone { imported: usize, failed: usize },
    UploadFailed { file: String, error: ApiError },
    Failed { action: &'static str, error: ApiError },
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::UploadFailed { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaylistCreated { name } => write!(f, "Playlist \"{}\" created", name),
            Self::PlaylistRenamed { old_name, new_name } => {
                write!(f, "Playlist \"{}\" renamed to \"{}\"", old_name, new_name)
            }
            Self::PlaylistNameEmpty => write!(f, "Playlist name cannot be empty"),
            Self::PlaylistRemoved { name } => write!(f, "Playlist \"{}\" removed", name),
            Self::PlaylistTracksAdded { playlist, count } => {
                write!(f, "{} track(s) added to \"{}\"", count, playlist)
            }
            Self::PlaylistTracksRemoved { playlist, count } => {
                write!(f, "{} track(s) removed from \"{}\"", count, playlist)
            }
            Self::NoNewTracksAdded => write!(f, "No new tracks added"),
            Self::TracksRemoved { count } => write!(f, "{} track(s) removed from library", count),
            Self::TrackUpdated { name } => write!(f, "Track \"{}\" updated", name),
            Self::LyricsUpdated { name } => write!(f, "Lyrics of \"{}\" updated", name),
            Self::FtpNoValidFiles => write!(f, "No valid files found for FTP import"),
            Self::FtpImportDone { imported, failed } => {
                write!(f, "FTP import finished: {} imported, {} failed", imported, failed)
            }
            Self::UploadFailed { file, error } => write!(f, "Upload of {} failed: {}", file, error),
            Self::Failed { action, error } => write!(f, "Failed to {}: {}", action, error),
        }
    }
}
