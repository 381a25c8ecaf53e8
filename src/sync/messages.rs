//! Push channel message decoding

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::api::models::*;
use crate::library::{Track, TrackKey};

/// Error key the server sends when another session already holds the channel
pub const ALREADY_CONNECTED: &str = "already_connected";

/// Every message the server can push
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Init(InitPayload),
    TrackAdd(Track),
    TracksRemove(Vec<TrackKey>),
    TrackUpdate {
        hash: TrackKey,
        title: String,
        artist: String,
    },
    TrackLyrics {
        hash: TrackKey,
        lyrics: String,
    },
    FtpStart {
        files: usize,
    },
    FtpFileProcessed(FtpFile),
    FtpDone,
    Destroy,
    Error {
        key: String,
        detail: String,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` payload: {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::BadPayload {
        kind: kind.to_string(),
        source,
    })
}

impl ChannelMessage {
    /// Decode one frame of the push channel
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(frame).map_err(DecodeError::NotJson)?;
        let kind = envelope.kind.as_str();
        let data = envelope.data;

        let message = match kind {
            "init" => Self::Init(payload(kind, data)?),
            "track_add" => {
                let p: TrackAddPayload = payload(kind, data)?;
                Self::TrackAdd(p.track)
            }
            "tracks_remove" => {
                let p: TracksRemovePayload = payload(kind, data)?;
                Self::TracksRemove(p.hashes)
            }
            "track_update" => {
                let p: TrackUpdatePayload = payload(kind, data)?;
                Self::TrackUpdate {
                    hash: p.hash,
                    title: p.title,
                    artist: p.artist,
                }
            }
            "track_lyrics" => {
                let p: TrackLyricsPayload = payload(kind, data)?;
                Self::TrackLyrics {
                    hash: p.hash,
                    lyrics: p.lyrics,
                }
            }
            "ftpu_start" => {
                let p: FtpStartPayload = payload(kind, data)?;
                Self::FtpStart {
                    files: p.files.max(0) as usize,
                }
            }
            "ftpu_file_processed" => Self::FtpFileProcessed(payload(kind, data)?),
            "ftpu_done" => Self::FtpDone,
            "destroy" => Self::Destroy,
            "error" => {
                let p: ErrorPayload = if data.is_null() {
                    ErrorPayload::default()
                } else {
                    payload(kind, data)?
                };
                Self::Error {
                    key: p.key,
                    detail: p.error,
                }
            }
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };

        Ok(message)
    }

    /// Name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::TrackAdd(_) => "track_add",
            Self::TracksRemove(_) => "tracks_remove",
            Self::TrackUpdate { .. } => "track_update",
            Self::TrackLyrics { .. } => "track_lyrics",
            Self::FtpStart { .. } => "ftpu_start",
            Self::FtpFileProcessed(_) => "ftpu_file_processed",
            Self::FtpDone => "ftpu_done",
            Self::Destroy => "destroy",
            Self::Error { .. } => "error",
        }
    }
}
