//! In-process fakes of the transport traits

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::{ApiError, ChannelError, EventSource, FrameStream, MutationApi, ProgressFn};
use crate::library::{TrackKey, UserTheme};
use crate::upload::UploadFile;

/// Call recorded by [`FakeApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UpdatePlaylist { db_id: i64, tracks: Vec<TrackKey> },
    AddPlaylist { name: String, tracks: Vec<TrackKey> },
    RenamePlaylist { db_id: i64, name: String },
    RemovePlaylist(i64),
    UpdateTrack { hash: String, artist: String, title: String },
    SetLyrics { hash: String, lyrics: String },
    RemoveTracks(Vec<TrackKey>),
    Upload(String),
    CloseOtherSession,
    UpdateTheme(String),
    UpdateThemes(usize),
    FtpUpload,
}

/// Records every call; endpoints can be scripted to fail a number of times
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, usize>>,
    new_id: Mutex<Option<i64>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `endpoint` with key `db`
    pub fn fail(&self, endpoint: &'static str, times: usize) {
        self.failures.lock().unwrap().insert(endpoint, times);
    }

    /// Id returned by `updatepl` and `addpl`
    pub fn set_new_id(&self, id: i64) {
        *self.new_id.lock().unwrap() = Some(id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, endpoint: &'static str, call: Call) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(endpoint) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ApiError::new("db", Some(format!("{endpoint} failed"))))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MutationApi for FakeApi {
    async fn update_playlist(&self, db_id: i64, tracks: &[TrackKey]) -> Result<i64, ApiError> {
        self.record(
            "updatepl",
            Call::UpdatePlaylist {
                db_id,
                tracks: tracks.to_vec(),
            },
        )?;
        Ok(self.new_id.lock().unwrap().unwrap_or(db_id))
    }

    async fn add_playlist(&self, name: &str, tracks: &[TrackKey]) -> Result<i64, ApiError> {
        self.record(
            "addpl",
            Call::AddPlaylist {
                name: name.to_string(),
                tracks: tracks.to_vec(),
            },
        )?;
        Ok(self.new_id.lock().unwrap().unwrap_or(100))
    }

    async fn rename_playlist(&self, db_id: i64, name: &str) -> Result<(), ApiError> {
        self.record(
            "renamepl",
            Call::RenamePlaylist {
                db_id,
                name: name.to_string(),
            },
        )
    }

    async fn remove_playlist(&self, db_id: i64) -> Result<(), ApiError> {
        self.record("removepl", Call::RemovePlaylist(db_id))
    }

    async fn update_track(&self, hash: &str, artist: &str, title: &str) -> Result<(), ApiError> {
        self.record(
            "updatetrack",
            Call::UpdateTrack {
                hash: hash.to_string(),
                artist: artist.to_string(),
                title: title.to_string(),
            },
        )
    }

    async fn set_lyrics(&self, hash: &str, lyrics: &str) -> Result<(), ApiError> {
        self.record(
            "setlyrics",
            Call::SetLyrics {
                hash: hash.to_string(),
                lyrics: lyrics.to_string(),
            },
        )
    }

    async fn remove_tracks(&self, hashes: &[TrackKey]) -> Result<(), ApiError> {
        self.record("removetracks", Call::RemoveTracks(hashes.to_vec()))
    }

    async fn upload_track(&self, file: &UploadFile, progress: ProgressFn) -> Result<(), ApiError> {
        progress(file.size / 2);
        self.record("upload", Call::Upload(file.name.clone()))?;
        progress(file.size);
        Ok(())
    }

    async fn close_other_session(&self) -> Result<(), ApiError> {
        self.record("closech", Call::CloseOtherSession)
    }

    async fn update_theme(&self, theme_id: &str) -> Result<(), ApiError> {
        self.record("updatetheme", Call::UpdateTheme(theme_id.to_string()))
    }

    async fn update_themes(&self, themes: &[UserTheme]) -> Result<(), ApiError> {
        self.record("updatethemes", Call::UpdateThemes(themes.len()))
    }

    async fn request_ftp_upload(&self) -> Result<(), ApiError> {
        self.record("ftp_upload", Call::FtpUpload)
    }
}

pub type FrameSender = mpsc::UnboundedSender<Result<String, ChannelError>>;

/// Push channel whose connections are fed by the test
#[derive(Default)]
pub struct FakeSource {
    pending: Mutex<VecDeque<Result<FrameStream, ChannelError>>>,
    connects: Mutex<usize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the next connection, returning its frame feed
    pub fn next_connection(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded();
        self.pending.lock().unwrap().push_back(Ok(rx.boxed()));
        tx
    }

    /// Make the next connection attempt fail
    pub fn refuse_next(&self, err: ChannelError) {
        self.pending.lock().unwrap().push_back(Err(err));
    }

    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn connect(&self) -> Result<FrameStream, ChannelError> {
        *self.connects.lock().unwrap() += 1;
        match self.pending.lock().unwrap().pop_front() {
            Some(next) => next,
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
