//! Mutation gateway
//!
//! Every server-side mutation goes through here. Calls run as spawned tasks
//! and report back as [`Completion`] values, which the session feeds to
//! [`MutationGateway::handle`] to reconcile the store. Apart from reorders
//! (already applied by the gesture) the store only changes after success.

mod notice;
mod reorder;

pub use notice::Notice;
pub use reorder::{ReorderDispatch, ReorderGate};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::api::{ApiError, MutationApi};
use crate::library::*;

/// Attempts made for a playlist rename before giving up
const RENAME_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackListChange {
    Added(usize),
    Removed(usize),
}

/// Settled gateway call
#[derive(Debug)]
pub enum Completion {
    Reorder {
        playlist: PlaylistId,
        result: Result<i64, ApiError>,
    },
    PlaylistTracks {
        playlist: PlaylistId,
        tracks: Vec<TrackKey>,
        change: TrackListChange,
        result: Result<i64, ApiError>,
    },
    PlaylistAdded {
        name: String,
        result: Result<i64, ApiError>,
    },
    PlaylistRenamed {
        playlist: PlaylistId,
        name: String,
        result: Result<(), ApiError>,
    },
    PlaylistRemoved {
        playlist: PlaylistId,
        result: Result<(), ApiError>,
    },
    TrackUpdated {
        hash: TrackKey,
        title: String,
        artist: String,
        result: Result<(), ApiError>,
    },
    LyricsSet {
        hash: TrackKey,
        lyrics: String,
        result: Result<(), ApiError>,
    },
    TracksRemoved {
        hashes: Vec<TrackKey>,
        result: Result<(), ApiError>,
    },
    Takeover {
        result: Result<(), ApiError>,
    },
    Theme {
        result: Result<(), ApiError>,
    },
    FtpRequested {
        result: Result<(), ApiError>,
    },
}

/// What a completion changed, for the session to act on
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayUpdate {
    Notice(Notice),
    TracksRemoved {
        keys: Vec<TrackKey>,
        playback: PlaybackChange,
    },
    PlaylistCreated(PlaylistId),
    /// The other session was closed; the channel can be reopened
    TakeoverReady,
}

/// Outcome of dropping dragged tracks on a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDrop {
    Sent { added: usize },
    NothingNew,
    /// All-tracks, the current playlist, or an unknown playlist
    InvalidTarget,
}

pub struct MutationGateway {
    api: Arc<dyn MutationApi>,
    completions: UnboundedSender<Completion>,
    reorders: ReorderGate,
}

impl MutationGateway {
    pub fn new(api: Arc<dyn MutationApi>) -> (Self, UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            api,
            completions,
            reorders: ReorderGate::default(),
        };
        (gateway, rx)
    }

    pub fn reorders(&self) -> &ReorderGate {
        &self.reorders
    }

    fn spawn<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let _ = completions.send(call.await);
        });
    }

    /// Persist the playlist's current order. While a call for the same
    /// playlist is in flight the commit is parked and sent, with the order
    /// as it is then, once that call settles.
    pub fn reorder_playlist(&mut self, store: &LibraryStore, playlist: PlaylistId) -> ReorderDispatch {
        if store.playlist(playlist).is_none() {
            return ReorderDispatch::Missing;
        }
        if !self.reorders.begin(playlist) {
            debug!("Reorder of playlist {} parked", playlist);
            return ReorderDispatch::Parked;
        }
        self.send_reorder(store, playlist);
        ReorderDispatch::Sent
    }

    fn send_reorder(&self, store: &LibraryStore, playlist: PlaylistId) -> bool {
        let Some(pl) = store.playlist(playlist) else {
            return false;
        };
        let api = self.api.clone();
        let db_id = pl.db_id;
        let tracks = pl.tracks.clone();
        debug!("Saving order of playlist {} ({} tracks)", playlist, tracks.len());

        self.spawn(async move {
            let result = api.update_playlist(db_id, &tracks).await;
            Completion::Reorder { playlist, result }
        });
        true
    }

    fn send_playlist_tracks(&self, pl: &Playlist, tracks: Vec<TrackKey>, change: TrackListChange) {
        let api = self.api.clone();
        let playlist = pl.id;
        let db_id = pl.db_id;
        self.spawn(async move {
            let result = api.update_playlist(db_id, &tracks).await;
            Completion::PlaylistTracks {
                playlist,
                tracks,
                change,
                result,
            }
        });
    }

    /// Remove keys from a playlist (not from the library)
    pub fn remove_from_playlist(&self, store: &LibraryStore, playlist: PlaylistId, keys: &[TrackKey]) -> bool {
        let Some(pl) = store.playlist(playlist).filter(|p| !p.is_library()) else {
            return false;
        };
        let tracks: Vec<TrackKey> = pl
            .tracks
            .iter()
            .filter(|t| !keys.contains(t))
            .cloned()
            .collect();
        let removed = pl.tracks.len() - tracks.len();
        if removed == 0 {
            return false;
        }
        self.send_playlist_tracks(pl, tracks, TrackListChange::Removed(removed));
        true
    }

    /// Prepend the dragged keys missing from `target`, in dragged order
    pub fn add_to_playlist(&self, store: &LibraryStore, target: PlaylistId, keys: &[TrackKey]) -> CrossDrop {
        let Some(pl) = store.playlist(target) else {
            return CrossDrop::InvalidTarget;
        };
        if pl.is_library() || target == store.current_id() || keys.is_empty() {
            return CrossDrop::InvalidTarget;
        }

        let mut tracks: Vec<TrackKey> = Vec::with_capacity(keys.len() + pl.tracks.len());
        for key in keys {
            if !pl.tracks.contains(key) && !tracks.contains(key) {
                tracks.push(key.clone());
            }
        }
        let added = tracks.len();
        if added == 0 {
            return CrossDrop::NothingNew;
        }

        tracks.extend(pl.tracks.iter().cloned());
        self.send_playlist_tracks(pl, tracks, TrackListChange::Added(added));
        CrossDrop::Sent { added }
    }

    pub fn add_playlist(&self, name: &str) {
        let api = self.api.clone();
        let name = name.to_string();
        self.spawn(async move {
            let result = api.add_playlist(&name, &[]).await;
            Completion::PlaylistAdded { name, result }
        });
    }

    /// Rename a playlist, retrying transient failures. An empty name is
    /// rejected; an unchanged name is a no-op.
    pub fn rename_playlist(&self, store: &LibraryStore, playlist: PlaylistId, name: &str) -> Result<bool, Notice> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Notice::PlaylistNameEmpty);
        }
        let Some(pl) = store.playlist(playlist).filter(|p| !p.is_library()) else {
            return Ok(false);
        };
        if pl.name == name {
            return Ok(false);
        }

        let api = self.api.clone();
        let db_id = pl.db_id;
        let name = name.to_string();
        self.spawn(async move {
            let mut attempt = 1;
            let result = loop {
                match api.rename_playlist(db_id, &name).await {
                    Ok(()) => break Ok(()),
                    Err(err) if attempt < RENAME_ATTEMPTS => {
                        debug!("Rename attempt {} failed: {}", attempt, err);
                        attempt += 1;
                    }
                    Err(err) => break Err(err),
                }
            };
            Completion::PlaylistRenamed {
                playlist,
                name,
                result,
            }
        });
        Ok(true)
    }

    pub fn delete_playlist(&self, store: &LibraryStore, playlist: PlaylistId) -> bool {
        let Some(pl) = store.playlist(playlist).filter(|p| !p.is_library()) else {
            return false;
        };
        let api = self.api.clone();
        let db_id = pl.db_id;
        self.spawn(async move {
            let result = api.remove_playlist(db_id).await;
            Completion::PlaylistRemoved { playlist, result }
        });
        true
    }

    pub fn mutate_track(&self, hash: &str, title: &str, artist: &str) {
        let api = self.api.clone();
        let (hash, title, artist) = (hash.to_string(), title.to_string(), artist.to_string());
        self.spawn(async move {
            let result = api.update_track(&hash, &artist, &title).await;
            Completion::TrackUpdated {
                hash,
                title,
                artist,
                result,
            }
        });
    }

    pub fn set_lyrics(&self, hash: &str, lyrics: &str) {
        let api = self.api.clone();
        let (hash, lyrics) = (hash.to_string(), lyrics.to_string());
        self.spawn(async move {
            let result = api.set_lyrics(&hash, &lyrics).await;
            Completion::LyricsSet {
                hash,
                lyrics,
                result,
            }
        });
    }

    /// Delete tracks from the library
    pub fn remove_tracks(&self, hashes: Vec<TrackKey>) {
        if hashes.is_empty() {
            return;
        }
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.remove_tracks(&hashes).await;
            Completion::TracksRemoved { hashes, result }
        });
    }

    /// Close the session that holds the channel so this one can take over
    pub fn takeover(&self) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.close_other_session().await;
            Completion::Takeover { result }
        });
    }

    /// Best-effort: failures are only logged
    pub fn save_theme(&self, theme_id: &str) {
        let api = self.api.clone();
        let theme_id = theme_id.to_string();
        self.spawn(async move {
            let result = api.update_theme(&theme_id).await;
            Completion::Theme { result }
        });
    }

    /// Best-effort: failures are only logged
    pub fn save_themes(&self, themes: Vec<UserTheme>) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.update_themes(&themes).await;
            Completion::Theme { result }
        });
    }

    pub fn request_ftp_upload(&self) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.request_ftp_upload().await;
            Completion::FtpRequested { result }
        });
    }

    /// Reconcile the store with a settled call
    pub fn handle(&mut self, completion: Completion, store: &mut LibraryStore) -> Vec<GatewayUpdate> {
        let mut updates = Vec::new();

        match completion {
            Completion::Reorder { playlist, result } => {
                match result {
                    Ok(id) => {
                        if playlist == LIBRARY_PLAYLIST_ID && id > 0 {
                            store.set_library_db_id(id);
                        }
                    }
                    Err(error) => {
                        // The optimistic order stays in place
                        warn!("Saving order of playlist {} failed: {}", playlist, error);
                        updates.push(failed("save playlist order", error));
                    }
                }
                if self.reorders.finish(playlist) && !self.send_reorder(store, playlist) {
                    self.reorders.abandon(playlist);
                }
            }
            Completion::PlaylistTracks {
                playlist,
                tracks,
                change,
                result,
            } => match result {
                Ok(_) => {
                    store.set_playlist_tracks(playlist, tracks);
                    let Some(pl) = store.playlist(playlist) else {
                        return updates;
                    };
                    let name = pl.name.clone();
                    let empty = pl.tracks.is_empty();
                    updates.push(GatewayUpdate::Notice(match change {
                        TrackListChange::Added(count) => Notice::PlaylistTracksAdded { playlist: name, count },
                        TrackListChange::Removed(count) => {
                            Notice::PlaylistTracksRemoved { playlist: name, count }
                        }
                    }));
                    if empty && playlist == store.current_id() {
                        store.set_select_mode(false);
                    }
                }
                Err(error) => updates.push(failed("update playlist", error)),
            },
            Completion::PlaylistAdded { name, result } => match result {
                Ok(id) if id > 0 => {
                    store.add_playlist(Playlist {
                        id,
                        db_id: id,
                        name: name.clone(),
                        tracks: Vec::new(),
                    });
                    store.set_current(id);
                    info!("Created playlist {} ({})", name, id);
                    updates.push(GatewayUpdate::PlaylistCreated(id));
                    updates.push(GatewayUpdate::Notice(Notice::PlaylistCreated { name }));
                }
                Ok(id) => warn!("Server returned invalid playlist id {}", id),
                Err(error) => updates.push(failed("create playlist", error)),
            },
            Completion::PlaylistRenamed {
                playlist,
                name,
                result,
            } => match result {
                Ok(()) => {
                    let old_name = store
                        .playlist(playlist)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    if store.rename_playlist(playlist, &name) {
                        updates.push(GatewayUpdate::Notice(Notice::PlaylistRenamed {
                            old_name,
                            new_name: name,
                        }));
                    }
                }
                Err(error) => updates.push(failed("rename playlist", error)),
            },
            Completion::PlaylistRemoved { playlist, result } => match result {
                Ok(()) => {
                    let name = store
                        .playlist(playlist)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    if store.remove_playlist(playlist) {
                        self.reorders.abandon(playlist);
                        updates.push(GatewayUpdate::Notice(Notice::PlaylistRemoved { name }));
                    }
                }
                Err(error) => updates.push(failed("remove playlist", error)),
            },
            Completion::TrackUpdated {
                hash,
                title,
                artist,
                result,
            } => match result {
                Ok(()) => {
                    if store.update_track(&hash, &title, &artist) {
                        let name = store.track(&hash).map(Track::display_name).unwrap_or_default();
                        updates.push(GatewayUpdate::Notice(Notice::TrackUpdated { name }));
                    }
                }
                Err(error) => updates.push(failed("update track", error)),
            },
            Completion::LyricsSet { hash, lyrics, result } => match result {
                Ok(()) => {
                    if store.update_lyrics(&hash, &lyrics) {
                        let name = store.track(&hash).map(Track::display_name).unwrap_or_default();
                        updates.push(GatewayUpdate::Notice(Notice::LyricsUpdated { name }));
                    }
                }
                Err(error) => updates.push(failed("save lyrics", error)),
            },
            Completion::TracksRemoved { hashes, result } => match result {
                Ok(()) => {
                    let count = hashes.len();
                    let playback = store.remove_tracks(&hashes);
                    if store.select_mode() && store.displayed_keys().is_empty() {
                        store.set_select_mode(false);
                    }
                    updates.push(GatewayUpdate::TracksRemoved {
                        keys: hashes,
                        playback,
                    });
                    updates.push(GatewayUpdate::Notice(Notice::TracksRemoved { count }));
                }
                Err(error) => updates.push(failed("remove tracks", error)),
            },
            Completion::Takeover { result } => match result {
                Ok(()) => updates.push(GatewayUpdate::TakeoverReady),
                Err(error) => updates.push(failed("close the other session", error)),
            },
            Completion::Theme { result } => {
                if let Err(error) = result {
                    debug!("Theme save failed: {}", error);
                }
            }
            Completion::FtpRequested { result } => {
                if let Err(error) = result {
                    updates.push(failed("start FTP import", error));
                }
            }
        }

        updates
    }
}

fn failed(action: &'static str, error: ApiError) -> GatewayUpdate {
    GatewayUpdate::Notice(Notice::Failed { action, error })
}
