//! Push channel supervision
//!
//! The channel owns one reader task per connection. Frames are forwarded to
//! the session tagged with the connection's generation, so anything still in
//! flight from a superseded connection is discarded on arrival.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::hydrate::{build_content, restore_session, Restored};
use super::messages::{ChannelMessage, DecodeError, ALREADY_CONNECTED};
use crate::api::{ChannelError, EventSource, FtpFile};
use crate::config::SessionMemory;
use crate::library::{LibraryStore, PlaybackChange, TrackKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Loading,
    Ready,
    /// Another session holds the channel; waits for a takeover request
    AlreadyConnected,
    /// Recoverable failure, reconnect countdown running
    Error,
    /// Session invalidated by the server
    Destroyed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AlreadyConnected | Self::Destroyed)
    }
}

/// Frame or failure from a reader task
#[derive(Debug)]
pub struct ChannelEvent {
    pub generation: u64,
    pub frame: Result<String, ChannelError>,
}

/// Effect of one applied channel event
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Hydrated(Restored),
    TrackAdded(TrackKey),
    TracksRemoved {
        keys: Vec<TrackKey>,
        playback: PlaybackChange,
    },
    TrackChanged(TrackKey),
    FtpStarted { files: usize },
    FtpFileProcessed(FtpFile),
    FtpDone,
    Disconnected(ChannelError),
    AlreadyConnected,
    Destroyed,
}

pub struct SyncChannel {
    source: Arc<dyn EventSource>,
    events: UnboundedSender<ChannelEvent>,
    state: ConnectionState,
    generation: u64,
    reader: Option<AbortHandle>,
    countdown: Option<u32>,
    reconnect_secs: u32,
}

impl SyncChannel {
    pub fn new(
        source: Arc<dyn EventSource>,
        reconnect_secs: u32,
    ) -> (Self, UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let channel = Self {
            source,
            events,
            state: ConnectionState::Loading,
            generation: 0,
            reader: None,
            countdown: None,
            reconnect_secs: reconnect_secs.max(1),
        };
        (channel, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Seconds left before the automatic reconnect
    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    /// (Re)open the channel, superseding any previous connection
    pub fn open(&mut self) {
        self.stop_reader();
        self.countdown = None;
        self.state = ConnectionState::Loading;

        let generation = self.generation;
        let source = self.source.clone();
        let events = self.events.clone();
        debug!("Opening channel (generation {})", generation);

        let handle = tokio::spawn(async move {
            let mut frames = match source.connect().await {
                Ok(frames) => frames,
                Err(err) => {
                    let _ = events.send(ChannelEvent {
                        generation,
                        frame: Err(err),
                    });
                    return;
                }
            };

            while let Some(frame) = frames.next().await {
                let failed = frame.is_err();
                if events.send(ChannelEvent { generation, frame }).is_err() || failed {
                    return;
                }
            }

            let _ = events.send(ChannelEvent {
                generation,
                frame: Err(ChannelError::Ended),
            });
        });

        self.reader = Some(handle.abort_handle());
    }

    /// Drop the connection without changing state
    pub fn close(&mut self) {
        self.stop_reader();
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.generation += 1;
    }

    /// Advance the reconnect countdown by one second. Returns true when it
    /// reached zero and the channel was reopened.
    pub fn tick(&mut self) -> bool {
        match self.countdown {
            Some(remaining) if remaining <= 1 => {
                info!("Reconnecting");
                self.open();
                true
            }
            Some(remaining) => {
                self.countdown = Some(remaining - 1);
                false
            }
            None => false,
        }
    }

    pub fn cancel_countdown(&mut self) {
        self.countdown = None;
    }

    /// Reconnect now instead of waiting for the countdown
    pub fn retry_now(&mut self) -> bool {
        if self.state != ConnectionState::Error {
            return false;
        }
        self.open();
        true
    }

    /// Apply one event from a reader task
    pub fn handle(
        &mut self,
        event: ChannelEvent,
        store: &mut LibraryStore,
        memory: &SessionMemory,
    ) -> Option<ChannelUpdate> {
        if event.generation != self.generation {
            debug!("Discarding event from superseded connection");
            return None;
        }
        if self.state == ConnectionState::Destroyed {
            return None;
        }

        let frame = match event.frame {
            Ok(frame) => frame,
            Err(err) => return self.transport_error(err, store),
        };

        let message = match ChannelMessage::decode(&frame) {
            Ok(message) => message,
            Err(DecodeError::BadPayload { kind, source }) if kind == "init" => {
                return self.transport_error(ChannelError::Malformed(source.to_string()), store);
            }
            Err(err) => {
                warn!("Dropping channel frame: {}", err);
                return None;
            }
        };

        debug!("Channel message: {}", message.kind());
        self.apply(message, store, memory)
    }

    fn apply(
        &mut self,
        message: ChannelMessage,
        store: &mut LibraryStore,
        memory: &SessionMemory,
    ) -> Option<ChannelUpdate> {
        match message {
            ChannelMessage::Init(payload) => {
                let content = match build_content(payload) {
                    Ok(content) => content,
                    Err(err) => return self.transport_error(err, store),
                };
                store.replace(content);
                let restored = restore_session(store, memory);
                self.state = ConnectionState::Ready;
                info!("Library hydrated: {} tracks", store.track_count());
                Some(ChannelUpdate::Hydrated(restored))
            }
            ChannelMessage::TrackAdd(track) => {
                let key = track.md5.clone();
                store.add_track(track);
                Some(ChannelUpdate::TrackAdded(key))
            }
            ChannelMessage::TracksRemove(keys) => {
                let playback = store.remove_tracks(&keys);
                Some(ChannelUpdate::TracksRemoved { keys, playback })
            }
            ChannelMessage::TrackUpdate {
                hash,
                title,
                artist,
            } => store
                .update_track(&hash, &title, &artist)
                .then_some(ChannelUpdate::TrackChanged(hash)),
            ChannelMessage::TrackLyrics { hash, lyrics } => store
                .update_lyrics(&hash, &lyrics)
                .then_some(ChannelUpdate::TrackChanged(hash)),
            ChannelMessage::FtpStart { files } => Some(ChannelUpdate::FtpStarted { files }),
            ChannelMessage::FtpFileProcessed(file) => Some(ChannelUpdate::FtpFileProcessed(file)),
            ChannelMessage::FtpDone => Some(ChannelUpdate::FtpDone),
            ChannelMessage::Destroy => {
                warn!("Session destroyed by server");
                store.stop();
                self.stop_reader();
                self.countdown = None;
                self.state = ConnectionState::Destroyed;
                Some(ChannelUpdate::Destroyed)
            }
            ChannelMessage::Error { key, .. } if key == ALREADY_CONNECTED => {
                warn!("Another session already holds the channel");
                self.countdown = None;
                self.state = ConnectionState::AlreadyConnected;
                Some(ChannelUpdate::AlreadyConnected)
            }
            ChannelMessage::Error { key, detail } => {
                let detail = (!detail.is_empty()).then_some(detail);
                self.transport_error(ChannelError::Server { key, detail }, store)
            }
        }
    }

    /// Pause playback; unless the session is terminal, enter ERROR and start
    /// the reconnect countdown
    fn transport_error(
        &mut self,
        err: ChannelError,
        store: &mut LibraryStore,
    ) -> Option<ChannelUpdate> {
        store.stop();
        self.stop_reader();

        if self.state.is_terminal() {
            debug!("Channel closed in state {:?}: {}", self.state, err);
            return None;
        }

        warn!("Channel error: {}", err);
        self.state = ConnectionState::Error;
        self.countdown = Some(self.reconnect_secs);
        Some(ChannelUpdate::Disconnected(err))
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
