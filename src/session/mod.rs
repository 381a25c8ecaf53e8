//! The single execution context that owns the engine
//!
//! Channel frames, gateway completions, upload reports, pointer input,
//! the hold timer and the reconnect ticker all arrive here and are applied
//! to the store strictly one at a time.

mod command;

pub use command::{Command, Input, SessionHandle, SessionUpdate};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{EventSource, MutationApi};
use crate::config::{ClientConfig, SessionMemory};
use crate::gateway::{Completion, CrossDrop, GatewayUpdate, MutationGateway, Notice};
use crate::gesture::{context_targets, ContextAction, DragReorderEngine, GestureEffect, GesturePhase, PointerEvent};
use crate::library::*;
use crate::sync::{ChannelEvent, ChannelUpdate, ConnectionState, SyncChannel};
use crate::upload::{UploadEvent, UploadOutcome, UploadQueueManager};

/// Receivers of the spawned-task reports, drained by [`Session::run`]
pub struct Inbox {
    channel: UnboundedReceiver<ChannelEvent>,
    completions: UnboundedReceiver<Completion>,
    uploads: UnboundedReceiver<UploadEvent>,
}

pub struct Session {
    store: LibraryStore,
    memory: SessionMemory,
    channel: SyncChannel,
    gateway: MutationGateway,
    uploads: UploadQueueManager,
    engine: DragReorderEngine,
    /// Armed hold timer: deadline and gesture id
    hold: Option<(Instant, u64)>,
    updates: UnboundedSender<SessionUpdate>,
    volume_base: f64,
}

impl Session {
    pub fn new(
        source: Arc<dyn EventSource>,
        api: Arc<dyn MutationApi>,
        config: &ClientConfig,
        memory: SessionMemory,
    ) -> (Self, Inbox, UnboundedReceiver<SessionUpdate>) {
        let (channel, channel_rx) = SyncChannel::new(source, config.reconnect_secs);
        let (gateway, completions_rx) = MutationGateway::new(api.clone());
        let (uploads, uploads_rx) = UploadQueueManager::new(api, config.extensions.clone());
        let (updates, updates_rx) = mpsc::unbounded_channel();

        let session = Self {
            store: LibraryStore::new(),
            memory,
            channel,
            gateway,
            uploads,
            engine: DragReorderEngine::new(config.hold_threshold()),
            hold: None,
            updates,
            volume_base: config.volume_base,
        };
        let inbox = Inbox {
            channel: channel_rx,
            completions: completions_rx,
            uploads: uploads_rx,
        };
        (session, inbox, updates_rx)
    }

    /// Start a session on its own task
    pub fn spawn(
        source: Arc<dyn EventSource>,
        api: Arc<dyn MutationApi>,
        config: &ClientConfig,
        memory: SessionMemory,
    ) -> (SessionHandle, UnboundedReceiver<SessionUpdate>, JoinHandle<()>) {
        let (session, inbox, updates) = Self::new(source, api, config, memory);
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let task = tokio::spawn(session.run(inbox, inputs));
        (SessionHandle::new(inputs_tx), updates, task)
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn connection(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn uploads(&self) -> &UploadQueueManager {
        &self.uploads
    }

    pub fn engine(&self) -> &DragReorderEngine {
        &self.engine
    }

    /// Remembered volume as 0..1 output gain
    pub fn device_volume(&self) -> f64 {
        self.memory.device_volume(self.volume_base)
    }

    /// Process inputs until the host quits or drops its handle
    pub async fn run(mut self, mut inbox: Inbox, mut inputs: UnboundedReceiver<Input>) {
        self.connect();

        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let hold = self.hold;
            let deadline = hold.map(|(at, _)| at).unwrap_or_else(Instant::now);

            tokio::select! {
                Some(event) = inbox.channel.recv() => self.on_channel(event),
                Some(completion) = inbox.completions.recv() => self.on_completion(completion),
                Some(event) = inbox.uploads.recv() => self.on_upload(event),
                input = inputs.recv() => {
                    let keep_going = match input {
                        Some(input) => self.input(input),
                        None => false,
                    };
                    if !keep_going {
                        break;
                    }
                }
                _ = sleep_until(deadline), if hold.is_some() => {
                    if let Some((_, gesture)) = hold {
                        self.hold_expired(gesture);
                    }
                }
                _ = ticker.tick() => self.tick(),
            }
        }

        self.shutdown();
    }

    /// Open the push channel
    pub fn connect(&mut self) {
        self.channel.open();
        self.emit(SessionUpdate::Connection(self.channel.state()));
    }

    fn shutdown(&mut self) {
        info!("Session shutting down");
        self.channel.close();
        self.save_memory();
    }

    /// Returns false when the session should stop
    pub fn input(&mut self, input: Input) -> bool {
        match input {
            Input::Pointer(event) => {
                self.pointer(event);
                true
            }
            Input::Command(command) => self.command(command),
        }
    }

    // ---- channel ----

    pub fn on_channel(&mut self, event: ChannelEvent) {
        let Some(update) = self.channel.handle(event, &mut self.store, &self.memory) else {
            return;
        };

        match update {
            ChannelUpdate::Hydrated(restored) => {
                self.cancel_gesture();
                self.emit(SessionUpdate::Connection(self.channel.state()));
                self.emit(SessionUpdate::NowPlaying(restored.now_playing.clone()));
                self.emit(SessionUpdate::Hydrated(restored));
            }
            ChannelUpdate::TrackAdded(_) | ChannelUpdate::TrackChanged(_) => {
                self.sync_gesture();
                self.emit(SessionUpdate::LibraryChanged);
            }
            ChannelUpdate::TracksRemoved { keys, playback } => self.after_removal(&keys, playback),
            ChannelUpdate::FtpStarted { files } => {
                if self.uploads.ftp_mut().start(files) {
                    self.emit_ftp();
                } else {
                    self.notify(Notice::FtpNoValidFiles);
                }
            }
            ChannelUpdate::FtpFileProcessed(file) => {
                self.uploads.ftp_mut().file_processed(file);
                self.emit_ftp();
            }
            ChannelUpdate::FtpDone => {
                let ftp = self.uploads.ftp_mut();
                let failed = ftp.failed().count();
                let imported = ftp.processed().len() - failed;
                ftp.finish();
                self.emit_ftp();
                self.notify(Notice::FtpImportDone { imported, failed });
            }
            ChannelUpdate::Disconnected(err) => {
                debug!("Disconnected: {}", err);
                self.emit(SessionUpdate::Connection(self.channel.state()));
                self.emit(SessionUpdate::NowPlaying(None));
                if let Some(seconds) = self.channel.countdown() {
                    self.emit(SessionUpdate::Reconnecting(seconds));
                }
            }
            ChannelUpdate::AlreadyConnected => {
                self.emit(SessionUpdate::Connection(ConnectionState::AlreadyConnected));
            }
            ChannelUpdate::Destroyed => {
                self.cancel_gesture();
                self.emit(SessionUpdate::Connection(ConnectionState::Destroyed));
                self.emit(SessionUpdate::NowPlaying(None));
            }
        }
    }

    /// One-second reconnect tick
    pub fn tick(&mut self) {
        if self.channel.tick() {
            self.emit(SessionUpdate::Connection(self.channel.state()));
        } else if let Some(seconds) = self.channel.countdown() {
            self.emit(SessionUpdate::Reconnecting(seconds));
        }
    }

    // ---- gateway ----

    pub fn on_completion(&mut self, completion: Completion) {
        let updates = self.gateway.handle(completion, &mut self.store);
        if updates.is_empty() {
            return;
        }

        for update in updates {
            match update {
                GatewayUpdate::Notice(notice) => self.notify(notice),
                GatewayUpdate::TracksRemoved { keys, playback } => self.after_removal(&keys, playback),
                GatewayUpdate::PlaylistCreated(id) => debug!("Switched to new playlist {}", id),
                GatewayUpdate::TakeoverReady => {
                    info!("Other session closed, reconnecting");
                    self.connect();
                }
            }
        }

        self.sync_gesture();
        if self.memory.last_playlist() != Some(self.store.playbacked()) {
            let playbacked = self.store.playbacked();
            self.memory.set_last_playlist(playbacked);
            self.save_memory();
        }
        self.emit(SessionUpdate::LibraryChanged);
    }

    fn after_removal(&mut self, keys: &[TrackKey], playback: PlaybackChange) {
        let before = self.engine.phase();
        self.engine.prune(keys, &self.store);
        self.engine.sync(&self.store);
        self.gesture_changed(before);

        match playback {
            PlaybackChange::Switched(key) => {
                self.memory.set_last_src(Some(&key));
                self.emit(SessionUpdate::NowPlaying(Some(key)));
            }
            PlaybackChange::Stopped => {
                self.memory.set_last_src(None);
                self.emit(SessionUpdate::NowPlaying(None));
            }
            PlaybackChange::Unchanged => {}
        }

        let queue = self.store.playback().to_vec();
        self.memory.set_playback(&queue);
        self.save_memory();
        self.emit(SessionUpdate::LibraryChanged);
    }

    // ---- uploads ----

    pub fn on_upload(&mut self, event: UploadEvent) {
        let Some(outcome) = self.uploads.handle_event(event) else {
            return;
        };

        if let UploadOutcome::Failed { id, error } = &outcome {
            let file = self
                .uploads
                .tasks()
                .iter()
                .find(|t| t.id == *id)
                .map(|t| t.file.name.clone())
                .unwrap_or_default();
            self.notify(Notice::UploadFailed {
                file,
                error: error.clone(),
            });
        }
        self.emit(SessionUpdate::Upload(outcome));
    }

    // ---- gestures ----

    pub fn pointer(&mut self, event: PointerEvent) {
        let before = self.engine.phase();
        let effects = self.engine.handle(event, &mut self.store);
        self.apply_effects(effects);
        self.gesture_changed(before);
    }

    fn cancel_gesture(&mut self) {
        let before = self.engine.phase();
        self.engine.reset();
        if !self.store.dragging().is_empty() {
            self.store.set_dragging(Vec::new());
        }
        self.gesture_changed(before);
    }

    /// Let a running gesture follow store changes it did not make
    fn sync_gesture(&mut self) {
        let before = self.engine.phase();
        self.engine.sync(&self.store);
        self.gesture_changed(before);
    }

    fn gesture_changed(&mut self, before: GesturePhase) {
        if self.engine.is_idle() {
            self.hold = None;
        }
        let after = self.engine.phase();
        if after != before {
            self.emit(SessionUpdate::Gesture(after));
        }
    }

    pub fn hold_expired(&mut self, gesture: u64) {
        self.hold = None;
        let effects = self.engine.hold_expired(gesture, &mut self.store);
        self.apply_effects(effects);
    }

    /// Deadline and id of the armed hold timer
    pub fn hold_deadline(&self) -> Option<(Instant, u64)> {
        self.hold
    }

    fn apply_effects(&mut self, effects: Vec<GestureEffect>) {
        for effect in effects {
            match effect {
                GestureEffect::HoldTimer { gesture, after } => {
                    self.hold = Some((Instant::now() + after, gesture));
                }
                GestureEffect::Promoted(kind) => {
                    self.hold = None;
                    self.emit(SessionUpdate::Gesture(self.engine.phase()));
                    debug!("Gesture active: {:?}", kind);
                }
                GestureEffect::Commit { playlist } => {
                    let dispatch = self.gateway.reorder_playlist(&self.store, playlist);
                    debug!("Reorder commit for playlist {}: {:?}", playlist, dispatch);
                }
                GestureEffect::Drop { target, keys } => {
                    match self.gateway.add_to_playlist(&self.store, target, &keys) {
                        CrossDrop::Sent { added } => debug!("Adding {} track(s) to playlist {}", added, target),
                        CrossDrop::NothingNew => self.notify(Notice::NoNewTracksAdded),
                        CrossDrop::InvalidTarget => debug!("Ignoring drop on playlist {}", target),
                    }
                }
                GestureEffect::Played(key) => {
                    self.memory.set_last_src(Some(&key));
                    self.save_memory();
                    self.emit(SessionUpdate::NowPlaying(Some(key)));
                }
                GestureEffect::QueueReplaced => self.remember_queue(),
            }
        }
    }

    // ---- commands ----

    /// Returns false on [`Command::Quit`]
    pub fn command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Retry => {
                if self.channel.retry_now() {
                    self.emit(SessionUpdate::Connection(self.channel.state()));
                }
            }
            Command::CancelReconnect => self.channel.cancel_countdown(),
            Command::Takeover => {
                if self.channel.state() == ConnectionState::AlreadyConnected {
                    self.gateway.takeover();
                } else {
                    debug!("Takeover requested in state {:?}", self.channel.state());
                }
            }
            Command::SelectPlaylist(id) => {
                self.store.set_current(id);
                self.emit(SessionUpdate::LibraryChanged);
            }
            Command::SetSearch(search) => {
                self.store.set_search(&search);
                self.emit(SessionUpdate::LibraryChanged);
            }
            Command::SetSort(sort) => {
                self.store.set_sort(sort);
                self.emit(SessionUpdate::LibraryChanged);
            }
            Command::SetSelectMode(enabled) => {
                self.store.set_select_mode(enabled);
                self.emit(SessionUpdate::LibraryChanged);
            }
            Command::SetEditMode(enabled) => {
                self.store.set_edit_mode(enabled);
                self.emit(SessionUpdate::LibraryChanged);
            }
            Command::CycleRepeat => {
                let mode = self.store.cycle_repeat(&mut rand::thread_rng());
                debug!("Repeat mode {:?}", mode);
                self.remember_queue();
            }
            Command::Next => self.step(true),
            Command::Previous => self.step(false),
            Command::TrackEnded => {
                if self.store.repeat() != RepeatMode::One {
                    self.step(true);
                }
            }
            Command::Enqueue(files) => {
                if !self.uploads.enqueue(files).is_empty() {
                    self.emit(SessionUpdate::Upload(UploadOutcome::Progress(self.uploads.progress())));
                }
            }
            Command::CancelUpload(id) => {
                if self.uploads.cancel(id) {
                    self.emit(SessionUpdate::Upload(UploadOutcome::Progress(self.uploads.progress())));
                }
            }
            Command::ClearFinished => self.uploads.clear_finished(),
            Command::Context { key, action } => self.context_action(&key, action),
            Command::AddPlaylist(name) => {
                let name = name.trim();
                if name.is_empty() {
                    self.notify(Notice::PlaylistNameEmpty);
                } else {
                    self.gateway.add_playlist(name);
                }
            }
            Command::RenamePlaylist { id, name } => {
                if let Err(notice) = self.gateway.rename_playlist(&self.store, id, &name) {
                    self.notify(notice);
                }
            }
            Command::DeletePlaylist(id) => {
                self.gateway.delete_playlist(&self.store, id);
            }
            Command::EditTrack { hash, title, artist } => self.gateway.mutate_track(&hash, &title, &artist),
            Command::SetLyrics { hash, lyrics } => self.gateway.set_lyrics(&hash, &lyrics),
            Command::SetTheme(theme) => {
                self.store.user_mut().theme = theme.clone();
                self.gateway.save_theme(&theme);
            }
            Command::SaveThemes(themes) => {
                self.store.user_mut().themes = themes.iter().map(|t| (t.id.clone(), t.clone())).collect();
                self.gateway.save_themes(themes);
            }
            Command::FtpImport => self.gateway.request_ftp_upload(),
            Command::SetVolume(volume) => {
                self.memory.set_volume(volume);
                self.save_memory();
            }
            Command::SetDeviceVolume(gain) => {
                self.memory.set_device_volume(gain, self.volume_base);
                self.save_memory();
            }
            Command::SetPosition(seconds) => {
                self.memory.set_position(seconds);
                self.save_memory();
            }
            Command::SetLang(lang) => {
                self.store.user_mut().lang = lang.clone();
                self.memory.set_lang(&lang);
                self.save_memory();
            }
        }
        true
    }

    fn context_action(&mut self, key: &str, action: ContextAction) {
        let keys = context_targets(&self.store, key, action);
        match action {
            ContextAction::DeleteFromPlaylist => {
                let current = self.store.current_id();
                if !self.gateway.remove_from_playlist(&self.store, current, &keys) {
                    debug!("Nothing to remove from playlist {}", current);
                }
            }
            ContextAction::DeleteFromLibrary => self.gateway.remove_tracks(keys),
            ContextAction::Edit | ContextAction::ShowLyrics | ContextAction::Download => {
                self.emit(SessionUpdate::ContextRequest { action, keys });
            }
        }
    }

    fn step(&mut self, forward: bool) {
        let next = if forward {
            self.store.next_in_queue()
        } else {
            self.store.previous_in_queue()
        };
        let Some(key) = next else {
            return;
        };
        if self.store.play(&key) {
            self.memory.set_last_src(Some(&key));
            self.save_memory();
            self.emit(SessionUpdate::NowPlaying(Some(key)));
        }
    }

    // ---- memory ----

    fn remember_queue(&mut self) {
        let queue = self.store.playback().to_vec();
        self.memory.set_playback(&queue);
        self.memory.set_last_playlist(self.store.playbacked());
        self.save_memory();
    }

    fn save_memory(&mut self) {
        if let Err(e) = self.memory.save() {
            warn!("Failed to save session memory: {:#}", e);
        }
    }

    fn emit_ftp(&self) {
        let ftp = self.uploads.ftp();
        self.emit(SessionUpdate::Ftp {
            pending: ftp.pending(),
            processed: ftp.processed().len(),
        });
    }

    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            warn!("{}", notice);
        } else {
            info!("{}", notice);
        }
        self.emit(SessionUpdate::Notice(notice));
    }

    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }
}
