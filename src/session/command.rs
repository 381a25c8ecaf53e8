//! Session inputs and outputs

use tokio::sync::mpsc::UnboundedSender;

use crate::gateway::Notice;
use crate::gesture::{ContextAction, GesturePhase, PointerEvent};
use crate::library::{PlaylistId, TrackKey, TrackSort, UserTheme};
use crate::sync::{ConnectionState, Restored};
use crate::upload::{TaskId, UploadFile, UploadOutcome};

/// Commands from the embedding host
#[derive(Debug, Clone)]
pub enum Command {
    /// Reconnect now instead of waiting for the countdown
    Retry,
    CancelReconnect,
    /// Close the session holding the channel and take it over
    Takeover,
    SelectPlaylist(PlaylistId),
    SetSearch(String),
    SetSort(TrackSort),
    SetSelectMode(bool),
    SetEditMode(bool),
    CycleRepeat,
    Next,
    Previous,
    /// The now-playing track reached its end
    TrackEnded,
    Enqueue(Vec<UploadFile>),
    CancelUpload(TaskId),
    ClearFinished,
    Context { key: TrackKey, action: ContextAction },
    AddPlaylist(String),
    RenamePlaylist { id: PlaylistId, name: String },
    DeletePlaylist(PlaylistId),
    EditTrack { hash: TrackKey, title: String, artist: String },
    SetLyrics { hash: TrackKey, lyrics: String },
    SetTheme(String),
    SaveThemes(Vec<UserTheme>),
    FtpImport,
    /// Volume on the 0..100 slider scale
    SetVolume(u8),
    /// Volume as 0..1 output gain
    SetDeviceVolume(f64),
    SetPosition(f64),
    SetLang(String),
    Quit,
}

#[derive(Debug, Clone)]
pub enum Input {
    Pointer(PointerEvent),
    Command(Command),
}

/// Everything the host needs to re-render or react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connection(ConnectionState),
    /// Seconds until the next reconnect attempt
    Reconnecting(u32),
    Hydrated(Restored),
    LibraryChanged,
    NowPlaying(Option<TrackKey>),
    Notice(Notice),
    Upload(UploadOutcome),
    Ftp { pending: usize, processed: usize },
    Gesture(GesturePhase),
    /// Context action the host carries out itself (editor, lyrics, download)
    ContextRequest { action: ContextAction, keys: Vec<TrackKey> },
}

/// Cloneable sender for a running session
#[derive(Clone)]
pub struct SessionHandle {
    inputs: UnboundedSender<Input>,
}

impl SessionHandle {
    pub(crate) fn new(inputs: UnboundedSender<Input>) -> Self {
        Self { inputs }
    }

    pub fn pointer(&self, event: PointerEvent) {
        let _ = self.inputs.send(Input::Pointer(event));
    }

    pub fn command(&self, command: Command) {
        let _ = self.inputs.send(Input::Command(command));
    }

    pub fn enqueue(&self, files: Vec<UploadFile>) {
        self.command(Command::Enqueue(files));
    }

    pub fn takeover(&self) {
        self.command(Command::Takeover);
    }

    pub fn retry(&self) {
        self.command(Command::Retry);
    }

    pub fn quit(&self) {
        self.command(Command::Quit);
    }
}
