//! Per-playlist reorder serialization

use std::collections::HashSet;

use crate::library::PlaylistId;

/// Result of asking to persist a playlist order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderDispatch {
    /// A call was started
    Sent,
    /// A call for this playlist is in flight; one more will follow it
    Parked,
    /// The playlist does not exist
    Missing,
}

/// Tracks which playlists have a reorder call in flight and which have a
/// commit waiting behind it. Parking twice still yields a single follow-up
/// call.
#[derive(Debug, Default)]
pub struct ReorderGate {
    in_flight: HashSet<PlaylistId>,
    parked: HashSet<PlaylistId>,
}

impl ReorderGate {
    /// Returns true when the caller may send now
    pub fn begin(&mut self, playlist: PlaylistId) -> bool {
        if self.in_flight.contains(&playlist) {
            self.parked.insert(playlist);
            false
        } else {
            self.in_flight.insert(playlist);
            true
        }
    }

    /// Release the playlist. Returns true when a parked commit should be
    /// sent now; the playlist then stays in flight.
    pub fn finish(&mut self, playlist: PlaylistId) -> bool {
        if self.parked.remove(&playlist) {
            true
        } else {
            self.in_flight.remove(&playlist);
            false
        }
    }

    /// Forget a playlist that disappeared while a call was pending
    pub fn abandon(&mut self, playlist: PlaylistId) {
        self.parked.remove(&playlist);
        self.in_flight.remove(&playlist);
    }

    pub fn is_in_flight(&self, playlist: PlaylistId) -> bool {
        self.in_flight.contains(&playlist)
    }

    pub fn is_parked(&self, playlist: PlaylistId) -> bool {
        self.parked.contains(&playlist)
    }
}
