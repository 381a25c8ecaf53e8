//! Normalized library state and its mutation operations
//!
//! The store performs no I/O. Every writer (channel deltas, gateway
//! reconciliation, gestures, uploads) mutates it from the session loop, one
//! event at a time.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::models::*;

/// Full replacement content delivered by hydration
#[derive(Debug, Clone, Default)]
pub struct LibraryContent {
    pub tracks: HashMap<TrackKey, Track>,
    pub playlists: BTreeMap<PlaylistId, Playlist>,
    /// Server name of the all-tracks playlist
    pub library_key: String,
    pub user: UserProfile,
    pub app_title: String,
}

#[derive(Debug, Default)]
pub struct LibraryStore {
    tracks: HashMap<TrackKey, Track>,
    playlists: BTreeMap<PlaylistId, Playlist>,
    library_key: String,
    current: PlaylistId,
    playbacked: PlaylistId,
    playback: Vec<TrackKey>,
    unshuffled: Option<Vec<TrackKey>>,
    now_playing: Option<TrackKey>,
    repeat: RepeatMode,
    sort: TrackSort,
    search: String,
    select_mode: bool,
    edit_mode: bool,
    selected: BTreeSet<TrackKey>,
    dragging: Vec<TrackKey>,
    user: UserProfile,
    app_title: String,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self {
            current: LIBRARY_PLAYLIST_ID,
            playbacked: LIBRARY_PLAYLIST_ID,
            ..Self::default()
        }
    }

    /// Replace all server-derived content. Transient view state that could
    /// reference old keys (selection, drag keys, queue) is reset.
    pub fn replace(&mut self, content: LibraryContent) {
        self.tracks = content.tracks;
        self.playlists = content.playlists;
        self.library_key = content.library_key;
        self.user = content.user;
        self.app_title = content.app_title;

        self.selected.clear();
        self.dragging.clear();
        self.select_mode = false;
        self.edit_mode = false;
        self.playback.clear();
        self.unshuffled = None;
        self.now_playing = None;
        self.current = LIBRARY_PLAYLIST_ID;
        self.playbacked = LIBRARY_PLAYLIST_ID;

        debug!(
            "Library replaced: {} tracks, {} playlists",
            self.tracks.len(),
            self.playlists.len()
        );
    }

    // ---- tracks ----

    pub fn track(&self, key: &str) -> Option<&Track> {
        self.tracks.get(key)
    }

    pub fn contains_track(&self, key: &str) -> bool {
        self.tracks.contains_key(key)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Insert a newly ingested track; it becomes the first entry of the
    /// all-tracks playlist.
    pub fn add_track(&mut self, track: Track) {
        let key = track.md5.clone();
        self.tracks.insert(key.clone(), track);

        if let Some(library) = self.playlists.get_mut(&LIBRARY_PLAYLIST_ID) {
            if !library.tracks.contains(&key) {
                library.tracks.insert(0, key);
            }
        }
    }

    /// Remove tracks from the library and from every place that references
    /// them, returning what happened to the now-playing track.
    pub fn remove_tracks(&mut self, keys: &[TrackKey]) -> PlaybackChange {
        let removed: HashSet<&str> = keys.iter().map(String::as_str).collect();

        for key in keys {
            self.tracks.remove(key);
        }
        for playlist in self.playlists.values_mut() {
            playlist.tracks.retain(|t| !removed.contains(t.as_str()));
        }
        self.selected.retain(|t| !removed.contains(t.as_str()));
        self.dragging.retain(|t| !removed.contains(t.as_str()));
        if let Some(original) = self.unshuffled.as_mut() {
            original.retain(|t| !removed.contains(t.as_str()));
        }

        let old_playback = std::mem::take(&mut self.playback);
        self.playback = old_playback
            .iter()
            .filter(|t| !removed.contains(t.as_str()))
            .cloned()
            .collect();

        let Some(playing) = self.now_playing.clone() else {
            return PlaybackChange::Unchanged;
        };
        if !removed.contains(playing.as_str()) {
            return PlaybackChange::Unchanged;
        }

        if self.repeat == RepeatMode::One || self.playback.is_empty() {
            self.now_playing = None;
            return PlaybackChange::Stopped;
        }

        let Some(index) = old_playback.iter().position(|t| *t == playing) else {
            self.now_playing = None;
            return PlaybackChange::Stopped;
        };

        let next = old_playback[index + 1..]
            .iter()
            .chain(old_playback[..index].iter())
            .find(|t| !removed.contains(t.as_str()))
            .cloned();

        match next {
            Some(next) => {
                self.now_playing = Some(next.clone());
                PlaybackChange::Switched(next)
            }
            None => {
                self.now_playing = None;
                PlaybackChange::Stopped
            }
        }
    }

    /// Apply a metadata edit; unknown keys are ignored
    pub fn update_track(&mut self, key: &str, title: &str, artist: &str) -> bool {
        match self.tracks.get_mut(key) {
            Some(track) => {
                track.title = title.to_string();
                track.artist = artist.to_string();
                true
            }
            None => false,
        }
    }

    pub fn update_lyrics(&mut self, key: &str, lyrics: &str) -> bool {
        match self.tracks.get_mut(key) {
            Some(track) => {
                track.lyrics = lyrics.to_string();
                true
            }
            None => false,
        }
    }

    // ---- playlists ----

    pub fn playlist(&self, id: PlaylistId) -> Option<&Playlist> {
        self.playlists.get(&id)
    }

    pub fn playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.values()
    }

    pub fn library_key(&self) -> &str {
        &self.library_key
    }

    /// Playlist currently shown, falling back to all-tracks
    pub fn current_playlist(&self) -> Option<&Playlist> {
        self.playlists
            .get(&self.current)
            .or_else(|| self.playlists.get(&LIBRARY_PLAYLIST_ID))
    }

    pub fn current_id(&self) -> PlaylistId {
        self.current_playlist()
            .map(|p| p.id)
            .unwrap_or(LIBRARY_PLAYLIST_ID)
    }

    /// Switch the displayed playlist. Leaves select mode, which also clears
    /// the selection.
    pub fn set_current(&mut self, id: PlaylistId) {
        self.current = if self.playlists.contains_key(&id) {
            id
        } else {
            LIBRARY_PLAYLIST_ID
        };
        self.set_select_mode(false);
    }

    pub fn playbacked(&self) -> PlaylistId {
        self.playbacked
    }

    pub fn set_playbacked(&mut self, id: PlaylistId) {
        self.playbacked = id;
    }

    pub fn add_playlist(&mut self, playlist: Playlist) {
        self.playlists.insert(playlist.id, playlist);
    }

    pub fn rename_playlist(&mut self, id: PlaylistId, name: &str) -> bool {
        match self.playlists.get_mut(&id) {
            Some(playlist) => {
                playlist.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_playlist(&mut self, id: PlaylistId) -> bool {
        if id == LIBRARY_PLAYLIST_ID || self.playlists.remove(&id).is_none() {
            return false;
        }
        if self.current == id {
            self.set_current(LIBRARY_PLAYLIST_ID);
        }
        if self.playbacked == id {
            self.playbacked = LIBRARY_PLAYLIST_ID;
        }
        true
    }

    /// Replace a playlist's order. Keys missing from the library and
    /// duplicates are dropped.
    pub fn set_playlist_tracks(&mut self, id: PlaylistId, tracks: Vec<TrackKey>) -> bool {
        let mut seen = HashSet::new();
        let tracks: Vec<TrackKey> = tracks
            .into_iter()
            .filter(|t| self.tracks.contains_key(t) && seen.insert(t.clone()))
            .collect();

        let Some(playlist) = self.playlists.get_mut(&id) else {
            return false;
        };
        playlist.tracks = tracks;
        self.prune_selection();
        true
    }

    /// Record the server id allocated for the all-tracks playlist
    pub fn set_library_db_id(&mut self, db_id: i64) {
        if let Some(library) = self.playlists.get_mut(&LIBRARY_PLAYLIST_ID) {
            library.db_id = db_id;
        }
    }

    /// Swap the entry at `index` with its neighbour above (`up`) or below.
    /// Returns the entry's new index, or `None` at the list edge.
    pub fn swap_with_neighbor(&mut self, id: PlaylistId, index: usize, up: bool) -> Option<usize> {
        let playlist = self.playlists.get_mut(&id)?;
        if index >= playlist.tracks.len() {
            return None;
        }
        let target = if up {
            index.checked_sub(1)?
        } else {
            let next = index + 1;
            if next >= playlist.tracks.len() {
                return None;
            }
            next
        };
        playlist.tracks.swap(index, target);
        Some(target)
    }

    // ---- view ----

    pub fn sort(&self) -> TrackSort {
        self.sort
    }

    pub fn set_sort(&mut self, sort: TrackSort) {
        self.sort = sort;
        self.prune_selection();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, search: &str) {
        self.search = search.to_string();
        self.prune_selection();
    }

    pub fn select_mode(&self) -> bool {
        self.select_mode
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    /// Leaving select mode also leaves edit mode and clears the selection
    pub fn set_select_mode(&mut self, enabled: bool) {
        self.select_mode = enabled;
        if !enabled {
            self.edit_mode = false;
            self.selected.clear();
        }
    }

    /// Edit mode shows the whole library and forces select mode
    pub fn set_edit_mode(&mut self, enabled: bool) {
        self.edit_mode = enabled;
        self.set_select_mode(enabled);
        self.prune_selection();
    }

    /// Tracks as currently displayed: playlist (or whole library in edit
    /// mode), filtered by search, then sorted
    pub fn displayed_tracks(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = if self.edit_mode {
            let mut all: Vec<&Track> = self.tracks.values().collect();
            all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.md5.cmp(&b.md5)));
            all
        } else {
            match self.current_playlist() {
                Some(playlist) => playlist
                    .tracks
                    .iter()
                    .filter_map(|k| self.tracks.get(k))
                    .collect(),
                None => Vec::new(),
            }
        };

        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            tracks.retain(|t| t.display_name().to_lowercase().contains(&needle));
        }

        match self.sort {
            TrackSort::Custom => {}
            TrackSort::TimestampAsc => tracks.sort_by_key(|t| t.timestamp),
            TrackSort::TimestampDesc => tracks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            TrackSort::ArtistAsc => tracks.sort_by_key(|t| t.artist.to_lowercase()),
            TrackSort::ArtistDesc => {
                tracks.sort_by(|a, b| b.artist.to_lowercase().cmp(&a.artist.to_lowercase()))
            }
            TrackSort::TitleAsc => tracks.sort_by_key(|t| t.title.to_lowercase()),
            TrackSort::TitleDesc => {
                tracks.sort_by(|a, b| b.title.to_lowercase().cmp(&a.title.to_lowercase()))
            }
            TrackSort::DurationAsc => tracks.sort_by(|a, b| a.duration.total_cmp(&b.duration)),
            TrackSort::DurationDesc => tracks.sort_by(|a, b| b.duration.total_cmp(&a.duration)),
        }

        tracks
    }

    pub fn displayed_keys(&self) -> Vec<TrackKey> {
        self.displayed_tracks()
            .into_iter()
            .map(|t| t.md5.clone())
            .collect()
    }

    /// Whether drag-to-reorder is allowed in the current view
    pub fn is_sortable_view(&self) -> bool {
        self.sort == TrackSort::Custom
            && self.search.is_empty()
            && !self.select_mode
            && !self.edit_mode
            && !self.displayed_tracks().is_empty()
    }

    // ---- selection ----

    pub fn selected(&self) -> &BTreeSet<TrackKey> {
        &self.selected
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected.contains(key)
    }

    /// Add displayed tracks to the selection
    pub fn select(&mut self, keys: &[TrackKey]) {
        let displayed: HashSet<TrackKey> = self.displayed_keys().into_iter().collect();
        for key in keys {
            if displayed.contains(key) {
                self.selected.insert(key.clone());
            }
        }
    }

    pub fn deselect(&mut self, keys: &[TrackKey]) {
        for key in keys {
            self.selected.remove(key);
        }
    }

    pub fn set_selected(&mut self, keys: &[TrackKey]) {
        self.selected.clear();
        self.select(keys);
    }

    /// Drop selected keys that are no longer displayed
    pub fn prune_selection(&mut self) {
        if self.selected.is_empty() {
            return;
        }
        let displayed: HashSet<TrackKey> = self.displayed_keys().into_iter().collect();
        self.selected.retain(|k| displayed.contains(k));
    }

    // ---- drag ----

    pub fn dragging(&self) -> &[TrackKey] {
        &self.dragging
    }

    pub fn set_dragging(&mut self, keys: Vec<TrackKey>) {
        self.dragging = keys
            .into_iter()
            .filter(|k| self.tracks.contains_key(k))
            .collect();
    }

    // ---- playback ----

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_deref().and_then(|k| self.tracks.get(k))
    }

    pub fn playback(&self) -> &[TrackKey] {
        &self.playback
    }

    /// Start a track. Returns false when the key is not in the library.
    pub fn play(&mut self, key: &str) -> bool {
        if !self.tracks.contains_key(key) {
            return false;
        }
        self.now_playing = Some(key.to_string());
        true
    }

    pub fn stop(&mut self) {
        self.now_playing = None;
    }

    /// Replace the playback queue; unknown keys are dropped
    pub fn set_playback(&mut self, keys: Vec<TrackKey>) {
        self.playback = keys
            .into_iter()
            .filter(|k| self.tracks.contains_key(k))
            .collect();
        self.unshuffled = None;
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    /// Advance the repeat mode. Entering shuffle shuffles the queue and
    /// keeps the original; returning to repeat-all restores it.
    pub fn cycle_repeat<R: Rng + ?Sized>(&mut self, rng: &mut R) -> RepeatMode {
        let next = self.repeat.cycled();
        match next {
            RepeatMode::Shuffle => {
                let original = self.playback.clone();
                self.playback.shuffle(rng);
                self.unshuffled = Some(original);
            }
            RepeatMode::All => {
                if let Some(original) = self.unshuffled.take() {
                    self.playback = original;
                }
            }
            RepeatMode::One => {}
        }
        self.repeat = next;
        next
    }

    /// Next queue entry after the now-playing track, wrapping around
    pub fn next_in_queue(&self) -> Option<TrackKey> {
        self.step_queue(true)
    }

    pub fn previous_in_queue(&self) -> Option<TrackKey> {
        self.step_queue(false)
    }

    fn step_queue(&self, forward: bool) -> Option<TrackKey> {
        let current = self.now_playing.as_ref()?;
        if self.playback.is_empty() {
            return None;
        }
        let len = self.playback.len();
        let index = match self.playback.iter().position(|k| k == current) {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        self.playback.get(index).cloned()
    }

    // ---- user ----

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn user_mut(&mut self) -> &mut UserProfile {
        &mut self.user
    }

    pub fn app_title(&self) -> &str {
        &self.app_title
    }

    /// Every (playlist, key) pair whose key is missing from the track map
    pub fn dangling_references(&self) -> Vec<(PlaylistId, TrackKey)> {
        let mut dangling = Vec::new();
        for playlist in self.playlists.values() {
            for key in &playlist.tracks {
                if !self.tracks.contains_key(key) {
                    dangling.push((playlist.id, key.clone()));
                }
            }
        }
        for key in self.playback.iter().chain(self.selected.iter()).chain(self.dragging.iter()) {
            if !self.tracks.contains_key(key) {
                dangling.push((LIBRARY_PLAYLIST_ID, key.clone()));
            }
        }
        dangling
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub fn track(key: &str, timestamp: i64) -> Track {
        Track {
            md5: key.to_string(),
            artist: format!("Artist {key}"),
            title: format!("Title {key}"),
            duration: 180.0,
            has_image: false,
            timestamp,
            lyrics: String::new(),
        }
    }

    pub fn keys(list: &[&str]) -> Vec<TrackKey> {
        list.iter().map(|k| k.to_string()).collect()
    }

    /// Store with tracks a..e, all-tracks in that order and playlist 7 = [b, d]
    pub fn sample_store() -> LibraryStore {
        let mut content = LibraryContent {
            library_key: "__all__".to_string(),
            ..Default::default()
        };
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            content.tracks.insert(key.to_string(), track(key, 100 - i as i64));
        }
        content.playlists.insert(
            LIBRARY_PLAYLIST_ID,
            Playlist {
                id: LIBRARY_PLAYLIST_ID,
                db_id: -1,
                name: "__all__".to_string(),
                tracks: keys(&["a", "b", "c", "d", "e"]),
            },
        );
        content.playlists.insert(
            7,
            Playlist {
                id: 7,
                db_id: 7,
                name: "Mix".to_string(),
                tracks: keys(&["b", "d"]),
            },
        );
        let mut store = LibraryStore::new();
        store.replace(content);
        store
    }

    #[test]
    fn test_add_track_prepends_to_library() {
        let mut store = sample_store();
        store.add_track(track("f", 200));
        let library = store.playlist(LIBRARY_PLAYLIST_ID).unwrap();
        assert_eq!(library.tracks[0], "f");
        assert_eq!(library.tracks.len(), 6);

        // Re-adding must not duplicate
        store.add_track(track("f", 200));
        assert_eq!(store.playlist(LIBRARY_PLAYLIST_ID).unwrap().tracks.len(), 6);
    }

    #[test]
    fn test_remove_tracks_clears_every_reference() {
        let mut store = sample_store();
        store.set_current(7);
        store.set_select_mode(true);
        store.select(&keys(&["b", "d"]));
        store.set_dragging(keys(&["b"]));
        store.set_playback(keys(&["a", "b", "c"]));

        store.remove_tracks(&keys(&["b"]));

        assert!(!store.contains_track("b"));
        assert_eq!(store.playlist(7).unwrap().tracks, keys(&["d"]));
        assert!(!store.is_selected("b"));
        assert!(store.dragging().is_empty());
        assert_eq!(store.playback(), keys(&["a", "c"]).as_slice());
        assert!(store.dangling_references().is_empty());
    }

    #[test]
    fn test_remove_playing_track_moves_to_next_survivor() {
        let mut store = sample_store();
        store.set_playback(keys(&["a", "b", "c", "d"]));
        store.play("b");

        let change = store.remove_tracks(&keys(&["b", "c"]));
        assert_eq!(change, PlaybackChange::Switched("d".to_string()));
        assert_eq!(store.now_playing().unwrap().md5, "d");
    }

    #[test]
    fn test_remove_playing_track_wraps_around() {
        let mut store = sample_store();
        store.set_playback(keys(&["a", "b", "c"]));
        store.play("c");

        let change = store.remove_tracks(&keys(&["c"]));
        assert_eq!(change, PlaybackChange::Switched("a".to_string()));
    }

    #[test]
    fn test_remove_playing_track_stops_on_repeat_one() {
        let mut store = sample_store();
        store.set_playback(keys(&["a", "b"]));
        store.play("a");
        store.set_repeat(RepeatMode::One);

        assert_eq!(store.remove_tracks(&keys(&["a"])), PlaybackChange::Stopped);
        assert!(store.now_playing().is_none());
    }

    #[test]
    fn test_swap_with_neighbor_respects_edges() {
        let mut store = sample_store();
        assert_eq!(store.swap_with_neighbor(LIBRARY_PLAYLIST_ID, 0, true), None);
        assert_eq!(store.swap_with_neighbor(LIBRARY_PLAYLIST_ID, 4, false), None);
        assert_eq!(store.swap_with_neighbor(LIBRARY_PLAYLIST_ID, 1, false), Some(2));
        assert_eq!(
            store.playlist(LIBRARY_PLAYLIST_ID).unwrap().tracks,
            keys(&["a", "c", "b", "d", "e"])
        );
    }

    #[test]
    fn test_search_prunes_selection() {
        let mut store = sample_store();
        store.set_select_mode(true);
        store.select(&keys(&["a", "b"]));
        store.set_search("title a");
        assert_eq!(store.selected().iter().cloned().collect::<Vec<_>>(), keys(&["a"]));
    }

    #[test]
    fn test_select_ignores_hidden_tracks() {
        let mut store = sample_store();
        store.set_current(7);
        store.set_select_mode(true);
        store.select(&keys(&["a", "b"]));
        assert!(!store.is_selected("a"));
        assert!(store.is_selected("b"));
    }

    #[test]
    fn test_playlist_switch_leaves_select_mode() {
        let mut store = sample_store();
        store.set_select_mode(true);
        store.select(&keys(&["a"]));
        store.set_current(7);
        assert!(!store.select_mode());
        assert!(store.selected().is_empty());
    }

    #[test]
    fn test_sortable_view() {
        let mut store = sample_store();
        assert!(store.is_sortable_view());
        store.set_search("x");
        assert!(!store.is_sortable_view());
        store.set_search("");
        store.set_sort(TrackSort::TitleAsc);
        assert!(!store.is_sortable_view());
    }

    #[test]
    fn test_displayed_sorted_by_timestamp() {
        let mut store = sample_store();
        store.set_sort(TrackSort::TimestampAsc);
        assert_eq!(store.displayed_keys(), keys(&["e", "d", "c", "b", "a"]));
    }

    #[test]
    fn test_set_playlist_tracks_filters_unknown_and_duplicates() {
        let mut store = sample_store();
        store.set_playlist_tracks(7, keys(&["a", "zz", "a", "c"]));
        assert_eq!(store.playlist(7).unwrap().tracks, keys(&["a", "c"]));
    }

    #[test]
    fn test_remove_current_playlist_falls_back() {
        let mut store = sample_store();
        store.set_current(7);
        assert!(store.remove_playlist(7));
        assert_eq!(store.current_id(), LIBRARY_PLAYLIST_ID);
        assert!(!store.remove_playlist(LIBRARY_PLAYLIST_ID));
    }

    #[test]
    fn test_queue_navigation_wraps() {
        let mut store = sample_store();
        store.set_playback(keys(&["a", "b", "c"]));
        store.play("c");
        assert_eq!(store.next_in_queue().as_deref(), Some("a"));
        store.play("a");
        assert_eq!(store.previous_in_queue().as_deref(), Some("c"));
    }

    #[test]
    fn test_shuffle_restores_original_queue() {
        let mut store = sample_store();
        let mut rng = StdRng::seed_from_u64(7);
        store.set_playback(keys(&["a", "b", "c", "d", "e"]));

        assert_eq!(store.cycle_repeat(&mut rng), RepeatMode::One);
        assert_eq!(store.cycle_repeat(&mut rng), RepeatMode::Shuffle);
        let mut shuffled = store.playback().to_vec();
        shuffled.sort();
        assert_eq!(shuffled, keys(&["a", "b", "c", "d", "e"]));

        assert_eq!(store.cycle_repeat(&mut rng), RepeatMode::All);
        assert_eq!(store.playback(), keys(&["a", "b", "c", "d", "e"]).as_slice());
    }
}
