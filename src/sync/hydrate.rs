//! Hydration: turning the `init` payload into library content
//!
//! Corrupt parts of the payload degrade locally. A playlist whose order does
//! not parse hydrates empty, a theme map that does not parse becomes empty.
//! Only an undecodable library map fails the whole hydration.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::api::{ChannelError, InitPayload, RawPlaylist, RawUser};
use crate::config::SessionMemory;
use crate::library::*;

/// Playback state restored from session memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub now_playing: Option<TrackKey>,
    /// Start playing right away (user's autoplay preference)
    pub resume: bool,
    pub playlist: PlaylistId,
}

/// Build the full store content from a hydration payload
pub fn build_content(payload: InitPayload) -> Result<LibraryContent, ChannelError> {
    let tracks = parse_library(payload.lib)?;

    let mut playlists = BTreeMap::new();
    let mut library_found = false;

    for raw in payload.playlists {
        let is_library = !library_found && raw.name == payload.apk;
        let mut playlist = parse_playlist(raw, &tracks);

        if is_library {
            library_found = true;
            let mut missing: Vec<&Track> = tracks
                .values()
                .filter(|t| !playlist.tracks.contains(&t.md5))
                .collect();
            sort_newest_first(&mut missing);

            let mut order: Vec<TrackKey> = missing.into_iter().map(|t| t.md5.clone()).collect();
            order.append(&mut playlist.tracks);
            playlist.tracks = order;
            playlist.id = LIBRARY_PLAYLIST_ID;
        }

        playlists.insert(playlist.id, playlist);
    }

    if !library_found {
        debug!("No all-tracks playlist on server, synthesizing one");
        let mut all: Vec<&Track> = tracks.values().collect();
        sort_newest_first(&mut all);
        playlists.insert(
            LIBRARY_PLAYLIST_ID,
            Playlist {
                id: LIBRARY_PLAYLIST_ID,
                db_id: -1,
                name: payload.apk.clone(),
                tracks: all.into_iter().map(|t| t.md5.clone()).collect(),
            },
        );
    }

    Ok(LibraryContent {
        tracks,
        playlists,
        library_key: payload.apk,
        user: parse_user(payload.u),
        app_title: payload.custom_app_title,
    })
}

fn sort_newest_first(tracks: &mut [&Track]) {
    tracks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.md5.cmp(&b.md5)));
}

/// The library map arrives JSON-encoded, but an inline object is accepted too
fn parse_library(lib: Value) -> Result<HashMap<TrackKey, Track>, ChannelError> {
    let parsed: HashMap<TrackKey, Track> = match lib {
        Value::Null => HashMap::new(),
        Value::String(encoded) => serde_json::from_str(&encoded)
            .map_err(|e| ChannelError::Malformed(format!("library map: {}", e)))?,
        value @ Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| ChannelError::Malformed(format!("library map: {}", e)))?,
        other => {
            return Err(ChannelError::Malformed(format!(
                "library map has unexpected type: {}",
                other
            )))
        }
    };

    Ok(parsed
        .into_iter()
        .map(|(key, mut track)| {
            track.md5 = key.clone();
            (key, track)
        })
        .collect())
}

fn parse_playlist(raw: RawPlaylist, tracks: &HashMap<TrackKey, Track>) -> Playlist {
    let order: Vec<TrackKey> = serde_json::from_str(&raw.tracks).unwrap_or_else(|e| {
        warn!("Playlist {} has a corrupt track order, clearing it: {}", raw.name, e);
        Vec::new()
    });

    let mut seen = HashSet::new();
    let order = order
        .into_iter()
        .filter(|k| tracks.contains_key(k) && seen.insert(k.clone()))
        .collect();

    Playlist {
        id: raw.id,
        db_id: raw.id,
        name: raw.name,
        tracks: order,
    }
}

fn parse_user(raw: RawUser) -> UserProfile {
    let themes: BTreeMap<String, UserTheme> = if raw.themes.is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&raw.themes).unwrap_or_else(|e| {
            warn!("Unable to read user theme data: {}", e);
            BTreeMap::new()
        })
    };

    let defaults = UserProfile::default();
    UserProfile {
        id: raw.id,
        nickname: raw.nickname,
        lang: if raw.lang.is_empty() { defaults.lang } else { raw.lang },
        theme: raw.theme,
        themes,
        is_admin: raw.is_admin,
        is_root: raw.is_root,
        rem_ip: raw.rem_ip,
        autoplay: raw.autoplay,
        has_avatar: raw.has_avatar,
    }
}

/// Reconcile remembered playback against freshly hydrated content.
///
/// The queue comes from the saved explicit queue if there is one, else from
/// the saved playlist's order, else it stays empty.
pub fn restore_session(store: &mut LibraryStore, memory: &SessionMemory) -> Restored {
    let mut restored = Restored {
        now_playing: None,
        resume: false,
        playlist: LIBRARY_PLAYLIST_ID,
    };

    if let Some(src) = memory.last_src() {
        if store.play(src) {
            restored.now_playing = Some(src.to_string());
            restored.resume = store.user().autoplay;
        }
    }

    let mut queue = Vec::new();
    if let Some(id) = memory.last_playlist() {
        if let Some(playlist) = store.playlist(id) {
            restored.playlist = id;
            queue = playlist.tracks.clone();
        }
    }
    if let Some(saved) = memory.playback() {
        queue = saved;
    }

    store.set_playback(queue);
    store.set_current(restored.playlist);
    store.set_playbacked(restored.playlist);
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> InitPayload {
        serde_json::from_value(value).unwrap()
    }

    fn library_json() -> String {
        json!({
            "a": {"md5": "a", "artist": "A", "title": "One", "duration": 10.0, "has_image": false, "timestamp": 1, "lyrics": ""},
            "b": {"md5": "b", "artist": "B", "title": "Two", "duration": 20.0, "has_image": true, "timestamp": 3, "lyrics": ""},
            "c": {"md5": "c", "artist": "C", "title": "Three", "duration": 30.0, "has_image": false, "timestamp": 2, "lyrics": ""}
        })
        .to_string()
    }

    #[test]
    fn test_corrupt_order_empties_only_that_playlist() {
        let content = build_content(payload(json!({
            "apk": "__all__",
            "lib": library_json(),
            "u": {"id": 1, "nickname": "me", "themes": "{}"},
            "playlists": [
                {"id": 3, "name": "Broken", "tracks": "[\"a\", "},
                {"id": 4, "name": "Fine", "tracks": "[\"c\",\"a\"]"}
            ],
            "custom_app_title": ""
        })))
        .unwrap();

        assert!(content.playlists[&3].tracks.is_empty());
        assert_eq!(content.playlists[&4].tracks, vec!["c", "a"]);
        assert_eq!(content.playlists[&4].db_id, 4);
    }

    #[test]
    fn test_library_playlist_is_rekeyed_and_completed() {
        let content = build_content(payload(json!({
            "apk": "__all__",
            "lib": library_json(),
            "playlists": [
                {"id": 9, "name": "__all__", "tracks": "[\"a\",\"zz\"]"}
            ]
        })))
        .unwrap();

        let library = &content.playlists[&LIBRARY_PLAYLIST_ID];
        assert_eq!(library.db_id, 9);
        assert!(!content.playlists.contains_key(&9));
        // Missing keys are prepended newest first, unknown keys dropped
        assert_eq!(library.tracks, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_library_playlist_synthesized_newest_first() {
        let content = build_content(payload(json!({
            "apk": "__all__",
            "lib": library_json(),
            "playlists": []
        })))
        .unwrap();

        let library = &content.playlists[&LIBRARY_PLAYLIST_ID];
        assert_eq!(library.db_id, -1);
        assert_eq!(library.name, "__all__");
        assert_eq!(library.tracks, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_corrupt_themes_become_empty() {
        let content = build_content(payload(json!({
            "apk": "x",
            "lib": "{}",
            "u": {"id": 2, "lang": "", "themes": "not json", "autoplay": true}
        })))
        .unwrap();

        assert!(content.user.themes.is_empty());
        assert_eq!(content.user.lang, "en");
        assert!(content.user.autoplay);
    }

    #[test]
    fn test_bad_library_map_fails() {
        let err = build_content(payload(json!({"apk": "x", "lib": "[1,2"}))).unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));
    }

    fn hydrated(memory: &SessionMemory, autoplay: bool) -> (LibraryStore, Restored) {
        let mut content = build_content(payload(json!({
            "apk": "__all__",
            "lib": library_json(),
            "u": {"id": 1, "autoplay": autoplay},
            "playlists": [{"id": 4, "name": "Fine", "tracks": "[\"c\",\"a\"]"}]
        })))
        .unwrap();
        content.app_title = "Music".to_string();

        let mut store = LibraryStore::new();
        store.replace(content);
        let restored = restore_session(&mut store, memory);
        (store, restored)
    }

    #[test]
    fn test_restore_prefers_explicit_queue() {
        let mut memory = SessionMemory::in_memory();
        memory.set_last_src(Some("c"));
        memory.set_last_playlist(4);
        memory.set_playback(&["b".to_string(), "gone".to_string(), "c".to_string()]);

        let (store, restored) = hydrated(&memory, true);
        assert_eq!(restored.now_playing.as_deref(), Some("c"));
        assert!(restored.resume);
        assert_eq!(store.playback(), &["b".to_string(), "c".to_string()]);
        assert_eq!(store.current_id(), 4);
        assert_eq!(store.playbacked(), 4);
    }

    #[test]
    fn test_restore_falls_back_to_playlist_order() {
        let mut memory = SessionMemory::in_memory();
        memory.set_last_src(Some("missing"));
        memory.set_last_playlist(4);

        let (store, restored) = hydrated(&memory, false);
        assert_eq!(restored.now_playing, None);
        assert!(!restored.resume);
        assert_eq!(store.playback(), &["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_empty_saved_queue_falls_back_to_playlist_order() {
        let mut memory = SessionMemory::in_memory();
        memory.set_last_playlist(4);
        memory.set_playback(&[]);

        let (store, _) = hydrated(&memory, false);
        assert_eq!(store.playback(), &["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_restore_with_nothing_saved() {
        let (store, restored) = hydrated(&SessionMemory::in_memory(), true);
        assert_eq!(restored.playlist, LIBRARY_PLAYLIST_ID);
        assert!(store.playback().is_empty());
        assert!(store.now_playing().is_none());
    }
}
