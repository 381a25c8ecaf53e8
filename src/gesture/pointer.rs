//! Pointer input as seen by the gesture engine

use crate::library::{LibraryStore, PlaylistId, TrackKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Secondary,
    Other,
}

/// Part of a track row under the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRegion {
    /// Selection checkbox column
    SelectBox,
    Body,
    /// Drag handle column
    Handle,
}

/// Vertical extent of a row, in pointer coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowBounds {
    pub top: f64,
    pub height: f64,
}

impl RowBounds {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowHit {
    pub key: TrackKey,
    pub region: RowRegion,
    pub bounds: RowBounds,
}

impl RowHit {
    pub fn new(key: &str, region: RowRegion, bounds: RowBounds) -> Self {
        Self {
            key: key.to_string(),
            region,
            bounds,
        }
    }
}

/// Where a pointer-up landed
#[derive(Debug, Clone, PartialEq)]
pub enum PointerTarget {
    Row(RowHit),
    /// A playlist entry in the sidebar
    Playlist(PlaylistId),
    Outside,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Down { button: Button, hit: RowHit, ctrl: bool },
    Move { y: f64 },
    Enter { hit: RowHit },
    Leave { key: TrackKey },
    Up { button: Button, target: PointerTarget, ctrl: bool },
}

/// Row context-menu actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    DeleteFromPlaylist,
    DeleteFromLibrary,
    Edit,
    ShowLyrics,
    Download,
}

impl ContextAction {
    /// Whether the action applies to the whole selection
    pub fn is_selection_aware(self) -> bool {
        matches!(self, Self::DeleteFromPlaylist | Self::DeleteFromLibrary)
    }
}

/// Tracks a context-menu action on `key` applies to: the selection (in
/// display order) when several rows including `key` are selected in select
/// mode and the action is selection-aware, otherwise just `key`
pub fn context_targets(store: &LibraryStore, key: &str, action: ContextAction) -> Vec<TrackKey> {
    let use_selection = action.is_selection_aware()
        && store.select_mode()
        && store.selected().len() > 1
        && store.is_selected(key);

    if use_selection {
        store
            .displayed_keys()
            .into_iter()
            .filter(|k| store.is_selected(k))
            .collect()
    } else {
        vec![key.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::store::tests::{keys, sample_store};

    #[test]
    fn test_context_targets_selection_aware() {
        let mut store = sample_store();
        store.set_select_mode(true);
        store.select(&keys(&["d", "b"]));

        assert_eq!(
            context_targets(&store, "d", ContextAction::DeleteFromLibrary),
            keys(&["b", "d"])
        );
        assert_eq!(context_targets(&store, "d", ContextAction::Edit), keys(&["d"]));
        // Row outside the selection
        assert_eq!(
            context_targets(&store, "a", ContextAction::DeleteFromPlaylist),
            keys(&["a"])
        );
    }

    #[test]
    fn test_context_targets_single_selection() {
        let mut store = sample_store();
        store.set_select_mode(true);
        store.select(&keys(&["b"]));
        assert_eq!(
            context_targets(&store, "b", ContextAction::DeleteFromLibrary),
            keys(&["b"])
        );

        store.select(&keys(&["c"]));
        store.set_select_mode(false);
        assert_eq!(
            context_targets(&store, "b", ContextAction::DeleteFromLibrary),
            keys(&["b"])
        );
    }
}
