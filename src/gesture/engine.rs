//! Drag-to-reorder, range multi-select and cross-playlist drag
//!
//! One gesture runs from pointer-down to pointer-up. A primary press on a
//! row arms the engine; the hold timer or leaving the row promotes it to one
//! of the active kinds, chosen at arm time. A release that ends an armed
//! gesture is a click.

use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::pointer::*;
use crate::library::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Reorder,
    Multiselect(SelectAction),
    CrossDrag,
}

/// Observable engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Armed(GestureKind),
    Active(GestureKind),
}

/// Active drag of one anchor row
///
/// The anchor is tracked by key. `index` is refreshed from the store
/// whenever the playlist may have changed underneath the drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub anchor: TrackKey,
    /// Row bounds at `origin`
    pub bounds: RowBounds,
    pub playlist: PlaylistId,
    pub origin: usize,
    /// Current index of the anchor (reorder only)
    pub index: usize,
    /// Playlist order when the drag started
    origin_order: Vec<TrackKey>,
}

impl DragSession {
    /// Placeholder row bounds for the anchor's current index
    pub fn placeholder(&self) -> RowBounds {
        let offset = self.index as f64 - self.origin as f64;
        RowBounds::new(self.bounds.top + offset * self.bounds.height, self.bounds.height)
    }

    /// Current index of the anchor in its playlist
    fn locate(&self, store: &LibraryStore) -> Option<usize> {
        let tracks = &store.playlist(self.playlist)?.tracks;
        if tracks.get(self.index) == Some(&self.anchor) {
            return Some(self.index);
        }
        tracks.iter().position(|k| *k == self.anchor)
    }

    /// Whether the drag changed the order of the rows it started with.
    /// Rows added or removed by others since then are not compared.
    fn moved(&self, store: &LibraryStore) -> bool {
        let Some(pl) = store.playlist(self.playlist) else {
            return false;
        };
        if pl.position(&self.anchor).is_none() {
            return false;
        }
        let now: HashSet<&str> = pl.tracks.iter().map(String::as_str).collect();
        let then: HashSet<&str> = self.origin_order.iter().map(String::as_str).collect();

        let before = self.origin_order.iter().filter(|k| now.contains(k.as_str()));
        let after = pl.tracks.iter().filter(|k| then.contains(k.as_str()));
        !before.eq(after)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Armed {
        gesture: u64,
        anchor: RowHit,
        kind: GestureKind,
    },
    Reorder(DragSession),
    Multiselect(SelectAction),
    CrossDrag(DragSession),
}

/// What the session has to do after an input
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEffect {
    /// Call back [`DragReorderEngine::hold_expired`] after `after`
    HoldTimer { gesture: u64, after: Duration },
    Promoted(GestureKind),
    /// Persist the playlist's order
    Commit { playlist: PlaylistId },
    /// Dragged tracks were released over a playlist
    Drop { target: PlaylistId, keys: Vec<TrackKey> },
    Played(TrackKey),
    /// The playback queue was replaced by the displayed list
    QueueReplaced,
}

#[derive(Debug)]
pub struct DragReorderEngine {
    hold: Duration,
    phase: Phase,
    next_gesture: u64,
    throttle: bool,
}

impl DragReorderEngine {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            phase: Phase::Idle,
            next_gesture: 1,
            throttle: false,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        match &self.phase {
            Phase::Idle => GesturePhase::Idle,
            Phase::Armed { kind, .. } => GesturePhase::Armed(*kind),
            Phase::Reorder(_) => GesturePhase::Active(GestureKind::Reorder),
            Phase::Multiselect(action) => GesturePhase::Active(GestureKind::Multiselect(*action)),
            Phase::CrossDrag(_) => GesturePhase::Active(GestureKind::CrossDrag),
        }
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.phase {
            Phase::Reorder(session) | Phase::CrossDrag(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Drop any gesture without side effects
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.throttle = false;
    }

    pub fn handle(&mut self, event: PointerEvent, store: &mut LibraryStore) -> Vec<GestureEffect> {
        match event {
            PointerEvent::Down { button, hit, ctrl: _ } => self.pointer_down(button, hit, store),
            PointerEvent::Move { y } => {
                self.pointer_move(y, store);
                Vec::new()
            }
            PointerEvent::Enter { hit } => self.pointer_enter(hit, store),
            PointerEvent::Leave { key } => self.pointer_leave(&key, store),
            PointerEvent::Up { button, target, ctrl } => self.pointer_up(button, target, ctrl, store),
        }
    }

    /// Arm a new gesture. A gesture still running (its release was never
    /// seen) is finished first, so a moved reorder still commits.
    pub fn pointer_down(&mut self, button: Button, hit: RowHit, store: &mut LibraryStore) -> Vec<GestureEffect> {
        if button != Button::Primary || !store.contains_track(&hit.key) {
            return Vec::new();
        }
        let mut effects = self.abandon(store);

        let kind = if store.select_mode() && hit.region == RowRegion::SelectBox {
            let action = if store.is_selected(&hit.key) {
                SelectAction::Remove
            } else {
                SelectAction::Add
            };
            GestureKind::Multiselect(action)
        } else if hit.region == RowRegion::Handle
            && store.is_sortable_view()
            && store
                .current_playlist()
                .is_some_and(|p| p.position(&hit.key).is_some())
        {
            GestureKind::Reorder
        } else {
            GestureKind::CrossDrag
        };

        let gesture = self.next_gesture;
        self.next_gesture += 1;
        debug!("Gesture {} armed as {:?}", gesture, kind);

        self.phase = Phase::Armed {
            gesture,
            anchor: hit,
            kind,
        };
        effects.push(GestureEffect::HoldTimer {
            gesture,
            after: self.hold,
        });
        effects
    }

    /// Hold timer fired. Timers of earlier gestures are ignored.
    pub fn hold_expired(&mut self, gesture: u64, store: &mut LibraryStore) -> Vec<GestureEffect> {
        match &self.phase {
            Phase::Armed { gesture: armed, .. } if *armed == gesture => self.promote(None, store),
            _ => Vec::new(),
        }
    }

    pub fn pointer_leave(&mut self, key: &str, store: &mut LibraryStore) -> Vec<GestureEffect> {
        match &self.phase {
            Phase::Armed { anchor, .. } if anchor.key == key => self.promote(None, store),
            _ => Vec::new(),
        }
    }

    pub fn pointer_enter(&mut self, hit: RowHit, store: &mut LibraryStore) -> Vec<GestureEffect> {
        match &self.phase {
            Phase::Armed {
                anchor,
                kind: GestureKind::Multiselect(_),
                ..
            } if anchor.key != hit.key && hit.region == RowRegion::SelectBox => {
                self.promote(Some(hit.key), store)
            }
            Phase::Multiselect(action) if hit.region == RowRegion::SelectBox => {
                apply_selection(store, *action, &[hit.key]);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Move the dragged row. Only every other move is processed.
    pub fn pointer_move(&mut self, y: f64, store: &mut LibraryStore) {
        let Phase::Reorder(session) = &mut self.phase else {
            return;
        };

        self.throttle = !self.throttle;
        if !self.throttle {
            return;
        }

        let Some(index) = session.locate(store) else {
            return;
        };
        session.index = index;

        let placeholder = session.placeholder();
        let up = if y <= placeholder.top {
            true
        } else if y >= placeholder.bottom() {
            false
        } else {
            return;
        };

        if let Some(index) = store.swap_with_neighbor(session.playlist, session.index, up) {
            session.index = index;
        }
    }

    pub fn pointer_up(
        &mut self,
        button: Button,
        target: PointerTarget,
        ctrl: bool,
        store: &mut LibraryStore,
    ) -> Vec<GestureEffect> {
        if button != Button::Primary {
            return Vec::new();
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.throttle = false;

        let effects = match phase {
            Phase::Idle | Phase::Multiselect(_) => Vec::new(),
            Phase::Armed { anchor, .. } => click(anchor, &target, ctrl, store),
            Phase::Reorder(session) => commit(&session, store),
            Phase::CrossDrag(_) => match target {
                PointerTarget::Playlist(target) if !store.dragging().is_empty() => {
                    vec![GestureEffect::Drop {
                        target,
                        keys: store.dragging().to_vec(),
                    }]
                }
                _ => Vec::new(),
            },
        };

        if !store.dragging().is_empty() {
            store.set_dragging(Vec::new());
        }
        effects
    }

    /// Forget removed tracks mid-gesture. Call after the store applied the
    /// removal.
    pub fn prune(&mut self, removed: &[TrackKey], store: &LibraryStore) {
        let drop_gesture = match &mut self.phase {
            Phase::Armed { anchor, .. } => removed.contains(&anchor.key),
            Phase::Reorder(session) => {
                if removed.contains(&session.anchor) {
                    debug!("Dragged track removed, reorder cancelled");
                    true
                } else {
                    let above = session.origin_order[..session.origin]
                        .iter()
                        .filter(|k| removed.contains(k))
                        .count();
                    session.origin -= above;
                    session.bounds.top -= above as f64 * session.bounds.height;
                    session.origin_order.retain(|k| !removed.contains(k));

                    match store
                        .playlist(session.playlist)
                        .and_then(|p| p.position(&session.anchor))
                    {
                        Some(index) => {
                            session.index = index;
                            false
                        }
                        None => true,
                    }
                }
            }
            Phase::CrossDrag(_) | Phase::Multiselect(_) | Phase::Idle => false,
        };

        if drop_gesture {
            self.phase = Phase::Idle;
        }
    }

    /// Catch up with store changes made outside the gesture: added tracks,
    /// replaced playlist orders, edits. Ends the gesture when its anchor or
    /// dragged tracks are gone.
    pub fn sync(&mut self, store: &LibraryStore) {
        let keep = match &mut self.phase {
            Phase::Idle | Phase::Multiselect(_) => true,
            Phase::Armed { anchor, .. } => store.contains_track(&anchor.key),
            Phase::Reorder(session) => match session.locate(store) {
                Some(index) => {
                    session.index = index;
                    true
                }
                None => {
                    debug!("Dragged track left playlist {}, reorder cancelled", session.playlist);
                    false
                }
            },
            Phase::CrossDrag(_) => !store.dragging().is_empty(),
        };

        if !keep {
            self.reset();
        }
    }

    /// End the current gesture without a release
    fn abandon(&mut self, store: &mut LibraryStore) -> Vec<GestureEffect> {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.throttle = false;

        let effects = match &phase {
            Phase::Reorder(session) => {
                debug!("Reorder interrupted by a new press");
                commit(session, store)
            }
            _ => Vec::new(),
        };
        if !store.dragging().is_empty() {
            store.set_dragging(Vec::new());
        }
        effects
    }

    fn promote(&mut self, entered: Option<TrackKey>, store: &mut LibraryStore) -> Vec<GestureEffect> {
        let Phase::Armed { anchor, kind, .. } = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return Vec::new();
        };
        self.throttle = false;

        match kind {
            GestureKind::Multiselect(action) => {
                let mut keys = vec![anchor.key];
                keys.extend(entered);
                apply_selection(store, action, &keys);
                self.phase = Phase::Multiselect(action);
            }
            GestureKind::Reorder => {
                let playlist = store.current_id();
                let Some(pl) = store.playlist(playlist) else {
                    return Vec::new();
                };
                let Some(origin) = pl.position(&anchor.key) else {
                    return Vec::new();
                };
                self.phase = Phase::Reorder(DragSession {
                    anchor: anchor.key,
                    bounds: anchor.bounds,
                    playlist,
                    origin,
                    index: origin,
                    origin_order: pl.tracks.clone(),
                });
            }
            GestureKind::CrossDrag => {
                let keys = if store.select_mode() && store.is_selected(&anchor.key) {
                    store
                        .displayed_keys()
                        .into_iter()
                        .filter(|k| store.is_selected(k))
                        .collect()
                } else {
                    vec![anchor.key.clone()]
                };
                let origin = store
                    .displayed_keys()
                    .iter()
                    .position(|k| *k == anchor.key)
                    .unwrap_or(0);
                store.set_dragging(keys);
                self.phase = Phase::CrossDrag(DragSession {
                    anchor: anchor.key,
                    bounds: anchor.bounds,
                    playlist: store.current_id(),
                    origin,
                    index: origin,
                    origin_order: Vec::new(),
                });
            }
        }

        debug!("Gesture promoted to {:?}", kind);
        vec![GestureEffect::Promoted(kind)]
    }
}

fn commit(session: &DragSession, store: &LibraryStore) -> Vec<GestureEffect> {
    if session.moved(store) {
        vec![GestureEffect::Commit {
            playlist: session.playlist,
        }]
    } else {
        Vec::new()
    }
}

fn apply_selection(store: &mut LibraryStore, action: SelectAction, keys: &[TrackKey]) {
    match action {
        SelectAction::Add => store.select(keys),
        SelectAction::Remove => store.deselect(keys),
    }
}

/// Release of a gesture that never became active
fn click(anchor: RowHit, target: &PointerTarget, ctrl: bool, store: &mut LibraryStore) -> Vec<GestureEffect> {
    let key = anchor.key;

    if ctrl && !store.select_mode() {
        store.set_select_mode(true);
        store.set_selected(&[key]);
        return Vec::new();
    }

    if store.select_mode() {
        let region = match target {
            PointerTarget::Row(hit) if hit.key == key => hit.region,
            _ => anchor.region,
        };
        if region == RowRegion::SelectBox {
            if store.is_selected(&key) {
                store.deselect(&[key]);
            } else {
                store.select(&[key]);
            }
        }
        return Vec::new();
    }

    let mut effects = Vec::new();
    let already_playing = store.now_playing().is_some_and(|t| t.md5 == key);
    if !already_playing && store.play(&key) {
        effects.push(GestureEffect::Played(key));
    }

    let current = store.current_id();
    store.set_playbacked(current);

    let displayed = store.displayed_keys();
    if store.playback() != displayed.as_slice() {
        store.set_repeat(RepeatMode::All);
        store.set_playback(displayed);
        effects.push(GestureEffect::QueueReplaced);
    }
    effects
}
