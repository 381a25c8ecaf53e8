//! Pointer gestures over the track list

mod engine;
mod pointer;

pub use engine::{DragReorderEngine, DragSession, GestureEffect, GestureKind, GesturePhase, SelectAction};
pub use pointer::{
    context_targets, Button, ContextAction, PointerEvent, PointerTarget, RowBounds, RowHit, RowRegion,
};
