//! # Playback State Machine
//!
//! Pure transition function over `(state, event)` plus a derived list of
//! side effects. Nothing in this module performs I/O.
//!
//! ```text
//!                 LOAD_TRACK (external)         CONVERSION_COMPLETE
//!   ┌──────┐  ─────────────────────────> ┌────────────┐ ─────────────┐
//!   │ idle │                             │ converting │              │
//!   └──┬───┘  LOAD_TRACK (catalog)       └────────────┘              ▼
//!      └────────────────────────────────────────────────────> ┌─────────┐
//!                                                             │ loading │
//!   ┌───────┐  LOAD_COMPLETE (!autoPlay)  ┌───────┐  PLAY     └────┬────┘
//!   │ error │ <────────────────────────── │ ready │ ──────┐       │ LOAD_COMPLETE
//!   └───────┘         LOAD_ERROR ▲        └───────┘       ▼       ▼ (autoPlay)
//!                                │                  ┌─────────┐ <─┘
//!                                └───────────────── │ playing │ <──> buffering
//!                                                   └────┬────┘
//!                                                   PAUSE│ ▲ PLAY
//!                                                        ▼ │
//!                                                   ┌────────┐
//!                                                   │ paused │
//!                                                   └────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::machine::{MachineState, PlayerEvent, PlaybackState};
//! use core_playback::model::{CatalogTrack, Quality};
//!
//! let machine = MachineState::new(Quality::Lossless);
//! let (loading, effects) = machine.step(&PlayerEvent::LoadTrack {
//!     track: CatalogTrack::new(1, "Intro", 215.0).into(),
//!     auto_play: false,
//! });
//!
//! assert_eq!(loading.state, PlaybackState::Loading);
//! assert_eq!(effects.len(), 1);
//! ```

mod context;
mod effects;
mod event;
mod transition;

pub use context::{FailureKind, PlaybackContext, PlaybackFailure, PlaybackState};
pub use effects::derive_effects;
pub use event::{PlayerEvent, SideEffect};
pub use transition::transition;

use crate::model::Quality;
use std::sync::Arc;

/// Machine state plus its context record.
///
/// Cloning is cheap: the context is shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub state: PlaybackState,
    pub context: Arc<PlaybackContext>,
}

impl MachineState {
    /// Idle machine seeded with the persisted quality preference.
    pub fn new(requested_quality: Quality) -> Self {
        Self {
            state: PlaybackState::Idle,
            context: Arc::new(PlaybackContext::new(requested_quality)),
        }
    }

    /// Apply `event` and derive the effects of the transition.
    pub fn step(&self, event: &PlayerEvent) -> (MachineState, Vec<SideEffect>) {
        let next = transition(self, event);
        let effects = derive_effects(self, &next, event);
        (next, effects)
    }

    /// `true` when `other` is this exact state: same variant and the same
    /// context allocation.
    pub fn is_same(&self, other: &MachineState) -> bool {
        self.state == other.state && Arc::ptr_eq(&self.context, &other.context)
    }

    /// Copy the context, edit it, and move to `state`.
    pub(crate) fn with(
        &self,
        state: PlaybackState,
        edit: impl FnOnce(&mut PlaybackContext),
    ) -> MachineState {
        let mut context = PlaybackContext::clone(&self.context);
        edit(&mut context);
        MachineState {
            state,
            context: Arc::new(context),
        }
    }

    /// Move to `state` keeping the context allocation.
    pub(crate) fn to_state(&self, state: PlaybackState) -> MachineState {
        MachineState {
            state,
            context: Arc::clone(&self.context),
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new(Quality::default())
    }
}
