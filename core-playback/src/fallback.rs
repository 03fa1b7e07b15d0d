//! # Fallback / Recovery Controller
//!
//! Decides whether an audio-element error should trigger an automatic
//! quality downgrade. Recovery is bounded: for each track, each error class
//! gets at most one downgrade, and nothing goes below the policy's streaming
//! tier.
//!
//! | Error class   | Condition                        | Action                          |
//! |---------------|----------------------------------|---------------------------------|
//! | `Adaptive`    | adaptive playback active         | disable adaptive, reload at lossless tier |
//! | `Progressive` | effective tier above streaming   | reload one step down            |
//! | either        | already attempted for this track | decline                         |
//!
//! The controller is also the load controller's [`LoadListener`]: a
//! manifest-unavailable signal spends the adaptive class for that track, so
//! adaptive playback is not retried for it.

use crate::config::FallbackPolicy;
use crate::loader::LoadedStream;
use crate::model::{CatalogTrack, Quality};
use crate::traits::LoadListener;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackClass {
    Adaptive,
    Progressive,
}

/// A downgrade the player should perform.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPlan {
    pub track: CatalogTrack,
    pub from: Option<Quality>,
    pub to: Quality,
    pub class: FallbackClass,
    pub reason: String,
}

impl FallbackPlan {
    pub fn disables_adaptive(&self) -> bool {
        self.class == FallbackClass::Adaptive
    }
}

#[derive(Debug, Default)]
struct TrackFallbackState {
    track_id: Option<i64>,
    spent: HashSet<FallbackClass>,
}

#[derive(Debug)]
pub struct FallbackController {
    policy: FallbackPolicy,
    state: Mutex<TrackFallbackState>,
}

impl FallbackController {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(TrackFallbackState::default()),
        }
    }

    /// Record that `track_id` started loading. A different track clears the
    /// spent classes; reloading the same track keeps them.
    pub fn track_started(&self, track_id: i64) {
        let mut state = self.state.lock();
        if state.track_id != Some(track_id) {
            state.track_id = Some(track_id);
            state.spent.clear();
        }
    }

    /// Whether adaptive playback may still be used for `track_id`.
    pub fn adaptive_allowed(&self, track_id: i64) -> bool {
        let state = self.state.lock();
        state.track_id != Some(track_id) || !state.spent.contains(&FallbackClass::Adaptive)
    }

    pub fn attempted(&self, track_id: i64, class: FallbackClass) -> bool {
        let state = self.state.lock();
        state.track_id == Some(track_id) && state.spent.contains(&class)
    }

    /// Decide how to react to an audio error on `track`.
    ///
    /// `stream` is the stream currently applied, if any. `None` means
    /// decline: the error becomes terminal.
    pub fn on_audio_error(
        &self,
        track: &CatalogTrack,
        stream: Option<&LoadedStream>,
        reason: &str,
    ) -> Option<FallbackPlan> {
        let stream = stream.filter(|stream| stream.track_id == track.id);
        let mut state = self.state.lock();
        if state.track_id != Some(track.id) {
            state.track_id = Some(track.id);
            state.spent.clear();
        }

        let adaptive = stream.map_or(false, |stream| stream.adaptive);
        let (class, to) = if adaptive {
            (FallbackClass::Adaptive, self.policy.lossless_tier)
        } else {
            let effective = stream.map(|stream| stream.quality)?;
            if effective <= self.policy.streaming_tier {
                debug!(track_id = track.id, %effective, "Already at the lowest fallback tier");
                return None;
            }
            let to = if effective > self.policy.lossless_tier {
                self.policy.lossless_tier
            } else {
                self.policy.streaming_tier
            };
            (FallbackClass::Progressive, to)
        };

        if !state.spent.insert(class) {
            debug!(track_id = track.id, ?class, "Fallback already attempted for this track");
            return None;
        }

        let from = stream.map(|stream| stream.quality);
        info!(track_id = track.id, ?class, ?from, %to, "Planning quality fallback");
        Some(FallbackPlan {
            track: track.clone(),
            from,
            to,
            class,
            reason: reason.to_string(),
        })
    }

    /// Forget everything (player reset).
    pub fn reset(&self) {
        *self.state.lock() = TrackFallbackState::default();
    }
}

impl LoadListener for FallbackController {
    fn on_manifest_unavailable(&self, track_id: i64) {
        let mut state = self.state.lock();
        if state.track_id != Some(track_id) {
            state.track_id = Some(track_id);
            state.spent.clear();
        }
        state.spent.insert(FallbackClass::Adaptive);
    }
}
