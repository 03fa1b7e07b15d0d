//! Playback state and context records.

use crate::model::{AttemptId, Quality, Track};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Mutually exclusive machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Converting,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Converting => "converting",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Error => "error",
        }
    }

    /// States in which a load is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Converting)
    }

    /// States in which a stream for the current attempt has been applied.
    pub fn has_stream(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Buffering
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of the last recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Conversion,
    Load,
    Playback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PlaybackFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The machine's state record.
///
/// Contexts are never mutated in place: every transition that changes a field
/// produces a new `Arc<PlaybackContext>`, and a transition that changes
/// nothing hands back the same `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackContext {
    pub current_track: Option<Track>,
    pub queue: Arc<Vec<Track>>,
    /// `None` iff `queue` is empty.
    pub queue_index: Option<usize>,
    pub stream_url: Option<String>,
    pub requested_quality: Quality,
    /// Known only once a load for the current attempt has completed.
    pub effective_quality: Option<Quality>,
    /// Seconds, clamped to `0..=duration` when the duration is known.
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub replay_gain: Option<f64>,
    pub error: Option<PlaybackFailure>,
    pub load_request_id: u64,
    pub attempt_id: AttemptId,
    pub auto_play: bool,
    /// Set while a retry or fallback load is in flight.
    pub is_recovering: bool,
}

impl PlaybackContext {
    pub fn new(requested_quality: Quality) -> Self {
        Self {
            current_track: None,
            queue: Arc::new(Vec::new()),
            queue_index: None,
            stream_url: None,
            requested_quality,
            effective_quality: None,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            sample_rate: None,
            bit_depth: None,
            replay_gain: None,
            error: None,
            load_request_id: 0,
            attempt_id: AttemptId::INITIAL,
            auto_play: false,
            is_recovering: false,
        }
    }

    /// Queue entry after the current one.
    pub fn next_in_queue(&self) -> Option<&Track> {
        self.queue_index.and_then(|index| self.queue.get(index + 1))
    }

    /// Clamp a position to `0..=duration` (upper bound only when known).
    pub(crate) fn clamp_time(&self, seconds: f64) -> f64 {
        let floor = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            floor.min(self.duration)
        } else {
            floor
        }
    }

    pub(crate) fn clear_stream(&mut self) {
        self.stream_url = None;
        self.effective_quality = None;
        self.sample_rate = None;
        self.bit_depth = None;
        self.replay_gain = None;
    }
}

impl Default for PlaybackContext {
    fn default() -> Self {
        Self::new(Quality::default())
    }
}
