//! # Event Bus System
//!
//! Broadcasts playback notifications to the UI layer using
//! `tokio::sync::broadcast`. The playback core never calls into UI code; it
//! publishes typed events and any number of subscribers react to them.
//!
//! ## Overview
//!
//! - **Event Types**: [`PlaybackEvent`] (state machine transitions and
//!   user-visible outcomes) and [`StreamEvent`] (load controller and fallback
//!   diagnostics), wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel
//! - **EventStream**: receiver wrapper with predicate filtering
//!
//! ```text
//! ┌───────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ Player        ├────────>│          ├────────────>│ UI store   │
//! └───────────────┘         │ EventBus │             └────────────┘
//! ┌───────────────┐  emit   │          │  subscribe  ┌────────────┐
//! │ Load/Fallback ├────────>│          ├────────────>│ Diagnostics│
//! └───────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::StateChanged {
//!     from: "idle".to_string(),
//!     to: "loading".to_string(),
//!     attempt_id: 1,
//!     load_request_id: 1,
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback state changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal;
//!   UI stores should re-read the player snapshot instead of replaying.
//! - **`RecvError::Closed`**: the player was dropped.
//!
//! Emitting with no subscribers returns `Err`; publishers ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// `TimeUpdate` is not published, so the volume is a handful of events per
/// track change.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback state machine notifications
    Playback(PlaybackEvent),
    /// Stream resolution and recovery notifications
    Stream(StreamEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Stream(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Stream(StreamEvent::ManifestUnavailable { .. })
            | CoreEvent::Stream(StreamEvent::FallbackTriggered { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::QualityChanged { .. })
            | CoreEvent::Stream(StreamEvent::LoadApplied { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Notifications derived from playback state machine transitions.
///
/// States and qualities are carried as their wire names (`"loading"`,
/// `"HI_RES_LOSSLESS"`) so UI bindings can forward them without depending on
/// `core-playback` types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The machine moved to a different state.
    StateChanged {
        from: String,
        to: String,
        /// Attempt token that was current after the transition.
        attempt_id: u64,
        load_request_id: u64,
    },
    /// The quality actually streaming changed.
    QualityChanged {
        track_id: String,
        requested: String,
        /// `None` while a load is in flight.
        effective: Option<String>,
    },
    /// An automatic retry or fallback load started. The UI must not present
    /// the track as playing until the next `StateChanged` to `playing`.
    Recovering {
        track_id: String,
        attempt_id: u64,
    },
    /// The current track finished playing.
    TrackEnded { track_id: String },
    /// Terminal failure surfaced to the user.
    Error {
        track_id: Option<String>,
        message: String,
        /// Whether a manual retry (`PLAY` from `error`) may succeed.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::QualityChanged { .. } => "Streaming quality changed",
            PlaybackEvent::Recovering { .. } => "Recovering playback",
            PlaybackEvent::TrackEnded { .. } => "Track ended",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Stream Events
// ============================================================================

/// Diagnostics from the track load controller and fallback controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum StreamEvent {
    /// Stream resolution started for a track.
    LoadStarted {
        track_id: String,
        sequence: u64,
        quality: String,
    },
    /// A resolved stream was applied to playback.
    LoadApplied {
        track_id: String,
        sequence: u64,
        quality: String,
        adaptive: bool,
    },
    /// A resolution finished after a newer load superseded it and was dropped.
    StaleResultDiscarded {
        track_id: String,
        sequence: u64,
        current_sequence: u64,
    },
    /// The catalog has no adaptive manifest for the track at this tier.
    ManifestUnavailable { track_id: String, quality: String },
    /// Playback is being retried at a lower tier.
    FallbackTriggered {
        track_id: String,
        from: Option<String>,
        to: String,
        reason: String,
    },
    /// The next queued track's manifest was resolved ahead of time.
    Preloaded { track_id: String, quality: String },
}

impl StreamEvent {
    fn description(&self) -> &str {
        match self {
            StreamEvent::LoadStarted { .. } => "Stream load started",
            StreamEvent::LoadApplied { .. } => "Stream applied",
            StreamEvent::StaleResultDiscarded { .. } => "Stale stream result discarded",
            StreamEvent::ManifestUnavailable { .. } => "Adaptive manifest unavailable",
            StreamEvent::FallbackTriggered { .. } => "Quality fallback triggered",
            StreamEvent::Preloaded { .. } => "Next track preloaded",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes into the same
/// channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with predicate filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let playback_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`/`try_recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
