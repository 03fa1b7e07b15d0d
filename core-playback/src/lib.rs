//! # Playback Orchestration
//!
//! Coordinates what plays, at which quality, and how the player recovers
//! when a stream fails.
//!
//! ## Overview
//!
//! - [`machine`]: pure state machine. `(state, event) -> (state, effects)`
//! - [`loader`]: sequence-guarded stream resolution with caching and proxy
//!   rewriting
//! - [`fallback`]: bounded quality downgrades after audio errors
//! - [`executor`]: runs effects against the audio device and collaborators
//! - [`player`]: the loop tying them together
//!
//! The crate performs no network or audio I/O itself. Hosts provide the
//! catalog, converter, audio device and adaptive engine through the
//! [`traits`] module.

pub mod adaptive;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod loader;
pub mod machine;
pub mod model;
pub mod player;
pub mod preferences;
pub mod traits;

pub use config::{FallbackPolicy, PlaybackConfig, ProxyConfig};
pub use error::{PlaybackError, Result};
pub use executor::{EffectExecutor, EffectOutcome};
pub use fallback::{FallbackClass, FallbackController, FallbackPlan};
pub use loader::{LoadOutcome, LoadRequest, LoadTicket, LoadedStream, TrackLoadController};
pub use machine::{MachineState, PlaybackContext, PlaybackState, PlayerEvent, SideEffect};
pub use model::{AttemptId, CatalogTrack, ExternalTrack, Quality, StreamMetadata, Track, TrackKey};
pub use player::{Player, PlayerDeps, PlayerHandle};
pub use preferences::QualityPreferences;
