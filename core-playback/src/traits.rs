//! # Playback Collaborator Traits
//!
//! Contracts between the orchestration core and the things it drives or
//! queries: the catalog (stream, manifest and conversion lookups), the audio
//! output device, the adaptive streaming engine and the user-facing
//! notification sink.
//!
//! ## Threading Model
//!
//! - On **native** targets every collaborator must be `Send + Sync` so the
//!   player can be driven from any tokio task.
//! - On **WASM** the browser audio element is single-threaded; traits use
//!   `?Send` from `async_trait` and drop the bounds.
//!
//! ## Errors
//!
//! Collaborators report failures as [`PlaybackError`](crate::PlaybackError).
//! Manifest resolvers must use
//! [`PlaybackError::ManifestUnavailable`](crate::PlaybackError::ManifestUnavailable)
//! when the catalog simply has no manifest, so the load controller can tell
//! it apart from a network failure.

use crate::error::Result;
use crate::model::{CatalogTrack, ExternalTrack, Quality, StreamMetadata};
use bridge_traits::platform::PlatformSendSync;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Catalog types
// ============================================================================

/// Progressive stream returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub url: String,
    #[serde(default)]
    pub metadata: StreamMetadata,
}

/// Result of an adaptive manifest lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestResolution {
    pub payload: ManifestPayload,
    #[serde(default)]
    pub metadata: StreamMetadata,
}

/// What the catalog returned in place of a manifest request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ManifestPayload {
    /// Segmented delivery; the manifest document is handed to the adaptive engine.
    Adaptive {
        manifest: String,
        content_type: String,
    },
    /// The catalog embedded a plain lossless stream instead of a manifest.
    FallbackStream {
        urls: Vec<String>,
        content_type: String,
    },
}

/// What the output device can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub can_play_lossless: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            can_play_lossless: true,
        }
    }
}

// ============================================================================
// Catalog collaborators
// ============================================================================

/// Resolves a progressive stream URL for a track.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait StreamResolver: PlatformSendSync {
    /// # Errors
    ///
    /// [`PlaybackError::StreamResolution`](crate::PlaybackError::StreamResolution)
    /// with the HTTP status when the catalog rejects the request.
    async fn resolve_stream(&self, track_id: i64, quality: Quality) -> Result<StreamInfo>;
}

/// Resolves an adaptive (DASH) manifest for a track.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ManifestResolver: PlatformSendSync {
    async fn resolve_manifest(&self, track_id: i64, quality: Quality)
        -> Result<ManifestResolution>;
}

/// Converts an externally-linked track into a playable catalog track.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait TrackConverter: PlatformSendSync {
    async fn convert(&self, track: &ExternalTrack) -> Result<CatalogTrack>;
}

// ============================================================================
// Audio device
// ============================================================================

/// The single audio output element.
///
/// Only the effect executor calls these methods. Device notifications
/// (`waiting`, `playing`, `pause`, `error`, `ended`, time updates) travel the
/// other way as [`PlayerEvent`](crate::machine::PlayerEvent)s sent through a
/// [`PlayerHandle`](crate::player::PlayerHandle).
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AudioDevice: PlatformSendSync {
    /// Assign the source URL. Takes effect on the next [`load`](Self::load).
    fn set_source(&self, url: &str) -> Result<()>;

    /// Reload the element from its current source.
    fn load(&self) -> Result<()>;

    /// Start playback.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::PlayRejected`](crate::PlaybackError::PlayRejected) when
    /// the platform refuses (autoplay policy, undecodable media).
    async fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Current position in seconds.
    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64) -> Result<()>;

    /// Detach the source and stop any network activity.
    fn unload(&self) -> Result<()>;

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }
}

// ============================================================================
// Adaptive streaming engine
// ============================================================================

/// Segmented-streaming engine bound to the audio device (e.g. a DASH player).
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AdaptiveEngine: PlatformSendSync {
    /// Start feeding the device from `manifest`.
    async fn attach(&self, manifest: &str, content_type: &str) -> Result<()>;

    /// Stop feeding the device. The engine stays usable.
    fn detach(&self) -> Result<()>;

    /// Release every resource. The engine is not used afterwards.
    fn destroy(&self);
}

/// Creates the adaptive engine on first use.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AdaptiveEngineFactory: PlatformSendSync {
    async fn create(&self) -> Result<Arc<dyn AdaptiveEngine>>;
}

// ============================================================================
// Outbound notifications
// ============================================================================

/// User-facing error surface (toast, banner).
pub trait NotificationSink: PlatformSendSync {
    fn notify_error(&self, message: &str);
}

/// Callbacks from the track load controller.
///
/// Only loads that are still current reach these callbacks; superseded
/// results are dropped before notification.
pub trait LoadListener: PlatformSendSync {
    fn on_load_complete(&self, _track_id: i64, _quality: Quality) {}

    /// Called once per logical load, after the retry cascade gave up.
    fn on_load_error(&self, _track_id: i64, _error: &crate::PlaybackError) {}

    /// The catalog has no adaptive manifest for `track_id`. Adaptive playback
    /// should not be retried for it.
    fn on_manifest_unavailable(&self, _track_id: i64) {}
}
