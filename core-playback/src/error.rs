//! # Playback Error Types
//!
//! Error types for track loading, stream resolution and device control.

use crate::model::Quality;
use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback orchestration.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Track object failed validation (missing or non-positive id).
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// Externally-linked track reached the load controller without being
    /// converted first.
    #[error("Track {0} must be converted before it can be loaded")]
    UnconvertedTrack(String),

    /// Quality name could not be parsed.
    #[error("Unknown quality tier: {0}")]
    InvalidQuality(String),

    // ========================================================================
    // Conversion Errors
    // ========================================================================
    /// Externally-linked track could not be matched to a catalog track.
    #[error("Track conversion failed: {0}")]
    ConversionFailed(String),

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// Stream resolution call failed.
    #[error("Stream resolution failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    StreamResolution {
        status: Option<u16>,
        message: String,
    },

    /// The catalog has no adaptive manifest for this track at this tier.
    #[error("Adaptive manifest unavailable for track {track_id} at {quality}")]
    ManifestUnavailable { track_id: i64, quality: Quality },

    /// Manifest resolution failed for any other reason.
    #[error("Manifest resolution failed: {0}")]
    ManifestFailed(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Adaptive streaming engine failed to initialise or attach.
    #[error("Adaptive engine error: {0}")]
    AdaptiveEngine(String),

    /// Audio output device reported an error.
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// The device rejected a play request (autoplay policy, decode error).
    #[error("Playback rejected: {0}")]
    PlayRejected(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Host bridge failure (settings store).
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` for the distinguished "no adaptive manifest" kind.
    pub fn is_manifest_unavailable(&self) -> bool {
        matches!(self, PlaybackError::ManifestUnavailable { .. })
    }

    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::StreamResolution { status, .. } => {
                status.map_or(true, |s| s == 408 || s == 429 || s >= 500)
            }
            PlaybackError::ManifestFailed(_) | PlaybackError::AudioDevice(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::StreamResolution { .. } | PlaybackError::ManifestFailed(_)
        )
    }

    /// Message shown to the user through the notification sink.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::ConversionFailed(_) | PlaybackError::UnconvertedTrack(_) => {
                "This track could not be found in the catalog.".to_string()
            }
            PlaybackError::StreamResolution {
                status: Some(401 | 403),
                ..
            } => "This track is not available for streaming.".to_string(),
            PlaybackError::StreamResolution { .. } | PlaybackError::ManifestFailed(_) => {
                "Could not load the stream. Check your connection and try again.".to_string()
            }
            PlaybackError::PlayRejected(_) | PlaybackError::AudioDevice(_) => {
                "Playback failed on this device.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
