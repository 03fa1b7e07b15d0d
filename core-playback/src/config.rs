//! # Playback Configuration
//!
//! Tunables for the load controller, the fallback ladder and the player loop.

use crate::error::{PlaybackError, Result};
use crate::model::Quality;
use serde::{Deserialize, Serialize};

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Downgrade ladder used by the retry cascade and the fallback controller.
    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Remaining seconds of the current track below which the next queued
    /// track's manifest is preloaded.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_preload_threshold")]
    pub preload_threshold_secs: f64,

    /// Optional proxy that stream URLs are rewritten through.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Whether hi-res requests may use adaptive (manifest) playback.
    ///
    /// Default: true.
    #[serde(default = "default_true")]
    pub adaptive_enabled: bool,

    /// Advance to the next queue entry when a track ends.
    ///
    /// Default: true.
    #[serde(default = "default_true")]
    pub auto_advance: bool,

    /// Bound of the player command channel.
    ///
    /// Default: 64.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            preload_threshold_secs: default_preload_threshold(),
            proxy: ProxyConfig::default(),
            adaptive_enabled: default_true(),
            auto_advance: default_true(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl PlaybackConfig {
    /// Configuration for metered connections.
    ///
    /// - No adaptive playback
    /// - Falls back to `Low` instead of `High`
    /// - Shorter preload window
    pub fn data_saver() -> Self {
        Self {
            fallback: FallbackPolicy {
                lossless_tier: Quality::Lossless,
                streaming_tier: Quality::Low,
            },
            preload_threshold_secs: 5.0,
            adaptive_enabled: false,
            ..Default::default()
        }
    }

    /// Route every stream through `base_url`.
    pub fn with_proxy(mut self, base_url: impl Into<String>) -> Self {
        self.proxy = ProxyConfig {
            enabled: true,
            base_url: Some(base_url.into()),
        };
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.fallback.streaming_tier > self.fallback.lossless_tier {
            return Err(PlaybackError::Config(
                "fallback.streaming_tier cannot exceed fallback.lossless_tier".to_string(),
            ));
        }

        if self.fallback.lossless_tier.is_hi_res() {
            return Err(PlaybackError::Config(
                "fallback.lossless_tier must be below the hi-res tier".to_string(),
            ));
        }

        if !(self.preload_threshold_secs > 0.0) || !self.preload_threshold_secs.is_finite() {
            return Err(PlaybackError::Config(
                "preload_threshold_secs must be a positive number".to_string(),
            ));
        }

        if self.proxy.enabled
            && self
                .proxy
                .base_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(PlaybackError::Config(
                "proxy.base_url is required when the proxy is enabled".to_string(),
            ));
        }

        if self.command_buffer == 0 {
            return Err(PlaybackError::Config(
                "command_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Bounded downgrade ladder: hi-res → `lossless_tier` → `streaming_tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// First step down from hi-res. Default: `Lossless`.
    #[serde(default = "default_lossless_tier")]
    pub lossless_tier: Quality,
    /// Last automatic step. Nothing below it is tried. Default: `High`.
    #[serde(default = "default_streaming_tier")]
    pub streaming_tier: Quality,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            lossless_tier: default_lossless_tier(),
            streaming_tier: default_streaming_tier(),
        }
    }
}

/// Stream URL proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Prefix the percent-encoded upstream URL is appended to, e.g.
    /// `https://proxy.example/stream?url=`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProxyConfig {
    /// Rewrite `url` through the proxy when enabled.
    ///
    /// URLs that already point at the proxy are returned unchanged.
    pub fn rewrite(&self, url: &str) -> String {
        match self.base_url.as_deref() {
            Some(base) if self.enabled && !base.is_empty() => {
                if url.starts_with(base) {
                    url.to_string()
                } else {
                    format!("{}{}", base, urlencoding::encode(url))
                }
            }
            _ => url.to_string(),
        }
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_preload_threshold() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_command_buffer() -> usize {
    64
}

fn default_lossless_tier() -> Quality {
    Quality::Lossless
}

fn default_streaming_tier() -> Quality {
    Quality::High
}
