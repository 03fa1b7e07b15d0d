//! # Quality, Attempt and Track Model
//!
//! Value types shared by the state machine, the load controller and the
//! fallback controller. None of them carry behaviour beyond ordering and
//! identity.

use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Quality
// ============================================================================

/// Streaming quality tier.
///
/// Tiers are ordered: `Low < High < Lossless < HiResLossless`. Requested and
/// effective quality are both expressed with this type; the playback context
/// keeps them in separate fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Low,
    High,
    Lossless,
    HiResLossless,
}

impl Quality {
    /// Catalog wire name (`"HI_RES_LOSSLESS"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "LOW",
            Quality::High => "HIGH",
            Quality::Lossless => "LOSSLESS",
            Quality::HiResLossless => "HI_RES_LOSSLESS",
        }
    }

    /// Returns `true` for the hi-res tier, which is delivered through an
    /// adaptive manifest when one exists.
    pub fn is_hi_res(&self) -> bool {
        matches!(self, Quality::HiResLossless)
    }

    pub fn is_lossless(&self) -> bool {
        *self >= Quality::Lossless
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Lossless
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Quality::Low),
            "HIGH" => Ok(Quality::High),
            "LOSSLESS" => Ok(Quality::Lossless),
            "HI_RES_LOSSLESS" | "HI_RES" => Ok(Quality::HiResLossless),
            _ => Err(PlaybackError::InvalidQuality(s.to_string())),
        }
    }
}

// ============================================================================
// Attempt
// ============================================================================

/// Token identifying one logical load.
///
/// A new token is minted whenever a load begins (new track, quality change,
/// retry, post-playback fallback) and when the machine is reset. Tokens only
/// ever grow, so a token is never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId(u64);

impl AttemptId {
    /// Token held by a freshly created machine.
    pub const INITIAL: AttemptId = AttemptId(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> AttemptId {
        AttemptId(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

// ============================================================================
// Stream metadata
// ============================================================================

/// Per-stream audio metadata reported by the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub replay_gain: Option<f64>,
}

// ============================================================================
// Tracks
// ============================================================================

/// Identity used to decide whether two tracks are "the same track".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKey {
    Catalog(i64),
    External(String),
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Catalog(id) => write!(f, "{}", id),
            TrackKey::External(id) => write!(f, "ext:{}", id),
        }
    }
}

/// A track that can be streamed directly from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: i64,
    pub title: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Best tier the catalog lists for this track.
    #[serde(default)]
    pub audio_quality: Option<Quality>,
    /// Catalog media tags (`"HIRES_LOSSLESS"`, `"LOSSLESS"`, ...).
    #[serde(default)]
    pub media_tags: Vec<String>,
}

impl CatalogTrack {
    pub fn new(id: i64, title: impl Into<String>, duration: f64) -> Self {
        Self {
            id,
            title: title.into(),
            duration,
            audio_quality: None,
            media_tags: Vec::new(),
        }
    }

    pub fn with_audio_quality(mut self, quality: Quality) -> Self {
        self.audio_quality = Some(quality);
        self
    }

    pub fn with_media_tag(mut self, tag: impl Into<String>) -> Self {
        self.media_tags.push(tag.into());
        self
    }

    /// Highest tier this track can be streamed at, derived from its metadata.
    ///
    /// A `HIRES_LOSSLESS` media tag wins over `audio_quality`. `None` means
    /// the catalog did not say, and the requested tier is used as-is.
    pub fn best_available_quality(&self) -> Option<Quality> {
        let tagged = self
            .media_tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case("HIRES_LOSSLESS"));
        if tagged {
            return Some(Quality::HiResLossless);
        }
        self.audio_quality
    }
}

/// A track linked from another service. It has to be converted to a
/// [`CatalogTrack`] before a stream can be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Duration in seconds.
    pub duration: f64,
    pub source_url: String,
}

/// A queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Track {
    Catalog(CatalogTrack),
    External(ExternalTrack),
}

impl Track {
    pub fn key(&self) -> TrackKey {
        match self {
            Track::Catalog(track) => TrackKey::Catalog(track.id),
            Track::External(track) => TrackKey::External(track.id.clone()),
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Track::Catalog(track) => track.duration,
            Track::External(track) => track.duration,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Track::Catalog(track) => &track.title,
            Track::External(track) => &track.title,
        }
    }

    pub fn as_catalog(&self) -> Option<&CatalogTrack> {
        match self {
            Track::Catalog(track) => Some(track),
            Track::External(_) => None,
        }
    }

    pub fn needs_conversion(&self) -> bool {
        matches!(self, Track::External(_))
    }
}

impl From<CatalogTrack> for Track {
    fn from(track: CatalogTrack) -> Self {
        Track::Catalog(track)
    }
}

impl From<ExternalTrack> for Track {
    fn from(track: ExternalTrack) -> Self {
        Track::External(track)
    }
}
