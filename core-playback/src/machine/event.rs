//! Machine input events and side effects.

use crate::model::{AttemptId, CatalogTrack, ExternalTrack, Quality, StreamMetadata, Track};
use serde::{Deserialize, Serialize};

/// Everything the machine reacts to: UI intents, asynchronous completions and
/// device notifications.
///
/// Completion events carry the attempt they were started for. `None` means
/// "untagged" and is always accepted; a tag that differs from the current
/// attempt makes the event inert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerEvent {
    // ---- intents ------------------------------------------------------------
    LoadTrack {
        track: Track,
        #[serde(default)]
        auto_play: bool,
    },
    SetQueue {
        queue: Vec<Track>,
        index: Option<usize>,
    },
    Play,
    Pause,
    Seek {
        position: f64,
    },
    ChangeQuality {
        quality: Quality,
    },
    FallbackRequested {
        quality: Quality,
        reason: String,
    },
    Reset,

    // ---- asynchronous completions -------------------------------------------
    ConversionComplete {
        track: CatalogTrack,
        attempt: Option<AttemptId>,
    },
    ConversionError {
        error: String,
        attempt: Option<AttemptId>,
    },
    LoadComplete {
        stream_url: Option<String>,
        quality: Quality,
        #[serde(default)]
        metadata: StreamMetadata,
        attempt: Option<AttemptId>,
    },
    LoadError {
        error: String,
        attempt: Option<AttemptId>,
    },

    // ---- device notifications -----------------------------------------------
    AudioReady,
    AudioPlaying,
    AudioPaused,
    AudioWaiting,
    AudioError {
        error: String,
        attempt: Option<AttemptId>,
    },
    TrackEnd,

    // ---- value updates ------------------------------------------------------
    TimeUpdate {
        time: f64,
    },
    DurationUpdate {
        duration: f64,
    },
    VolumeUpdate {
        volume: f64,
    },
    MuteUpdate {
        muted: bool,
    },
    SampleRateUpdate {
        sample_rate: Option<u32>,
    },
    BitDepthUpdate {
        bit_depth: Option<u8>,
    },
    ReplayGainUpdate {
        replay_gain: Option<f64>,
    },
}

impl PlayerEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::LoadTrack { .. } => "LOAD_TRACK",
            PlayerEvent::SetQueue { .. } => "SET_QUEUE",
            PlayerEvent::Play => "PLAY",
            PlayerEvent::Pause => "PAUSE",
            PlayerEvent::Seek { .. } => "SEEK",
            PlayerEvent::ChangeQuality { .. } => "CHANGE_QUALITY",
            PlayerEvent::FallbackRequested { .. } => "FALLBACK_REQUESTED",
            PlayerEvent::Reset => "RESET",
            PlayerEvent::ConversionComplete { .. } => "CONVERSION_COMPLETE",
            PlayerEvent::ConversionError { .. } => "CONVERSION_ERROR",
            PlayerEvent::LoadComplete { .. } => "LOAD_COMPLETE",
            PlayerEvent::LoadError { .. } => "LOAD_ERROR",
            PlayerEvent::AudioReady => "AUDIO_READY",
            PlayerEvent::AudioPlaying => "AUDIO_PLAYING",
            PlayerEvent::AudioPaused => "AUDIO_PAUSED",
            PlayerEvent::AudioWaiting => "AUDIO_WAITING",
            PlayerEvent::AudioError { .. } => "AUDIO_ERROR",
            PlayerEvent::TrackEnd => "TRACK_END",
            PlayerEvent::TimeUpdate { .. } => "TIME_UPDATE",
            PlayerEvent::DurationUpdate { .. } => "DURATION_UPDATE",
            PlayerEvent::VolumeUpdate { .. } => "VOLUME_UPDATE",
            PlayerEvent::MuteUpdate { .. } => "MUTE_UPDATE",
            PlayerEvent::SampleRateUpdate { .. } => "SAMPLE_RATE_UPDATE",
            PlayerEvent::BitDepthUpdate { .. } => "BIT_DEPTH_UPDATE",
            PlayerEvent::ReplayGainUpdate { .. } => "REPLAY_GAIN_UPDATE",
        }
    }

    /// Attempt tag carried by completion events.
    pub fn attempt(&self) -> Option<AttemptId> {
        match self {
            PlayerEvent::ConversionComplete { attempt, .. }
            | PlayerEvent::ConversionError { attempt, .. }
            | PlayerEvent::LoadComplete { attempt, .. }
            | PlayerEvent::LoadError { attempt, .. }
            | PlayerEvent::AudioError { attempt, .. } => *attempt,
            _ => None,
        }
    }

    /// High-frequency events that are not worth a log line per dispatch.
    pub(crate) fn is_chatty(&self) -> bool {
        matches!(
            self,
            PlayerEvent::TimeUpdate { .. } | PlayerEvent::VolumeUpdate { .. }
        )
    }
}

/// Declarative I/O requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    ConvertTrack {
        track: ExternalTrack,
        attempt: AttemptId,
    },
    LoadStream {
        track: CatalogTrack,
        /// Requested quality when the load was started. The load controller
        /// re-reads the latest preference before resolving.
        quality: Quality,
        /// Next catalog track in the queue, kept in the caches.
        next: Option<CatalogTrack>,
        attempt: AttemptId,
        load_request_id: u64,
    },
    SetAudioSource {
        url: String,
        attempt: AttemptId,
    },
    PlayAudio {
        attempt: AttemptId,
    },
    PauseAudio,
    SeekAudio {
        position: f64,
    },
    ShowError {
        message: String,
    },
    HandleAudioError {
        error: String,
        attempt: AttemptId,
    },
    ResetAudio,
}

impl SideEffect {
    pub fn name(&self) -> &'static str {
        match self {
            SideEffect::ConvertTrack { .. } => "convert-track",
            SideEffect::LoadStream { .. } => "load-stream",
            SideEffect::SetAudioSource { .. } => "set-audio-source",
            SideEffect::PlayAudio { .. } => "play-audio",
            SideEffect::PauseAudio => "pause-audio",
            SideEffect::SeekAudio { .. } => "seek-audio",
            SideEffect::ShowError { .. } => "show-error",
            SideEffect::HandleAudioError { .. } => "handle-audio-error",
            SideEffect::ResetAudio => "reset-audio",
        }
    }
}
