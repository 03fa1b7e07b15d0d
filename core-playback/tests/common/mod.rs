//! Hand-written collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use core_playback::traits::{
    AdaptiveEngine, AdaptiveEngineFactory, AudioDevice, DeviceCapabilities, ManifestPayload,
    ManifestResolution, ManifestResolver, NotificationSink, StreamInfo, StreamResolver,
    TrackConverter,
};
use core_playback::{CatalogTrack, ExternalTrack, PlaybackError, Quality, Result, StreamMetadata};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone)]
pub enum StreamScript {
    Url(String),
    Fail(Option<u16>),
}

#[derive(Debug, Clone)]
pub enum ManifestScript {
    Adaptive,
    FallbackStream(String),
    Unavailable,
    Fail,
}

/// Scripted stream and manifest resolver.
///
/// Unscripted streams resolve to `https://cdn.test/{id}/{QUALITY}.flac`;
/// unscripted manifests are unavailable.
#[derive(Default)]
pub struct ScriptedCatalog {
    streams: Mutex<HashMap<(i64, Quality), StreamScript>>,
    manifests: Mutex<HashMap<(i64, Quality), ManifestScript>>,
    gates: Mutex<HashMap<i64, oneshot::Receiver<()>>>,
    stream_calls: Mutex<Vec<(i64, Quality)>>,
    manifest_calls: Mutex<Vec<(i64, Quality)>>,
}

impl ScriptedCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stream(&self, track_id: i64, quality: Quality, script: StreamScript) {
        self.streams.lock().insert((track_id, quality), script);
    }

    pub fn manifest(&self, track_id: i64, quality: Quality, script: ManifestScript) {
        self.manifests.lock().insert((track_id, quality), script);
    }

    /// Hold the next resolution for `track_id` until the returned sender fires.
    pub fn gate(&self, track_id: i64) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(track_id, rx);
        tx
    }

    pub fn stream_calls(&self) -> Vec<(i64, Quality)> {
        self.stream_calls.lock().clone()
    }

    pub fn manifest_calls(&self) -> Vec<(i64, Quality)> {
        self.manifest_calls.lock().clone()
    }

    async fn wait_gate(&self, track_id: i64) {
        let gate = self.gates.lock().remove(&track_id);
        if let Some(gate) = gate {
            gate.await.ok();
        }
    }
}

pub fn default_url(track_id: i64, quality: Quality) -> String {
    format!("https://cdn.test/{}/{}.flac", track_id, quality)
}

#[async_trait]
impl StreamResolver for ScriptedCatalog {
    async fn resolve_stream(&self, track_id: i64, quality: Quality) -> Result<StreamInfo> {
        self.stream_calls.lock().push((track_id, quality));
        self.wait_gate(track_id).await;
        let script = self.streams.lock().get(&(track_id, quality)).cloned();
        match script.unwrap_or_else(|| StreamScript::Url(default_url(track_id, quality))) {
            StreamScript::Url(url) => Ok(StreamInfo {
                url,
                metadata: StreamMetadata {
                    sample_rate: Some(44_100),
                    bit_depth: Some(16),
                    replay_gain: Some(-6.5),
                },
            }),
            StreamScript::Fail(status) => Err(PlaybackError::StreamResolution {
                status,
                message: format!("no stream for {} at {}", track_id, quality),
            }),
        }
    }
}

#[async_trait]
impl ManifestResolver for ScriptedCatalog {
    async fn resolve_manifest(&self, track_id: i64, quality: Quality) -> Result<ManifestResolution> {
        self.manifest_calls.lock().push((track_id, quality));
        self.wait_gate(track_id).await;
        let script = self.manifests.lock().get(&(track_id, quality)).cloned();
        let metadata = StreamMetadata {
            sample_rate: Some(192_000),
            bit_depth: Some(24),
            replay_gain: None,
        };
        match script.unwrap_or(ManifestScript::Unavailable) {
            ManifestScript::Adaptive => Ok(ManifestResolution {
                payload: ManifestPayload::Adaptive {
                    manifest: format!("<MPD track=\"{}\"/>", track_id),
                    content_type: "application/dash+xml".to_string(),
                },
                metadata,
            }),
            ManifestScript::FallbackStream(url) => Ok(ManifestResolution {
                payload: ManifestPayload::FallbackStream {
                    urls: vec![url],
                    content_type: "audio/flac".to_string(),
                },
                metadata,
            }),
            ManifestScript::Unavailable => Err(PlaybackError::ManifestUnavailable { track_id, quality }),
            ManifestScript::Fail => Err(PlaybackError::ManifestFailed("timeout".to_string())),
        }
    }
}

// ============================================================================
// Converter
// ============================================================================

#[derive(Default)]
pub struct MapConverter {
    matches: Mutex<HashMap<String, CatalogTrack>>,
}

impl MapConverter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_match(self: Arc<Self>, external_id: &str, track: CatalogTrack) -> Arc<Self> {
        self.matches.lock().insert(external_id.to_string(), track);
        self
    }
}

#[async_trait]
impl TrackConverter for MapConverter {
    async fn convert(&self, track: &ExternalTrack) -> Result<CatalogTrack> {
        self.matches
            .lock()
            .get(&track.id)
            .cloned()
            .ok_or_else(|| PlaybackError::ConversionFailed(format!("no match for {}", track.id)))
    }
}

// ============================================================================
// Audio device
// ============================================================================

#[derive(Default)]
pub struct RecordingDevice {
    calls: Mutex<Vec<String>>,
    reject_play: AtomicBool,
    limited: AtomicBool,
    position: Mutex<f64>,
}

impl RecordingDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A device that cannot decode lossless audio.
    pub fn limited() -> Arc<Self> {
        let device = Self::default();
        device.limited.store(true, Ordering::SeqCst);
        Arc::new(device)
    }

    pub fn reject_play(&self, reject: bool) {
        self.reject_play.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn sources(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("set_source:").map(str::to_string))
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl AudioDevice for RecordingDevice {
    fn set_source(&self, url: &str) -> Result<()> {
        self.record(format!("set_source:{}", url));
        Ok(())
    }

    fn load(&self) -> Result<()> {
        self.record("load");
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.record("play");
        if self.reject_play.load(Ordering::SeqCst) {
            return Err(PlaybackError::PlayRejected("autoplay blocked".to_string()));
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.record("pause");
        Ok(())
    }

    fn current_time(&self) -> f64 {
        *self.position.lock()
    }

    fn set_current_time(&self, seconds: f64) -> Result<()> {
        self.record(format!("seek:{}", seconds));
        *self.position.lock() = seconds;
        Ok(())
    }

    fn unload(&self) -> Result<()> {
        self.record("unload");
        Ok(())
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            can_play_lossless: !self.limited.load(Ordering::SeqCst),
        }
    }
}

// ============================================================================
// Adaptive engine
// ============================================================================

#[derive(Default)]
pub struct EngineLog {
    pub created: AtomicUsize,
    pub attached: Mutex<Vec<String>>,
    pub detached: AtomicUsize,
    pub destroyed: AtomicUsize,
}

pub struct TestEngine {
    log: Arc<EngineLog>,
}

#[async_trait]
impl AdaptiveEngine for TestEngine {
    async fn attach(&self, manifest: &str, _content_type: &str) -> Result<()> {
        self.log.attached.lock().push(manifest.to_string());
        Ok(())
    }

    fn detach(&self) -> Result<()> {
        self.log.detached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) {
        self.log.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct TestEngineFactory {
    pub log: Arc<EngineLog>,
}

impl TestEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl AdaptiveEngineFactory for TestEngineFactory {
    async fn create(&self) -> Result<Arc<dyn AdaptiveEngine>> {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TestEngine {
            log: Arc::clone(&self.log),
        }))
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn catalog_track(id: i64) -> CatalogTrack {
    CatalogTrack::new(id, format!("Track {}", id), 200.0).with_audio_quality(Quality::Lossless)
}

pub fn hires_track(id: i64) -> CatalogTrack {
    CatalogTrack::new(id, format!("Hi-Res {}", id), 200.0).with_media_tag("HIRES_LOSSLESS")
}

pub fn external_track(id: &str) -> ExternalTrack {
    ExternalTrack {
        id: id.to_string(),
        title: format!("External {}", id),
        artist: "Someone".to_string(),
        duration: 180.0,
        source_url: format!("https://elsewhere.test/{}", id),
    }
}
