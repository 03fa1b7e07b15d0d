//! # Track Load Controller
//!
//! Resolves a playable stream (adaptive manifest or progressive URL) for a
//! catalog track and applies it only if no newer load has started since.
//!
//! ## Sequencing
//!
//! Every [`begin`](TrackLoadController::begin) mints a sequence number. The
//! resolution steps await the catalog for as long as they need; when the
//! result comes back it is compared with the controller's current sequence
//! under the same lock that guards the applied stream. A mismatch drops the
//! result without touching any state, so a slow response for track A cannot
//! overwrite track B that the user skipped to in the meantime.
//!
//! Retries of the same logical load go through
//! [`resolve`](TrackLoadController::resolve) again with the same
//! [`LoadTicket`], so they keep the sequence number.
//!
//! ## Resolution order
//!
//! ```text
//!  requested quality ──> resolve_target_quality
//!                              │
//!              hi-res? ────────┤
//!                 │ yes        │ no
//!                 ▼            │
//!      manifest cache / resolver
//!        adaptive ──> attach engine ──> apply
//!        fallback-stream ──> cache lossless URL ─┐
//!        unavailable ──> purge + notify ─────────┤
//!        other error ──> log ────────────────────┤
//!                                                ▼
//!                      stream cache / resolver (lossless tier or target)
//!                                   │ proxy rewrite, cache
//!                                   ▼
//!                                 apply
//! ```

mod cache;
mod quality;

pub use cache::{CacheKey, ManifestCache, StreamCache, TrackCache};
pub use quality::{resolve_target_quality, retry_quality};

use crate::adaptive::AdaptiveEngineSlot;
use crate::config::{FallbackPolicy, PlaybackConfig, ProxyConfig};
use crate::error::{PlaybackError, Result};
use crate::model::{CatalogTrack, Quality, StreamMetadata, Track};
use crate::traits::{
    DeviceCapabilities, LoadListener, ManifestPayload, ManifestResolver, StreamInfo,
    StreamResolver,
};
use core_runtime::events::{CoreEvent, EventBus, StreamEvent};
use core_runtime::logging::redact_url;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Request / outcome types
// ============================================================================

/// Input of a load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub track: Track,
    /// Next queue entry. Its cache entries survive pruning.
    pub next: Option<CatalogTrack>,
}

impl LoadRequest {
    pub fn new(track: impl Into<Track>) -> Self {
        Self {
            track: track.into(),
            next: None,
        }
    }

    pub fn with_next(mut self, next: Option<CatalogTrack>) -> Self {
        self.next = next;
        self
    }
}

/// Snapshot taken when a load begins.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    pub sequence: u64,
    pub track: CatalogTrack,
    pub next_track_id: Option<i64>,
}

/// The stream currently applied to playback.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedStream {
    pub track_id: i64,
    /// `None` for adaptive playback, where the engine feeds the device.
    pub url: Option<String>,
    pub quality: Quality,
    pub metadata: StreamMetadata,
    pub adaptive: bool,
}

/// How a resolution ended.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(LoadedStream),
    /// A newer load started; the result was discarded.
    Superseded { sequence: u64 },
    /// Every step failed. `target` is the tier the request resolved to;
    /// `attempted` is the progressive tier actually tried.
    Failed {
        error: PlaybackError,
        target: Quality,
        attempted: Quality,
    },
}

enum AdaptiveStep {
    Applied(LoadedStream),
    Superseded,
    FallThrough,
}

struct LoadState {
    sequence: u64,
    current: Option<LoadedStream>,
}

// ============================================================================
// TrackLoadController
// ============================================================================

pub struct TrackLoadController {
    streams: Arc<dyn StreamResolver>,
    manifests: Arc<dyn ManifestResolver>,
    adaptive: Option<Arc<AdaptiveEngineSlot>>,
    listener: Option<Arc<dyn LoadListener>>,
    event_bus: Option<EventBus>,
    policy: FallbackPolicy,
    proxy: ProxyConfig,
    adaptive_enabled: bool,
    capabilities: DeviceCapabilities,
    requested_quality: RwLock<Quality>,
    state: Mutex<LoadState>,
    stream_cache: Mutex<StreamCache>,
    manifest_cache: Mutex<ManifestCache>,
}

impl TrackLoadController {
    pub fn new(
        streams: Arc<dyn StreamResolver>,
        manifests: Arc<dyn ManifestResolver>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            streams,
            manifests,
            adaptive: None,
            listener: None,
            event_bus: None,
            policy: config.fallback,
            proxy: config.proxy.clone(),
            adaptive_enabled: config.adaptive_enabled,
            capabilities: DeviceCapabilities::default(),
            requested_quality: RwLock::new(Quality::default()),
            state: Mutex::new(LoadState {
                sequence: 0,
                current: None,
            }),
            stream_cache: Mutex::new(StreamCache::new()),
            manifest_cache: Mutex::new(ManifestCache::new()),
        }
    }

    /// Enable adaptive playback through `slot`.
    pub fn with_adaptive_engine(mut self, slot: Arc<AdaptiveEngineSlot>) -> Self {
        self.adaptive = Some(slot);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn LoadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Set event bus for stream diagnostics.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_requested_quality(self, quality: Quality) -> Self {
        *self.requested_quality.write() = quality;
        self
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Latest requested quality. Read at resolution time, not at `begin`.
    pub fn requested_quality(&self) -> Quality {
        *self.requested_quality.read()
    }

    pub fn set_requested_quality(&self, quality: Quality) {
        *self.requested_quality.write() = quality;
    }

    pub fn current_sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    pub fn is_current(&self, sequence: u64) -> bool {
        self.current_sequence() == sequence
    }

    /// The stream applied by the last successful load.
    pub fn current_stream(&self) -> Option<LoadedStream> {
        self.state.lock().current.clone()
    }

    pub fn is_adaptive_active(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .map_or(false, |stream| stream.adaptive)
    }

    pub fn cached_stream(&self, track_id: i64, quality: Quality) -> Option<StreamInfo> {
        self.stream_cache.lock().get(track_id, quality)
    }

    pub fn has_cached_manifest(&self, track_id: i64, quality: Quality) -> bool {
        self.manifest_cache.lock().contains(track_id, quality)
    }

    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.stream_cache.lock().len(), self.manifest_cache.lock().len())
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Validate the request and mint a sequence number.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::UnconvertedTrack`] for externally-linked tracks
    /// - [`PlaybackError::InvalidTrack`] for a non-positive id
    ///
    /// A rejected request leaves the controller untouched.
    pub fn begin(&self, request: &LoadRequest) -> Result<LoadTicket> {
        let track = match &request.track {
            Track::Catalog(track) => track,
            Track::External(track) => {
                return Err(PlaybackError::UnconvertedTrack(track.id.clone()));
            }
        };
        if track.id <= 0 {
            return Err(PlaybackError::InvalidTrack(format!(
                "track id must be positive, got {}",
                track.id
            )));
        }

        let sequence = {
            let mut state = self.state.lock();
            state.sequence += 1;
            state.sequence
        };

        Ok(LoadTicket {
            sequence,
            track: track.clone(),
            next_track_id: request.next.as_ref().map(|next| next.id).filter(|id| *id > 0),
        })
    }

    /// Report that the load for `ticket` gave up after its retries.
    ///
    /// The listener hears about it only while `ticket` is current.
    pub fn fail(&self, ticket: &LoadTicket, error: &PlaybackError) {
        if !self.is_current(ticket.sequence) {
            return;
        }
        if let Some(listener) = &self.listener {
            listener.on_load_error(ticket.track.id, error);
        }
    }

    /// Begin and resolve at the requested quality.
    pub async fn load_track(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let ticket = self.begin(request)?;
        Ok(self.resolve(&ticket, None, true).await)
    }

    /// Resolve `ticket`.
    ///
    /// `quality` overrides the requested quality (retry cascade, fallback).
    /// `allow_adaptive` is `false` once adaptive playback failed for the
    /// track. Failures come back as [`LoadOutcome::Failed`]; nothing is
    /// applied unless `ticket` is still current when the result arrives.
    #[instrument(skip(self, ticket), fields(track_id = ticket.track.id, sequence = ticket.sequence))]
    pub async fn resolve(
        &self,
        ticket: &LoadTicket,
        quality: Option<Quality>,
        allow_adaptive: bool,
    ) -> LoadOutcome {
        let requested = quality.unwrap_or_else(|| self.requested_quality());
        let target =
            resolve_target_quality(requested, &ticket.track, self.capabilities, &self.policy);

        debug!(%requested, %target, "Resolving stream");
        self.emit(StreamEvent::LoadStarted {
            track_id: ticket.track.id.to_string(),
            sequence: ticket.sequence,
            quality: target.to_string(),
        });

        let mut progressive = target;
        if target.is_hi_res() {
            if allow_adaptive && self.adaptive_enabled && self.adaptive.is_some() {
                match self.resolve_adaptive(ticket, target).await {
                    AdaptiveStep::Applied(stream) => return LoadOutcome::Loaded(stream),
                    AdaptiveStep::Superseded => return self.superseded(ticket),
                    AdaptiveStep::FallThrough => {}
                }
            }
            progressive = self.policy.lossless_tier;
        }

        match self.resolve_progressive(ticket.track.id, progressive).await {
            Ok(info) => {
                let stream = LoadedStream {
                    track_id: ticket.track.id,
                    url: Some(info.url),
                    quality: progressive,
                    metadata: info.metadata,
                    adaptive: false,
                };
                match self.apply(ticket, stream) {
                    Some(stream) => LoadOutcome::Loaded(stream),
                    None => self.superseded(ticket),
                }
            }
            Err(error) => {
                if !self.is_current(ticket.sequence) {
                    return self.superseded(ticket);
                }
                warn!(quality = %progressive, error = %error, "Stream resolution failed");
                LoadOutcome::Failed {
                    error,
                    target,
                    attempted: progressive,
                }
            }
        }
    }

    async fn resolve_adaptive(&self, ticket: &LoadTicket, quality: Quality) -> AdaptiveStep {
        let track_id = ticket.track.id;
        let cached = self.manifest_cache.lock().get(track_id, quality);
        let resolution = match cached {
            Some(resolution) => {
                debug!("Manifest cache hit");
                Ok(resolution)
            }
            None => self.manifests.resolve_manifest(track_id, quality).await,
        };

        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(error) if error.is_manifest_unavailable() => {
                self.manifest_cache.lock().remove(track_id, quality);
                if self.is_current(ticket.sequence) {
                    info!("Adaptive manifest unavailable, using progressive stream");
                    if let Some(listener) = &self.listener {
                        listener.on_manifest_unavailable(track_id);
                    }
                    self.emit(StreamEvent::ManifestUnavailable {
                        track_id: track_id.to_string(),
                        quality: quality.to_string(),
                    });
                }
                return AdaptiveStep::FallThrough;
            }
            Err(error) => {
                warn!(error = %error, "Manifest resolution failed, using progressive stream");
                return AdaptiveStep::FallThrough;
            }
        };

        self.manifest_cache
            .lock()
            .insert(track_id, quality, resolution.clone());

        match resolution.payload {
            ManifestPayload::Adaptive {
                manifest,
                content_type,
            } => {
                if !self.is_current(ticket.sequence) {
                    return AdaptiveStep::Superseded;
                }
                if let Err(error) = self.attach(&manifest, &content_type).await {
                    warn!(error = %error, "Adaptive engine attach failed");
                    return AdaptiveStep::FallThrough;
                }
                let stream = LoadedStream {
                    track_id,
                    url: None,
                    quality,
                    metadata: resolution.metadata,
                    adaptive: true,
                };
                match self.apply(ticket, stream) {
                    Some(stream) => AdaptiveStep::Applied(stream),
                    None => AdaptiveStep::Superseded,
                }
            }
            ManifestPayload::FallbackStream { urls, content_type } => {
                if let Some(url) = urls.first() {
                    debug!(%content_type, url = %redact_url(url), "Manifest carried a lossless stream");
                    self.stream_cache.lock().insert(
                        track_id,
                        self.policy.lossless_tier,
                        StreamInfo {
                            url: self.proxy.rewrite(url),
                            metadata: resolution.metadata,
                        },
                    );
                }
                AdaptiveStep::FallThrough
            }
        }
    }

    async fn attach(&self, manifest: &str, content_type: &str) -> Result<()> {
        let slot = self
            .adaptive
            .as_ref()
            .ok_or_else(|| PlaybackError::AdaptiveEngine("no adaptive engine".to_string()))?;
        let engine = slot.acquire().await?;
        engine.attach(manifest, content_type).await
    }

    async fn resolve_progressive(&self, track_id: i64, quality: Quality) -> Result<StreamInfo> {
        let cached = self.stream_cache.lock().get(track_id, quality);
        if let Some(info) = cached {
            debug!(%quality, "Stream cache hit");
            return Ok(info);
        }

        let info = self.streams.resolve_stream(track_id, quality).await?;
        let info = StreamInfo {
            url: self.proxy.rewrite(&info.url),
            metadata: info.metadata,
        };
        debug!(%quality, url = %redact_url(&info.url), "Stream resolved");
        self.stream_cache
            .lock()
            .insert(track_id, quality, info.clone());
        Ok(info)
    }

    /// Apply `stream` if `ticket` is still current. All fields land together.
    fn apply(&self, ticket: &LoadTicket, stream: LoadedStream) -> Option<LoadedStream> {
        let replaced_adaptive = {
            let mut state = self.state.lock();
            if state.sequence != ticket.sequence {
                return None;
            }
            let was_adaptive = state.current.as_ref().map_or(false, |s| s.adaptive);
            state.current = Some(stream.clone());
            was_adaptive && !stream.adaptive
        };

        if replaced_adaptive {
            if let Some(slot) = &self.adaptive {
                slot.detach();
            }
        }

        self.prune(ticket.track.id, ticket.next_track_id);

        info!(quality = %stream.quality, adaptive = stream.adaptive, "Stream applied");
        if let Some(listener) = &self.listener {
            listener.on_load_complete(stream.track_id, stream.quality);
        }
        self.emit(StreamEvent::LoadApplied {
            track_id: stream.track_id.to_string(),
            sequence: ticket.sequence,
            quality: stream.quality.to_string(),
            adaptive: stream.adaptive,
        });
        Some(stream)
    }

    fn superseded(&self, ticket: &LoadTicket) -> LoadOutcome {
        let current_sequence = self.current_sequence();
        debug!(current_sequence, "Discarding stale load result");
        self.emit(StreamEvent::StaleResultDiscarded {
            track_id: ticket.track.id.to_string(),
            sequence: ticket.sequence,
            current_sequence,
        });
        LoadOutcome::Superseded {
            sequence: ticket.sequence,
        }
    }

    fn prune(&self, current: i64, next: Option<i64>) {
        let streams = self.stream_cache.lock().retain_tracks(current, next);
        let manifests = self.manifest_cache.lock().retain_tracks(current, next);
        if streams + manifests > 0 {
            debug!(streams, manifests, "Pruned load caches");
        }
    }

    // ------------------------------------------------------------------------
    // Preload / teardown
    // ------------------------------------------------------------------------

    /// Resolve and cache the adaptive manifest for `next`. Best effort: never
    /// touches the current sequence, and failures are only logged.
    ///
    /// Returns `true` if a manifest for `next` is cached afterwards.
    #[instrument(skip(self, next), fields(track_id = next.id))]
    pub async fn preload(&self, next: &CatalogTrack) -> bool {
        if next.id <= 0 || !self.adaptive_enabled || self.adaptive.is_none() {
            return false;
        }
        let target = resolve_target_quality(
            self.requested_quality(),
            next,
            self.capabilities,
            &self.policy,
        );
        if !target.is_hi_res() {
            return false;
        }
        if self.has_cached_manifest(next.id, target) {
            return true;
        }

        match self.manifests.resolve_manifest(next.id, target).await {
            Ok(resolution) => {
                self.manifest_cache.lock().insert(next.id, target, resolution);
                debug!(quality = %target, "Preloaded manifest");
                self.emit(StreamEvent::Preloaded {
                    track_id: next.id.to_string(),
                    quality: target.to_string(),
                });
                true
            }
            Err(error) => {
                debug!(error = %error, "Preload failed");
                false
            }
        }
    }

    /// Stop using the adaptive engine for the current stream.
    pub fn disable_adaptive(&self) {
        if let Some(slot) = &self.adaptive {
            slot.detach();
        }
        if let Some(stream) = self.state.lock().current.as_mut() {
            stream.adaptive = false;
        }
    }

    /// Invalidate in-flight loads and drop all cached state.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.sequence += 1;
            state.current = None;
        }
        self.stream_cache.lock().clear();
        self.manifest_cache.lock().clear();
        if let Some(slot) = &self.adaptive {
            slot.release();
        }
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Stream(event)).ok();
        }
    }
}

impl std::fmt::Debug for TrackLoadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (streams, manifests) = self.cache_sizes();
        f.debug_struct("TrackLoadController")
            .field("sequence", &self.current_sequence())
            .field("requested_quality", &self.requested_quality())
            .field("cached_streams", &streams)
            .field("cached_manifests", &manifests)
            .finish()
    }
}
