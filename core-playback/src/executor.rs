//! # Side-Effect Executor
//!
//! Turns [`SideEffect`]s into audio-device calls and collaborator requests,
//! and turns their results back into [`PlayerEvent`]s.
//!
//! The executor is the only writer of the audio device. Synchronous effects
//! (set source, pause, seek) run immediately; asynchronous ones (conversion,
//! stream loading, play) come back as [`EffectFuture`]s which the
//! [`Player`](crate::player::Player) polls and feeds back into the machine in
//! completion order.
//!
//! | Effect               | Action                                                  |
//! |----------------------|---------------------------------------------------------|
//! | `convert-track`      | `TrackConverter::convert` → `CONVERSION_*`              |
//! | `load-stream`        | load controller + one retry → `LOAD_*`                  |
//! | `set-audio-source`   | `set_source` + `load`, remembers the attempt            |
//! | `play-audio`         | `play`; a rejection becomes `AUDIO_ERROR`               |
//! | `pause-audio`        | `pause`                                                 |
//! | `seek-audio`         | `set_current_time`                                      |
//! | `show-error`         | notification sink                                       |
//! | `handle-audio-error` | fallback controller; declined → notify + `LOAD_ERROR`   |
//! | `reset-audio`        | unload device, reset load and fallback controllers      |

use crate::config::FallbackPolicy;
use crate::fallback::{FallbackController, FallbackPlan};
use crate::error::PlaybackError;
use crate::loader::{
    retry_quality, LoadOutcome, LoadRequest, LoadTicket, LoadedStream, TrackLoadController,
};
use crate::machine::{MachineState, PlayerEvent, SideEffect};
use crate::model::{AttemptId, CatalogTrack, ExternalTrack, Track};
use crate::traits::{AudioDevice, NotificationSink, TrackConverter};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, StreamEvent};
use core_runtime::logging::redact_url;
use futures::future::{self, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What an effect produced once it finished.
#[derive(Debug)]
pub enum EffectOutcome {
    /// Feed this event back into the machine.
    Event(PlayerEvent),
    /// The fallback controller accepted an audio error.
    Fallback(FallbackPlan),
    Done,
}

#[cfg(not(target_arch = "wasm32"))]
pub type EffectFuture = futures::future::BoxFuture<'static, EffectOutcome>;

#[cfg(target_arch = "wasm32")]
pub type EffectFuture = futures::future::LocalBoxFuture<'static, EffectOutcome>;

#[cfg(not(target_arch = "wasm32"))]
fn boxed<F>(future: F) -> EffectFuture
where
    F: Future<Output = EffectOutcome> + Send + 'static,
{
    future.boxed()
}

#[cfg(target_arch = "wasm32")]
fn boxed<F>(future: F) -> EffectFuture
where
    F: Future<Output = EffectOutcome> + 'static,
{
    future.boxed_local()
}

fn ready(outcome: EffectOutcome) -> EffectFuture {
    boxed(future::ready(outcome))
}

pub struct EffectExecutor {
    device: Arc<dyn AudioDevice>,
    loader: Arc<TrackLoadController>,
    converter: Arc<dyn TrackConverter>,
    notifier: Arc<dyn NotificationSink>,
    fallback: Arc<FallbackController>,
    policy: FallbackPolicy,
    event_bus: Option<EventBus>,
    /// Attempt that set the device's current source.
    source_attempt: Mutex<Option<AttemptId>>,
}

impl EffectExecutor {
    pub fn new(
        device: Arc<dyn AudioDevice>,
        loader: Arc<TrackLoadController>,
        converter: Arc<dyn TrackConverter>,
        notifier: Arc<dyn NotificationSink>,
        fallback: Arc<FallbackController>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            device,
            loader,
            converter,
            notifier,
            fallback,
            policy,
            event_bus: None,
            source_attempt: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn loader(&self) -> &Arc<TrackLoadController> {
        &self.loader
    }

    pub fn source_attempt(&self) -> Option<AttemptId> {
        *self.source_attempt.lock()
    }

    /// Tag an untagged device error with the attempt that set the source.
    pub fn tag_device_error(&self, event: PlayerEvent) -> PlayerEvent {
        match event {
            PlayerEvent::AudioError {
                error,
                attempt: None,
            } => PlayerEvent::AudioError {
                error,
                attempt: self.source_attempt(),
            },
            other => other,
        }
    }

    /// Execute a transition's effects in order.
    ///
    /// When the batch contains `handle-audio-error`, `show-error` is held
    /// back: the notification is only shown if the fallback controller
    /// declines.
    pub fn execute_all(
        self: &Arc<Self>,
        effects: Vec<SideEffect>,
        machine: &MachineState,
    ) -> Vec<EffectFuture> {
        let recovering = effects
            .iter()
            .any(|effect| matches!(effect, SideEffect::HandleAudioError { .. }));
        effects
            .into_iter()
            .filter(|effect| !(recovering && matches!(effect, SideEffect::ShowError { .. })))
            .filter_map(|effect| self.execute(effect, machine))
            .collect()
    }

    /// Execute one effect. `None` means it completed synchronously with
    /// nothing to report.
    pub fn execute(
        self: &Arc<Self>,
        effect: SideEffect,
        machine: &MachineState,
    ) -> Option<EffectFuture> {
        debug!(effect = effect.name(), "Executing effect");
        match effect {
            SideEffect::ConvertTrack { track, attempt } => Some(self.convert(track, attempt)),

            SideEffect::LoadStream {
                track,
                next,
                attempt,
                ..
            } => {
                self.fallback.track_started(track.id);
                let request = LoadRequest::new(track.clone()).with_next(next);
                let ticket = match self.loader.begin(&request) {
                    Ok(ticket) => ticket,
                    Err(error) => {
                        warn!(track_id = track.id, error = %error, "Load rejected");
                        return Some(ready(load_error(&error, attempt)));
                    }
                };
                let this = Arc::clone(self);
                Some(boxed(async move { this.load(ticket, attempt).await }))
            }

            SideEffect::SetAudioSource { url, attempt } => {
                *self.source_attempt.lock() = Some(attempt);
                debug!(url = %redact_url(&url), %attempt, "Setting audio source");
                let applied = self.device.set_source(&url).and_then(|_| self.device.load());
                match applied {
                    Ok(()) => None,
                    Err(error) => Some(ready(EffectOutcome::Event(PlayerEvent::AudioError {
                        error: error.to_string(),
                        attempt: Some(attempt),
                    }))),
                }
            }

            SideEffect::PlayAudio { attempt } => {
                let device = Arc::clone(&self.device);
                Some(boxed(async move {
                    match device.play().await {
                        Ok(()) => EffectOutcome::Done,
                        Err(error) => {
                            warn!(error = %error, %attempt, "Play rejected");
                            EffectOutcome::Event(PlayerEvent::AudioError {
                                error: error.to_string(),
                                attempt: Some(attempt),
                            })
                        }
                    }
                }))
            }

            SideEffect::PauseAudio => {
                if let Err(error) = self.device.pause() {
                    warn!(error = %error, "Pause failed");
                }
                None
            }

            SideEffect::SeekAudio { position } => {
                if let Err(error) = self.device.set_current_time(position) {
                    warn!(error = %error, position, "Seek failed");
                }
                None
            }

            SideEffect::ShowError { message } => {
                self.show_error(machine, &message);
                None
            }

            SideEffect::HandleAudioError { error, attempt } => {
                Some(ready(self.handle_audio_error(machine, error, attempt)))
            }

            SideEffect::ResetAudio => {
                if let Err(error) = self.device.pause().and_then(|_| self.device.unload()) {
                    warn!(error = %error, "Device reset failed");
                }
                *self.source_attempt.lock() = None;
                self.loader.reset();
                self.fallback.reset();
                None
            }
        }
    }

    fn convert(&self, track: ExternalTrack, attempt: AttemptId) -> EffectFuture {
        let converter = Arc::clone(&self.converter);
        boxed(async move {
            match converter.convert(&track).await {
                Ok(converted) => {
                    info!(external_id = %track.id, track_id = converted.id, "Track converted");
                    EffectOutcome::Event(PlayerEvent::ConversionComplete {
                        track: converted,
                        attempt: Some(attempt),
                    })
                }
                Err(error) => {
                    warn!(external_id = %track.id, error = %error, "Track conversion failed");
                    EffectOutcome::Event(PlayerEvent::ConversionError {
                        error: error.user_message(),
                        attempt: Some(attempt),
                    })
                }
            }
        })
    }

    /// Resolve `ticket`, retrying once at the tier the original target maps
    /// to. The retry reuses the ticket, so it stays the same logical load.
    async fn load(&self, ticket: LoadTicket, attempt: AttemptId) -> EffectOutcome {
        let track_id = ticket.track.id;
        let allow_adaptive = self.fallback.adaptive_allowed(track_id);
        let (error, target, attempted) =
            match self.loader.resolve(&ticket, None, allow_adaptive).await {
                LoadOutcome::Loaded(stream) => return load_complete(stream, attempt),
                LoadOutcome::Superseded { .. } => return EffectOutcome::Done,
                LoadOutcome::Failed {
                    error,
                    target,
                    attempted,
                } => (error, target, attempted),
            };

        let Some(quality) = retry_quality(target, &self.policy) else {
            return self.give_up(&ticket, &error, attempt);
        };
        info!(track_id, %target, from = %attempted, to = %quality, "Retrying load");
        self.emit(StreamEvent::FallbackTriggered {
            track_id: track_id.to_string(),
            from: Some(attempted.to_string()),
            to: quality.to_string(),
            reason: error.to_string(),
        });

        match self.loader.resolve(&ticket, Some(quality), false).await {
            LoadOutcome::Loaded(stream) => load_complete(stream, attempt),
            LoadOutcome::Superseded { .. } => EffectOutcome::Done,
            LoadOutcome::Failed { error, .. } => self.give_up(&ticket, &error, attempt),
        }
    }

    fn give_up(
        &self,
        ticket: &LoadTicket,
        error: &PlaybackError,
        attempt: AttemptId,
    ) -> EffectOutcome {
        self.loader.fail(ticket, error);
        load_error(error, attempt)
    }

    /// Reload `plan.track` at `plan.to` for `attempt`. Not retried further.
    ///
    /// The ticket is minted here, so any load still in flight is superseded
    /// from this point on.
    pub fn fallback_load(
        self: &Arc<Self>,
        plan: FallbackPlan,
        next: Option<CatalogTrack>,
        attempt: AttemptId,
    ) -> EffectFuture {
        if plan.disables_adaptive() {
            self.loader.disable_adaptive();
        }
        let request = LoadRequest::new(plan.track.clone()).with_next(next);
        let ticket = match self.loader.begin(&request) {
            Ok(ticket) => ticket,
            Err(error) => return ready(load_error(&error, attempt)),
        };
        let this = Arc::clone(self);
        boxed(async move {
            match this.loader.resolve(&ticket, Some(plan.to), false).await {
                LoadOutcome::Loaded(stream) => load_complete(stream, attempt),
                LoadOutcome::Superseded { .. } => EffectOutcome::Done,
                LoadOutcome::Failed { error, .. } => this.give_up(&ticket, &error, attempt),
            }
        })
    }

    /// Best-effort manifest preload for the next queue entry.
    pub fn preload(self: &Arc<Self>, next: CatalogTrack) -> EffectFuture {
        let loader = Arc::clone(&self.loader);
        boxed(async move {
            loader.preload(&next).await;
            EffectOutcome::Done
        })
    }

    fn handle_audio_error(
        &self,
        machine: &MachineState,
        error: String,
        attempt: AttemptId,
    ) -> EffectOutcome {
        let track = machine
            .context
            .current_track
            .as_ref()
            .and_then(Track::as_catalog);
        let stream = self.loader.current_stream();
        let plan = track
            .and_then(|track| self.fallback.on_audio_error(track, stream.as_ref(), &error));

        match plan {
            Some(plan) => {
                self.emit(StreamEvent::FallbackTriggered {
                    track_id: plan.track.id.to_string(),
                    from: plan.from.map(|quality| quality.to_string()),
                    to: plan.to.to_string(),
                    reason: plan.reason.clone(),
                });
                EffectOutcome::Fallback(plan)
            }
            None => {
                self.show_error(machine, &error);
                EffectOutcome::Event(PlayerEvent::LoadError {
                    error,
                    attempt: Some(attempt),
                })
            }
        }
    }

    fn show_error(&self, machine: &MachineState, message: &str) {
        warn!(error = message, "Showing playback error");
        self.notifier.notify_error(message);
        self.emit_playback(PlaybackEvent::Error {
            track_id: machine
                .context
                .current_track
                .as_ref()
                .map(|track| track.key().to_string()),
            message: message.to_string(),
            recoverable: machine.context.current_track.is_some(),
        });
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Stream(event)).ok();
        }
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playback(event)).ok();
        }
    }
}

fn load_complete(stream: LoadedStream, attempt: AttemptId) -> EffectOutcome {
    EffectOutcome::Event(PlayerEvent::LoadComplete {
        stream_url: stream.url,
        quality: stream.quality,
        metadata: stream.metadata,
        attempt: Some(attempt),
    })
}

fn load_error(error: &PlaybackError, attempt: AttemptId) -> EffectOutcome {
    EffectOutcome::Event(PlayerEvent::LoadError {
        error: error.user_message(),
        attempt: Some(attempt),
    })
}

impl std::fmt::Debug for EffectExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectExecutor")
            .field("source_attempt", &self.source_attempt())
            .field("loader", &self.loader)
            .finish()
    }
}
