//! # Player
//!
//! Wires the pure machine to the executor. The player owns the current
//! [`MachineState`]; everything else talks to it through a [`PlayerHandle`].
//!
//! ```text
//!  PlayerHandle ──commands──┐
//!                           ▼
//!                    dispatch(event) ──> MachineState::step
//!                           ▲                    │ effects
//!                           │                    ▼
//!                 completions ◄──────── EffectExecutor
//! ```
//!
//! Completions are fed back in the order they finish. Results that belong
//! to an older attempt are discarded by the machine itself.

use crate::adaptive::AdaptiveEngineSlot;
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::executor::{EffectExecutor, EffectFuture, EffectOutcome};
use crate::fallback::{FallbackClass, FallbackController, FallbackPlan};
use crate::loader::TrackLoadController;
use crate::machine::{MachineState, PlaybackState, PlayerEvent, SideEffect};
use crate::model::{CatalogTrack, Quality, Track};
use crate::preferences::QualityPreferences;
use crate::traits::{
    AdaptiveEngineFactory, AudioDevice, ManifestResolver, NotificationSink, StreamResolver,
    TrackConverter,
};
use bridge_traits::storage::SettingsStore;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use futures::channel::mpsc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Host collaborators the player drives.
pub struct PlayerDeps {
    pub streams: Arc<dyn StreamResolver>,
    pub manifests: Arc<dyn ManifestResolver>,
    pub converter: Arc<dyn TrackConverter>,
    pub device: Arc<dyn AudioDevice>,
    pub notifier: Arc<dyn NotificationSink>,
    /// Enables adaptive hi-res playback when present.
    pub adaptive: Option<Arc<dyn AdaptiveEngineFactory>>,
    /// Persists the requested quality when present.
    pub settings: Option<Arc<dyn SettingsStore>>,
    pub event_bus: Option<EventBus>,
}

/// Cloneable sender side of a running [`Player`].
#[derive(Clone, Debug)]
pub struct PlayerHandle {
    sender: mpsc::Sender<PlayerEvent>,
}

impl PlayerHandle {
    /// Queue an event, waiting for buffer space.
    pub async fn send(&self, event: PlayerEvent) -> Result<()> {
        let mut sender = self.sender.clone();
        sender
            .send(event)
            .await
            .map_err(|_| PlaybackError::Internal("player stopped".to_string()))
    }

    /// Queue an event without waiting. Fails when the buffer is full.
    pub fn try_send(&self, event: PlayerEvent) -> Result<()> {
        self.sender.clone().try_send(event).map_err(|e| {
            if e.is_full() {
                PlaybackError::Internal("player command buffer full".to_string())
            } else {
                PlaybackError::Internal("player stopped".to_string())
            }
        })
    }

    pub async fn load_track(&self, track: impl Into<Track>, auto_play: bool) -> Result<()> {
        self.send(PlayerEvent::LoadTrack {
            track: track.into(),
            auto_play,
        })
        .await
    }

    pub async fn set_queue(&self, queue: Vec<Track>, index: usize) -> Result<()> {
        self.send(PlayerEvent::SetQueue {
            queue,
            index: Some(index),
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(PlayerEvent::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PlayerEvent::Pause).await
    }

    pub async fn seek(&self, position: f64) -> Result<()> {
        self.send(PlayerEvent::Seek { position }).await
    }

    pub async fn change_quality(&self, quality: Quality) -> Result<()> {
        self.send(PlayerEvent::ChangeQuality { quality }).await
    }

    /// Report an error raised by the audio device. The player tags it with
    /// the attempt that set the device's source.
    pub fn device_error(&self, error: impl Into<String>) -> Result<()> {
        self.try_send(PlayerEvent::AudioError {
            error: error.into(),
            attempt: None,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

enum Step {
    Completed(EffectOutcome),
    Command(Option<PlayerEvent>),
}

pub struct Player {
    config: PlaybackConfig,
    machine: MachineState,
    executor: Arc<EffectExecutor>,
    preferences: Option<QualityPreferences>,
    event_bus: Option<EventBus>,
    pending: FuturesUnordered<EffectFuture>,
    commands: mpsc::Receiver<PlayerEvent>,
    /// Next track whose manifest was already preloaded.
    preloaded: Option<i64>,
    /// Plan from the fallback controller awaiting its `FALLBACK_REQUESTED`.
    planned: Option<FallbackPlan>,
}

impl Player {
    /// Build a player and the handle that drives it.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Config`] if `config` is invalid.
    pub fn new(config: PlaybackConfig, deps: PlayerDeps) -> Result<(Self, PlayerHandle)> {
        config.validate()?;

        let fallback = Arc::new(FallbackController::new(config.fallback));
        let mut loader = TrackLoadController::new(deps.streams, deps.manifests, &config)
            .with_listener(fallback.clone())
            .with_capabilities(deps.device.capabilities());
        if let Some(factory) = deps.adaptive {
            loader = loader.with_adaptive_engine(Arc::new(AdaptiveEngineSlot::new(factory)));
        }
        if let Some(bus) = &deps.event_bus {
            loader = loader.with_event_bus(bus.clone());
        }

        let mut executor = EffectExecutor::new(
            deps.device,
            Arc::new(loader),
            deps.converter,
            deps.notifier,
            fallback,
            config.fallback,
        );
        if let Some(bus) = &deps.event_bus {
            executor = executor.with_event_bus(bus.clone());
        }

        let (sender, commands) = mpsc::channel(config.command_buffer);
        let player = Self {
            machine: MachineState::default(),
            executor: Arc::new(executor),
            preferences: deps.settings.map(QualityPreferences::new),
            event_bus: deps.event_bus,
            pending: FuturesUnordered::new(),
            commands,
            preloaded: None,
            planned: None,
            config,
        };
        info!(
            adaptive = player.config.adaptive_enabled,
            proxy = player.config.proxy.enabled,
            "Player created"
        );
        Ok((player, PlayerHandle { sender }))
    }

    /// Seed the requested quality from the settings store.
    pub async fn restore_preferences(&mut self) {
        let Some(preferences) = &self.preferences else {
            return;
        };
        let quality = preferences
            .load_or(self.machine.context.requested_quality)
            .await;
        if quality != self.machine.context.requested_quality {
            debug!(%quality, "Restored quality preference");
            self.machine = self.machine.with(self.machine.state, |ctx| {
                ctx.requested_quality = quality;
            });
        }
        self.executor.loader().set_requested_quality(quality);
    }

    pub fn state(&self) -> &MachineState {
        &self.machine
    }

    pub fn loader(&self) -> &Arc<TrackLoadController> {
        self.executor.loader()
    }

    /// Effects still in flight.
    pub fn pending_effects(&self) -> usize {
        self.pending.len()
    }

    /// Feed one event through the machine and start its effects.
    ///
    /// Returns the effects the transition derived.
    pub fn dispatch(&mut self, event: PlayerEvent) -> Vec<SideEffect> {
        let event = self.executor.tag_device_error(event);
        let prev = self.machine.clone();
        let (next, effects) = prev.step(&event);

        if !event.is_chatty() {
            debug!(
                event = event.name(),
                from = %prev.state,
                to = %next.state,
                effects = effects.len(),
                "Dispatched"
            );
        }
        let changed = !next.is_same(&prev);
        if changed {
            self.machine = next;
            let requested = self.machine.context.requested_quality;
            if requested != prev.context.requested_quality {
                self.quality_requested(requested);
            }
            self.publish(&prev, &event);
        }

        let futures = self.executor.execute_all(effects.clone(), &self.machine);
        self.pending.extend(futures);

        if !changed {
            return effects;
        }
        match &event {
            PlayerEvent::TrackEnd if prev.state == PlaybackState::Playing => self.advance(),
            PlayerEvent::TimeUpdate { .. } => self.maybe_preload(),
            PlayerEvent::FallbackRequested { quality, reason } => {
                self.fallback_accepted(&prev, *quality, reason)
            }
            _ => {}
        }
        effects
    }

    /// Drive in-flight effects until none are left.
    pub async fn settle(&mut self) {
        while let Some(outcome) = self.pending.next().await {
            self.complete(outcome);
        }
    }

    /// Process commands and completions until every handle is dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!("Player loop started");
        loop {
            let step = {
                let pending = &mut self.pending;
                let commands = &mut self.commands;
                futures::select_biased! {
                    outcome = pending.select_next_some() => Step::Completed(outcome),
                    command = commands.next() => Step::Command(command),
                }
            };
            match step {
                Step::Completed(outcome) => self.complete(outcome),
                Step::Command(Some(event)) => {
                    self.dispatch(event);
                }
                Step::Command(None) => break,
            }
        }
        self.settle().await;
        info!("Player loop stopped");
    }

    fn complete(&mut self, outcome: EffectOutcome) {
        match outcome {
            EffectOutcome::Event(event) => {
                self.dispatch(event);
            }
            EffectOutcome::Fallback(plan) => self.start_fallback(plan),
            EffectOutcome::Done => {}
        }
    }

    fn start_fallback(&mut self, plan: FallbackPlan) {
        let event = PlayerEvent::FallbackRequested {
            quality: plan.to,
            reason: plan.reason.clone(),
        };
        self.planned = Some(plan);
        self.dispatch(event);
        if let Some(plan) = self.planned.take() {
            warn!(to = %plan.to, "Fallback not accepted by the machine");
        }
    }

    /// Start the reload for an accepted `FALLBACK_REQUESTED`. Requests from
    /// the fallback controller carry their plan; anything else is treated as
    /// a progressive downgrade of the current track.
    fn fallback_accepted(&mut self, prev: &MachineState, quality: Quality, reason: &str) {
        let planned = self.planned.take();
        let ctx = Arc::clone(&self.machine.context);
        if self.machine.state != PlaybackState::Loading
            || ctx.load_request_id == prev.context.load_request_id
        {
            self.planned = planned;
            return;
        }

        let plan = match planned {
            Some(plan) => plan,
            None => {
                let Some(track) = ctx.current_track.as_ref().and_then(Track::as_catalog) else {
                    let key = ctx
                        .current_track
                        .as_ref()
                        .map(|track| track.key().to_string())
                        .unwrap_or_default();
                    warn!(track = %key, "Fallback requested for an unconverted track");
                    self.dispatch(PlayerEvent::LoadError {
                        error: PlaybackError::UnconvertedTrack(key).user_message(),
                        attempt: Some(ctx.attempt_id),
                    });
                    return;
                };
                info!(track_id = track.id, %quality, "Fallback requested");
                FallbackPlan {
                    track: track.clone(),
                    from: prev.context.effective_quality,
                    to: quality,
                    class: FallbackClass::Progressive,
                    reason: reason.to_string(),
                }
            }
        };
        let next = next_catalog(&self.machine);
        let future = self.executor.fallback_load(plan, next, ctx.attempt_id);
        self.pending.push(future);
    }

    fn quality_requested(&mut self, quality: Quality) {
        self.executor.loader().set_requested_quality(quality);
        if let Some(preferences) = self.preferences.clone() {
            self.pending.push(persist(preferences, quality));
        }
    }

    fn advance(&mut self) {
        if !self.config.auto_advance {
            return;
        }
        let ctx = Arc::clone(&self.machine.context);
        let Some(index) = ctx.queue_index else {
            return;
        };
        let Some(next) = ctx.queue.get(index + 1).cloned() else {
            debug!("Queue finished");
            return;
        };
        info!(index = index + 1, "Advancing to next queue entry");
        self.dispatch(PlayerEvent::SetQueue {
            queue: ctx.queue.to_vec(),
            index: Some(index + 1),
        });
        self.dispatch(PlayerEvent::LoadTrack {
            track: next,
            auto_play: true,
        });
    }

    fn maybe_preload(&mut self) {
        let ctx = &self.machine.context;
        if !self.machine.state.has_stream() || ctx.duration <= 0.0 {
            return;
        }
        if ctx.duration - ctx.current_time > self.config.preload_threshold_secs {
            return;
        }
        let Some(next) = next_catalog(&self.machine) else {
            return;
        };
        if self.preloaded == Some(next.id) {
            return;
        }
        self.preloaded = Some(next.id);
        debug!(track_id = next.id, "Preloading next track");
        let future = self.executor.preload(next);
        self.pending.push(future);
    }

    fn publish(&self, prev: &MachineState, event: &PlayerEvent) {
        let Some(bus) = &self.event_bus else {
            return;
        };
        let next = &self.machine;
        let track_id = next
            .context
            .current_track
            .as_ref()
            .map(|track| track.key().to_string())
            .unwrap_or_default();

        if prev.state != next.state {
            bus.emit(CoreEvent::Playback(PlaybackEvent::StateChanged {
                from: prev.state.to_string(),
                to: next.state.to_string(),
                attempt_id: next.context.attempt_id.value(),
                load_request_id: next.context.load_request_id,
            }))
            .ok();
        }
        if prev.context.requested_quality != next.context.requested_quality
            || prev.context.effective_quality != next.context.effective_quality
        {
            bus.emit(CoreEvent::Playback(PlaybackEvent::QualityChanged {
                track_id: track_id.clone(),
                requested: next.context.requested_quality.to_string(),
                effective: next.context.effective_quality.map(|q| q.to_string()),
            }))
            .ok();
        }
        if next.context.is_recovering && !prev.context.is_recovering {
            bus.emit(CoreEvent::Playback(PlaybackEvent::Recovering {
                track_id: track_id.clone(),
                attempt_id: next.context.attempt_id.value(),
            }))
            .ok();
        }
        if matches!(event, PlayerEvent::TrackEnd) {
            let ended = prev
                .context
                .current_track
                .as_ref()
                .map(|track| track.key().to_string())
                .unwrap_or(track_id);
            bus.emit(CoreEvent::Playback(PlaybackEvent::TrackEnded { track_id: ended }))
                .ok();
        }
    }
}

fn next_catalog(machine: &MachineState) -> Option<CatalogTrack> {
    machine
        .context
        .next_in_queue()
        .and_then(Track::as_catalog)
        .cloned()
}

#[cfg(not(target_arch = "wasm32"))]
fn persist(preferences: QualityPreferences, quality: Quality) -> EffectFuture {
    persist_inner(preferences, quality).boxed()
}

#[cfg(target_arch = "wasm32")]
fn persist(preferences: QualityPreferences, quality: Quality) -> EffectFuture {
    persist_inner(preferences, quality).boxed_local()
}

async fn persist_inner(preferences: QualityPreferences, quality: Quality) -> EffectOutcome {
    if let Err(error) = preferences.save(quality).await {
        warn!(error = %error, "Could not persist quality preference");
    }
    EffectOutcome::Done
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.machine.state)
            .field("attempt", &self.machine.context.attempt_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}
