//! Player and executor tests
//!
//! End-to-end flows through `Player::dispatch` / `Player::settle` with
//! scripted collaborators: effect execution, the single load retry, bounded
//! fallback, device-error tagging, queue advancement and preloading.

mod common;

use bridge_traits::storage::{MemorySettingsStore, SettingsStore};
use common::*;
use core_playback::machine::{PlaybackState, PlayerEvent};
use core_playback::preferences::QUALITY_KEY;
use core_playback::traits::{AdaptiveEngineFactory, TrackConverter};
use core_playback::{PlaybackConfig, PlaybackError, Player, PlayerDeps, Quality, Track};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct Harness {
    catalog: Arc<ScriptedCatalog>,
    device: Arc<RecordingDevice>,
    notifier: Arc<RecordingNotifier>,
    converter: Arc<MapConverter>,
    engines: Option<Arc<TestEngineFactory>>,
    settings: Option<Arc<MemorySettingsStore>>,
    bus: EventBus,
}

impl Harness {
    fn new() -> Self {
        Self {
            catalog: ScriptedCatalog::new(),
            device: RecordingDevice::new(),
            notifier: RecordingNotifier::new(),
            converter: MapConverter::new(),
            engines: None,
            settings: None,
            bus: EventBus::new(128),
        }
    }

    fn with_adaptive(mut self) -> Self {
        self.engines = Some(TestEngineFactory::new());
        self
    }

    fn with_settings(mut self, store: MemorySettingsStore) -> Self {
        self.settings = Some(Arc::new(store));
        self
    }

    fn with_converter(mut self, converter: Arc<MapConverter>) -> Self {
        self.converter = converter;
        self
    }

    fn deps(&self) -> PlayerDeps {
        PlayerDeps {
            streams: self.catalog.clone(),
            manifests: self.catalog.clone(),
            converter: self.converter.clone() as Arc<dyn TrackConverter>,
            device: self.device.clone(),
            notifier: self.notifier.clone(),
            adaptive: self
                .engines
                .clone()
                .map(|factory| factory as Arc<dyn AdaptiveEngineFactory>),
            settings: self
                .settings
                .clone()
                .map(|store| store as Arc<dyn SettingsStore>),
            event_bus: Some(self.bus.clone()),
        }
    }

    fn player(&self) -> Player {
        self.player_with(PlaybackConfig::default())
    }

    fn player_with(&self, config: PlaybackConfig) -> Player {
        let (player, _handle) = Player::new(config, self.deps()).unwrap();
        player
    }
}

fn load(track: impl Into<Track>, auto_play: bool) -> PlayerEvent {
    PlayerEvent::LoadTrack {
        track: track.into(),
        auto_play,
    }
}

fn playback_events(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CoreEvent::Playback(event) = event {
            events.push(event);
        }
    }
    events
}

// ============================================================================
// Effect execution
// ============================================================================

#[tokio::test]
async fn test_load_and_autoplay_drives_device() {
    let harness = Harness::new();
    let mut player = harness.player();

    let effects = player.dispatch(load(catalog_track(1), true));
    assert_eq!(effects.len(), 1);
    assert_eq!(player.state().state, PlaybackState::Loading);

    player.settle().await;

    let ctx = &player.state().context;
    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(ctx.effective_quality, Some(Quality::Lossless));
    assert_eq!(ctx.sample_rate, Some(44_100));
    let url = default_url(1, Quality::Lossless);
    assert_eq!(ctx.stream_url.as_deref(), Some(url.as_str()));
    assert_eq!(
        harness.device.calls(),
        vec![format!("set_source:{}", url), "load".to_string(), "play".to_string()]
    );
    assert_eq!(player.pending_effects(), 0);
}

#[tokio::test]
async fn test_external_track_is_converted_then_played() {
    let converter = MapConverter::new().with_match("sp:9", catalog_track(9));
    let harness = Harness::new().with_converter(converter);
    let mut player = harness.player();

    player.dispatch(load(external_track("sp:9"), true));
    assert_eq!(player.state().state, PlaybackState::Converting);
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(harness.catalog.stream_calls(), vec![(9, Quality::Lossless)]);
}

#[tokio::test]
async fn test_conversion_failure_notifies_user() {
    let harness = Harness::new();
    let mut player = harness.player();

    player.dispatch(load(external_track("sp:404"), true));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(
        harness.notifier.messages(),
        vec!["This track could not be found in the catalog.".to_string()]
    );
    assert!(harness.catalog.stream_calls().is_empty());
}

#[tokio::test]
async fn test_pause_and_seek_reach_device() {
    let harness = Harness::new();
    let mut player = harness.player();
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;
    harness.device.clear();

    player.dispatch(PlayerEvent::Seek { position: 30.0 });
    player.dispatch(PlayerEvent::Pause);
    player.settle().await;

    assert_eq!(harness.device.calls(), vec!["seek:30".to_string(), "pause".to_string()]);
    assert_eq!(player.state().state, PlaybackState::Paused);
}

#[tokio::test]
async fn test_reset_unloads_device_and_clears_loader() {
    let harness = Harness::new();
    let mut player = harness.player();
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    player.dispatch(PlayerEvent::Reset);
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Idle);
    assert_eq!(harness.device.count("unload"), 1);
    assert!(player.loader().current_stream().is_none());
    assert_eq!(player.loader().cache_sizes(), (0, 0));
}

// ============================================================================
// Retry cascade
// ============================================================================

#[tokio::test]
async fn test_failed_lossless_retries_at_streaming_tier() {
    let harness = Harness::new();
    harness
        .catalog
        .stream(1, Quality::Lossless, StreamScript::Fail(Some(503)));
    let mut player = harness.player();

    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(player.state().context.effective_quality, Some(Quality::High));
    assert_eq!(
        harness.catalog.stream_calls(),
        vec![(1, Quality::Lossless), (1, Quality::High)]
    );
    // The retry continued the same logical load
    assert_eq!(player.loader().current_sequence(), 1);
}

#[tokio::test]
async fn test_exhausted_cascade_enters_error() {
    let harness = Harness::new();
    harness.catalog.stream(1, Quality::High, StreamScript::Fail(None));
    harness
        .catalog
        .stream(1, Quality::Lossless, StreamScript::Fail(Some(500)));
    let mut player = harness.player();

    player.dispatch(PlayerEvent::ChangeQuality {
        quality: Quality::High,
    });
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(
        harness.catalog.stream_calls(),
        vec![(1, Quality::High), (1, Quality::Lossless)]
    );
    assert_eq!(
        harness.notifier.messages(),
        vec!["Could not load the stream. Check your connection and try again.".to_string()]
    );
    assert!(harness.device.sources().is_empty());
}

#[tokio::test]
async fn test_low_target_retries_once_at_lossless() {
    let harness = Harness::new();
    harness.catalog.stream(1, Quality::Low, StreamScript::Fail(Some(503)));
    harness
        .catalog
        .stream(1, Quality::Lossless, StreamScript::Fail(Some(503)));
    let mut player = harness.player();

    player.dispatch(PlayerEvent::ChangeQuality { quality: Quality::Low });
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(
        harness.catalog.stream_calls(),
        vec![(1, Quality::Low), (1, Quality::Lossless)]
    );
    assert_eq!(player.loader().current_sequence(), 1);
    assert!(harness.device.sources().is_empty());
}

#[tokio::test]
async fn test_hi_res_target_is_not_retried_after_progressive_failure() {
    let harness = Harness::new();
    harness
        .catalog
        .stream(1, Quality::Lossless, StreamScript::Fail(Some(503)));
    let mut player = harness.player();

    player.dispatch(PlayerEvent::ChangeQuality {
        quality: Quality::HiResLossless,
    });
    player.dispatch(load(hires_track(1), true));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(harness.catalog.stream_calls(), vec![(1, Quality::Lossless)]);
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_play_rejection_falls_back_once_then_fails() {
    let harness = Harness::new();
    harness.device.reject_play(true);
    let mut events = harness.bus.subscribe();
    let mut player = harness.player();

    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    // Lossless rejected -> one downgrade to High -> rejected again -> terminal
    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(
        harness.catalog.stream_calls(),
        vec![(1, Quality::Lossless), (1, Quality::High)]
    );
    assert_eq!(harness.device.sources().len(), 2);
    assert_eq!(harness.notifier.messages().len(), 1);

    let recovering = playback_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, PlaybackEvent::Recovering { .. }))
        .count();
    assert_eq!(recovering, 1);
}

#[tokio::test]
async fn test_error_at_lowest_tier_is_terminal() {
    let harness = Harness::new();
    let mut player = harness.player_with(PlaybackConfig::data_saver());
    player.dispatch(PlayerEvent::ChangeQuality { quality: Quality::Low });
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Playing);

    player.dispatch(PlayerEvent::AudioError {
        error: "MEDIA_ERR_DECODE".to_string(),
        attempt: None,
    });
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Error);
    assert_eq!(harness.notifier.messages(), vec!["MEDIA_ERR_DECODE".to_string()]);
    assert_eq!(harness.catalog.stream_calls().len(), 1);
}

#[tokio::test]
async fn test_adaptive_error_disables_adaptive_and_reloads_lossless() {
    let harness = Harness::new().with_adaptive();
    harness
        .catalog
        .manifest(1, Quality::HiResLossless, ManifestScript::Adaptive);
    let mut player = harness.player();
    player.dispatch(PlayerEvent::ChangeQuality {
        quality: Quality::HiResLossless,
    });

    player.dispatch(load(hires_track(1), true));
    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Playing);
    assert!(player.loader().is_adaptive_active());
    assert!(harness.device.sources().is_empty());

    player.dispatch(PlayerEvent::AudioError {
        error: "segment decode".to_string(),
        attempt: None,
    });
    player.settle().await;

    let ctx = &player.state().context;
    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(ctx.effective_quality, Some(Quality::Lossless));
    assert!(!ctx.is_recovering);
    assert!(!player.loader().is_adaptive_active());
    assert_eq!(harness.device.sources(), vec![default_url(1, Quality::Lossless)]);
    let engines = harness.engines.as_ref().unwrap();
    assert!(engines.log.detached.load(Ordering::SeqCst) >= 1);
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_requested_fallback_reloads_current_track() {
    let harness = Harness::new();
    let mut events = harness.bus.subscribe();
    let mut player = harness.player();
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Playing);
    harness.device.clear();

    let effects = player.dispatch(PlayerEvent::FallbackRequested {
        quality: Quality::High,
        reason: "buffering".to_string(),
    });
    assert!(effects.is_empty());
    assert_eq!(player.state().state, PlaybackState::Loading);
    assert_eq!(player.pending_effects(), 1);

    player.settle().await;

    let ctx = &player.state().context;
    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(ctx.effective_quality, Some(Quality::High));
    assert!(!ctx.is_recovering);
    assert_eq!(harness.device.sources(), vec![default_url(1, Quality::High)]);
    assert_eq!(
        harness.catalog.stream_calls(),
        vec![(1, Quality::Lossless), (1, Quality::High)]
    );
    assert!(playback_events(&mut events)
        .iter()
        .any(|event| matches!(event, PlaybackEvent::Recovering { .. })));
}

#[tokio::test]
async fn test_fallback_during_initial_load_applies_one_result() {
    let harness = Harness::new();
    let release = harness.catalog.gate(1);
    let mut player = harness.player();

    player.dispatch(load(catalog_track(1), true));
    let attempt = player.state().context.attempt_id;
    player.dispatch(PlayerEvent::FallbackRequested {
        quality: Quality::High,
        reason: "slow start".to_string(),
    });
    assert_eq!(player.state().state, PlaybackState::Loading);
    assert_eq!(player.state().context.attempt_id, attempt);
    assert_eq!(player.pending_effects(), 2);

    release.send(()).ok();
    player.settle().await;

    // The initial load was superseded by the fallback reload
    let ctx = &player.state().context;
    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(ctx.effective_quality, Some(Quality::High));
    assert!(!ctx.is_recovering);
    assert_eq!(harness.device.sources(), vec![default_url(1, Quality::High)]);
    assert_eq!(harness.device.count("play"), 1);
    assert_eq!(player.loader().current_sequence(), 2);
    assert_eq!(
        player.loader().current_stream().map(|stream| stream.quality),
        Some(Quality::High)
    );
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn test_device_error_from_previous_source_is_ignored() {
    let harness = Harness::new();
    let mut player = harness.player();
    player.dispatch(load(catalog_track(1), false));
    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Ready);

    player.dispatch(load(catalog_track(2), false));
    // Error raised by the element still playing track 1
    player.dispatch(PlayerEvent::AudioError {
        error: "network".to_string(),
        attempt: None,
    });
    assert_eq!(player.state().state, PlaybackState::Loading);

    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Ready);
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_out_of_order_completion_does_not_clobber_newer_track() {
    let harness = Harness::new();
    let release_first = harness.catalog.gate(1);
    let mut player = harness.player();

    player.dispatch(load(catalog_track(1), false));
    player.dispatch(load(catalog_track(2), false));
    let release = async {
        release_first.send(()).ok();
    };
    futures::join!(player.settle(), release);

    let ctx = &player.state().context;
    assert_eq!(player.state().state, PlaybackState::Ready);
    assert_eq!(ctx.current_track, Some(Track::Catalog(catalog_track(2))));
    assert_eq!(harness.device.sources(), vec![default_url(2, Quality::Lossless)]);
    assert_eq!(player.loader().current_stream().unwrap().track_id, 2);
}

// ============================================================================
// Queue and preload
// ============================================================================

#[tokio::test]
async fn test_track_end_advances_queue() {
    let harness = Harness::new();
    let mut player = harness.player();
    let queue: Vec<Track> = vec![catalog_track(1).into(), catalog_track(2).into()];

    player.dispatch(PlayerEvent::SetQueue {
        queue,
        index: Some(0),
    });
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    player.dispatch(PlayerEvent::TrackEnd);
    assert_eq!(player.state().state, PlaybackState::Loading);
    assert_eq!(player.state().context.queue_index, Some(1));
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Playing);
    assert_eq!(
        harness.device.sources(),
        vec![default_url(1, Quality::Lossless), default_url(2, Quality::Lossless)]
    );

    // Last entry: playback stops
    player.dispatch(PlayerEvent::TrackEnd);
    player.settle().await;
    assert_eq!(player.state().state, PlaybackState::Idle);
}

#[tokio::test]
async fn test_auto_advance_can_be_disabled() {
    let harness = Harness::new();
    let config = PlaybackConfig {
        auto_advance: false,
        ..Default::default()
    };
    let mut player = harness.player_with(config);
    player.dispatch(PlayerEvent::SetQueue {
        queue: vec![catalog_track(1).into(), catalog_track(2).into()],
        index: Some(0),
    });
    player.dispatch(load(catalog_track(1), true));
    player.settle().await;

    player.dispatch(PlayerEvent::TrackEnd);
    player.settle().await;

    assert_eq!(player.state().state, PlaybackState::Idle);
    assert_eq!(harness.catalog.stream_calls().len(), 1);
}

#[tokio::test]
async fn test_next_manifest_is_preloaded_near_track_end() {
    let harness = Harness::new().with_adaptive();
    harness
        .catalog
        .manifest(2, Quality::HiResLossless, ManifestScript::Adaptive);
    let mut player = harness.player();
    player.dispatch(PlayerEvent::ChangeQuality {
        quality: Quality::HiResLossless,
    });
    player.dispatch(PlayerEvent::SetQueue {
        queue: vec![hires_track(1).into(), hires_track(2).into()],
        index: Some(0),
    });
    player.dispatch(load(hires_track(1), true));
    player.settle().await;
    assert!(!player.loader().has_cached_manifest(2, Quality::HiResLossless));

    player.dispatch(PlayerEvent::TimeUpdate { time: 100.0 });
    player.settle().await;
    assert!(!player.loader().has_cached_manifest(2, Quality::HiResLossless));

    player.dispatch(PlayerEvent::TimeUpdate { time: 195.0 });
    player.dispatch(PlayerEvent::TimeUpdate { time: 196.0 });
    player.settle().await;

    assert!(player.loader().has_cached_manifest(2, Quality::HiResLossless));
    let lookups = harness
        .catalog
        .manifest_calls()
        .into_iter()
        .filter(|(id, _)| *id == 2)
        .count();
    assert_eq!(lookups, 1);
}

// ============================================================================
// Preferences and configuration
// ============================================================================

#[tokio::test]
async fn test_quality_preference_is_restored_and_persisted() {
    let store = MemorySettingsStore::new().with_value(QUALITY_KEY, "HIGH");
    let harness = Harness::new().with_settings(store);
    let mut player = harness.player();

    player.restore_preferences().await;
    assert_eq!(player.state().context.requested_quality, Quality::High);
    assert_eq!(player.loader().requested_quality(), Quality::High);

    player.dispatch(PlayerEvent::ChangeQuality {
        quality: Quality::Lossless,
    });
    player.settle().await;

    let settings = harness.settings.as_ref().unwrap();
    assert_eq!(
        settings.get_string(QUALITY_KEY).await.unwrap(),
        Some("LOSSLESS".to_string())
    );
    assert_eq!(player.loader().requested_quality(), Quality::Lossless);
}

#[test]
fn test_invalid_config_is_rejected() {
    let harness = Harness::new();
    let config = PlaybackConfig {
        command_buffer: 0,
        ..Default::default()
    };
    let result = Player::new(config, harness.deps());
    assert!(matches!(result, Err(PlaybackError::Config(_))));
}

// ============================================================================
// Run loop
// ============================================================================

#[tokio::test]
async fn test_run_loop_processes_commands_until_handles_drop() {
    let harness = Harness::new();
    let mut events = harness.bus.subscribe();
    let (player, handle) = Player::new(PlaybackConfig::default(), harness.deps()).unwrap();

    let client = async move {
        handle.load_track(catalog_track(1), true).await.unwrap();
        handle.seek(12.0).await.unwrap();
    };
    futures::join!(player.run(), client);

    let transitions: Vec<(String, String)> = playback_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PlaybackEvent::StateChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("idle".to_string(), "loading".to_string()),
            ("loading".to_string(), "playing".to_string()),
        ]
    );
    assert!(harness.device.count("play") >= 1);
}
