//! Side-effect derivation.

use super::context::PlaybackState;
use super::event::{PlayerEvent, SideEffect};
use super::MachineState;
use crate::model::Track;

/// Derive the effects of `prev → next` caused by `event`. Pure.
///
/// Entering a state (or starting a new load within `loading`/`converting`)
/// yields that state's canonical effect. `LOAD_COMPLETE`, `SEEK`,
/// `AUDIO_ERROR` and `RESET` add their own effects on top. A transition that
/// changed nothing yields nothing, except `SEEK`, which always reaches the
/// device.
pub fn derive_effects(
    prev: &MachineState,
    next: &MachineState,
    event: &PlayerEvent,
) -> Vec<SideEffect> {
    let seek = matches!(event, PlayerEvent::Seek { .. });
    if prev.is_same(next) && !seek {
        return Vec::new();
    }

    let ctx = &next.context;
    let mut effects = EffectList::default();

    match event {
        PlayerEvent::Reset => effects.push(SideEffect::ResetAudio),
        PlayerEvent::LoadComplete {
            stream_url: Some(url),
            ..
        } => effects.push(SideEffect::SetAudioSource {
            url: url.clone(),
            attempt: ctx.attempt_id,
        }),
        _ => {}
    }

    let load_started = prev.context.load_request_id != ctx.load_request_id;
    if prev.state != next.state || load_started {
        if let Some(effect) = entry_effect(next, event) {
            effects.push(effect);
        }
    }

    match event {
        PlayerEvent::LoadComplete {
            stream_url: Some(_),
            ..
        } if matches!(next.state, PlaybackState::Playing | PlaybackState::Buffering) => {
            effects.push(SideEffect::PlayAudio {
                attempt: ctx.attempt_id,
            })
        }
        PlayerEvent::Seek { .. } => effects.push(SideEffect::SeekAudio {
            position: ctx.current_time,
        }),
        PlayerEvent::AudioError { error, .. } => {
            effects.push(SideEffect::HandleAudioError {
                error: error.clone(),
                attempt: ctx.attempt_id,
            })
        }
        _ => {}
    }

    effects.into_vec()
}

/// Canonical effect for the destination state.
fn entry_effect(next: &MachineState, event: &PlayerEvent) -> Option<SideEffect> {
    let ctx = &next.context;
    match next.state {
        PlaybackState::Converting => match &ctx.current_track {
            Some(Track::External(track)) => Some(SideEffect::ConvertTrack {
                track: track.clone(),
                attempt: ctx.attempt_id,
            }),
            _ => None,
        },
        // The player starts the fallback reload itself.
        PlaybackState::Loading if matches!(event, PlayerEvent::FallbackRequested { .. }) => None,
        PlaybackState::Loading => match &ctx.current_track {
            Some(Track::Catalog(track)) => Some(SideEffect::LoadStream {
                track: track.clone(),
                quality: ctx.requested_quality,
                next: ctx.next_in_queue().and_then(Track::as_catalog).cloned(),
                attempt: ctx.attempt_id,
                load_request_id: ctx.load_request_id,
            }),
            _ => None,
        },
        PlaybackState::Ready => ctx.stream_url.as_ref().map(|url| SideEffect::SetAudioSource {
            url: url.clone(),
            attempt: ctx.attempt_id,
        }),
        PlaybackState::Playing => Some(SideEffect::PlayAudio {
            attempt: ctx.attempt_id,
        }),
        PlaybackState::Paused => Some(SideEffect::PauseAudio),
        PlaybackState::Error => Some(SideEffect::ShowError {
            message: ctx
                .error
                .as_ref()
                .map(|failure| failure.message.clone())
                .unwrap_or_else(|| "Playback error".to_string()),
        }),
        PlaybackState::Idle | PlaybackState::Buffering => None,
    }
}

/// Effect list that keeps at most one effect of each kind.
#[derive(Default)]
struct EffectList(Vec<SideEffect>);

impl EffectList {
    fn push(&mut self, effect: SideEffect) {
        if !self.0.iter().any(|existing| existing.name() == effect.name()) {
            self.0.push(effect);
        }
    }

    fn into_vec(self) -> Vec<SideEffect> {
        self.0
    }
}
