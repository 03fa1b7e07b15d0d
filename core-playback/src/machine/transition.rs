//! The transition table.
//!
//! Every `(state, event)` pair has an answer; pairs the table does not list
//! return the input unchanged, context allocation included.

use super::context::{FailureKind, PlaybackContext, PlaybackFailure, PlaybackState};
use super::event::PlayerEvent;
use super::MachineState;
use crate::model::{Track, TrackKey};
use std::sync::Arc;

use PlaybackState::*;

/// Compute the next machine state. Pure.
pub fn transition(machine: &MachineState, event: &PlayerEvent) -> MachineState {
    let ctx = &machine.context;
    let state = machine.state;

    if let Some(attempt) = event.attempt() {
        if attempt != ctx.attempt_id {
            return machine.clone();
        }
    }

    match event {
        PlayerEvent::LoadTrack { track, auto_play } => {
            let auto_play = *auto_play || matches!(state, Playing | Buffering);
            machine.with(load_destination(track), |ctx| {
                ctx.current_track = Some(track.clone());
                ctx.current_time = 0.0;
                ctx.duration = sanitize_duration(track.duration());
                begin_load(ctx);
                ctx.auto_play = auto_play;
                ctx.is_recovering = false;
            })
        }

        PlayerEvent::SetQueue { queue, index } => set_queue(machine, queue, *index),

        PlayerEvent::ConversionComplete { track, .. } if state == Converting => {
            machine.with(Loading, |ctx| {
                if track.duration > 0.0 {
                    ctx.duration = track.duration;
                }
                ctx.current_track = Some(Track::Catalog(track.clone()));
            })
        }

        PlayerEvent::ConversionError { error, .. } if state == Converting => {
            enter_error(machine, FailureKind::Conversion, error)
        }

        PlayerEvent::LoadComplete {
            stream_url,
            quality,
            metadata,
            ..
        } => {
            let destination = match state {
                Loading if ctx.auto_play => Playing,
                Loading => Ready,
                Playing | Paused | Buffering => state,
                _ => return machine.clone(),
            };
            machine.with(destination, |ctx| {
                ctx.stream_url = stream_url.clone();
                ctx.effective_quality = Some(*quality);
                ctx.sample_rate = metadata.sample_rate;
                ctx.bit_depth = metadata.bit_depth;
                ctx.replay_gain = metadata.replay_gain;
                ctx.error = None;
                ctx.is_recovering = false;
            })
        }

        PlayerEvent::LoadError { error, .. } if state == Loading => {
            enter_error(machine, FailureKind::Load, error)
        }

        PlayerEvent::Play => play(machine),

        PlayerEvent::Pause => match state {
            Playing | Buffering => machine.with(Paused, |ctx| ctx.auto_play = false),
            Loading | Converting | Ready if ctx.auto_play => {
                machine.with(state, |ctx| ctx.auto_play = false)
            }
            _ => machine.clone(),
        },

        PlayerEvent::AudioReady if state == Loading => {
            machine.to_state(if ctx.auto_play { Playing } else { Ready })
        }
        PlayerEvent::AudioPlaying if state == Buffering => machine.to_state(Playing),
        PlayerEvent::AudioWaiting if state == Playing => machine.to_state(Buffering),
        PlayerEvent::AudioPaused if state == Playing => {
            machine.with(Paused, |ctx| ctx.auto_play = false)
        }

        PlayerEvent::AudioError { error, .. } => {
            enter_error(machine, FailureKind::Playback, error)
        }

        PlayerEvent::TrackEnd if state == Playing => machine.with(Idle, |ctx| {
            ctx.current_time = 0.0;
            ctx.effective_quality = None;
            ctx.auto_play = false;
        }),

        PlayerEvent::ChangeQuality { quality } => match &ctx.current_track {
            Some(track) if state != Idle => {
                let destination = load_destination(track);
                let keep_playing = matches!(state, Playing | Buffering);
                machine.with(destination, |ctx| {
                    ctx.requested_quality = *quality;
                    begin_load(ctx);
                    ctx.auto_play = ctx.auto_play || keep_playing;
                })
            }
            _ if ctx.requested_quality == *quality => machine.clone(),
            _ => machine.with(state, |ctx| ctx.requested_quality = *quality),
        },

        PlayerEvent::FallbackRequested { .. } => {
            if ctx.current_track.is_none() {
                return machine.clone();
            }
            // An initial load that has not finished keeps its attempt so its
            // in-flight resolution can still land.
            let keep_attempt = state.is_loading();
            machine.with(Loading, |ctx| {
                ctx.clear_stream();
                ctx.error = None;
                ctx.load_request_id += 1;
                if !keep_attempt {
                    ctx.attempt_id = ctx.attempt_id.next();
                }
                ctx.auto_play = true;
                ctx.is_recovering = true;
            })
        }

        PlayerEvent::Seek { position } => {
            let position = ctx.clamp_time(*position);
            update(machine, ctx.current_time == position, |ctx| {
                ctx.current_time = position
            })
        }

        PlayerEvent::TimeUpdate { time } => {
            let time = ctx.clamp_time(*time);
            update(machine, ctx.current_time == time, |ctx| ctx.current_time = time)
        }

        PlayerEvent::DurationUpdate { duration } => {
            let duration = sanitize_duration(*duration);
            update(machine, ctx.duration == duration, |ctx| {
                ctx.duration = duration;
                ctx.current_time = ctx.clamp_time(ctx.current_time);
            })
        }

        PlayerEvent::VolumeUpdate { volume } => {
            let volume = if volume.is_finite() {
                volume.clamp(0.0, 1.0)
            } else {
                ctx.volume
            };
            update(machine, ctx.volume == volume, |ctx| ctx.volume = volume)
        }

        PlayerEvent::MuteUpdate { muted } => {
            update(machine, ctx.muted == *muted, |ctx| ctx.muted = *muted)
        }

        PlayerEvent::SampleRateUpdate { sample_rate } => {
            update(machine, ctx.sample_rate == *sample_rate, |ctx| {
                ctx.sample_rate = *sample_rate
            })
        }

        PlayerEvent::BitDepthUpdate { bit_depth } => {
            update(machine, ctx.bit_depth == *bit_depth, |ctx| {
                ctx.bit_depth = *bit_depth
            })
        }

        PlayerEvent::ReplayGainUpdate { replay_gain } => {
            update(machine, ctx.replay_gain == *replay_gain, |ctx| {
                ctx.replay_gain = *replay_gain
            })
        }

        PlayerEvent::Reset => machine.with(Idle, |ctx| {
            let mut fresh = PlaybackContext::new(ctx.requested_quality);
            fresh.volume = ctx.volume;
            fresh.muted = ctx.muted;
            fresh.load_request_id = ctx.load_request_id;
            fresh.attempt_id = ctx.attempt_id.next();
            *ctx = fresh;
        }),

        _ => machine.clone(),
    }
}

fn play(machine: &MachineState) -> MachineState {
    let ctx = &machine.context;
    match machine.state {
        Ready | Paused | Buffering => machine.with(Playing, |ctx| {
            ctx.auto_play = true;
            ctx.is_recovering = false;
        }),
        Loading | Converting if ctx.auto_play => machine.clone(),
        Loading | Converting => machine.with(machine.state, |ctx| ctx.auto_play = true),
        Idle => match &ctx.current_track {
            Some(track) => machine.with(load_destination(track), |ctx| {
                begin_load(ctx);
                ctx.auto_play = true;
            }),
            None => machine.clone(),
        },
        Error => match &ctx.current_track {
            Some(track) => machine.with(load_destination(track), |ctx| {
                begin_load(ctx);
                ctx.auto_play = true;
                ctx.is_recovering = true;
            }),
            None => machine.clone(),
        },
        Playing => machine.clone(),
    }
}

fn set_queue(machine: &MachineState, queue: &[Track], index: Option<usize>) -> MachineState {
    let ctx = &machine.context;
    let index = match (queue.len(), index) {
        (0, _) => None,
        (len, Some(i)) => Some(i.min(len - 1)),
        (_, None) => Some(0),
    };
    let current = index
        .and_then(|i| queue.get(i).cloned())
        .or_else(|| ctx.current_track.clone());

    if ctx.queue.as_slice() == queue && ctx.queue_index == index && ctx.current_track == current {
        return machine.clone();
    }

    let previous_key: Option<TrackKey> = ctx.current_track.as_ref().map(Track::key);
    let identity_changed = current.as_ref().map(Track::key) != previous_key;

    machine.with(machine.state, |ctx| {
        ctx.queue = Arc::new(queue.to_vec());
        ctx.queue_index = index;
        ctx.current_track = current;
        if identity_changed {
            ctx.current_time = 0.0;
            ctx.duration = 0.0;
            ctx.sample_rate = None;
            ctx.bit_depth = None;
            ctx.replay_gain = None;
        }
    })
}

fn enter_error(machine: &MachineState, kind: FailureKind, message: &str) -> MachineState {
    machine.with(Error, |ctx| {
        ctx.error = Some(PlaybackFailure::new(kind, message));
        ctx.effective_quality = None;
        ctx.is_recovering = false;
    })
}

/// Apply a pure field update, or hand back the same state when `unchanged`.
fn update(
    machine: &MachineState,
    unchanged: bool,
    edit: impl FnOnce(&mut PlaybackContext),
) -> MachineState {
    if unchanged {
        machine.clone()
    } else {
        machine.with(machine.state, edit)
    }
}

/// Reset per-stream fields and start a new attempt.
fn begin_load(ctx: &mut PlaybackContext) {
    ctx.clear_stream();
    ctx.error = None;
    ctx.load_request_id += 1;
    ctx.attempt_id = ctx.attempt_id.next();
}

fn load_destination(track: &Track) -> PlaybackState {
    if track.needs_conversion() {
        Converting
    } else {
        Loading
    }
}

fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() {
        duration.max(0.0)
    } else {
        0.0
    }
}
