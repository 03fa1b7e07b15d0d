//! Quality resolution and the retry ladder.

use crate::config::FallbackPolicy;
use crate::model::{CatalogTrack, Quality};
use crate::traits::DeviceCapabilities;

/// Pick the tier to resolve for `track`.
///
/// 1. A device that cannot play lossless never gets a hi-res request; it is
///    lowered to the policy's lossless tier.
/// 2. A hi-res request for a track whose best tier is lower is lowered to
///    that tier.
pub fn resolve_target_quality(
    requested: Quality,
    track: &CatalogTrack,
    capabilities: DeviceCapabilities,
    policy: &FallbackPolicy,
) -> Quality {
    let mut target = requested;

    if target.is_hi_res() && !capabilities.can_play_lossless {
        target = policy.lossless_tier;
    }

    if target.is_hi_res() {
        if let Some(best) = track.best_available_quality() {
            if best < target {
                target = best;
            }
        }
    }

    target
}

/// The single retry tier for a load whose original `target` failed.
///
/// - below the lossless tier: retry at the lossless tier
/// - at the lossless tier: retry at the streaming tier
/// - hi-res, or no lower tier configured: no retry
pub fn retry_quality(target: Quality, policy: &FallbackPolicy) -> Option<Quality> {
    if target == policy.lossless_tier {
        (policy.streaming_tier != target).then_some(policy.streaming_tier)
    } else if !target.is_hi_res() && target < policy.lossless_tier {
        Some(policy.lossless_tier)
    } else {
        None
    }
}
