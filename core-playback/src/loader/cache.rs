//! Stream and manifest caches owned by a load controller.
//!
//! Both are keyed by `(track id, quality)` and pruned after every successful
//! load down to the current and next track.

use crate::model::Quality;
use crate::traits::{ManifestResolution, StreamInfo};
use std::collections::HashMap;

pub type CacheKey = (i64, Quality);

/// Map keyed by `(track id, quality)` that can be pruned by track.
#[derive(Debug, Clone)]
pub struct TrackCache<V> {
    entries: HashMap<CacheKey, V>,
}

pub type StreamCache = TrackCache<StreamInfo>;
pub type ManifestCache = TrackCache<ManifestResolution>;

impl<V> Default for TrackCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: Clone> TrackCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: i64, quality: Quality) -> Option<V> {
        self.entries.get(&(track_id, quality)).cloned()
    }

    pub fn insert(&mut self, track_id: i64, quality: Quality, value: V) {
        self.entries.insert((track_id, quality), value);
    }

    pub fn remove(&mut self, track_id: i64, quality: Quality) -> Option<V> {
        self.entries.remove(&(track_id, quality))
    }

    pub fn contains(&self, track_id: i64, quality: Quality) -> bool {
        self.entries.contains_key(&(track_id, quality))
    }

    /// Drop every entry whose track is neither `current` nor `next`.
    ///
    /// Returns the number of entries removed.
    pub fn retain_tracks(&mut self, current: i64, next: Option<i64>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(track_id, _), _| *track_id == current || Some(*track_id) == next);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
