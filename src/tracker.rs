use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::assignment::{self, IouMatrix};
use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::track::{Track, TrackUpdate};

/// Result of one tracker step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerOutput {
    /// Matched and newly created tracks, in detection order.
    pub updates: Vec<TrackUpdate>,
    /// Ids dropped this frame, ascending.
    pub evicted: Vec<u32>,
}

/// IoU based multi-object tracker. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            tracks: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Advances every track by one frame. Detections are expected to be
    /// valid already.
    pub fn update(&mut self, frame_index: u64, timestamp: f64, detections: &[Detection]) -> TrackerOutput {
        let ids: Vec<u32> = self.tracks.keys().copied().collect();
        let ages: Vec<u32> = self.tracks.values().map(|t| t.age).collect();

        let ious = {
            let tracks: Vec<&Track> = self.tracks.values().collect();
            let class_aware = self.config.class_aware;

            IouMatrix::from_fn(tracks.len(), detections.len(), |r, c| {
                let (track, det) = (tracks[r], &detections[c]);
                if class_aware && track.class != det.class {
                    0.0
                } else {
                    track.bbox.iou(&det.bbox)
                }
            })
        };

        let matches = assignment::assign(
            self.config.assignment,
            &ious,
            &ages,
            self.config.match_thresh,
        );

        let mut det_track: Vec<Option<(u32, bool)>> = vec![None; detections.len()];
        let mut matched = vec![false; ids.len()];

        for m in &matches {
            let id = ids[m.track];
            if let Some(track) = self.tracks.get_mut(&id) {
                track.update(frame_index, timestamp, &detections[m.detection]);
                debug!("track {} matched detection {} (iou {:.3})", id, m.detection, m.iou);
            }

            matched[m.track] = true;
            det_track[m.detection] = Some((id, false));
        }

        for (idx, id) in ids.iter().enumerate() {
            if !matched[idx] {
                if let Some(track) = self.tracks.get_mut(id) {
                    track.mark_missed();
                }
            }
        }

        let track_buffer = self.config.track_buffer;
        let mut evicted = Vec::new();
        self.tracks.retain(|id, track| {
            let keep = track.age <= track_buffer;
            if !keep {
                info!("track {} evicted after {} missed frames", id, track.age);
                evicted.push(*id);
            }
            keep
        });

        for (idx, det) in detections.iter().enumerate() {
            if det_track[idx].is_some() {
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;

            let track = Track::new(id, frame_index, timestamp, det, self.config.history_len);
            info!("track {} created as {}", id, det.class);
            self.tracks.insert(id, track);
            det_track[idx] = Some((id, true));
        }

        let updates = det_track
            .into_iter()
            .flatten()
            .filter_map(|(id, is_new)| self.tracks.get(&id).map(|t| TrackUpdate::from_track(t, is_new)))
            .collect();

        TrackerOutput { updates, evicted }
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Live tracks in ascending id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
