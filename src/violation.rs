use nalgebra as na;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::ViolationConfig;
use crate::detection::VehicleClass;
use crate::lane::LanePolygon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyState {
    #[default]
    Outside,
    InsideAccumulating,
    /// Latched until the track leaves the lane beyond the grace tolerance.
    Violated,
}

/// A confirmed lane violation, before the event metadata is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Violation {
    pub track_id: u32,
    pub class: VehicleClass,
    pub frame_index: u64,
    pub timestamp: f64,
    pub dwell_frames: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Occupancy {
    state: OccupancyState,
    dwell: u32,
    grace: u32,
}

impl Occupancy {
    fn reset(&mut self) {
        *self = Occupancy::default();
    }
}

/// Tracks per vehicle dwell inside the restricted lane.
#[derive(Debug)]
pub struct LaneViolationEngine {
    lane: LanePolygon,
    config: ViolationConfig,
    tracks: BTreeMap<u32, Occupancy>,
}

impl LaneViolationEngine {
    pub fn new(lane: LanePolygon, config: &ViolationConfig) -> Self {
        Self {
            lane,
            config: config.clone(),
            tracks: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn lane(&self) -> &LanePolygon {
        &self.lane
    }

    #[inline]
    pub fn is_allowed(&self, class: VehicleClass) -> bool {
        self.config.allowed_classes.contains(&class)
    }

    /// Feeds one observation of a track. Returns a violation on the frame
    /// the dwell threshold is reached, once per occupancy episode.
    pub fn update(
        &mut self,
        track_id: u32,
        class: VehicleClass,
        centroid: na::Point2<f64>,
        frame_index: u64,
        timestamp: f64,
    ) -> Option<Violation> {
        let allowed = self.is_allowed(class);
        let inside = self.lane.contains(&centroid);
        let dwell_frames = self.config.dwell_frames;
        let grace_misses = self.config.grace_misses;

        let occ = self.tracks.entry(track_id).or_default();
        let before = occ.state;

        // An allowed class frame during an episode counts like a frame
        // outside the lane, so a single misclassification uses up grace.
        if inside && !allowed {
            occ.grace = 0;
            match occ.state {
                OccupancyState::Outside => {
                    occ.state = OccupancyState::InsideAccumulating;
                    occ.dwell = 1;
                }
                OccupancyState::InsideAccumulating | OccupancyState::Violated => {
                    occ.dwell = occ.dwell.saturating_add(1);
                }
            }
        } else if occ.state != OccupancyState::Outside {
            occ.grace += 1;
            if occ.grace > grace_misses {
                occ.reset();
            }
        }

        let mut violation = None;
        if occ.state == OccupancyState::InsideAccumulating && occ.dwell >= dwell_frames {
            occ.state = OccupancyState::Violated;
            violation = Some(Violation {
                track_id,
                class,
                frame_index,
                timestamp,
                dwell_frames: occ.dwell,
            });
        }

        if occ.state != before {
            debug!("track {} lane state {:?} -> {:?}", track_id, before, occ.state);
        }

        if violation.is_some() {
            info!(
                "track {} ({}) violated the lane at frame {} after {} frames",
                track_id, class, frame_index, occ.dwell
            );
        }

        violation
    }

    /// Single image check: inside the lane with a class that is not allowed.
    pub fn check_instant(&self, centroid: &na::Point2<f64>, class: VehicleClass) -> bool {
        !self.is_allowed(class) && self.lane.contains(centroid)
    }

    pub fn state_of(&self, track_id: u32) -> OccupancyState {
        self.tracks
            .get(&track_id)
            .map(|o| o.state)
            .unwrap_or_default()
    }

    pub fn dwell_of(&self, track_id: u32) -> u32 {
        self.tracks.get(&track_id).map(|o| o.dwell).unwrap_or(0)
    }

    /// True when any held track is currently latched.
    pub fn any_violated(&self) -> bool {
        self.tracks.values().any(|o| o.state == OccupancyState::Violated)
    }

    pub fn remove(&mut self, track_id: u32) {
        self.tracks.remove(&track_id);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn inside() -> na::Point2<f64> {
        na::Point2::new(50.0, 50.0)
    }

    fn outside() -> na::Point2<f64> {
        na::Point2::new(500.0, 50.0)
    }

    fn engine(dwell_frames: u32, grace_misses: u32) -> LaneViolationEngine {
        let lane = LanePolygon::new(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]]).unwrap();
        let config = ViolationConfig {
            dwell_frames,
            grace_misses,
            ..Default::default()
        };
        LaneViolationEngine::new(lane, &config)
    }

    fn feed(engine: &mut LaneViolationEngine, frame: &mut u64, p: na::Point2<f64>, n: usize) -> Vec<u64> {
        let mut emitted = Vec::new();
        for _ in 0..n {
            if let Some(v) = engine.update(1, VehicleClass::Car, p, *frame, *frame as f64 / 30.0) {
                emitted.push(v.frame_index);
            }
            *frame += 1;
        }
        emitted
    }

    #[test]
    fn fires_exactly_on_tenth_inside_frame() {
        let mut e = engine(10, 2);
        let mut frame = 0;

        assert!(feed(&mut e, &mut frame, inside(), 9).is_empty());
        assert_eq!(e.state_of(1), OccupancyState::InsideAccumulating);
        assert_eq!(e.dwell_of(1), 9);

        let v = e.update(1, VehicleClass::Car, inside(), 9, 0.3).unwrap();
        assert_eq!(v.dwell_frames, 10);
        assert_eq!(v.frame_index, 9);
        assert_eq!(e.state_of(1), OccupancyState::Violated);
    }

    #[test]
    fn short_exits_keep_dwell_progress() {
        let mut e = engine(10, 2);
        let mut frame = 0;

        feed(&mut e, &mut frame, inside(), 5);
        feed(&mut e, &mut frame, outside(), 2);
        assert_eq!(e.dwell_of(1), 5);
        assert_eq!(e.state_of(1), OccupancyState::InsideAccumulating);

        feed(&mut e, &mut frame, inside(), 4);
        feed(&mut e, &mut frame, outside(), 1);
        assert_eq!(feed(&mut e, &mut frame, inside(), 1), vec![12]);
    }

    #[test]
    fn third_exit_frame_resets() {
        let mut e = engine(10, 2);
        let mut frame = 0;

        feed(&mut e, &mut frame, inside(), 5);
        feed(&mut e, &mut frame, outside(), 3);
        assert_eq!(e.dwell_of(1), 0);
        assert_eq!(e.state_of(1), OccupancyState::Outside);

        assert!(feed(&mut e, &mut frame, inside(), 9).is_empty());
        assert_eq!(feed(&mut e, &mut frame, inside(), 1).len(), 1);
    }

    #[test]
    fn latched_until_full_exit() {
        let mut e = engine(10, 2);
        let mut frame = 0;

        assert_eq!(feed(&mut e, &mut frame, inside(), 60).len(), 1);
        assert_eq!(e.dwell_of(1), 60);

        feed(&mut e, &mut frame, outside(), 2);
        assert!(feed(&mut e, &mut frame, inside(), 20).is_empty());
        assert!(e.any_violated());

        feed(&mut e, &mut frame, outside(), 3);
        assert_eq!(e.state_of(1), OccupancyState::Outside);
        assert_eq!(feed(&mut e, &mut frame, inside(), 10).len(), 1);
    }

    #[test]
    fn allowed_classes_never_violate() {
        let mut e = engine(3, 2);
        for frame in 0..20 {
            assert!(e.update(1, VehicleClass::Truck, inside(), frame, 0.0).is_none());
            assert!(e.update(2, VehicleClass::Bus, inside(), frame, 0.0).is_none());
        }
        assert_eq!(e.state_of(1), OccupancyState::Outside);
        assert!(!e.any_violated());
    }

    #[test]
    fn class_flicker_keeps_the_episode_latched() {
        let mut e = engine(10, 2);
        let emitted: Vec<u64> = (0..40u64)
            .filter_map(|frame| {
                let class = if frame == 15 { VehicleClass::Truck } else { VehicleClass::Car };
                e.update(1, class, inside(), frame, 0.0)
            })
            .map(|v| v.frame_index)
            .collect();

        assert_eq!(emitted, vec![9]);
        assert_eq!(e.state_of(1), OccupancyState::Violated);
    }

    #[test]
    fn class_flicker_keeps_dwell_progress() {
        let mut e = engine(5, 2);
        for frame in 0..4 {
            e.update(1, VehicleClass::Car, inside(), frame, 0.0);
        }
        assert!(e.update(1, VehicleClass::Bus, inside(), 4, 0.0).is_none());
        assert_eq!(e.dwell_of(1), 4);
        assert_eq!(e.state_of(1), OccupancyState::InsideAccumulating);

        let v = e.update(1, VehicleClass::Car, inside(), 5, 0.0).unwrap();
        assert_eq!(v.dwell_frames, 5);
    }

    #[test]
    fn lasting_reclassification_resets_past_grace() {
        let mut e = engine(5, 2);
        for frame in 0..4 {
            e.update(1, VehicleClass::Car, inside(), frame, 0.0);
        }
        for frame in 4..7 {
            e.update(1, VehicleClass::Truck, inside(), frame, 0.0);
        }
        assert_eq!(e.state_of(1), OccupancyState::Outside);
        assert_eq!(e.dwell_of(1), 0);

        let emitted: Vec<_> = (7..12)
            .filter_map(|frame| e.update(1, VehicleClass::Car, inside(), frame, 0.0))
            .collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].frame_index, 11);
    }

    #[test]
    fn single_frame_threshold_fires_on_entry() {
        let mut e = engine(1, 0);
        assert!(e.update(1, VehicleClass::Motorcycle, inside(), 0, 0.0).is_some());
        assert!(e.update(1, VehicleClass::Motorcycle, inside(), 1, 0.0).is_none());
    }

    #[test]
    fn instant_check_and_removal() {
        let mut e = engine(10, 2);
        assert!(e.check_instant(&inside(), VehicleClass::Car));
        assert!(!e.check_instant(&inside(), VehicleClass::Bus));
        assert!(!e.check_instant(&outside(), VehicleClass::Car));

        e.update(4, VehicleClass::Car, inside(), 0, 0.0);
        e.remove(4);
        assert!(e.is_empty());
        assert_eq!(e.state_of(4), OccupancyState::Outside);
    }
}
