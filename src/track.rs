use nalgebra as na;
use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::detection::{Detection, VehicleClass};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub frame_index: u64,
    // in seconds
    pub timestamp: f64,
    pub centroid: na::Point2<f64>,
}

/// Long-lived identity, owned by the tracker.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: BBox<Ltrb>,
    pub class: VehicleClass,
    pub confidence: f32,
    pub history: CircularQueue<TrackPoint>,
    /// consecutive frames without a matching detection
    pub age: u32,
    /// frames with a matching detection, including the first one
    pub hits: u32,
}

impl Track {
    pub fn new(id: u32, frame_index: u64, timestamp: f64, det: &Detection, history_len: usize) -> Self {
        let mut history = CircularQueue::with_capacity(history_len);
        history.push(TrackPoint {
            frame_index,
            timestamp,
            centroid: det.bbox.centroid(),
        });

        Self {
            id,
            bbox: det.bbox,
            class: det.class,
            confidence: det.confidence,
            history,
            age: 0,
            hits: 1,
        }
    }

    pub fn update(&mut self, frame_index: u64, timestamp: f64, det: &Detection) {
        self.bbox = det.bbox;
        self.class = det.class;
        self.confidence = det.confidence;
        self.age = 0;
        self.hits += 1;
        self.history.push(TrackPoint {
            frame_index,
            timestamp,
            centroid: det.bbox.centroid(),
        });
    }

    #[inline]
    pub fn mark_missed(&mut self) {
        self.age += 1;
    }

    #[inline]
    pub fn centroid(&self) -> na::Point2<f64> {
        self.bbox.centroid()
    }

    #[inline]
    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.history.newest()
    }
}

/// Per-frame tracker output for one matched or newly created track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackUpdate {
    pub track_id: u32,
    pub bbox: BBox<Ltrb>,
    pub class: VehicleClass,
    pub confidence: f32,
    pub is_new: bool,
}

impl TrackUpdate {
    pub fn from_track(track: &Track, is_new: bool) -> Self {
        Self {
            track_id: track.id,
            bbox: track.bbox,
            class: track.class,
            confidence: track.confidence,
            is_new,
        }
    }

    #[inline]
    pub fn centroid(&self) -> na::Point2<f64> {
        self.bbox.centroid()
    }
}
