use nalgebra as na;
use std::collections::BTreeMap;
use tracing::debug;

use crate::calibration::CalibrationModel;
use crate::circular_queue::CircularQueue;
use crate::config::SpeedConfig;

const MPS_TO_KPH: f64 = 3.6;

#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: f64,
    pixel: na::Point2<f64>,
    world: na::Point2<f64>,
}

#[derive(Debug)]
struct TrackSpeed {
    samples: CircularQueue<Sample>,
    smoothed: Option<f64>,
    reports: u32,
}

impl TrackSpeed {
    fn new(cap: usize) -> Self {
        Self {
            samples: CircularQueue::with_capacity(cap),
            smoothed: None,
            reports: 0,
        }
    }
}

/// Smoothed per-track ground speed in km/h.
#[derive(Debug)]
pub struct SpeedEstimator {
    model: Option<CalibrationModel>,
    config: SpeedConfig,
    tracks: BTreeMap<u32, TrackSpeed>,
}

impl SpeedEstimator {
    /// Without a calibration model every speed stays undefined.
    pub fn new(model: Option<CalibrationModel>, config: &SpeedConfig) -> Self {
        Self {
            model,
            config: config.clone(),
            tracks: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.model.is_some()
    }

    pub fn update(&mut self, track_id: u32, centroid: na::Point2<f64>, timestamp: f64) -> Option<f64> {
        let model = self.model.as_ref()?;
        let world = model.pixel_to_world(centroid.x, centroid.y)?;

        let cfg = &self.config;
        let state = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| TrackSpeed::new(cfg.history_len));

        if let Some(last) = state.samples.newest() {
            if timestamp <= last.timestamp {
                return state.smoothed;
            }
        }

        let reference = state
            .samples
            .iter()
            .find(|s| timestamp - s.timestamp <= cfg.max_lag_sec)
            .copied();

        state.samples.push(Sample {
            timestamp,
            pixel: centroid,
            world,
        });

        let reference = match reference {
            Some(r) if timestamp - r.timestamp >= cfg.min_lag_sec => r,
            _ => return state.smoothed,
        };

        let dt = timestamp - reference.timestamp;
        let pixel_rate = na::distance(&reference.pixel, &centroid) / dt;

        let instant = if pixel_rate < cfg.min_pixels_per_sec {
            0.0
        } else {
            CalibrationModel::distance_meters(&reference.world, &world) / dt * MPS_TO_KPH
        };

        let smoothed = match state.smoothed {
            Some(prev) => cfg.ema_alpha * instant + (1.0 - cfg.ema_alpha) * prev,
            None => instant,
        };

        debug!(
            "track {} speed {:.1} km/h (instant {:.1} over {:.3}s)",
            track_id, smoothed, instant, dt
        );

        state.smoothed = Some(smoothed);
        state.smoothed
    }

    /// Last smoothed speed of a track.
    #[inline]
    pub fn speed(&self, track_id: u32) -> Option<f64> {
        self.tracks.get(&track_id).and_then(|s| s.smoothed)
    }

    /// True on every `report_every_n_frames`-th call per track, first on
    /// the n-th one.
    pub fn should_report(&mut self, track_id: u32) -> bool {
        let every = self.config.report_every_n_frames.max(1);
        let cap = self.config.history_len;
        let state = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| TrackSpeed::new(cap));

        state.reports += 1;
        if state.reports >= every {
            state.reports = 0;
            true
        } else {
            false
        }
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
