use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::assignment::AssignmentStrategy;
use crate::bbox::BBox;
use crate::calibration::CalibrationModel;
use crate::detection::VehicleClass;
use crate::error::{CalibrationError, Error};
use crate::lane::LanePolygon;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to continue a track.
    pub match_thresh: f64,
    /// Frames a track survives without a matching detection.
    pub track_buffer: u32,
    /// Centroids kept per track.
    pub history_len: usize,
    pub assignment: AssignmentStrategy,
    /// Only match detections to tracks of the same class.
    pub class_aware: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_thresh: 0.5,
            track_buffer: 30,
            history_len: 30,
            assignment: AssignmentStrategy::Greedy,
            class_aware: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    /// EMA weight of the newest instantaneous speed.
    pub ema_alpha: f64,
    /// Centroid motion below this rate reads as standing still.
    pub min_pixels_per_sec: f64,
    /// Samples kept per track.
    pub history_len: usize,
    /// Shortest reference interval for an instantaneous speed, seconds.
    pub min_lag_sec: f64,
    /// Longest reference interval for an instantaneous speed, seconds.
    pub max_lag_sec: f64,
    /// Display throttle, see `SpeedEstimator::should_report`.
    pub report_every_n_frames: u32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            min_pixels_per_sec: 3.0,
            history_len: 30,
            min_lag_sec: 0.1,
            max_lag_sec: 0.5,
            report_every_n_frames: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViolationConfig {
    /// Consecutive inside frames needed to confirm a violation.
    pub dwell_frames: u32,
    /// Outside frames tolerated without losing dwell progress.
    pub grace_misses: u32,
    /// Classes that may use the lane.
    #[serde(alias = "classes_truck_ok")]
    pub allowed_classes: BTreeSet<VehicleClass>,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            dwell_frames: 10,
            grace_misses: 2,
            allowed_classes: [VehicleClass::Truck, VehicleClass::Bus].into_iter().collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HomographyConfig {
    pub image_points: Vec<[f64; 2]>,
    pub world_points: Vec<[f64; 2]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimpleScaleConfig {
    #[serde(default = "default_meters_per_pixel")]
    pub meters_per_pixel: f64,
}

fn default_meters_per_pixel() -> f64 {
    0.025
}

/// Legacy lane rectangle, left top corner plus size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LaneRect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
}

/// Everything one camera site needs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// Source identifier used in event ids.
    pub site: String,
    /// Overrides the stream frame rate.
    #[serde(alias = "fps_override")]
    pub fps: Option<f64>,
    #[serde(alias = "truck_bus_lane_polygon")]
    pub lane_polygon: Option<Vec<[f64; 2]>>,
    #[serde(alias = "truck_bus_lane_rect")]
    pub lane_rect: Option<LaneRect>,
    pub homography: Option<HomographyConfig>,
    pub simple_scale: Option<SimpleScaleConfig>,
    /// How far a detection box may reach outside the frame.
    pub frame_tolerance_px: f64,
    /// Events kept by the in-memory event log.
    pub event_log_capacity: usize,
    pub tracker: TrackerConfig,
    pub speed: SpeedConfig,
    pub violation: ViolationConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: "site".to_string(),
            fps: None,
            lane_polygon: None,
            lane_rect: None,
            homography: None,
            simple_scale: None,
            frame_tolerance_px: 20.0,
            event_log_capacity: 1024,
            tracker: TrackerConfig::default(),
            speed: SpeedConfig::default(),
            violation: ViolationConfig::default(),
        }
    }
}

impl SiteConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, Error> {
        let config: SiteConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.tracker;
        if !(t.match_thresh > 0.0 && t.match_thresh <= 1.0) {
            return Err(Error::Config(format!(
                "match_thresh must be in (0, 1], got {}",
                t.match_thresh
            )));
        }

        if t.history_len == 0 {
            return Err(Error::Config("tracker history_len must be at least 1".to_string()));
        }

        if !(self.frame_tolerance_px >= 0.0 && self.frame_tolerance_px.is_finite()) {
            return Err(Error::Config(format!(
                "frame_tolerance_px must be finite and non-negative, got {}",
                self.frame_tolerance_px
            )));
        }

        let s = &self.speed;
        if !(s.ema_alpha > 0.0 && s.ema_alpha <= 1.0) {
            return Err(Error::Config(format!(
                "ema_alpha must be in (0, 1], got {}",
                s.ema_alpha
            )));
        }

        if !(s.min_pixels_per_sec >= 0.0) {
            return Err(Error::Config(format!(
                "min_pixels_per_sec must be non-negative, got {}",
                s.min_pixels_per_sec
            )));
        }

        if !(s.min_lag_sec > 0.0 && s.min_lag_sec <= s.max_lag_sec) {
            return Err(Error::Config(format!(
                "speed lag window [{}, {}] is empty",
                s.min_lag_sec, s.max_lag_sec
            )));
        }

        if self.violation.dwell_frames == 0 {
            return Err(Error::Config("dwell_frames must be at least 1".to_string()));
        }

        // Two samples are the least a displacement needs.
        if s.history_len < 2 {
            return Err(Error::Config(format!(
                "speed history_len must be at least 2, got {}",
                s.history_len
            )));
        }

        if let Some(fps) = self.fps {
            if !(fps > 0.0 && fps.is_finite()) {
                return Err(Error::Config(format!("fps must be positive, got {}", fps)));
            }

            let span = (s.history_len - 1) as f64 / fps;
            if span < s.min_lag_sec {
                return Err(Error::Config(format!(
                    "speed history of {} frames spans {:.3}s at {} fps, shorter than min_lag_sec {}",
                    s.history_len, span, fps, s.min_lag_sec
                )));
            }
        }

        self.lane()?;

        Ok(())
    }

    /// The restricted lane. A polygon wins over a legacy rectangle.
    pub fn lane(&self) -> Result<LanePolygon, Error> {
        match (&self.lane_polygon, &self.lane_rect) {
            (Some(points), _) => LanePolygon::new(points),
            (None, Some(r)) => LanePolygon::from_rect(&BBox::ltwh(r.x, r.y, r.w, r.h)),
            (None, None) => Err(Error::Config("no lane polygon or rectangle configured".to_string())),
        }
    }

    /// Homography wins over a simple scale. `Ok(None)` when neither is
    /// configured.
    pub fn calibration(&self) -> Result<Option<CalibrationModel>, CalibrationError> {
        if let Some(h) = &self.homography {
            return CalibrationModel::from_correspondences(&h.image_points, &h.world_points).map(Some);
        }

        if let Some(s) = &self.simple_scale {
            return CalibrationModel::from_scale(s.meters_per_pixel).map(Some);
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationMode;

    const SITE: &str = r#"
site: bridge_north
fps_override: 25
truck_bus_lane_polygon: [[100, 400], [300, 400], [320, 700], [80, 700]]
homography:
  image_points: [[420, 380], [860, 380], [1180, 700], [100, 700]]
  world_points: [[0, 0], [7, 0], [7, 30], [0, 30]]
violation:
  dwell_frames: 12
  classes_truck_ok: [truck]
speed:
  ema_alpha: 0.3
"#;

    #[test]
    fn loads_site_yaml_with_defaults() {
        let config = SiteConfig::from_yaml_str(SITE).unwrap();
        assert_eq!(config.site, "bridge_north");
        assert_eq!(config.fps, Some(25.0));
        assert_eq!(config.violation.dwell_frames, 12);
        assert_eq!(config.violation.grace_misses, 2);
        assert_eq!(
            config.violation.allowed_classes,
            [VehicleClass::Truck].into_iter().collect()
        );
        assert_eq!(config.speed.ema_alpha, 0.3);
        assert_eq!(config.speed.report_every_n_frames, 3);
        assert_eq!(config.tracker, TrackerConfig::default());

        assert_eq!(config.lane().unwrap().vertices().len(), 4);
        let model = config.calibration().unwrap().unwrap();
        assert_eq!(model.mode(), CalibrationMode::Homography);
    }

    #[test]
    fn legacy_rectangle_and_simple_scale() {
        let config = SiteConfig::from_yaml_str(
            r#"
truck_bus_lane_rect: {x: 10, y: 20, w: 100, h: 50}
simple_scale: {}
"#,
        )
        .unwrap();

        let lane = config.lane().unwrap();
        assert_eq!(lane.vertices().len(), 4);
        let model = config.calibration().unwrap().unwrap();
        assert_eq!(model, CalibrationModel::SimpleScale(0.025));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SiteConfig::from_yaml_str("lane_polygon: [[0, 0], [1, 1]]").is_err());
        assert!(SiteConfig::from_yaml_str("lane_polygon: [[0, 0], [5, 5], [10, 10]]").is_err());
        assert!(SiteConfig::from_yaml_str("tracker: {match_thresh: 0}").is_err());

        let mut config = SiteConfig::default();
        config.lane_polygon = Some(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]);
        assert!(config.validate().is_ok());

        config.violation.dwell_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_tolerance_and_history() {
        let mut config = SiteConfig::default();
        config.lane_polygon = Some(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]);

        config.frame_tolerance_px = f64::NAN;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.frame_tolerance_px = -1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.frame_tolerance_px = 0.0;
        assert!(config.validate().is_ok());

        config.tracker.history_len = 0;
        assert!(config.validate().is_err());
        config.tracker.history_len = 30;

        config.speed.history_len = 1;
        assert!(config.validate().is_err());

        // Three frames at 25 fps span 0.08s, short of the 0.1s minimum lag.
        config.fps = Some(25.0);
        config.speed.history_len = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.speed.history_len = 4;
        assert!(config.validate().is_ok());

        // Without a frame rate the span is unknown.
        config.fps = None;
        config.speed.history_len = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_calibration_is_not_an_error() {
        let config = SiteConfig::default();
        assert_eq!(config.calibration(), Ok(None));
    }
}
