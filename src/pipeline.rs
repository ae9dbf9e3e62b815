use serde_derive::Serialize;
use tracing::{debug, warn};

use crate::bbox::{BBox, Ltrb};
use crate::config::SiteConfig;
use crate::detection::{Detection, VehicleClass};
use crate::error::Error;
use crate::events::{EventSink, ViolationEvent};
use crate::frame::Frame;
use crate::speed::SpeedEstimator;
use crate::tracker::Tracker;
use crate::violation::{LaneViolationEngine, OccupancyState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    pub track_id: u32,
    pub bbox: BBox<Ltrb>,
    pub class: VehicleClass,
    pub confidence: f32,
    pub is_new: bool,
    pub speed_kph: Option<f64>,
    /// Whether an overlay should refresh the displayed speed this frame.
    pub display_speed: bool,
    pub state: OccupancyState,
}

impl TrackReport {
    #[inline]
    pub fn violated(&self) -> bool {
        self.state == OccupancyState::Violated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub dropped_detections: usize,
    pub tracks: Vec<TrackReport>,
    pub evicted: Vec<u32>,
    pub events: Vec<ViolationEvent>,
    /// Some held track is currently latched as violating.
    pub lane_violated: bool,
}

/// Per-source frame orchestrator: tracking, then speed and lane occupancy
/// per track, then event publishing.
pub struct Pipeline<S: EventSink> {
    source: String,
    media: String,
    frame_tolerance: f64,
    tracker: Tracker,
    speed: SpeedEstimator,
    violations: LaneViolationEngine,
    sink: S,
    frames: u64,
}

impl<S: EventSink> Pipeline<S> {
    /// Fails on an invalid config, lane or calibration.
    pub fn new(config: &SiteConfig, media: &str, sink: S) -> Result<Self, Error> {
        config.validate()?;

        let lane = config.lane()?;
        let model = config.calibration()?;
        if model.is_none() {
            warn!("no calibration configured, speeds stay unknown");
        }

        Ok(Self {
            source: config.site.clone(),
            media: media.to_string(),
            frame_tolerance: config.frame_tolerance_px,
            tracker: Tracker::new(&config.tracker),
            speed: SpeedEstimator::new(model, &config.speed),
            violations: LaneViolationEngine::new(lane, &config.violation),
            sink,
            frames: 0,
        })
    }

    /// Overrides the source id used in event ids.
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn process(&mut self, frame: &Frame) -> FrameReport {
        let detections = self.valid_detections(frame);
        let dropped = frame.len() - detections.len();

        let output = self.tracker.update(frame.index, frame.timestamp, &detections);

        for id in &output.evicted {
            self.speed.remove(*id);
            self.violations.remove(*id);
        }

        let mut tracks = Vec::with_capacity(output.updates.len());
        let mut events = Vec::new();

        for update in &output.updates {
            let id = update.track_id;
            if !self.tracker.contains(id) {
                panic!("{}", Error::TrackNotFound(id));
            }

            let centroid = update.centroid();
            let speed_kph = self.speed.update(id, centroid, frame.timestamp);
            let display_speed = self.speed.should_report(id);

            let violation =
                self.violations
                    .update(id, update.class, centroid, frame.index, frame.timestamp);

            if let Some(violation) = violation {
                let event = ViolationEvent::new(&self.source, &self.media, &violation, speed_kph);
                self.sink.publish(&event);
                events.push(event);
            }

            tracks.push(TrackReport {
                track_id: id,
                bbox: update.bbox,
                class: update.class,
                confidence: update.confidence,
                is_new: update.is_new,
                speed_kph,
                display_speed,
                state: self.violations.state_of(id),
            });
        }

        self.frames += 1;

        FrameReport {
            frame_index: frame.index,
            timestamp: frame.timestamp,
            dropped_detections: dropped,
            tracks,
            evicted: output.evicted,
            events,
            lane_violated: self.violations.any_violated(),
        }
    }

    /// Still image mode: indices of the valid detections standing in the
    /// lane with a class that is not allowed there. No state is touched.
    pub fn check_still(&self, frame: &Frame) -> Vec<usize> {
        frame
            .iter()
            .enumerate()
            .filter(|(_, det)| det.validate(frame.dims, self.frame_tolerance).is_ok())
            .filter(|(_, det)| self.violations.check_instant(&det.bbox.centroid(), det.class))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn valid_detections(&self, frame: &Frame) -> Vec<Detection> {
        frame
            .iter()
            .enumerate()
            .filter_map(|(idx, det)| match det.validate(frame.dims, self.frame_tolerance) {
                Ok(()) => Some(*det),
                Err(err) => {
                    warn!("frame {}: dropping detection {}: {}", frame.index, idx, err);
                    None
                }
            })
            .collect()
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn speed(&self) -> &SpeedEstimator {
        &self.speed
    }

    #[inline]
    pub fn violations(&self) -> &LaneViolationEngine {
        &self.violations
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        debug!("pipeline {} closed after {} frames", self.source, self.frames);
        self.sink
    }

    #[inline]
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;

    fn config() -> SiteConfig {
        SiteConfig {
            site: "test".to_string(),
            lane_polygon: Some(vec![[0.0, 0.0], [400.0, 0.0], [400.0, 400.0], [0.0, 400.0]]),
            simple_scale: Some(crate::config::SimpleScaleConfig {
                meters_per_pixel: 0.05,
            }),
            ..Default::default()
        }
    }

    fn car(x: f64) -> Detection {
        Detection::new(BBox::ltrb(x, 100.0, x + 80.0, 160.0), 0.8, VehicleClass::Car)
    }

    #[test]
    fn violation_event_carries_speed_and_id() {
        let mut pipeline = Pipeline::new(&config(), "clip.mp4", EventLog::new(16)).unwrap();

        let mut events = Vec::new();
        for i in 0..12u64 {
            let frame = Frame::at_rate(i, 10.0, vec![car(50.0 + 5.0 * i as f64)]).with_dims(640, 480);
            let report = pipeline.process(&frame);
            assert_eq!(report.tracks.len(), 1);
            events.extend(report.events);
        }

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_id, "test_00000009_t1");
        assert_eq!(event.media, "clip.mp4");
        assert_eq!(event.dwell_frames, 10);
        // 5 px per frame at 10 fps and 0.05 m/px is 2.5 m/s.
        assert!((event.speed_kph.unwrap() - 9.0).abs() < 1e-6);

        assert_eq!(pipeline.sink().len(), 1);
        assert_eq!(pipeline.frames_processed(), 12);
    }

    #[test]
    fn invalid_detections_are_dropped() {
        let mut pipeline = Pipeline::new(&config(), "clip.mp4", Vec::new()).unwrap();

        let bad = Detection::new(BBox::ltrb(10.0, 10.0, 10.0, 50.0), 0.9, VehicleClass::Car);
        let far = Detection::new(BBox::ltrb(2000.0, 10.0, 2100.0, 50.0), 0.9, VehicleClass::Car);
        let frame = Frame::new(0, 0.0, vec![bad, car(50.0), far]).with_dims(640, 480);

        let report = pipeline.process(&frame);
        assert_eq!(report.dropped_detections, 2);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].track_id, 1);
    }

    #[test]
    fn still_image_check() {
        let pipeline = Pipeline::new(&config(), "still.jpg", Vec::new()).unwrap();
        let truck = Detection::new(BBox::ltrb(10.0, 10.0, 90.0, 60.0), 0.9, VehicleClass::Truck);
        let outside = Detection::new(BBox::ltrb(500.0, 10.0, 580.0, 60.0), 0.9, VehicleClass::Car);
        let frame = Frame::new(0, 0.0, vec![truck, outside, car(50.0)]);

        assert_eq!(pipeline.check_still(&frame), vec![2]);
        assert!(pipeline.tracker().is_empty());
    }

    #[test]
    fn bad_calibration_fails_fast() {
        let mut config = config();
        config.simple_scale = None;
        config.homography = Some(crate::config::HomographyConfig {
            image_points: vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 0.0]],
            world_points: vec![[0.0, 0.0], [7.0, 0.0], [7.0, 30.0], [0.0, 30.0]],
        });

        assert!(matches!(
            Pipeline::new(&config, "clip.mp4", Vec::new()),
            Err(Error::Calibration(_))
        ));
    }
}
