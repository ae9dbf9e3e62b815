pub mod assignment;
pub mod bbox;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod frame;
pub mod lane;
pub mod math;
pub mod pipeline;
pub mod speed;
pub mod tracker;
pub mod violation;

mod circular_queue;
mod track;

pub use config::SiteConfig;
pub use detection::{Detection, VehicleClass};
pub use events::{EventLog, EventSink, ViolationEvent};
pub use frame::Frame;
pub use pipeline::{FrameReport, Pipeline};
pub use track::{Track, TrackPoint, TrackUpdate};

use error::Error;
use std::collections::HashMap;
use std::rc::Rc;

pub trait Monitoring {
    fn process(&mut self, src: &str, frame: &Frame) -> Result<FrameReport, Error>;
    fn tracks(&self, src: &str) -> Rc<[Track]>;
    fn drain_events(&mut self, src: &str) -> Vec<ViolationEvent>;
}

/// Runs one independent pipeline per source, all built from the same site
/// config.
pub struct MultiSourceMonitor {
    config: SiteConfig,
    pipelines: HashMap<String, Pipeline<EventLog>>,
}

impl MultiSourceMonitor {
    pub fn new(config: SiteConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            pipelines: HashMap::new(),
        })
    }

    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    #[inline]
    pub fn pipeline(&self, src: &str) -> Option<&Pipeline<EventLog>> {
        self.pipelines.get(src)
    }
}

impl crate::Monitoring for MultiSourceMonitor {
    fn process(&mut self, src: &str, frame: &Frame) -> Result<FrameReport, Error> {
        let pipeline = match self.pipelines.get_mut(src) {
            Some(pipeline) => pipeline,
            None => {
                let log = EventLog::new(self.config.event_log_capacity);
                let pipeline = Pipeline::new(&self.config, src, log)?.with_source(src);

                self.pipelines.entry(src.to_string()).or_insert(pipeline)
            }
        };

        Ok(pipeline.process(frame))
    }

    #[inline]
    fn tracks(&self, src: &str) -> Rc<[Track]> {
        if let Some(pipeline) = self.pipelines.get(src) {
            return pipeline.tracker().tracks().cloned().collect();
        }

        Rc::new([])
    }

    fn drain_events(&mut self, src: &str) -> Vec<ViolationEvent> {
        self.pipelines
            .get_mut(src)
            .map(|p| p.sink_mut().drain())
            .unwrap_or_default()
    }
}
