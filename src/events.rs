use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

use crate::detection::VehicleClass;
use crate::error::Error;
use crate::violation::Violation;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    #[serde(rename = "TRUCK_BUS_LANE")]
    TruckBusLane,
}

/// A confirmed violation with everything an event log needs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub event_id: String,
    pub media: String,
    pub timestamp_ms: f64,
    #[serde(rename = "frame_num")]
    pub frame_index: u64,
    pub track_id: u32,
    pub class: VehicleClass,
    #[serde(rename = "violation")]
    pub kind: ViolationKind,
    pub dwell_frames: u32,
    /// `None` when the speed could not be estimated.
    pub speed_kph: Option<f64>,
}

impl ViolationEvent {
    pub fn new(source: &str, media: &str, violation: &Violation, speed_kph: Option<f64>) -> Self {
        Self {
            event_id: format!(
                "{}_{:08}_t{}",
                source, violation.frame_index, violation.track_id
            ),
            media: media.to_string(),
            timestamp_ms: violation.timestamp * 1000.0,
            frame_index: violation.frame_index,
            track_id: violation.track_id,
            class: violation.class,
            kind: ViolationKind::TruckBusLane,
            dwell_frames: violation.dwell_frames,
            speed_kph,
        }
    }
}

/// Receives every violation event as it is confirmed.
pub trait EventSink {
    fn publish(&mut self, event: &ViolationEvent);
}

impl EventSink for Vec<ViolationEvent> {
    fn publish(&mut self, event: &ViolationEvent) {
        self.push(event.clone());
    }
}

/// In-memory sink keeping the most recent events.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<ViolationEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &ViolationEvent> {
        self.events.iter()
    }

    pub fn drain(&mut self) -> Vec<ViolationEvent> {
        self.events.drain(..).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for EventLog {
    fn publish(&mut self, event: &ViolationEvent) {
        if self.events.len() >= self.capacity {
            warn!("event log full ({} events), dropping oldest", self.capacity);
            self.events.pop_front();
        }

        self.events.push_back(event.clone());
    }
}

/// Summary of one processed media file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventLogRecord {
    /// When the record was produced, RFC 3339 on disk.
    pub timestamp: DateTime<Utc>,
    pub media: String,
    pub site_config: String,
    pub total_frames: u64,
    pub fps: Option<f64>,
    pub violations: Vec<ViolationEvent>,
}

impl EventLogRecord {
    /// Record stamped with the current time.
    pub fn new(
        media: &str,
        site_config: &str,
        total_frames: u64,
        fps: Option<f64>,
        violations: Vec<ViolationEvent>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            media: media.to_string(),
            site_config: site_config.to_string(),
            total_frames,
            fps,
            violations,
        }
    }

    /// `{site}_video_{YYYYmmdd_HHMMSS}.json`, named after the record time.
    pub fn default_file_name(&self, site: &str) -> String {
        format!("{}_video_{}.json", site, self.timestamp.format("%Y%m%d_%H%M%S"))
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;

        info!(
            "saved {} violation event(s) to {}",
            self.violations.len(),
            path.display()
        );

        Ok(())
    }
}
