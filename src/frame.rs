use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

/// Everything the detector reports for one video frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    /// in seconds
    pub timestamp: f64,
    #[serde(default)]
    pub dims: Option<(u32, u32)>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            index,
            timestamp,
            dims: None,
            detections,
        }
    }

    /// Frame at `index` of a constant rate stream.
    pub fn at_rate(index: u64, fps: f64, detections: Vec<Detection>) -> Self {
        Self::new(index, index as f64 / fps, detections)
    }

    pub fn with_dims(mut self, width: u32, height: u32) -> Self {
        self.dims = Some((width, height));
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
