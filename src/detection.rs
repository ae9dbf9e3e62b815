use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::{BBox, Ltrb};
use crate::error::InvalidDetection;

/// Vehicle taxonomy produced by the detector.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Motorcycle,
        VehicleClass::Bus,
        VehicleClass::Truck,
    ];

    /// Maps a COCO class id onto the vehicle taxonomy.
    pub fn from_coco_id(id: i32) -> Result<Self, InvalidDetection> {
        match id {
            2 => Ok(VehicleClass::Car),
            3 => Ok(VehicleClass::Motorcycle),
            5 => Ok(VehicleClass::Bus),
            7 => Ok(VehicleClass::Truck),
            _ => Err(InvalidDetection::UnknownClass(id)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detector output for one frame
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "score")]
    pub confidence: f32,
    pub class: VehicleClass,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class: VehicleClass) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    /// Checks the box is usable for tracking. `dims` is the frame size when
    /// known; a box may stick out of it by at most `tolerance` pixels.
    pub fn validate(&self, dims: Option<(u32, u32)>, tolerance: f64) -> Result<(), InvalidDetection> {
        if !self.bbox.is_finite() {
            return Err(InvalidDetection::NonFinite);
        }

        let (width, height) = (self.bbox.width(), self.bbox.height());
        if width <= 0.0 || height <= 0.0 {
            return Err(InvalidDetection::EmptyBox { width, height });
        }

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvalidDetection::Confidence(self.confidence));
        }

        if let Some((frame_width, frame_height)) = dims {
            let (fw, fh) = (frame_width as f64, frame_height as f64);
            let b = &self.bbox;

            if b.left() < -tolerance
                || b.top() < -tolerance
                || b.right() > fw + tolerance
                || b.bottom() > fh + tolerance
            {
                return Err(InvalidDetection::OutOfFrame {
                    frame_width,
                    frame_height,
                });
            }
        }

        Ok(())
    }
}
