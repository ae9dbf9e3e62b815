//! Pixel to ground-plane mapping.
//!
//! Every tracked point is assumed to lie on the calibrated road plane. Camera
//! height and anything moving out of that plane are not modelled, so world
//! positions of tall vehicles are an approximation.

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CalibrationError, PointSet};
use crate::math;

/// Relative triangle area below which three calibration points count as
/// collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Full perspective correction from four correspondences
    Homography,
    /// Single meters-per-pixel factor, no perspective correction
    SimpleScale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationModel {
    Homography(na::Matrix3<f64>),
    SimpleScale(f64),
}

impl CalibrationModel {
    /// Fits the homography mapping each image point onto its world point
    /// (meters on the road plane).
    pub fn from_correspondences(
        image_points: &[[f64; 2]],
        world_points: &[[f64; 2]],
    ) -> Result<Self, CalibrationError> {
        if image_points.len() != 4 || world_points.len() != 4 {
            return Err(CalibrationError::InsufficientPoints {
                image: image_points.len(),
                world: world_points.len(),
            });
        }

        if image_points
            .iter()
            .chain(world_points.iter())
            .flatten()
            .any(|v| !v.is_finite())
        {
            return Err(CalibrationError::NonFinite);
        }

        let to_points = |raw: &[[f64; 2]]| -> [na::Point2<f64>; 4] {
            [0, 1, 2, 3].map(|i| na::Point2::new(raw[i][0], raw[i][1]))
        };
        let src = to_points(image_points);
        let dst = to_points(world_points);

        if math::has_collinear_triple(&src, COLLINEAR_TOLERANCE) {
            return Err(CalibrationError::Collinear(PointSet::Image));
        }

        if math::has_collinear_triple(&dst, COLLINEAR_TOLERANCE) {
            return Err(CalibrationError::Collinear(PointSet::World));
        }

        let h = math::fit_homography(&src, &dst).ok_or(CalibrationError::Singular)?;
        debug!("fitted ground plane homography: {:?}", h);

        Ok(CalibrationModel::Homography(h))
    }

    pub fn from_scale(meters_per_pixel: f64) -> Result<Self, CalibrationError> {
        if !meters_per_pixel.is_finite() || meters_per_pixel <= 0.0 {
            return Err(CalibrationError::InvalidScale(meters_per_pixel));
        }

        warn!(
            "using simple scale calibration ({} m/px), speeds are not perspective corrected",
            meters_per_pixel
        );

        Ok(CalibrationModel::SimpleScale(meters_per_pixel))
    }

    #[inline]
    pub fn mode(&self) -> CalibrationMode {
        match self {
            CalibrationModel::Homography(_) => CalibrationMode::Homography,
            CalibrationModel::SimpleScale(_) => CalibrationMode::SimpleScale,
        }
    }

    /// World position in meters. `None` only for pixels on the horizon line
    /// of the homography.
    pub fn pixel_to_world(&self, px: f64, py: f64) -> Option<na::Point2<f64>> {
        match self {
            CalibrationModel::Homography(h) => math::project(h, &na::Point2::new(px, py)),
            CalibrationModel::SimpleScale(scale) => Some(na::Point2::new(px * scale, py * scale)),
        }
    }

    #[inline]
    pub fn distance_meters(a: &na::Point2<f64>, b: &na::Point2<f64>) -> f64 {
        na::distance(a, b)
    }
}
