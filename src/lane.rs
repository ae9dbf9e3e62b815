use nalgebra as na;

use crate::bbox::{BBox, Ltwh};
use crate::error::Error;
use crate::math;

/// Distance in pixels within which a point counts as lying on an edge.
const EDGE_EPSILON: f64 = 1e-9;

/// Smallest accepted polygon area as a fraction of its squared extent.
const AREA_EPSILON: f64 = 1e-9;

/// Restricted lane area in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct LanePolygon {
    vertices: Vec<na::Point2<f64>>,
}

impl LanePolygon {
    /// Needs at least three finite vertices enclosing a non-zero area. A
    /// closing vertex repeating the first one is dropped.
    pub fn new(points: &[[f64; 2]]) -> Result<Self, Error> {
        let mut vertices: Vec<_> = points
            .iter()
            .map(|p| na::Point2::new(p[0], p[1]))
            .collect();

        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(Error::Config(format!(
                "lane polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::Config("lane polygon has non-finite vertices".to_string()));
        }

        // Relative to the bounding box, so the check does not depend on units.
        let (min, max) = vertices.iter().fold(
            (vertices[0], vertices[0]),
            |(lo, hi), p| (lo.inf(p), hi.sup(p)),
        );
        let span = (max - min).amax();
        let area = math::polygon_area(&vertices);
        if !(span > 0.0) || area.abs() <= AREA_EPSILON * span * span {
            return Err(Error::Config(format!(
                "lane polygon encloses no area ({})",
                area
            )));
        }

        Ok(Self { vertices })
    }

    /// Converts a legacy rectangle into its four corner polygon.
    pub fn from_rect(rect: &BBox<Ltwh>) -> Result<Self, Error> {
        if !(rect.width() > 0.0 && rect.height() > 0.0) {
            return Err(Error::Config(format!(
                "lane rectangle has non-positive size {}x{}",
                rect.width(),
                rect.height()
            )));
        }

        let corners = rect.corners().map(|p| [p.x, p.y]);
        Self::new(&corners)
    }

    #[inline]
    pub fn vertices(&self) -> &[na::Point2<f64>] {
        &self.vertices
    }

    /// Crossing number test. Points on an edge or vertex are inside, which
    /// also holds for non-convex and self-touching outlines.
    pub fn contains(&self, p: &na::Point2<f64>) -> bool {
        let n = self.vertices.len();
        let mut inside = false;

        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];

            if math::on_segment(p, a, b, EDGE_EPSILON) {
                return true;
            }

            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }

        inside
    }
}
