use itertools::Itertools;
use munkres::{solve_assignment, WeightMatrix};
use noisy_float::prelude::r64;
use serde_derive::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::warn;

/// How detections are paired with tracks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Highest IoU first
    #[default]
    Greedy,
    /// Maximum total IoU (Hungarian algorithm)
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub track: usize,
    pub detection: usize,
    pub iou: f64,
}

/// IoU scores between tracks (rows) and detections (columns).
#[derive(Debug, Clone)]
pub struct IouMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl IouMatrix {
    pub fn from_fn<F: Fn(usize, usize) -> f64>(rows: usize, cols: usize, f: F) -> Self {
        let data = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| f(r, c))
            .collect();

        Self { rows, cols, data }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Pairs tracks with detections one-to-one, only keeping pairs whose IoU
/// is positive and at least `threshold`.
///
/// `ages` holds the age of each row's track; rows must be given in ascending
/// track id order so ties resolve the same way on every run.
pub fn assign(
    strategy: AssignmentStrategy,
    ious: &IouMatrix,
    ages: &[u32],
    threshold: f64,
) -> Vec<Assignment> {
    if ious.rows() == 0 || ious.cols() == 0 {
        return Vec::new();
    }

    match strategy {
        AssignmentStrategy::Greedy => greedy(ious, ages, threshold),
        AssignmentStrategy::Optimal => optimal(ious, threshold),
    }
}

#[inline]
fn admissible(iou: f64, threshold: f64) -> bool {
    iou > 0.0 && iou >= threshold
}

// Ties on IoU go to the younger track, then the lower track id, then the
// earlier detection.
fn greedy(ious: &IouMatrix, ages: &[u32], threshold: f64) -> Vec<Assignment> {
    let candidates = (0..ious.rows())
        .cartesian_product(0..ious.cols())
        .map(|(track, detection)| Assignment {
            track,
            detection,
            iou: ious.get(track, detection),
        })
        .filter(|a| admissible(a.iou, threshold))
        .sorted_by_key(|a| (Reverse(r64(a.iou)), ages[a.track], a.track, a.detection));

    let mut track_used = vec![false; ious.rows()];
    let mut det_used = vec![false; ious.cols()];
    let mut result = Vec::new();

    for candidate in candidates {
        if track_used[candidate.track] || det_used[candidate.detection] {
            continue;
        }

        track_used[candidate.track] = true;
        det_used[candidate.detection] = true;
        result.push(candidate);
    }

    result
}

fn optimal(ious: &IouMatrix, threshold: f64) -> Vec<Assignment> {
    // Inadmissible pairs cost more than any admissible one so they are only
    // used as padding, and get filtered out afterwards.
    const BLOCKED: f64 = 2.0;

    let n = ious.rows().max(ious.cols());
    let mut weights = Vec::with_capacity(n * n);
    for r in 0..n {
        for c in 0..n {
            let cost = if r < ious.rows() && c < ious.cols() {
                let iou = ious.get(r, c);
                if admissible(iou, threshold) {
                    1.0 - iou
                } else {
                    BLOCKED
                }
            } else {
                BLOCKED
            };
            weights.push(cost);
        }
    }

    let mut matrix = WeightMatrix::from_row_vec(n, weights);

    match solve_assignment(&mut matrix) {
        Ok(positions) => positions
            .into_iter()
            .filter(|p| p.row < ious.rows() && p.column < ious.cols())
            .map(|p| Assignment {
                track: p.row,
                detection: p.column,
                iou: ious.get(p.row, p.column),
            })
            .filter(|a| admissible(a.iou, threshold))
            .sorted_by_key(|a| a.track)
            .collect(),
        Err(err) => {
            warn!("assignment could not be solved: {:?}", err);
            Vec::new()
        }
    }
}
