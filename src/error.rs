use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Calibration Error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Invalid Detection: {0}")]
    InvalidDetection(#[from] InvalidDetection),

    #[error("Track {0} is not held by the tracker")]
    TrackNotFound(u32),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Yaml Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a calibration model can not be built. All of them are fatal at
/// startup; a pipeline never runs with a half-valid model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("expected exactly 4 image and 4 world points, got {image} and {world}")]
    InsufficientPoints { image: usize, world: usize },

    #[error("calibration point is not finite")]
    NonFinite,

    #[error("three of the {0} points are (nearly) collinear")]
    Collinear(PointSet),

    #[error("homography system is singular")]
    Singular,

    #[error("meters per pixel must be finite and positive, got {0}")]
    InvalidScale(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSet {
    Image,
    World,
}

impl std::fmt::Display for PointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointSet::Image => f.write_str("image"),
            PointSet::World => f.write_str("world"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidDetection {
    #[error("bbox has non-finite coordinates")]
    NonFinite,

    #[error("bbox has non-positive size {width}x{height}")]
    EmptyBox { width: f64, height: f64 },

    #[error("bbox lies outside the {frame_width}x{frame_height} frame")]
    OutOfFrame { frame_width: u32, frame_height: u32 },

    #[error("confidence {0} is outside [0, 1]")]
    Confidence(f32),

    #[error("unknown class id {0}")]
    UnknownClass(i32),
}
