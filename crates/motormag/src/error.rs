//! Error types shared by the analysis core, the scan driver and the devices

use thiserror::Error;

use crate::table::Axis;

#[derive(Error, Debug)]
pub enum MagError {
    #[error("Table has {actual} samples but grid shape {shape:?} needs {expected}")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("No grid shape given and none attached to the table")]
    MissingShapeMetadata,

    #[error("Table has no samples")]
    EmptyTable,

    #[error("Row order does not follow the x-major/z-minor grid traversal along {axis}")]
    TraversalMismatch { axis: Axis },

    #[error("Failed to resolve cut axis automatically: all 3 axes changed")]
    AmbiguousCutAxis,

    #[error("2-D data required for a cut plane, got {fixed} fixed axes")]
    InsufficientDimensionality { fixed: usize },

    #[error("Requested cut position {axis}={position} not in scanned data")]
    PositionNotFound { axis: Axis, position: f64 },

    #[error("Cut index {index} out of range for axis {axis} with {len} points")]
    CutIndexOutOfRange { axis: Axis, index: usize, len: usize },

    #[error("Gradient along {axis} is undefined: only one grid point")]
    UnsupportedGradientAxis { axis: Axis },

    #[error("Channel not present in table: {0}")]
    InvalidChannelSelection(String),

    #[error("Sample {row} has {actual} values, table declares {expected} channels")]
    InvalidSample {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid scan definition: {0}")]
    InvalidScan(String),

    #[error("Motor stage not at zero ({x:.2}, {y:.2}, {z:.2}): drive to zero before scanning")]
    StageNotAtOrigin { x: f64, y: f64, z: f64 },

    #[error("Device error: {0}")]
    Device(String),

    #[error("No valid probe frame after {attempts} reads, last: {last:?}")]
    ProbeFrame { attempts: usize, last: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MagResult<T> = Result<T, MagError>;
