//! motormag: Acquire and analyse magnetic field scans
//!
//! This crate provides:
//! - Box scan planning and execution over a motion stage and field probe
//! - Reshaping of flat sample tables into 3-D grids
//! - Field amplitude, gradients and relative gradient maps
//! - 2-D cut planes through a scanned volume
//! - Alignment of two scans (background subtraction, normalisation)
//!
//! Positions are in mm and fields in mT unless noted otherwise.

pub mod align;
pub mod amplitude;
pub mod device;
pub mod error;
pub mod gradient;
pub mod grid;
pub mod interp;
mod mesh;
pub mod plane;
pub mod probe;
pub mod scan;
pub mod sim;
pub mod table;

pub use align::{divide, interpolate, subtract};
pub use amplitude::{amplitude, table_amplitude};
pub use device::{FieldProbe, MotionDevice, MoveProfile, ProbeReading};
pub use error::{MagError, MagResult};
pub use gradient::{gradient, gradient_squared, relative_gradient_squared, GradientMap};
pub use grid::{reshape, reshape_within, CoordinateField, Grid3, ValueField};
pub use plane::{resolve_cut_index, resolve_fixed_axis, slice, strength_plane, CutPlane};
pub use scan::{BoxScan, RangeDef, ScanConfig, ScanOrder, ScanPlan};
pub use table::{Axis, GridMetadata, GridShape, Sample, SampleTable, StepSizes};

use nalgebra::Vector3;

/// Closeness test for coordinates, `|a - b| <= atol + rtol * |b|`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { rtol: 1e-5, atol: 1e-8 }
    }
}

impl Tolerance {
    pub fn close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.of(b)
    }

    /// Allowed deviation around `x`
    pub fn of(&self, x: f64) -> f64 {
        self.atol + self.rtol * x.abs()
    }
}

/// Which recorded step size divides a difference of component `i` along
/// direction `j`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPairing {
    /// Step of axis `i`, matching how existing analyses were computed
    #[default]
    FieldAxis,
    /// Step of axis `j`, the textbook derivative
    Direction,
}

/// Where the reference field of a relative gradient map is taken
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ReferencePoint {
    /// Center of the sampled bounding box
    #[default]
    BoundingBoxCenter,
    Fixed(Vector3<f64>),
}

/// Configuration for the analysis functions
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisConfig {
    /// Used when matching cut positions and aligning scans
    pub tolerance: Tolerance,
    pub step_pairing: StepPairing,
    pub reference: ReferencePoint,
}
