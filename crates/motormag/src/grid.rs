//! Folding a flat sample table back into 3-D coordinate and value arrays.
//!
//! Rows are expected in the canonical traversal order: x moves slowest and z
//! fastest, i.e. the flatten order of an `(nx, ny, nz)` row-major array. The
//! scan driver always stores tables in this order regardless of the order the
//! stage visited the points in. A table sorted any other way would silently
//! pair values with the wrong coordinates, so every reshape checks that each
//! coordinate array only varies along its own axis and does so monotonically.

use std::collections::BTreeMap;

use ndarray::{Array3, Axis as NdAxis};

use crate::error::{MagError, MagResult};
use crate::table::{Axis, GridShape, SampleTable};
use crate::Tolerance;

/// A 3-D array indexed `[i, j, k]` along x, y, z
pub type Grid3 = Array3<f64>;

/// Per-axis coordinate arrays sharing one grid shape
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateField {
    pub x: Grid3,
    pub y: Grid3,
    pub z: Grid3,
}

impl CoordinateField {
    pub fn axis(&self, axis: Axis) -> &Grid3 {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    pub fn shape(&self) -> GridShape {
        let (nx, ny, nz) = self.x.dim();
        GridShape::new(nx, ny, nz)
    }

    /// Coordinates along `axis` at the first index of the other two axes
    pub fn axis_values(&self, axis: Axis) -> Vec<f64> {
        let mut lane = self.axis(axis).view();
        for other in axis.others() {
            lane.collapse_axis(NdAxis(other.index()), 0);
        }
        lane.iter().copied().collect()
    }
}

/// Measured channels reshaped onto the grid, keyed by channel name
#[derive(Debug, Clone, PartialEq)]
pub struct ValueField {
    channels: BTreeMap<String, Grid3>,
}

impl ValueField {
    pub fn channel(&self, name: &str) -> MagResult<&Grid3> {
        self.channels
            .get(name)
            .ok_or_else(|| MagError::InvalidChannelSelection(name.to_string()))
    }

    /// The field component measured along `axis` (`mag_x`, `mag_y`, `mag_z`)
    pub fn component(&self, axis: Axis) -> MagResult<&Grid3> {
        self.channel(axis.field_channel())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}

/// Reshape `table` into coordinate and value arrays.
///
/// `shape` overrides the table's attached metadata; one of the two must be
/// present. Coordinates are compared with the default [`Tolerance`].
pub fn reshape(table: &SampleTable, shape: Option<GridShape>) -> MagResult<(CoordinateField, ValueField)> {
    reshape_within(table, shape, Tolerance::default())
}

/// [`reshape`] with an explicit tolerance for the traversal check
pub fn reshape_within(
    table: &SampleTable,
    shape: Option<GridShape>,
    tolerance: Tolerance,
) -> MagResult<(CoordinateField, ValueField)> {
    let shape = shape
        .or_else(|| table.metadata().map(|m| m.lengths))
        .ok_or(MagError::MissingShapeMetadata)?;

    let expected = shape.total();
    if table.len() != expected {
        return Err(MagError::ShapeMismatch {
            shape: shape.0,
            expected,
            actual: table.len(),
        });
    }

    let dim = shape.dim();
    let fold = |data: Vec<f64>| {
        Array3::from_shape_vec(dim, data).map_err(|_| MagError::ShapeMismatch {
            shape: shape.0,
            expected,
            actual: table.len(),
        })
    };

    let coords = CoordinateField {
        x: fold(table.axis_column(Axis::X))?,
        y: fold(table.axis_column(Axis::Y))?,
        z: fold(table.axis_column(Axis::Z))?,
    };
    check_traversal(&coords, tolerance)?;

    let mut channels = BTreeMap::new();
    for name in table.channels() {
        channels.insert(name.clone(), fold(table.column(name)?)?);
    }

    Ok((coords, ValueField { channels }))
}

/// Each coordinate array must be constant across the other two axes and
/// strictly monotonic along its own.
fn check_traversal(coords: &CoordinateField, tolerance: Tolerance) -> MagResult<()> {
    for axis in Axis::ALL {
        let grid = coords.axis(axis);
        let line = coords.axis_values(axis);

        for (idx, value) in grid.indexed_iter() {
            let own = [idx.0, idx.1, idx.2][axis.index()];
            if !tolerance.close(*value, line[own]) {
                return Err(MagError::TraversalMismatch { axis });
            }
        }

        let distinct = line.windows(2).all(|w| !tolerance.close(w[1], w[0]));
        let increasing = line.windows(2).all(|w| w[1] > w[0]);
        let decreasing = line.windows(2).all(|w| w[1] < w[0]);
        if !(distinct && (increasing || decreasing)) {
            return Err(MagError::TraversalMismatch { axis });
        }
    }
    Ok(())
}

/// Canonical-order table over the given axis points with `field(x, y, z)` values
#[cfg(test)]
pub(crate) fn grid_table_with(
    xs: &[f64],
    ys: &[f64],
    zs: &[f64],
    field: impl Fn(f64, f64, f64) -> [f64; 3],
) -> SampleTable {
    let mut points = Vec::new();
    for &x in xs {
        for &y in ys {
            for &z in zs {
                points.push(([x, y, z], field(x, y, z)));
            }
        }
    }
    let step = |v: &[f64]| if v.len() > 1 { v[1] - v[0] } else { f64::NAN };
    crate::table::field_table(&points).with_metadata(crate::table::GridMetadata {
        lengths: GridShape::new(xs.len(), ys.len(), zs.len()),
        step_sizes: crate::table::StepSizes([step(xs), step(ys), step(zs)]),
    })
}

#[cfg(test)]
pub(crate) fn grid_table(xs: &[f64], ys: &[f64], zs: &[f64]) -> SampleTable {
    grid_table_with(xs, ys, zs, |x, y, z| [x, y, z])
}
