//! Cut planes through volumetric scan data for 2-D display.

use ndarray::{Array2, Axis as NdAxis};
use serde::Serialize;

use crate::amplitude::amplitude;
use crate::error::{MagError, MagResult};
use crate::grid::{reshape_within, CoordinateField, Grid3};
use crate::table::{Axis, SampleTable};
use crate::Tolerance;

/// A 2-D slice handed to a renderer: coordinates of the two in-plane axes
/// and the values, all indexed `[h, v]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CutPlane {
    pub cut_axis: Axis,
    pub index: usize,
    pub position: f64,
    pub horizontal_axis: Axis,
    pub vertical_axis: Axis,
    pub horizontal: Array2<f64>,
    pub vertical: Array2<f64>,
    pub values: Array2<f64>,
}

/// Row-major export of a [`CutPlane`]
#[derive(Debug, Serialize)]
pub struct CutPlaneExport {
    pub cut_axis: Axis,
    pub index: usize,
    pub position: f64,
    pub horizontal_axis: Axis,
    pub vertical_axis: Axis,
    pub horizontal: Vec<Vec<f64>>,
    pub vertical: Vec<Vec<f64>>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CutPlane {
    /// Caption in the form `Field: xyz, cut position: z=0.0(i=0)`
    pub fn label(&self, field: &str) -> String {
        format!(
            "Field: {}, cut position: {}={:.1}(i={})",
            field, self.cut_axis, self.position, self.index
        )
    }

    pub fn to_export(&self) -> CutPlaneExport {
        let rows = |m: &Array2<f64>| -> Vec<Vec<f64>> { m.outer_iter().map(|r| r.to_vec()).collect() };
        CutPlaneExport {
            cut_axis: self.cut_axis,
            index: self.index,
            position: self.position,
            horizontal_axis: self.horizontal_axis,
            vertical_axis: self.vertical_axis,
            horizontal: rows(&self.horizontal),
            vertical: rows(&self.vertical),
            values: self
                .values
                .outer_iter()
                .map(|r| r.iter().map(|v| if v.is_nan() { None } else { Some(*v) }).collect())
                .collect(),
        }
    }
}

/// Axes along which every sample shares the first sample's coordinate
pub fn fixed_axes(table: &SampleTable) -> Vec<Axis> {
    let Some(first) = table.samples().first() else {
        return Axis::ALL.to_vec();
    };
    Axis::ALL
        .into_iter()
        .filter(|&axis| {
            let v = first.coordinate(axis);
            table.samples().iter().all(|s| s.coordinate(axis) == v)
        })
        .collect()
}

/// The single constant axis of a planar scan
pub fn resolve_fixed_axis(table: &SampleTable) -> MagResult<Axis> {
    match fixed_axes(table).as_slice() {
        [axis] => Ok(*axis),
        [] => Err(MagError::AmbiguousCutAxis),
        more => Err(MagError::InsufficientDimensionality { fixed: more.len() }),
    }
}

/// Resolve where to cut along `axis`, returning `(index, position)`.
///
/// An explicit index wins; with neither index nor position the first layer
/// is used; a position must match a scanned coordinate within `tolerance`.
pub fn resolve_cut_index(
    coords: &CoordinateField,
    axis: Axis,
    index: Option<usize>,
    position: Option<f64>,
    tolerance: Tolerance,
) -> MagResult<(usize, f64)> {
    let values = coords.axis_values(axis);
    let checked = |i: usize| {
        values
            .get(i)
            .map(|&p| (i, p))
            .ok_or(MagError::CutIndexOutOfRange {
                axis,
                index: i,
                len: values.len(),
            })
    };

    match (index, position) {
        (Some(i), _) => checked(i),
        (None, None) => checked(0),
        (None, Some(target)) => values
            .iter()
            .position(|&v| tolerance.close(v, target))
            .map(|i| (i, values[i]))
            .ok_or(MagError::PositionNotFound { axis, position: target }),
    }
}

/// Slice `values` (and the in-plane coordinates) at the resolved layer of
/// `axis`. The in-plane axes are the remaining two in x, y, z order.
pub fn slice(
    coords: &CoordinateField,
    values: &Grid3,
    axis: Axis,
    index: Option<usize>,
    position: Option<f64>,
    tolerance: Tolerance,
) -> MagResult<CutPlane> {
    let (index, position) = resolve_cut_index(coords, axis, index, position, tolerance)?;
    let [horizontal_axis, vertical_axis] = axis.others();
    let cut = |grid: &Grid3| grid.index_axis(NdAxis(axis.index()), index).to_owned();

    Ok(CutPlane {
        cut_axis: axis,
        index,
        position,
        horizontal_axis,
        vertical_axis,
        horizontal: cut(coords.axis(horizontal_axis)),
        vertical: cut(coords.axis(vertical_axis)),
        values: cut(values),
    })
}

/// Field strength on a cut plane straight from a table: resolves the cut
/// axis when not given, computes the amplitude of `components` and slices.
pub fn strength_plane(
    table: &SampleTable,
    cut_axis: Option<Axis>,
    index: Option<usize>,
    position: Option<f64>,
    components: &[Axis],
    tolerance: Tolerance,
) -> MagResult<CutPlane> {
    let cut_axis = match cut_axis {
        Some(axis) => axis,
        None => resolve_fixed_axis(table)?,
    };
    let (coords, values) = reshape_within(table, None, tolerance)?;
    let field = amplitude(&values, components)?;
    slice(&coords, &field, cut_axis, index, position, tolerance)
}
