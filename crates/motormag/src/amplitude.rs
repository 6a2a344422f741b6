//! Field magnitude from a selection of vector components

use crate::error::{MagError, MagResult};
use crate::grid::{reshape, CoordinateField, Grid3, ValueField};
use crate::table::{Axis, SampleTable};

/// Euclidean norm of the selected components at every grid point.
///
/// Duplicated axes are counted twice. Use [`ValueField::component`] for the
/// signed reading of a single axis.
pub fn amplitude(values: &ValueField, components: &[Axis]) -> MagResult<Grid3> {
    match components {
        [] => Err(MagError::InvalidChannelSelection(String::new())),
        [single] => Ok(values.component(*single)?.mapv(f64::abs)),
        _ => {
            let mut sum = Grid3::zeros(values.component(components[0])?.raw_dim());
            for axis in components {
                sum.zip_mut_with(values.component(*axis)?, |acc, v| *acc += v * v);
            }
            Ok(sum.mapv_into(f64::sqrt))
        }
    }
}

/// Reshape `table` and compute the amplitude of `components` on its grid.
pub fn table_amplitude(table: &SampleTable, components: &[Axis]) -> MagResult<(CoordinateField, Grid3)> {
    let (coords, values) = reshape(table, None)?;
    let field = amplitude(&values, components)?;
    Ok((coords, field))
}
