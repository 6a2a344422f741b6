//! Finite-difference gradients of the measured field and the relative
//! gradient map used to judge field uniformity.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use ndarray::{Axis as NdAxis, Zip};

use crate::error::{MagError, MagResult};
use crate::grid::{reshape, Grid3};
use crate::interp::LinearInterpolator;
use crate::table::{Axis, SampleTable};
use crate::{AnalysisConfig, ReferencePoint, StepPairing};

/// Partial derivative of each field component (first key) along each
/// direction (second key)
pub type GradientMap = BTreeMap<(Axis, Axis), Grid3>;

/// Derivative of `field` along `axis` with spacing `step`: central
/// differences inside, one-sided differences on the two boundary layers.
pub fn derivative(field: &Grid3, axis: Axis, step: f64) -> MagResult<Grid3> {
    let ax = NdAxis(axis.index());
    let n = field.len_of(ax);
    if n < 2 {
        return Err(MagError::UnsupportedGradientAxis { axis });
    }

    let mut out = Grid3::zeros(field.raw_dim());
    Zip::from(out.lanes_mut(ax))
        .and(field.lanes(ax))
        .for_each(|mut d, f| {
            d[0] = (f[1] - f[0]) / step;
            d[n - 1] = (f[n - 1] - f[n - 2]) / step;
            for i in 1..n - 1 {
                d[i] = (f[i + 1] - f[i - 1]) / (2.0 * step);
            }
        });
    Ok(out)
}

/// Derivatives of every `field_axes` component along every `directions` axis.
///
/// The spacing comes from the step size recorded for the *field* axis, not
/// the direction, unless `config.step_pairing` says otherwise. On scans with
/// equal spacing on all axes the two agree.
pub fn gradient(
    table: &SampleTable,
    field_axes: &[Axis],
    directions: &[Axis],
    config: &AnalysisConfig,
) -> MagResult<GradientMap> {
    let metadata = table.metadata().ok_or(MagError::MissingShapeMetadata)?;
    let (_, values) = reshape(table, None)?;

    let mut map = GradientMap::new();
    for &field_axis in field_axes {
        let component = values.component(field_axis)?;
        for &direction in directions {
            let step = match config.step_pairing {
                StepPairing::FieldAxis => metadata.step_sizes.get(field_axis),
                StepPairing::Direction => metadata.step_sizes.get(direction),
            };
            map.insert((field_axis, direction), derivative(component, direction, step)?);
        }
    }
    Ok(map)
}

/// Sum of the squares of every partial derivative in `field_axes` x `directions`
pub fn gradient_squared(
    table: &SampleTable,
    field_axes: &[Axis],
    directions: &[Axis],
    config: &AnalysisConfig,
) -> MagResult<Grid3> {
    let map = gradient(table, field_axes, directions, config)?;
    let shape = table
        .metadata()
        .map(|m| m.lengths.dim())
        .ok_or(MagError::MissingShapeMetadata)?;

    let mut sum = Grid3::zeros(shape);
    for partial in map.values() {
        sum.zip_mut_with(partial, |acc, d| *acc += d * d);
    }
    Ok(sum)
}

/// Squared magnitude of the `field_axes` components at `position`, found by
/// interpolating the raw samples.
pub fn reference_field_squared(
    table: &SampleTable,
    field_axes: &[Axis],
    position: Vector3<f64>,
    config: &AnalysisConfig,
) -> MagResult<f64> {
    let channels: Vec<String> = field_axes.iter().map(|a| a.field_channel().to_string()).collect();
    let interp = LinearInterpolator::from_table(table, &channels, config.tolerance)?;
    Ok(interp.evaluate(position.into()).iter().map(|v| v * v).sum())
}

/// Gradient squared divided by the squared reference field, a dimensionless
/// map of field non-uniformity.
///
/// Explicit arguments take precedence; otherwise the reference position comes
/// from `config.reference` and the reference value is interpolated there.
pub fn relative_gradient_squared(
    table: &SampleTable,
    field_axes: &[Axis],
    directions: &[Axis],
    reference_value: Option<f64>,
    reference_position: Option<Vector3<f64>>,
    config: &AnalysisConfig,
) -> MagResult<Grid3> {
    if table.is_empty() {
        return Err(MagError::EmptyTable);
    }
    let squared = gradient_squared(table, field_axes, directions, config)?;

    let reference_value = match reference_value {
        Some(v) => v,
        None => {
            let position = match (reference_position, config.reference) {
                (Some(p), _) => p,
                (None, ReferencePoint::Fixed(p)) => p,
                (None, ReferencePoint::BoundingBoxCenter) => table.center().ok_or(MagError::EmptyTable)?,
            };
            reference_field_squared(table, field_axes, position, config)?
        }
    };

    Ok(squared.mapv_into(|g| g / reference_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::grid_table_with;
    use approx::assert_relative_eq;

    const XS: [f64; 4] = [0.0, 2.0, 4.0, 6.0];
    const YS: [f64; 3] = [0.0, 5.0, 10.0];
    const ZS: [f64; 2] = [0.0, 1.0];

    #[test]
    fn test_constant_field_has_zero_gradient() {
        let table = grid_table_with(&XS, &YS, &ZS, |_, _, _| [1.0, -2.0, 3.0]);
        let g = gradient_squared(&table, &Axis::ALL, &Axis::ALL, &AnalysisConfig::default()).unwrap();
        assert_eq!(g.dim(), (4, 3, 2));
        assert!(g.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_central_and_edge_differences() {
        // mag_x = x^2 along a single line, step 2
        let field = ndarray::Array3::from_shape_vec((4, 1, 1), vec![0.0, 4.0, 16.0, 36.0]).unwrap();
        let d = derivative(&field, Axis::X, 2.0).unwrap();
        let got: Vec<f64> = d.iter().copied().collect();
        assert_eq!(got, vec![2.0, 4.0, 8.0, 10.0]);
    }

    #[test]
    fn test_single_point_direction_is_unsupported() {
        let table = grid_table_with(&XS, &YS, &[0.0], |x, _, _| [x, 0.0, 0.0]);
        let result = gradient(&table, &[Axis::X], &[Axis::Z], &AnalysisConfig::default());
        assert!(matches!(result, Err(MagError::UnsupportedGradientAxis { axis: Axis::Z })));
    }

    #[test]
    fn test_step_is_taken_from_field_axis() {
        // mag_x = 3y; x step is 2, y step is 5
        let table = grid_table_with(&XS, &YS, &ZS, |_, y, _| [3.0 * y, 0.0, 0.0]);

        let map = gradient(&table, &[Axis::X], &[Axis::Y], &AnalysisConfig::default()).unwrap();
        // difference per index is 15, divided by the x step of 2
        assert!(map[&(Axis::X, Axis::Y)].iter().all(|&v| v == 7.5));

        let config = AnalysisConfig {
            step_pairing: StepPairing::Direction,
            ..AnalysisConfig::default()
        };
        let map = gradient(&table, &[Axis::X], &[Axis::Y], &config).unwrap();
        assert!(map[&(Axis::X, Axis::Y)].iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_gradient_map_keys() {
        let table = grid_table_with(&XS, &YS, &ZS, |x, y, z| [x, y, z]);
        let map = gradient(&table, &[Axis::X, Axis::Z], &[Axis::X, Axis::Y], &AnalysisConfig::default()).unwrap();
        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(
            keys,
            vec![(Axis::X, Axis::X), (Axis::X, Axis::Y), (Axis::Z, Axis::X), (Axis::Z, Axis::Y)]
        );
    }

    #[test]
    fn test_relative_gradient_of_empty_table() {
        let table = SampleTable::new(vec!["mag_x".into(), "mag_y".into(), "mag_z".into()], Vec::new())
            .unwrap()
            .with_metadata(crate::table::GridMetadata {
                lengths: crate::table::GridShape::new(0, 0, 0),
                step_sizes: crate::table::StepSizes([f64::NAN; 3]),
            });
        let result = relative_gradient_squared(&table, &Axis::ALL, &Axis::ALL, None, None, &AnalysisConfig::default());
        assert!(matches!(result, Err(MagError::EmptyTable)));
    }

    #[test]
    fn test_relative_gradient_defaults_to_box_center() {
        // mag_z = 4 + x/2, step 2 on x; center is x = 3 where mag_z = 5.5
        let table = grid_table_with(&XS, &YS, &ZS, |x, _, _| [0.0, 0.0, 4.0 + 0.5 * x]);
        let config = AnalysisConfig {
            step_pairing: StepPairing::Direction,
            ..AnalysisConfig::default()
        };
        let rel = relative_gradient_squared(&table, &[Axis::Z], &[Axis::X], None, None, &config).unwrap();
        for v in rel.iter() {
            assert_relative_eq!(*v, 0.25 / (5.5 * 5.5), epsilon = 1e-12);
        }

        let rel = relative_gradient_squared(
            &table,
            &[Axis::Z],
            &[Axis::X],
            None,
            Some(Vector3::new(0.0, 0.0, 0.0)),
            &config,
        )
        .unwrap();
        assert_relative_eq!(rel[[1, 1, 1]], 0.25 / 16.0, epsilon = 1e-12);

        let rel = relative_gradient_squared(&table, &[Axis::Z], &[Axis::X], Some(0.5), None, &config).unwrap();
        assert_relative_eq!(rel[[0, 0, 0]], 0.5, epsilon = 1e-12);
    }
}
