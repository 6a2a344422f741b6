//! Aligning two independently sampled field maps so they can be combined
//! point by point (field minus background, field over reference, ...).

use crate::error::MagResult;
use crate::interp::LinearInterpolator;
use crate::table::SampleTable;
use crate::Tolerance;

/// Estimate every channel of `source` at each of `targets`.
///
/// The result carries `source`'s channels in `targets` order; points the
/// source does not cover come out as NaN.
pub fn interpolate(targets: &[[f64; 3]], source: &SampleTable, tolerance: Tolerance) -> MagResult<SampleTable> {
    let interp = LinearInterpolator::from_table(source, source.channels(), tolerance)?;
    let samples = targets
        .iter()
        .map(|&p| crate::table::Sample::new(p, interp.evaluate(p)))
        .collect();
    SampleTable::new(source.channels().to_vec(), samples)
}

/// `field - background`, channel by channel, on `field`'s positions
pub fn subtract(field: &SampleTable, background: &SampleTable, tolerance: Tolerance) -> MagResult<SampleTable> {
    combine(field, background, tolerance, |a, b| a - b)
}

/// `dividend / divisor`, channel by channel, on `dividend`'s positions
pub fn divide(dividend: &SampleTable, divisor: &SampleTable, tolerance: Tolerance) -> MagResult<SampleTable> {
    combine(dividend, divisor, tolerance, |a, b| a / b)
}

fn combine(
    primary: &SampleTable,
    secondary: &SampleTable,
    tolerance: Tolerance,
    op: impl Fn(f64, f64) -> f64,
) -> MagResult<SampleTable> {
    let indices = primary
        .channels()
        .iter()
        .map(|c| secondary.channel_index(c))
        .collect::<MagResult<Vec<_>>>()?;

    let aligned;
    let other = if primary.same_positions(secondary) {
        secondary
    } else {
        aligned = interpolate(&primary.positions(), secondary, tolerance)?;
        &aligned
    };

    let values = primary
        .samples()
        .iter()
        .zip(other.samples())
        .map(|(p, s)| {
            p.values
                .iter()
                .zip(&indices)
                .map(|(&a, &i)| op(a, s.values[i]))
                .collect()
        })
        .collect();
    primary.with_values(primary.channels().to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MagError;
    use crate::grid::grid_table_with;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subtract_self_is_zero() {
        let field = grid_table_with(&[0.0, 5.0], &[0.0, 5.0], &[0.0], |x, y, _| [x, y, 1.0]);
        let result = subtract(&field, &field, Tolerance::default()).unwrap();

        assert_eq!(result.positions(), field.positions());
        assert_eq!(result.metadata().map(|m| m.lengths), field.metadata().map(|m| m.lengths));
        assert!(result.samples().iter().all(|s| s.values.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_subtract_interpolates_background() {
        let field = grid_table_with(&[1.0, 3.0], &[1.0, 3.0], &[0.0], |_, _, _| [10.0, 10.0, 10.0]);
        let background = grid_table_with(&[0.0, 4.0], &[0.0, 4.0], &[0.0], |x, y, _| [x, y, x + y]);
        let result = subtract(&field, &background, Tolerance::default()).unwrap();

        assert_eq!(result.positions(), field.positions());
        let last = &result.samples()[3].values;
        assert_relative_eq!(last[0], 7.0, epsilon = 1e-12);
        assert_relative_eq!(last[1], 7.0, epsilon = 1e-12);
        assert_relative_eq!(last[2], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_divide_and_uncovered_points() {
        let field = grid_table_with(&[0.0, 8.0], &[0.0], &[0.0, 2.0], |_, _, _| [6.0, 6.0, 6.0]);
        let divisor = grid_table_with(&[0.0, 4.0], &[0.0], &[0.0, 2.0], |_, _, _| [2.0, 3.0, 6.0]);
        let result = divide(&field, &divisor, Tolerance::default()).unwrap();

        assert_eq!(result.samples()[0].values, vec![3.0, 2.0, 1.0]);
        // x = 8 lies outside the divisor scan
        assert!(result.samples()[2].values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_interpolate_onto_targets() {
        let source = grid_table_with(&[0.0, 10.0], &[0.0, 10.0], &[0.0, 10.0], |x, y, z| [x, y, z]);
        let aligned = interpolate(&[[2.0, 4.0, 6.0], [20.0, 0.0, 0.0]], &source, Tolerance::default()).unwrap();

        assert_eq!(aligned.channels(), source.channels());
        let first = &aligned.samples()[0].values;
        assert_relative_eq!(first[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(first[2], 6.0, epsilon = 1e-12);
        assert!(aligned.samples()[1].values[0].is_nan());
        assert!(aligned.metadata().is_none());
    }

    #[test]
    fn test_missing_background_channel() {
        let field = grid_table_with(&[0.0, 1.0], &[0.0], &[0.0], |_, _, _| [1.0, 1.0, 1.0]);
        let background = SampleTable::new(
            vec!["mag_x".into()],
            vec![
                crate::table::Sample::new([0.0, 0.0, 0.0], vec![1.0]),
                crate::table::Sample::new([1.0, 0.0, 0.0], vec![1.0]),
            ],
        )
        .unwrap();
        assert!(matches!(
            subtract(&field, &background, Tolerance::default()),
            Err(MagError::InvalidChannelSelection(name)) if name == "mag_y"
        ));
    }
}
