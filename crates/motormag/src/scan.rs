//! Box scans: planning the grid of stage positions and driving the stage and
//! probe through it.

use std::time::Duration;

use chrono::Utc;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::device::{FieldProbe, MotionDevice, MoveProfile};
use crate::error::{MagError, MagResult};
use crate::table::{Axis, GridMetadata, GridShape, Sample, SampleTable, StepSizes, FIELD_CHANNELS, TEMPERATURE_CHANNELS};

/// Extent of one axis: a fixed coordinate or a `[start, end]` span (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeDef {
    Single(f64),
    Span([f64; 2]),
}

/// Expand a range definition into the coordinates to visit.
///
/// `steps` (point count) wins over `step_size`; without it the span must be a
/// whole multiple of `step_size`.
pub fn range_to_points(range: RangeDef, steps: Option<usize>, step_size: f64) -> MagResult<Vec<f64>> {
    if step_size == 0.0 {
        return Err(MagError::InvalidScan("step size cannot be zero".to_string()));
    }
    if steps == Some(0) {
        return Err(MagError::InvalidScan("an axis needs at least one point".to_string()));
    }
    let [start, end] = match range {
        RangeDef::Single(v) => return Ok(vec![v]),
        RangeDef::Span(span) => span,
    };

    let count = match steps {
        Some(_) if start == end => return Ok(vec![start]),
        Some(n) => n,
        None => {
            let span = (end - start).abs();
            let step = step_size.abs();
            if span % step > 0.1 {
                return Err(MagError::InvalidScan(format!(
                    "span of scan {} is not a multiple of step size {}",
                    span, step
                )));
            }
            (span / step) as usize + 1
        }
    };
    Ok(linspace(start, end, count))
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Spacing of an evenly spaced point list, NaN for a single point
pub fn step_of(points: &[f64]) -> f64 {
    match points {
        [a, b, ..] => b - a,
        _ => f64::NAN,
    }
}

/// Axis priority during a scan: the first axis moves least
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOrder(pub [Axis; 3]);

impl ScanOrder {
    /// Parse a permutation of `xyz`
    pub fn parse(order: &str) -> MagResult<Self> {
        let invalid = || MagError::InvalidScan(format!("invalid scan order: {:?}", order));
        let axes: Vec<Axis> = order
            .chars()
            .map(|c| Axis::from_char(c).ok_or_else(invalid))
            .collect::<MagResult<_>>()?;
        match axes.as_slice() {
            &[a, b, c] if a != b && b != c && a != c => Ok(Self([a, b, c])),
            _ => Err(invalid()),
        }
    }
}

impl Default for ScanOrder {
    /// z moves least: it carries the heaviest load
    fn default() -> Self {
        Self([Axis::Z, Axis::X, Axis::Y])
    }
}

/// Every stage position of a box scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub axis_points: [Vec<f64>; 3],
    pub order: ScanOrder,
}

impl ScanPlan {
    pub fn new(
        ranges: [RangeDef; 3],
        steps: [Option<usize>; 3],
        step_sizes: [f64; 3],
        order: ScanOrder,
    ) -> MagResult<Self> {
        Ok(Self {
            axis_points: [
                range_to_points(ranges[0], steps[0], step_sizes[0])?,
                range_to_points(ranges[1], steps[1], step_sizes[1])?,
                range_to_points(ranges[2], steps[2], step_sizes[2])?,
            ],
            order,
        })
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.axis_points[0].len(), self.axis_points[1].len(), self.axis_points[2].len())
    }

    pub fn step_sizes(&self) -> StepSizes {
        StepSizes([
            step_of(&self.axis_points[0]),
            step_of(&self.axis_points[1]),
            step_of(&self.axis_points[2]),
        ])
    }

    pub fn metadata(&self) -> GridMetadata {
        GridMetadata {
            lengths: self.shape(),
            step_sizes: self.step_sizes(),
        }
    }

    /// All positions in table order: x slowest, z fastest
    pub fn points(&self) -> Vec<Vector3<f64>> {
        let [xs, ys, zs] = &self.axis_points;
        let mut points = Vec::with_capacity(self.shape().total());
        for &x in xs {
            for &y in ys {
                for &z in zs {
                    points.push(Vector3::new(x, y, z));
                }
            }
        }
        points
    }

    /// Indices into [`ScanPlan::points`] in the order the stage visits them
    pub fn visit_order(&self) -> Vec<usize> {
        let points = self.points();
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by(|&a, &b| {
            self.order
                .0
                .iter()
                .map(|axis| points[a][axis.index()].total_cmp(&points[b][axis.index()]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// The eight corners of the scanned box
    pub fn corners(&self) -> Vec<Vector3<f64>> {
        let bounds: Vec<(f64, f64)> = self
            .axis_points
            .iter()
            .map(|p| {
                p.iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
            })
            .collect();
        let pick = |(lo, hi): (f64, f64), high: bool| if high { hi } else { lo };
        let mut corners = Vec::with_capacity(8);
        for z in [false, true] {
            for (x, y) in [(false, false), (true, false), (true, true), (false, true)] {
                corners.push(Vector3::new(pick(bounds[0], x), pick(bounds[1], y), pick(bounds[2], z)));
            }
        }
        corners
    }
}

/// Stage and probe settings for a scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub profile: MoveProfile,
    /// Speed for the corner dry run (mm/s)
    pub corner_speed: f64,
    /// Drive the box corners before scanning
    pub test_corners: bool,
    /// Readings dropped after each move to let the probe settle
    pub n_discards: usize,
    /// Readings averaged per point
    pub n_reps: usize,
    /// How far from zero the stage may be when a scan starts (mm)
    pub origin_tolerance: f64,
    pub poll_interval: Duration,
    /// Extra wait after the stage stops
    pub settle: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            profile: MoveProfile::default(),
            corner_speed: 10.0,
            test_corners: true,
            n_discards: 1,
            n_reps: 3,
            origin_tolerance: 0.1,
            poll_interval: Duration::from_millis(200),
            settle: Duration::ZERO,
        }
    }
}

/// A box scan ready to run
#[derive(Debug, Clone)]
pub struct BoxScan {
    pub plan: ScanPlan,
    pub config: ScanConfig,
}

impl BoxScan {
    pub fn new(plan: ScanPlan, config: ScanConfig) -> Self {
        Self { plan, config }
    }

    /// Run the scan and return the samples in table order with grid metadata.
    ///
    /// The stage must start at the origin and is returned there afterwards.
    pub fn run<M: MotionDevice, P: FieldProbe>(&self, stage: &mut M, probe: &mut P) -> MagResult<SampleTable> {
        if let Some(axis) = Axis::ALL.into_iter().find(|a| self.plan.axis_points[a.index()].is_empty()) {
            return Err(MagError::InvalidScan(format!("no points along {}", axis)));
        }
        let start = stage.position()?;
        if start.iter().any(|v| v.abs() >= self.config.origin_tolerance) {
            return Err(MagError::StageNotAtOrigin {
                x: start.x,
                y: start.y,
                z: start.z,
            });
        }

        if self.config.test_corners {
            tracing::info!("Driving to 8 corners of test volume.");
            let profile = MoveProfile {
                speed: self.config.corner_speed,
                ..self.config.profile
            };
            for corner in self.plan.corners() {
                self.move_to(stage, corner, &profile)?;
            }
        }

        let points = self.plan.points();
        let mut readings = vec![Vec::new(); points.len()];
        let total = points.len();
        tracing::info!("Starting box scan: {} points, shape {:?}", total, self.plan.shape().0);

        for (nth, idx) in self.plan.visit_order().into_iter().enumerate() {
            let p = points[idx];
            self.move_to(stage, p, &self.config.profile)?;
            for _ in 0..self.config.n_discards {
                probe.read_once()?;
            }
            let reading = probe.read_averaged(self.config.n_reps)?;
            tracing::info!(
                "{}/{}, field at {:.2}, {:.2}, {:.2}: {:.2}mT, {:.2}mT, {:.2}mT",
                nth + 1,
                total,
                p.x,
                p.y,
                p.z,
                reading.field.x,
                reading.field.y,
                reading.field.z
            );
            readings[idx] = reading.channels();
        }

        self.move_to(stage, Vector3::zeros(), &self.config.profile)?;

        let channels = FIELD_CHANNELS
            .iter()
            .chain(TEMPERATURE_CHANNELS.iter())
            .map(|c| c.to_string())
            .collect();
        let samples = points
            .iter()
            .zip(readings)
            .map(|(p, values)| Sample::new((*p).into(), values))
            .collect();
        Ok(SampleTable::new(channels, samples)?
            .with_metadata(self.plan.metadata())
            .with_acquired(Utc::now()))
    }

    fn move_to<M: MotionDevice>(&self, stage: &mut M, target: Vector3<f64>, profile: &MoveProfile) -> MagResult<()> {
        stage.move_absolute(target, profile)?;
        stage.wait_idle(self.config.poll_interval, self.config.settle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockStage, MockStageHandle, ProbeReading, SimulatedProbe, TrackedStage};
    use crate::grid::reshape;
    use crate::sim::CoilSet;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_range_to_points() {
        assert_eq!(
            range_to_points(RangeDef::Span([-10.0, 10.0]), Some(5), 5.0).unwrap(),
            vec![-10.0, -5.0, 0.0, 5.0, 10.0]
        );
        assert_eq!(range_to_points(RangeDef::Single(30.0), Some(5), 3.0).unwrap(), vec![30.0]);
        assert_eq!(range_to_points(RangeDef::Span([20.0, 50.0]), None, 2.0).unwrap().len(), 16);
        assert_eq!(range_to_points(RangeDef::Span([4.0, 4.0]), Some(3), 1.0).unwrap(), vec![4.0]);
        assert!(matches!(
            range_to_points(RangeDef::Span([20.0, 30.0]), None, 3.0),
            Err(MagError::InvalidScan(_))
        ));
        assert!(range_to_points(RangeDef::Span([0.0, 10.0]), None, 0.0).is_err());
        assert!(matches!(
            range_to_points(RangeDef::Span([0.0, 10.0]), Some(0), 5.0),
            Err(MagError::InvalidScan(_))
        ));
        assert!(range_to_points(RangeDef::Single(3.0), Some(0), 5.0).is_err());
        assert_eq!(
            range_to_points(RangeDef::Span([10.0, 0.0]), None, 5.0).unwrap(),
            vec![10.0, 5.0, 0.0]
        );
    }

    #[test]
    fn test_scan_order() {
        assert_eq!(ScanOrder::parse("zxy").unwrap(), ScanOrder::default());
        assert!(ScanOrder::parse("xxy").is_err());
        assert!(ScanOrder::parse("xy").is_err());
        assert!(ScanOrder::parse("xyw").is_err());
    }

    #[test]
    fn test_plan_metadata_and_order() {
        let plan = ScanPlan::new(
            [RangeDef::Span([0.0, 5.0]), RangeDef::Span([0.0, 10.0]), RangeDef::Single(2.0)],
            [None, None, None],
            [5.0, 5.0, 5.0],
            ScanOrder::parse("xyz").unwrap(),
        )
        .unwrap();
        assert_eq!(plan.shape(), GridShape::new(2, 3, 1));
        let steps = plan.step_sizes();
        assert_eq!((steps.get(Axis::X), steps.get(Axis::Y)), (5.0, 5.0));
        assert!(steps.get(Axis::Z).is_nan());

        let points = plan.points();
        assert_eq!(points[1], Vector3::new(0.0, 5.0, 2.0));
        // x moves least, so the visit order equals table order here
        assert_eq!(plan.visit_order(), (0..6).collect::<Vec<_>>());

        let yxz = ScanPlan { order: ScanOrder::parse("yxz").unwrap(), ..plan.clone() };
        let visits: Vec<_> = yxz.visit_order().into_iter().map(|i| points[i]).collect();
        assert_eq!(visits[1], Vector3::new(5.0, 0.0, 2.0));

        assert_eq!(plan.corners().len(), 8);
        assert!(plan.corners().contains(&Vector3::new(0.0, 10.0, 2.0)));
    }

    #[test]
    fn test_plan_rejects_empty_axis() {
        let plan = ScanPlan::new(
            [RangeDef::Span([0.0, 10.0]), RangeDef::Span([0.0, 10.0]), RangeDef::Single(0.0)],
            [Some(0), None, None],
            [5.0; 3],
            ScanOrder::default(),
        );
        assert!(matches!(plan, Err(MagError::InvalidScan(_))));

        let plan = ScanPlan {
            axis_points: [Vec::new(), vec![0.0], vec![0.0]],
            order: ScanOrder::default(),
        };
        let mut stage = MockStage::new();
        let handle = MockStageHandle::new();
        let mut probe = SimulatedProbe::new(&handle, CoilSet::default());
        let scan = BoxScan::new(plan, ScanConfig::default());
        assert!(matches!(scan.run(&mut stage, &mut probe), Err(MagError::InvalidScan(_))));
        assert!(stage.commands.is_empty());
    }

    #[test]
    fn test_refuses_to_start_away_from_origin() {
        let plan = ScanPlan::new(
            [RangeDef::Single(0.0), RangeDef::Single(0.0), RangeDef::Single(0.0)],
            [None; 3],
            [5.0; 3],
            ScanOrder::default(),
        )
        .unwrap();
        let mut stage = MockStage::at(Vector3::new(0.5, 0.0, 0.0));
        struct Dead;
        impl FieldProbe for Dead {
            fn read_once(&mut self) -> MagResult<ProbeReading> {
                Err(MagError::Device("unplugged".into()))
            }
        }
        let scan = BoxScan::new(plan, ScanConfig::default());
        assert!(matches!(scan.run(&mut stage, &mut Dead), Err(MagError::StageNotAtOrigin { .. })));
    }

    #[test]
    fn test_simulated_scan_produces_grid_table() {
        let plan = ScanPlan::new(
            [RangeDef::Span([-10.0, 10.0]), RangeDef::Span([-10.0, 10.0]), RangeDef::Single(0.0)],
            [None; 3],
            [10.0; 3],
            ScanOrder::default(),
        )
        .unwrap();
        let handle = MockStageHandle::new();
        let mut stage = TrackedStage::new(MockStage::new(), &handle);
        let mut probe = SimulatedProbe::new(&handle, CoilSet::pair(Vector3::zeros(), 50.0, 50.0, 100.0));

        let scan = BoxScan::new(plan, ScanConfig::default());
        let table = scan.run(&mut stage, &mut probe).unwrap();

        assert_eq!(table.len(), 9);
        assert_eq!(table.channels().len(), 6);
        assert!(table.acquired().is_some());
        assert_eq!(stage.position().unwrap(), Vector3::zeros());
        // 8 corners + 9 points + return home
        assert_eq!(stage.inner.commands.len(), 18);

        let (coords, values) = reshape(&table, None).unwrap();
        let bz = values.component(Axis::Z).unwrap();
        // symmetric about the coil axis
        assert!((bz[[0, 0, 0]] - bz[[2, 2, 0]]).abs() < 1e-9);
        assert_eq!(coords.x[[2, 0, 0]], 10.0);
    }
}
