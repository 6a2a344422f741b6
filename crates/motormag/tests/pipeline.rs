use approx::assert_relative_eq;
use motormag::device::{MockStage, MockStageHandle, SimulatedProbe, TrackedStage};
use motormag::gradient::relative_gradient_squared;
use motormag::sim::CoilSet;
use motormag::{
    amplitude, reshape, resolve_fixed_axis, slice, subtract, AnalysisConfig, Axis, BoxScan, GridMetadata, GridShape,
    RangeDef, Sample, SampleTable, ScanConfig, ScanOrder, ScanPlan, StepSizes, Tolerance,
};
use nalgebra::Vector3;
use pretty_assertions::assert_eq;

fn unit_field_plane() -> SampleTable {
    let channels = vec!["mag_x".to_string(), "mag_y".to_string(), "mag_z".to_string()];
    let samples = [[0.0, 0.0, 0.0], [0.0, 5.0, 0.0], [5.0, 0.0, 0.0], [5.0, 5.0, 0.0]]
        .into_iter()
        .map(|p| Sample::new(p, vec![1.0, 1.0, 1.0]))
        .collect();
    SampleTable::new(channels, samples)
        .unwrap()
        .with_metadata(GridMetadata {
            lengths: GridShape::new(2, 2, 1),
            step_sizes: StepSizes([5.0, 5.0, f64::NAN]),
        })
}

fn simulated_scan(background: Vector3<f64>) -> SampleTable {
    let plan = ScanPlan::new(
        [RangeDef::Span([-10.0, 10.0]); 3],
        [None; 3],
        [10.0; 3],
        ScanOrder::default(),
    )
    .unwrap();
    let handle = MockStageHandle::new();
    let mut stage = TrackedStage::new(MockStage::new(), &handle);
    let mut probe = SimulatedProbe::new(&handle, CoilSet::pair(Vector3::zeros(), 50.0, 50.0, 100.0));
    probe.background = background;
    BoxScan::new(plan, ScanConfig::default())
        .run(&mut stage, &mut probe)
        .unwrap()
}

#[test]
fn test_planar_scan_to_cut_plane() {
    let table = unit_field_plane();
    assert_eq!(resolve_fixed_axis(&table).unwrap(), Axis::Z);

    let (coords, values) = reshape(&table, None).unwrap();
    let field = amplitude(&values, &[Axis::X, Axis::Y, Axis::Z]).unwrap();
    for v in field.iter() {
        assert_relative_eq!(*v, 3f64.sqrt());
    }

    let plane = slice(&coords, &field, Axis::Z, Some(0), None, Tolerance::default()).unwrap();
    assert_eq!((plane.horizontal_axis, plane.vertical_axis), (Axis::X, Axis::Y));
    assert_eq!(plane.horizontal, coords.x.index_axis(ndarray::Axis(2), 0).to_owned());
    assert_eq!(plane.vertical, coords.y.index_axis(ndarray::Axis(2), 0).to_owned());
    assert_eq!(plane.label("xyz"), "Field: xyz, cut position: z=0.0(i=0)");
}

#[test]
fn test_scan_file_round_trip() {
    let table = unit_field_plane();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.json");
    table.save(&path).unwrap();

    let loaded = SampleTable::load(&path).unwrap();
    assert_eq!(loaded.positions(), table.positions());
    let metadata = loaded.metadata().unwrap();
    assert_eq!(metadata.lengths, GridShape::new(2, 2, 1));
    assert!(metadata.step_sizes.get(Axis::Z).is_nan());
}

#[test]
fn test_simulated_scan_background_and_uniformity() {
    let field = simulated_scan(Vector3::zeros());
    let with_offset = simulated_scan(Vector3::new(0.05, 0.0, 0.0));
    assert_eq!(field.metadata().map(|m| m.lengths), Some(GridShape::new(3, 3, 3)));

    let corrected = subtract(&field, &with_offset, Tolerance::default()).unwrap();
    for sample in corrected.samples() {
        assert_relative_eq!(sample.values[0], -0.05, epsilon = 1e-9);
        assert_relative_eq!(sample.values[2], 0.0, epsilon = 1e-9);
    }

    let map = relative_gradient_squared(
        &field,
        &[Axis::X, Axis::Y, Axis::Z],
        &[Axis::X, Axis::Y, Axis::Z],
        None,
        None,
        &AnalysisConfig::default(),
    )
    .unwrap();
    let center = map[[1, 1, 1]];
    assert!(center < 1e-9);
    assert!(map.iter().all(|v| v.is_finite() && *v >= 0.0));
    assert!(map[[0, 0, 0]] > center);
}
