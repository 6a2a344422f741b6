//! motormag: CLI for planning, simulating and analysing magnetic field scans

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use motormag::device::{MockStage, MockStageHandle, SimulatedProbe, TrackedStage};
use motormag::gradient::relative_gradient_squared;
use motormag::plane::{fixed_axes, strength_plane};
use motormag::sim::CoilSet;
use motormag::table::parse_axes;
use motormag::{
    divide, subtract, AnalysisConfig, Axis, BoxScan, RangeDef, SampleTable, ScanConfig, ScanOrder, ScanPlan,
    StepPairing, Tolerance,
};
use nalgebra::Vector3;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "motormag")]
#[command(about = "Plan, simulate and analyse motorized magnetic field scans")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the grid a box scan would visit
    Plan(ScanArgs),
    /// Run a box scan against a simulated stage and coil pair
    Simulate {
        #[command(flatten)]
        scan: ScanArgs,

        /// Coil radius in mm
        #[arg(long, default_value = "50")]
        coil_radius: f64,

        /// Distance between the two coils in mm
        #[arg(long, default_value = "50")]
        coil_gap: f64,

        /// Current times turns per coil
        #[arg(long, default_value = "100")]
        ampere_turns: f64,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarise a scan file
    Info {
        /// Input scan JSON
        input: PathBuf,
    },
    /// Field strength on a cut plane
    Slice {
        /// Input scan JSON
        input: PathBuf,

        /// Axis normal to the plane; detected for planar scans
        #[arg(long)]
        axis: Option<Axis>,

        /// Layer index along the cut axis
        #[arg(long)]
        index: Option<usize>,

        /// Layer position along the cut axis (mm)
        #[arg(long)]
        position: Option<f64>,

        /// Field components to combine
        #[arg(long, default_value = "xyz")]
        components: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Relative gradient squared map of a volumetric scan
    Gradient {
        /// Input scan JSON
        input: PathBuf,

        /// Field components to differentiate
        #[arg(long, default_value = "xyz")]
        field_axes: String,

        /// Directions to differentiate along
        #[arg(long, default_value = "xyz")]
        directions: String,

        /// Squared reference field; interpolated when omitted
        #[arg(long)]
        reference_value: Option<f64>,

        /// Reference position as x,y,z (mm); box center when omitted
        #[arg(long)]
        reference_position: Option<String>,

        /// Divide by the step of the differentiation direction
        #[arg(long)]
        direction_steps: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Subtract a background scan
    Subtract(CombineArgs),
    /// Divide by a reference scan
    Divide(CombineArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// x range as `start:end` or a single value (mm)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    x: String,

    /// y range as `start:end` or a single value (mm)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    y: String,

    /// z range as `start:end` or a single value (mm)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    z: String,

    /// Step size for all axes (mm)
    #[arg(long, default_value = "5")]
    step: f64,

    /// Points per axis, overrides the step size
    #[arg(long)]
    steps: Option<usize>,

    /// Axis order, first moves least
    #[arg(long, default_value = "zxy")]
    order: String,

    /// Readings averaged per point
    #[arg(long, default_value = "3")]
    reps: usize,

    /// Readings dropped after each move
    #[arg(long, default_value = "1")]
    discards: usize,

    /// Skip driving the box corners first
    #[arg(long)]
    no_corners: bool,
}

#[derive(Args, Debug)]
struct CombineArgs {
    /// Scan to operate on
    input: PathBuf,

    /// Background or reference scan
    other: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_range(s: &str) -> Result<RangeDef> {
    let number = |v: &str| {
        v.trim()
            .parse::<f64>()
            .with_context(|| format!("Invalid coordinate: {:?}", v))
    };
    match s.split_once(':') {
        Some((start, end)) => Ok(RangeDef::Span([number(start)?, number(end)?])),
        None => Ok(RangeDef::Single(number(s)?)),
    }
}

fn parse_position(s: &str) -> Result<Vector3<f64>> {
    let parts = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid position: {:?}", s))?;
    match parts.as_slice() {
        &[x, y, z] => Ok(Vector3::new(x, y, z)),
        _ => anyhow::bail!("Position needs three coordinates, got {:?}", s),
    }
}

impl ScanArgs {
    fn plan(&self) -> Result<ScanPlan> {
        let ranges = [parse_range(&self.x)?, parse_range(&self.y)?, parse_range(&self.z)?];
        let plan = ScanPlan::new(
            ranges,
            [self.steps; 3],
            [self.step; 3],
            ScanOrder::parse(&self.order)?,
        )?;
        Ok(plan)
    }

    fn config(&self) -> ScanConfig {
        ScanConfig {
            n_reps: self.reps,
            n_discards: self.discards,
            test_corners: !self.no_corners,
            ..ScanConfig::default()
        }
    }
}

fn load(path: &Path) -> Result<SampleTable> {
    SampleTable::load(path).with_context(|| format!("Failed to read scan file: {:?}", path))
}

fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write output file: {:?}", path))?;
            eprintln!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Plan(args) => {
            let plan = args.plan()?;
            let summary = serde_json::json!({
                "x": plan.axis_points[0],
                "y": plan.axis_points[1],
                "z": plan.axis_points[2],
                "metadata": plan.metadata(),
                "points": plan.shape().total(),
            });
            emit(&serde_json::to_string_pretty(&summary)?, None)?;
        }
        Command::Simulate {
            scan,
            coil_radius,
            coil_gap,
            ampere_turns,
            output,
        } => {
            let plan = scan.plan()?;
            let handle = MockStageHandle::new();
            let mut stage = TrackedStage::new(MockStage::new(), &handle);
            let mut probe = SimulatedProbe::new(
                &handle,
                CoilSet::pair(Vector3::zeros(), coil_radius, coil_gap, ampere_turns),
            );
            let table = BoxScan::new(plan, scan.config())
                .run(&mut stage, &mut probe)
                .context("Scan failed")?;
            emit(&table.to_json()?, output.as_deref())?;
        }
        Command::Info { input } => {
            let table = load(&input)?;
            let bounds = table.bounds().map(|(lo, hi)| [[lo.x, lo.y, lo.z], [hi.x, hi.y, hi.z]]);
            let summary = serde_json::json!({
                "samples": table.len(),
                "channels": table.channels(),
                "metadata": table.metadata(),
                "acquired": table.acquired(),
                "fixed_axes": fixed_axes(&table),
                "bounds": bounds,
            });
            emit(&serde_json::to_string_pretty(&summary)?, None)?;
        }
        Command::Slice {
            input,
            axis,
            index,
            position,
            components,
            output,
        } => {
            let table = load(&input)?;
            let plane = strength_plane(&table, axis, index, position, &parse_axes(&components)?, Tolerance::default())
                .context("Failed to cut plane")?;
            eprintln!("{}", plane.label(&components));
            emit(&serde_json::to_string_pretty(&plane.to_export())?, output.as_deref())?;
        }
        Command::Gradient {
            input,
            field_axes,
            directions,
            reference_value,
            reference_position,
            direction_steps,
            output,
        } => {
            let table = load(&input)?;
            let config = AnalysisConfig {
                step_pairing: if direction_steps {
                    StepPairing::Direction
                } else {
                    StepPairing::FieldAxis
                },
                ..AnalysisConfig::default()
            };
            let reference_position = reference_position.as_deref().map(parse_position).transpose()?;
            let map = relative_gradient_squared(
                &table,
                &parse_axes(&field_axes)?,
                &parse_axes(&directions)?,
                reference_value,
                reference_position,
                &config,
            )
            .context("Gradient computation failed")?;
            let values = map.iter().map(|v| vec![*v]).collect();
            let result = table.with_values(vec!["rel_grad_sq".to_string()], values)?;
            emit(&result.to_json()?, output.as_deref())?;
        }
        Command::Subtract(args) => {
            let result = subtract(&load(&args.input)?, &load(&args.other)?, Tolerance::default())?;
            emit(&result.to_json()?, args.output.as_deref())?;
        }
        Command::Divide(args) => {
            let result = divide(&load(&args.input)?, &load(&args.other)?, Tolerance::default())?;
            emit(&result.to_json()?, args.output.as_deref())?;
        }
    }

    Ok(())
}
