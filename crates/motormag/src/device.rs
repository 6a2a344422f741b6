//! Hardware seams: the motion stage and the field probe, plus simulated
//! stand-ins for running scans without hardware.

use std::thread;
use std::time::Duration;

use nalgebra::Vector3;

use crate::error::{MagError, MagResult};
use crate::sim::CoilSet;

/// Motion parameters for one move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveProfile {
    /// mm/s; the path speed when coordinated, otherwise per axis
    pub speed: f64,
    pub acceleration: f64,
    /// Move all three axes in sync
    pub coordinated: bool,
}

impl Default for MoveProfile {
    fn default() -> Self {
        Self {
            speed: 25.0,
            acceleration: 0.3,
            coordinated: true,
        }
    }
}

/// A 3-axis translation stage. Positions in mm.
pub trait MotionDevice {
    /// Start a move to an absolute position
    fn move_absolute(&mut self, target: Vector3<f64>, profile: &MoveProfile) -> MagResult<()>;

    /// Start a move by an offset from the current position
    fn move_relative(&mut self, distance: Vector3<f64>, profile: &MoveProfile) -> MagResult<()>;

    fn position(&mut self) -> MagResult<Vector3<f64>>;

    fn is_moving(&mut self) -> MagResult<bool>;

    /// Halt all axes. The reported position may no longer be trusted.
    fn stop(&mut self) -> MagResult<()>;

    /// Block until every axis has stopped, then wait `settle` more
    fn wait_idle(&mut self, poll: Duration, settle: Duration) -> MagResult<()> {
        while self.is_moving()? {
            thread::sleep(poll);
        }
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        Ok(())
    }
}

/// One gaussmeter reading: field (mT) and probe temperature (°C) per axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub field: Vector3<f64>,
    pub temperature: Vector3<f64>,
}

impl ProbeReading {
    /// Values in table channel order: `mag_x..mag_z, temp_x..temp_z`
    pub fn channels(&self) -> Vec<f64> {
        self.field.iter().chain(self.temperature.iter()).copied().collect()
    }
}

/// A three-axis magnetic field probe
pub trait FieldProbe {
    fn read_once(&mut self) -> MagResult<ProbeReading>;

    /// Throw away readings that arrived before this call. Streaming probes
    /// override this; polled ones have nothing to drop.
    fn discard_stale(&mut self) -> MagResult<()> {
        Ok(())
    }

    /// Mean of `n` consecutive fresh readings (at least one is taken)
    fn read_averaged(&mut self, n: usize) -> MagResult<ProbeReading> {
        let n = n.max(1);
        self.discard_stale()?;
        let mut field = Vector3::zeros();
        let mut temperature = Vector3::zeros();
        for _ in 0..n {
            let r = self.read_once()?;
            field += r.field;
            temperature += r.temperature;
        }
        Ok(ProbeReading {
            field: field / n as f64,
            temperature: temperature / n as f64,
        })
    }
}

/// Render a move as controller G-code.
///
/// Absolute moves use `G01` (coordinated) / `G00` (per axis), relative moves
/// `G81` / `G80`. Distances and rates are written with one decimal.
pub fn gcode(target: Vector3<f64>, profile: &MoveProfile, absolute: bool) -> String {
    let (s, a) = (profile.speed, profile.acceleration);
    if profile.coordinated {
        let code = if absolute { "G01" } else { "G81" };
        format!(
            "{}X{:.1}Y{:.1}Z{:.1}F{:.1}A{:.1}D0",
            code, target.x, target.y, target.z, s, a
        )
    } else {
        let code = if absolute { "G00" } else { "G80" };
        format!(
            "{code}X{x:.1}FX{s:.1}AX{a:.1}Y{y:.1}FY{s:.1}AY{a:.1}Z{z:.1}FZ{s:.1}AZ{a:.1}D0",
            x = target.x,
            y = target.y,
            z = target.z,
        )
    }
}

/// Limit switch state decoded from the controller's input word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub x_low: bool,
    pub x_high: bool,
    pub y_low: bool,
    pub y_high: bool,
    pub z_low: bool,
    pub z_high: bool,
}

impl InputState {
    pub fn from_bits(state: u32) -> Self {
        let bit = |n: u32| (state >> n) & 1 == 1;
        Self {
            x_low: bit(9),
            x_high: bit(10),
            y_low: bit(6),
            y_high: bit(7),
            z_low: bit(3),
            z_high: bit(4),
        }
    }

    /// True when any limit switch is engaged
    pub fn any(&self) -> bool {
        self.x_low || self.x_high || self.y_low || self.y_high || self.z_low || self.z_high
    }
}

/// A stage that arrives instantly and records every command it was sent
#[derive(Debug, Clone, Default)]
pub struct MockStage {
    position: Vector3<f64>,
    /// Travel limits per axis (min, max), unchecked when `None`
    pub limits: Option<(Vector3<f64>, Vector3<f64>)>,
    pub commands: Vec<String>,
}

impl MockStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(position: Vector3<f64>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    fn go(&mut self, target: Vector3<f64>, command: String) -> MagResult<()> {
        if let Some((min, max)) = self.limits {
            if target.iter().zip(min.iter().zip(max.iter())).any(|(t, (lo, hi))| t < lo || t > hi) {
                return Err(MagError::Device(format!("target {:?} beyond travel limits", target)));
            }
        }
        tracing::debug!("mock stage: {}", command);
        self.commands.push(command);
        self.position = target;
        Ok(())
    }
}

impl MotionDevice for MockStage {
    fn move_absolute(&mut self, target: Vector3<f64>, profile: &MoveProfile) -> MagResult<()> {
        self.go(target, gcode(target, profile, true))
    }

    fn move_relative(&mut self, distance: Vector3<f64>, profile: &MoveProfile) -> MagResult<()> {
        let target = self.position + distance;
        self.go(target, gcode(distance, profile, false))
    }

    fn position(&mut self) -> MagResult<Vector3<f64>> {
        Ok(self.position)
    }

    fn is_moving(&mut self) -> MagResult<bool> {
        Ok(false)
    }

    fn stop(&mut self) -> MagResult<()> {
        tracing::warn!("mock stage stopped, coordinates invalidated");
        Ok(())
    }
}

/// A probe reporting the field of a simulated coil at the stage position
#[derive(Debug, Clone)]
pub struct SimulatedProbe<'a> {
    stage: &'a MockStageHandle,
    pub source: CoilSet,
    /// Constant field added to every reading (mT), e.g. the Earth's field
    pub background: Vector3<f64>,
    pub temperature: f64,
}

/// Shared view of where a [`MockStage`] currently is, so a simulated probe
/// can follow it
#[derive(Debug, Default)]
pub struct MockStageHandle {
    position: std::cell::Cell<[f64; 3]>,
}

impl MockStageHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, position: Vector3<f64>) {
        self.position.set(position.into());
    }

    pub fn get(&self) -> Vector3<f64> {
        Vector3::from(self.position.get())
    }
}

impl<'a> SimulatedProbe<'a> {
    pub fn new(stage: &'a MockStageHandle, source: CoilSet) -> Self {
        Self {
            stage,
            source,
            background: Vector3::zeros(),
            temperature: 25.0,
        }
    }
}

impl FieldProbe for SimulatedProbe<'_> {
    fn read_once(&mut self) -> MagResult<ProbeReading> {
        // Tesla to millitesla
        let field = self.source.field_at(self.stage.get()) * 1e3 + self.background;
        Ok(ProbeReading {
            field,
            temperature: Vector3::repeat(self.temperature),
        })
    }
}

/// A [`MockStage`] that publishes its position to a [`MockStageHandle`]
pub struct TrackedStage<'a> {
    pub inner: MockStage,
    handle: &'a MockStageHandle,
}

impl<'a> TrackedStage<'a> {
    pub fn new(inner: MockStage, handle: &'a MockStageHandle) -> Self {
        handle.set(inner.position);
        Self { inner, handle }
    }
}

impl MotionDevice for TrackedStage<'_> {
    fn move_absolute(&mut self, target: Vector3<f64>, profile: &MoveProfile) -> MagResult<()> {
        self.inner.move_absolute(target, profile)?;
        self.handle.set(self.inner.position);
        Ok(())
    }

    fn move_relative(&mut self, distance: Vector3<f64>, profile: &MoveProfile) -> MagResult<()> {
        self.inner.move_relative(distance, profile)?;
        self.handle.set(self.inner.position);
        Ok(())
    }

    fn position(&mut self) -> MagResult<Vector3<f64>> {
        self.inner.position()
    }

    fn is_moving(&mut self) -> MagResult<bool> {
        self.inner.is_moving()
    }

    fn stop(&mut self) -> MagResult<()> {
        self.inner.stop()
    }
}
