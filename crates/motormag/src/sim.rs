//! Magnetic field of current loops using the Biot-Savart law
//!
//! Stands in for a real field source when scanning with simulated devices.

use std::f64::consts::PI;

use nalgebra::Vector3;

const MU0: f64 = 4.0 * PI * 1e-7; // Permeability of free space (H/m)

/// A circular current loop, normal along Z
#[derive(Clone, Debug)]
pub struct CurrentLoop {
    pub center: Vector3<f64>, // Center position (mm)
    pub radius: f64,          // Radius (mm)
    pub ampere_turns: f64,    // Current × turns (A·turns)
}

/// A set of loops whose fields superpose
#[derive(Clone, Debug, Default)]
pub struct CoilSet {
    pub loops: Vec<CurrentLoop>,
    /// Wire segments per loop
    pub segments: usize,
}

impl CoilSet {
    /// Two coaxial loops of radius `radius` separated by `gap` (mm), centered
    /// on `center`. With `gap == radius` this is a Helmholtz pair.
    pub fn pair(center: Vector3<f64>, radius: f64, gap: f64, ampere_turns: f64) -> Self {
        let offset = Vector3::new(0.0, 0.0, gap / 2.0);
        Self {
            loops: vec![
                CurrentLoop {
                    center: center + offset,
                    radius,
                    ampere_turns,
                },
                CurrentLoop {
                    center: center - offset,
                    radius,
                    ampere_turns,
                },
            ],
            segments: 64,
        }
    }

    /// Total B-field (T) at `point` (mm)
    pub fn field_at(&self, point: Vector3<f64>) -> Vector3<f64> {
        self.loops
            .iter()
            .map(|l| biot_savart_loop(l, point, self.segments.max(4)))
            .sum()
    }
}

/// B-field (T) of a single loop at `point` (mm)
fn biot_savart_loop(loop_: &CurrentLoop, point: Vector3<f64>, num_segments: usize) -> Vector3<f64> {
    // Convert mm to m for SI units
    let r_m = loop_.radius * 1e-3;
    let c = loop_.center * 1e-3;
    let p = point * 1e-3;

    let dtheta = 2.0 * PI / num_segments as f64;
    let mut b = Vector3::zeros();

    for i in 0..num_segments {
        let theta_mid = (i as f64 + 0.5) * dtheta;

        // Wire element position and tangent
        let w = c + Vector3::new(r_m * theta_mid.cos(), r_m * theta_mid.sin(), 0.0);
        let dl = Vector3::new(-r_m * theta_mid.sin() * dtheta, r_m * theta_mid.cos() * dtheta, 0.0);

        let r = p - w;
        let r_mag = r.norm();
        if r_mag < 1e-10 {
            continue;
        }

        // dB = (μ₀/4π) * I * (dl × r) / r³
        b += dl.cross(&r) * (MU0 / (4.0 * PI) * loop_.ampere_turns / (r_mag * r_mag * r_mag));
    }

    b
}
