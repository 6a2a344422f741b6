//! Linear interpolation of scattered samples.
//!
//! Axes along which every sample shares one coordinate are dropped first, so a
//! planar scan interpolates in 2-D and a line scan in 1-D. Queries off such a
//! plane (beyond tolerance) yield NaN.
//!
//! When the remaining coordinates form a complete lattice (every scan does)
//! each lattice cell is split into simplices (Kuhn triangulation) and the
//! value is the barycentric combination of the enclosing simplex's corners.
//! Any other cloud is Delaunay-triangulated (triangles in 2-D, tetrahedra in
//! 3-D) and interpolated barycentrically the same way. Both are exact at the
//! samples and linear in between. Anything outside the sampled hull is NaN.

use std::cmp::Ordering;

use nalgebra::Vector3;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};

use crate::error::MagResult;
use crate::mesh::TetMesh;
use crate::table::{Axis, SampleTable};
use crate::Tolerance;

/// A planar sample, indexing its row of values
#[derive(Debug, Clone, Copy)]
struct Node {
    position: Point2<f64>,
    row: usize,
}

impl HasPosition for Node {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Lattice {
        /// Ascending node coordinates per active axis
        nodes: Vec<Vec<f64>>,
        /// Channel values per node, row-major over the active axes
        values: Vec<Vec<f64>>,
    },
    Planar {
        triangulation: DelaunayTriangulation<Node>,
        values: Vec<Vec<f64>>,
    },
    Volume {
        mesh: TetMesh,
        values: Vec<Vec<f64>>,
    },
    /// Nothing to interpolate from
    Empty,
}

#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    channels: Vec<String>,
    /// Shared coordinate of every axis that does not vary
    fixed: [Option<f64>; 3],
    active: Vec<Axis>,
    mode: Mode,
    tolerance: Tolerance,
}

impl LinearInterpolator {
    /// Interpolator over the named channels of `table`
    pub fn from_table(table: &SampleTable, channels: &[String], tolerance: Tolerance) -> MagResult<Self> {
        let indices = channels
            .iter()
            .map(|c| table.channel_index(c))
            .collect::<MagResult<Vec<_>>>()?;
        let values = table
            .samples()
            .iter()
            .map(|s| indices.iter().map(|&i| s.values[i]).collect())
            .collect();
        Ok(Self::new(&table.positions(), values, channels.to_vec(), tolerance))
    }

    /// Repeated positions keep the first sample's values.
    pub fn new(positions: &[[f64; 3]], values: Vec<Vec<f64>>, channels: Vec<String>, tolerance: Tolerance) -> Self {
        let mut fixed = [None; 3];
        let mut active = Vec::new();
        if let Some(first) = positions.first() {
            for axis in Axis::ALL {
                let a = axis.index();
                if positions.iter().all(|p| tolerance.close(p[a], first[a])) {
                    fixed[a] = Some(first[a]);
                } else {
                    active.push(axis);
                }
            }
        }

        let reduced: Vec<Vec<f64>> = positions
            .iter()
            .map(|p| active.iter().map(|a| p[a.index()]).collect())
            .collect();
        let (reduced, values) = distinct(reduced, values, tolerance);

        let mode = build_lattice(&reduced, &values, tolerance).unwrap_or_else(|| match active.len() {
            2 => {
                let mut triangulation = DelaunayTriangulation::new();
                for (row, p) in reduced.iter().enumerate() {
                    // non-finite coordinates cannot be placed and are left out
                    let _ = triangulation.insert(Node {
                        position: Point2::new(p[0], p[1]),
                        row,
                    });
                }
                Mode::Planar { triangulation, values }
            }
            3 => {
                let points: Vec<Vector3<f64>> = reduced.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect();
                let mesh = TetMesh::build(&points);
                if mesh.is_empty() {
                    Mode::Empty
                } else {
                    Mode::Volume { mesh, values }
                }
            }
            _ => Mode::Empty,
        });

        Self {
            channels,
            fixed,
            active,
            mode,
            tolerance,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// True when the samples formed a complete lattice
    pub fn is_lattice(&self) -> bool {
        matches!(self.mode, Mode::Lattice { .. })
    }

    /// Interpolated channel values at `point`, NaN outside the sampled hull
    pub fn evaluate(&self, point: [f64; 3]) -> Vec<f64> {
        let outside = vec![f64::NAN; self.channels.len()];
        for (a, fixed) in self.fixed.iter().enumerate() {
            if let Some(v) = fixed {
                if !self.tolerance.close(point[a], *v) {
                    return outside;
                }
            }
        }
        let query: Vec<f64> = self.active.iter().map(|a| point[a.index()]).collect();

        match &self.mode {
            Mode::Lattice { nodes, values } => self.simplex(nodes, values, &query).unwrap_or(outside),
            Mode::Planar { triangulation, values } => {
                let at = Point2::new(query[0], query[1]);
                let interpolator = triangulation.barycentric();
                (0..self.channels.len())
                    .map(|c| {
                        interpolator
                            .interpolate(|v| values[v.data().row][c], at)
                            .unwrap_or(f64::NAN)
                    })
                    .collect()
            }
            Mode::Volume { mesh, values } => match mesh.locate(Vector3::new(query[0], query[1], query[2])) {
                Some((cell, weights)) => (0..self.channels.len())
                    .map(|c| cell.iter().zip(weights).map(|(&v, w)| w * values[v][c]).sum::<f64>())
                    .collect(),
                None => outside,
            },
            Mode::Empty => outside,
        }
    }

    fn simplex(&self, nodes: &[Vec<f64>], values: &[Vec<f64>], query: &[f64]) -> Option<Vec<f64>> {
        let dims = nodes.len();
        let mut cell = Vec::with_capacity(dims);
        let mut frac = Vec::with_capacity(dims);
        for (axis_nodes, &q) in nodes.iter().zip(query) {
            let first = axis_nodes[0];
            let last = axis_nodes[axis_nodes.len() - 1];
            if q < first - self.tolerance.of(first) || q > last + self.tolerance.of(last) {
                return None;
            }
            let upper = axis_nodes.partition_point(|&n| n <= q);
            let i = upper.saturating_sub(1).min(axis_nodes.len() - 2);
            let t = (q - axis_nodes[i]) / (axis_nodes[i + 1] - axis_nodes[i]);
            cell.push(i);
            frac.push(t.clamp(0.0, 1.0));
        }

        let mut order: Vec<usize> = (0..dims).collect();
        order.sort_by(|&a, &b| frac[b].partial_cmp(&frac[a]).unwrap_or(Ordering::Equal));

        let mut result = vec![0.0; self.channels.len()];
        let mut add = |vertex: &[usize], weight: f64| {
            if weight > 0.0 {
                let node = &values[flat_index(nodes, vertex)];
                for (r, v) in result.iter_mut().zip(node) {
                    *r += weight * v;
                }
            }
        };

        let mut vertex = cell;
        let lead = order.first().map(|&d| frac[d]).unwrap_or(0.0);
        add(&vertex, 1.0 - lead);
        for (k, &d) in order.iter().enumerate() {
            vertex[d] += 1;
            let next = order.get(k + 1).map(|&n| frac[n]).unwrap_or(0.0);
            add(&vertex, frac[d] - next);
        }
        Some(result)
    }
}

fn build_lattice(points: &[Vec<f64>], values: &[Vec<f64>], tolerance: Tolerance) -> Option<Mode> {
    let dims = points.first()?.len();
    let mut nodes = Vec::with_capacity(dims);
    for d in 0..dims {
        let mut coords: Vec<f64> = points.iter().map(|p| p[d]).collect();
        coords.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        coords.dedup_by(|a, b| tolerance.close(*a, *b));
        if coords.len() < 2 {
            return None;
        }
        nodes.push(coords);
    }

    let count: usize = nodes.iter().map(Vec::len).product();
    if count != points.len() {
        return None;
    }

    let mut slots: Vec<Option<Vec<f64>>> = vec![None; count];
    for (p, v) in points.iter().zip(values) {
        let mut vertex = Vec::with_capacity(dims);
        for (axis_nodes, &q) in nodes.iter().zip(p) {
            vertex.push(axis_nodes.iter().position(|&n| tolerance.close(q, n))?);
        }
        let slot = &mut slots[flat_index(&nodes, &vertex)];
        if slot.is_some() {
            return None;
        }
        *slot = Some(v.clone());
    }

    let values = slots.into_iter().collect::<Option<Vec<_>>>()?;
    Some(Mode::Lattice { nodes, values })
}

fn flat_index(nodes: &[Vec<f64>], vertex: &[usize]) -> usize {
    nodes
        .iter()
        .zip(vertex)
        .fold(0, |acc, (axis_nodes, &i)| acc * axis_nodes.len() + i)
}

/// Drop points that repeat an earlier one within `tolerance`
fn distinct(points: Vec<Vec<f64>>, values: Vec<Vec<f64>>, tolerance: Tolerance) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .iter()
            .zip(&points[b])
            .map(|(p, q)| p.partial_cmp(q).unwrap_or(Ordering::Equal))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut keep = vec![true; points.len()];
    for pair in order.windows(2) {
        let same = points[pair[0]]
            .iter()
            .zip(&points[pair[1]])
            .all(|(p, q)| tolerance.close(*q, *p));
        if same {
            let later = pair[0].max(pair[1]);
            keep[later] = false;
        }
    }

    points
        .into_iter()
        .zip(values)
        .zip(keep)
        .filter_map(|(pv, k)| k.then_some(pv))
        .unzip()
}
