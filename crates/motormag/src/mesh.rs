//! Delaunay tetrahedralization of scattered 3-D samples (Bowyer-Watson) and
//! point location with barycentric weights.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

/// Relative slack on the in-sphere test, so co-spherical points (every
/// partial lattice) are treated as outside
const IN_SPHERE_SLACK: f64 = 1e-10;

/// Barycentric weights may dip this far below zero on a face
const FACE_SLACK: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Cell {
    vertices: [usize; 4],
    center: Vector3<f64>,
    radius2: f64,
}

impl Cell {
    /// None for a flat tetrahedron
    fn new(vertices: [usize; 4], points: &[Vector3<f64>]) -> Option<Self> {
        let a = points[vertices[0]];
        let edges = [
            points[vertices[1]] - a,
            points[vertices[2]] - a,
            points[vertices[3]] - a,
        ];
        let m = Matrix3::from_rows(&[edges[0].transpose(), edges[1].transpose(), edges[2].transpose()]);
        let scale = edges.iter().map(|e| e.norm()).fold(0.0, f64::max);
        if m.determinant().abs() <= 1e-12 * scale * scale * scale {
            return None;
        }
        let rhs = Vector3::new(edges[0].norm_squared(), edges[1].norm_squared(), edges[2].norm_squared()) / 2.0;
        let offset = m.lu().solve(&rhs)?;
        Some(Self {
            vertices,
            center: a + offset,
            radius2: offset.norm_squared(),
        })
    }

    fn encloses(&self, p: &Vector3<f64>) -> bool {
        (p - self.center).norm_squared() < self.radius2 * (1.0 - IN_SPHERE_SLACK)
    }

    fn faces(&self) -> [[usize; 3]; 4] {
        let [a, b, c, d] = self.vertices;
        [[b, c, d], [a, c, d], [a, b, d], [a, b, c]].map(|mut f| {
            f.sort_unstable();
            f
        })
    }
}

/// Tetrahedra covering the convex hull of a point cloud
#[derive(Debug, Clone)]
pub(crate) struct TetMesh {
    points: Vec<Vector3<f64>>,
    cells: Vec<[usize; 4]>,
    /// Maps `p - points[cell[0]]` to the weights of vertices 1..4
    inverses: Vec<Matrix3<f64>>,
}

impl TetMesh {
    /// Triangulate `points`, which must be distinct. Fewer than four points,
    /// or a flat cloud, give an empty mesh.
    pub(crate) fn build(points: &[Vector3<f64>]) -> Self {
        let n = points.len();
        let mut all = points.to_vec();
        let mut cells = Vec::new();

        if n >= 4 {
            let (min, max) = points.iter().fold((points[0], points[0]), |(lo, hi), p| (lo.inf(p), hi.sup(p)));
            let center = (min + max) / 2.0;
            let m = 100.0 * (max - min).max().max(f64::MIN_POSITIVE);
            // regular tetrahedron well around the cloud
            for corner in [
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(1.0, -1.0, -1.0),
                Vector3::new(-1.0, 1.0, -1.0),
                Vector3::new(-1.0, -1.0, 1.0),
            ] {
                all.push(center + corner * m);
            }
            cells.extend(Cell::new([n, n + 1, n + 2, n + 3], &all));

            for i in 0..n {
                let p = all[i];
                let (bad, good): (Vec<Cell>, Vec<Cell>) = cells.into_iter().partition(|c| c.encloses(&p));

                let mut shared: HashMap<[usize; 3], usize> = HashMap::new();
                for face in bad.iter().flat_map(Cell::faces) {
                    *shared.entry(face).or_default() += 1;
                }

                cells = good;
                for ([a, b, c], count) in shared {
                    if count == 1 {
                        cells.extend(Cell::new([a, b, c, i], &all));
                    }
                }
            }
            cells.retain(|c| c.vertices.iter().all(|&v| v < n));
        }

        let mut mesh = Self {
            points: points.to_vec(),
            cells: Vec::with_capacity(cells.len()),
            inverses: Vec::with_capacity(cells.len()),
        };
        for cell in cells {
            let v = cell.vertices;
            let a = points[v[0]];
            let edges = Matrix3::from_columns(&[points[v[1]] - a, points[v[2]] - a, points[v[3]] - a]);
            if let Some(inverse) = edges.try_inverse() {
                mesh.cells.push(v);
                mesh.inverses.push(inverse);
            }
        }
        mesh
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell containing `q` and the barycentric weight of each of its
    /// vertices, or None outside the hull
    pub(crate) fn locate(&self, q: Vector3<f64>) -> Option<([usize; 4], [f64; 4])> {
        self.cells.iter().zip(&self.inverses).find_map(|(cell, inverse)| {
            let w = inverse * (q - self.points[cell[0]]);
            let weights = [1.0 - w.sum(), w.x, w.y, w.z];
            weights.iter().all(|&l| l >= -FACE_SLACK).then_some((*cell, weights))
        })
    }
}
