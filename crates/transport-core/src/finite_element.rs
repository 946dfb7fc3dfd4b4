// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Finite Elements
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Discontinuous tensor-product Lagrange elements on the uniform mesh.
//!
//! Every cell of a [`CartesianMesh`] is the same box, so shape values,
//! physical gradients and JxW are tabulated once at construction and
//! shared by all cells. Local dofs and quadrature points are both
//! numbered with x fastest.
//!
//! Face quadrature runs over the tangential axes in ascending order, so
//! point `q` on face `f` of a cell and point `q` on face `f ^ 1` of the
//! neighbour across it are the same physical point.

use std::ops::Range;

use ndarray::{Array2, Array3, ArrayView1};
use transport_math::gauss::gauss_legendre_unit;
use transport_types::constants::MAX_POLYNOMIAL_DEGREE;
use transport_types::error::{TransportError, TransportResult};

use crate::mesh::{face_normal, CartesianMesh};

/// Shape data of a cell or face evaluator.
pub trait FiniteElement: Send + Sync {
    fn degree(&self) -> usize;

    fn dofs_per_cell(&self) -> usize;

    /// Volume values for `cell`.
    fn cell_values(&self, cell: usize) -> &CellValues;

    /// Values on `face` of `cell`.
    fn face_values(&self, cell: usize, face: usize) -> &FaceValues;

    /// Global dof indices of `cell`.
    fn dof_range(&self, cell: usize) -> Range<usize> {
        let n = self.dofs_per_cell();
        cell * n..(cell + 1) * n
    }
}

// ─────────────────────────── tabulated data ──────────────────────────

/// Values, physical gradients and JxW at the volume quadrature points.
#[derive(Debug, Clone)]
pub struct CellValues {
    values: Array2<f64>,
    gradients: Array3<f64>,
    jxw: Vec<f64>,
}

impl CellValues {
    pub fn n_dofs(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_quadrature_points(&self) -> usize {
        self.jxw.len()
    }

    #[inline]
    pub fn value(&self, i: usize, q: usize) -> f64 {
        self.values[[i, q]]
    }

    #[inline]
    pub fn gradient(&self, i: usize, q: usize) -> [f64; 3] {
        [
            self.gradients[[i, q, 0]],
            self.gradients[[i, q, 1]],
            self.gradients[[i, q, 2]],
        ]
    }

    #[inline]
    pub fn jxw(&self, q: usize) -> f64 {
        self.jxw[q]
    }

    /// Value of the local expansion `coeffs` at point `q`.
    pub fn evaluate(&self, coeffs: ArrayView1<f64>, q: usize) -> f64 {
        coeffs
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.values[[i, q]])
            .sum()
    }

    pub fn evaluate_gradient(&self, coeffs: ArrayView1<f64>, q: usize) -> [f64; 3] {
        let mut g = [0.0; 3];
        for (i, c) in coeffs.iter().enumerate() {
            for (a, ga) in g.iter_mut().enumerate() {
                *ga += c * self.gradients[[i, q, a]];
            }
        }
        g
    }
}

/// Face quadrature data plus the outward normal.
#[derive(Debug, Clone)]
pub struct FaceValues {
    inner: CellValues,
    normal: [f64; 3],
    axis: usize,
}

impl FaceValues {
    pub fn n_dofs(&self) -> usize {
        self.inner.n_dofs()
    }

    pub fn n_quadrature_points(&self) -> usize {
        self.inner.n_quadrature_points()
    }

    #[inline]
    pub fn value(&self, i: usize, q: usize) -> f64 {
        self.inner.value(i, q)
    }

    #[inline]
    pub fn gradient(&self, i: usize, q: usize) -> [f64; 3] {
        self.inner.gradient(i, q)
    }

    #[inline]
    pub fn jxw(&self, q: usize) -> f64 {
        self.inner.jxw(q)
    }

    pub fn normal(&self) -> [f64; 3] {
        self.normal
    }

    /// Axis the face is normal to.
    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn evaluate(&self, coeffs: ArrayView1<f64>, q: usize) -> f64 {
        self.inner.evaluate(coeffs, q)
    }

    pub fn evaluate_gradient(&self, coeffs: ArrayView1<f64>, q: usize) -> [f64; 3] {
        self.inner.evaluate_gradient(coeffs, q)
    }
}

// ──────────────────────────── 1-D basis ──────────────────────────────

/// Lagrange polynomials on `p + 1` equispaced nodes of `[0, 1]`.
struct LagrangeBasis1d {
    nodes: Vec<f64>,
}

impl LagrangeBasis1d {
    fn new(degree: usize) -> Self {
        LagrangeBasis1d {
            nodes: (0..=degree).map(|k| k as f64 / degree as f64).collect(),
        }
    }

    fn value(&self, k: usize, x: f64) -> f64 {
        let xk = self.nodes[k];
        self.nodes
            .iter()
            .enumerate()
            .filter(|&(m, _)| m != k)
            .map(|(_, &xm)| (x - xm) / (xk - xm))
            .product()
    }

    fn derivative(&self, k: usize, x: f64) -> f64 {
        let xk = self.nodes[k];
        let mut sum = 0.0;
        for (j, &xj) in self.nodes.iter().enumerate() {
            if j == k {
                continue;
            }
            let mut term = 1.0 / (xk - xj);
            for (m, &xm) in self.nodes.iter().enumerate() {
                if m != k && m != j {
                    term *= (x - xm) / (xk - xm);
                }
            }
            sum += term;
        }
        sum
    }
}

// ──────────────────────────── DG element ─────────────────────────────

/// DG tensor-product Lagrange element of degree 1..=4 with `(p+1)^dim`
/// Gauss points.
#[derive(Debug, Clone)]
pub struct DgLagrange {
    dim: usize,
    degree: usize,
    dofs_per_cell: usize,
    cell: CellValues,
    faces: Vec<FaceValues>,
}

/// Multi-index of `flat` with `n` entries per active axis, x fastest.
fn unflatten(mut flat: usize, n: usize, dim: usize) -> [usize; 3] {
    let mut idx = [0; 3];
    for slot in idx.iter_mut().take(dim) {
        *slot = flat % n;
        flat /= n;
    }
    idx
}

impl DgLagrange {
    pub fn new(mesh: &CartesianMesh, degree: usize) -> TransportResult<Self> {
        if degree == 0 || degree > MAX_POLYNOMIAL_DEGREE {
            return Err(TransportError::Config(format!(
                "polynomial degree must be in 1..={MAX_POLYNOMIAL_DEGREE}, got {degree}"
            )));
        }
        let dim = mesh.dim();
        let h = mesh.spacing();
        let n1 = degree + 1;
        let dofs_per_cell = n1.pow(dim as u32);
        let basis = LagrangeBasis1d::new(degree);
        let (qx, qw) = gauss_legendre_unit(n1);

        // Volume tabulation
        let n_q = n1.pow(dim as u32);
        let mut values = Array2::zeros((dofs_per_cell, n_q));
        let mut gradients = Array3::zeros((dofs_per_cell, n_q, 3));
        let mut jxw = vec![0.0; n_q];
        for q in 0..n_q {
            let qi = unflatten(q, n1, dim);
            jxw[q] = (0..dim).map(|a| qw[qi[a]]).product::<f64>() * mesh.cell_volume();
            for i in 0..dofs_per_cell {
                let ii = unflatten(i, n1, dim);
                let points: Vec<f64> = (0..dim).map(|a| qx[qi[a]]).collect();
                let (v, g) = tensor_value_and_gradient(&basis, &ii, &points, &h, dim);
                values[[i, q]] = v;
                for a in 0..3 {
                    gradients[[i, q, a]] = g[a];
                }
            }
        }
        let cell = CellValues {
            values,
            gradients,
            jxw,
        };

        // Face tabulation: the normal coordinate is pinned to 0 or 1
        let faces = (0..2 * dim)
            .map(|f| {
                let axis = f / 2;
                let pinned = if f % 2 == 0 { 0.0 } else { 1.0 };
                let tangential: Vec<usize> = (0..dim).filter(|&a| a != axis).collect();
                let n_fq = n1.pow(tangential.len() as u32);
                let mut values = Array2::zeros((dofs_per_cell, n_fq));
                let mut gradients = Array3::zeros((dofs_per_cell, n_fq, 3));
                let mut jxw = vec![0.0; n_fq];
                for q in 0..n_fq {
                    let ti = unflatten(q, n1, tangential.len());
                    let mut points = vec![pinned; dim];
                    let mut w = mesh.face_area(axis);
                    for (t, &a) in tangential.iter().enumerate() {
                        points[a] = qx[ti[t]];
                        w *= qw[ti[t]];
                    }
                    jxw[q] = w;
                    for i in 0..dofs_per_cell {
                        let ii = unflatten(i, n1, dim);
                        let (v, g) = tensor_value_and_gradient(&basis, &ii, &points, &h, dim);
                        values[[i, q]] = v;
                        for a in 0..3 {
                            gradients[[i, q, a]] = g[a];
                        }
                    }
                }
                FaceValues {
                    inner: CellValues {
                        values,
                        gradients,
                        jxw,
                    },
                    normal: face_normal(f),
                    axis,
                }
            })
            .collect();

        Ok(DgLagrange {
            dim,
            degree,
            dofs_per_cell,
            cell,
            faces,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// Product basis function `ii` and its physical gradient at reference
/// point `x`.
fn tensor_value_and_gradient(
    basis: &LagrangeBasis1d,
    ii: &[usize; 3],
    x: &[f64],
    h: &[f64; 3],
    dim: usize,
) -> (f64, [f64; 3]) {
    let vals: Vec<f64> = (0..dim).map(|a| basis.value(ii[a], x[a])).collect();
    let ders: Vec<f64> = (0..dim)
        .map(|a| basis.derivative(ii[a], x[a]) / h[a])
        .collect();
    let value = vals.iter().product();
    let mut grad = [0.0; 3];
    for a in 0..dim {
        grad[a] = (0..dim)
            .map(|b| if b == a { ders[b] } else { vals[b] })
            .product();
    }
    (value, grad)
}

impl FiniteElement for DgLagrange {
    fn degree(&self) -> usize {
        self.degree
    }

    fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    fn cell_values(&self, _cell: usize) -> &CellValues {
        &self.cell
    }

    fn face_values(&self, _cell: usize, face: usize) -> &FaceValues {
        &self.faces[face]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn square(p: usize) -> (CartesianMesh, DgLagrange) {
        let mesh = CartesianMesh::new(2, &[2.0, 1.0], &[4, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, p).unwrap();
        (mesh, fe)
    }

    #[test]
    fn test_partition_of_unity() {
        for p in 1..=4 {
            let (_, fe) = square(p);
            let cv = fe.cell_values(0);
            for q in 0..cv.n_quadrature_points() {
                let sum: f64 = (0..cv.n_dofs()).map(|i| cv.value(i, q)).sum();
                assert!((sum - 1.0).abs() < 1e-12, "p = {p}, q = {q}: sum = {sum}");
                let gsum: f64 = (0..cv.n_dofs()).map(|i| cv.gradient(i, q)[0]).sum();
                assert!(gsum.abs() < 1e-10, "gradients must sum to zero, got {gsum}");
            }
        }
    }

    #[test]
    fn test_jxw_sums_to_measure() {
        let (mesh, fe) = square(2);
        let cv = fe.cell_values(3);
        let vol: f64 = (0..cv.n_quadrature_points()).map(|q| cv.jxw(q)).sum();
        assert!((vol - mesh.cell_volume()).abs() < 1e-14);
        let fv = fe.face_values(3, 1);
        let area: f64 = (0..fv.n_quadrature_points()).map(|q| fv.jxw(q)).sum();
        assert!((area - mesh.face_area(0)).abs() < 1e-14);
        assert_eq!(fv.normal(), [1.0, 0.0, 0.0]);
        assert_eq!(fv.axis(), 0);
    }

    #[test]
    fn test_linear_field_reproduced() {
        // u = 3x - 2y interpolated at the nodes of a 0.5 x 0.5 cell
        let (_, fe) = square(1);
        let h = 0.5;
        let nodal = |x: f64, y: f64| 3.0 * x - 2.0 * y;
        let coeffs = Array1::from_vec(vec![
            nodal(0.0, 0.0),
            nodal(h, 0.0),
            nodal(0.0, h),
            nodal(h, h),
        ]);
        let cv = fe.cell_values(0);
        for q in 0..cv.n_quadrature_points() {
            let g = cv.evaluate_gradient(coeffs.view(), q);
            assert!((g[0] - 3.0).abs() < 1e-12 && (g[1] + 2.0).abs() < 1e-12);
        }
        // On the +x face the trace is 1.5 - 2y
        let fv = fe.face_values(0, 1);
        let mean: f64 = (0..fv.n_quadrature_points())
            .map(|q| fv.evaluate(coeffs.view(), q) * fv.jxw(q))
            .sum::<f64>()
            / 0.5;
        assert!((mean - (1.5 - 0.5)).abs() < 1e-12, "face mean = {mean}");
    }

    #[test]
    fn test_neighbor_face_points_coincide() {
        // Tangential coordinates of point q agree between face 1 and face 0.
        let mesh = CartesianMesh::new(3, &[1.0, 1.0, 1.0], &[2, 2, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, 2).unwrap();
        let plus = fe.face_values(0, 1);
        let minus = fe.face_values(1, 0);
        // Basis functions on the shared face differ only in their x index.
        let n1 = 3;
        for q in 0..plus.n_quadrature_points() {
            for j in 0..n1 * n1 {
                let i_plus = (n1 - 1) + n1 * j;
                let i_minus = n1 * j;
                assert!((plus.value(i_plus, q) - minus.value(i_minus, q)).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_degree_out_of_range() {
        let mesh = CartesianMesh::new(1, &[1.0], &[2], vec![]).unwrap();
        assert!(DgLagrange::new(&mesh, 0).is_err());
        assert!(DgLagrange::new(&mesh, 5).is_err());
    }
}
