// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Property-Based Tests (proptest) for transport-math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for transport-math using proptest.
//!
//! Covers: Gauss-Legendre exactness, Krylov solver residuals, block-Jacobi
//! preconditioning.

use std::sync::Arc;

use ndarray::Array1;
use proptest::prelude::*;
use transport_math::gauss::gauss_legendre;
use transport_math::krylov::{solve, KrylovConfig, KrylovMethod, LinearOperator};
use transport_math::precond::{BlockJacobi, IdentityPreconditioner};
use transport_math::sparse::{SparseMatrix, SparsityPattern};

/// Block-tridiagonal test operator with `nb` blocks of size `bs`.
/// `skew` adds a non-symmetric off-diagonal perturbation.
fn block_operator(nb: usize, bs: usize, skew: f64) -> SparseMatrix {
    let n = nb * bs;
    let rows = (0..n)
        .map(|i| {
            let b = i / bs;
            let lo = b.saturating_sub(1) * bs;
            let hi = ((b + 2).min(nb)) * bs;
            (lo..hi).collect()
        })
        .collect();
    let pattern = Arc::new(SparsityPattern::from_rows(n, rows).unwrap());
    let mut a = SparseMatrix::new(pattern);
    for i in 0..n {
        a.add(i, i, 4.0 + bs as f64).unwrap();
        let b = i / bs;
        for j in (b * bs)..((b + 1) * bs) {
            if j != i {
                a.add(i, j, 0.5).unwrap();
            }
        }
        if i >= bs {
            a.add(i, i - bs, -1.0 - skew).unwrap();
        }
        if i + bs < n {
            a.add(i, i + bs, -1.0 + skew).unwrap();
        }
    }
    a.compress();
    a
}

fn true_residual(a: &SparseMatrix, b: &Array1<f64>, x: &Array1<f64>) -> f64 {
    let mut ax = Array1::zeros(b.len());
    a.apply(x, &mut ax);
    (b - &ax).mapv(|v| v * v).sum().sqrt()
}

// ── Gauss-Legendre Properties ────────────────────────────────────────

proptest! {
    /// Weights are positive and sum to the interval length.
    #[test]
    fn gauss_weights_sum_to_two(n in 1usize..24) {
        let (_, w) = gauss_legendre(n);
        prop_assert!(w.iter().all(|wi| *wi > 0.0));
        let sum: f64 = w.iter().sum();
        prop_assert!((sum - 2.0).abs() < 1e-13, "sum = {}", sum);
    }

    /// An n-point rule integrates x^k exactly for k < 2n.
    #[test]
    fn gauss_polynomial_exactness(n in 1usize..12, k_frac in 0.0f64..1.0) {
        let k = ((2 * n - 1) as f64 * k_frac).floor() as i32;
        let (x, w) = gauss_legendre(n);
        let integral: f64 = x.iter().zip(&w).map(|(xi, wi)| wi * xi.powi(k)).sum();
        let exact = if k % 2 == 1 { 0.0 } else { 2.0 / (k as f64 + 1.0) };
        prop_assert!((integral - exact).abs() < 1e-12,
            "n = {}, k = {}: {} vs {}", n, k, integral, exact);
    }

    /// Points lie strictly inside (-1, 1).
    #[test]
    fn gauss_points_interior(n in 1usize..24) {
        let (x, _) = gauss_legendre(n);
        prop_assert!(x.iter().all(|xi| xi.abs() < 1.0));
    }
}

// ── Krylov Solver Properties ─────────────────────────────────────────

proptest! {
    /// CG on a symmetric positive definite operator meets its tolerance.
    #[test]
    fn cg_residual_below_tolerance(nb in 2usize..12, bs in 1usize..5, seed in 0.0f64..6.0) {
        let a = block_operator(nb, bs, 0.0);
        let n = nb * bs;
        let b = Array1::from_shape_fn(n, |i| (seed + i as f64).sin() + 1.5);
        let mut x = Array1::zeros(n);
        let config = KrylovConfig { method: KrylovMethod::Cg, ..KrylovConfig::default() };
        let result = solve(&a, &IdentityPreconditioner, &b, &mut x, &config).unwrap();
        prop_assert!(result.converged);
        let bnorm = b.mapv(|v| v * v).sum().sqrt();
        prop_assert!(true_residual(&a, &b, &x) <= 1e-8 * bnorm);
    }

    /// BiCGStab and GMRES agree on a non-symmetric operator.
    #[test]
    fn nonsymmetric_methods_agree(nb in 2usize..10, bs in 1usize..4, skew in 0.0f64..0.8) {
        let a = block_operator(nb, bs, skew);
        let n = nb * bs;
        let b = Array1::from_shape_fn(n, |i| 1.0 + 0.1 * i as f64);
        let pc = BlockJacobi::new(&a, bs).unwrap();

        let mut x_bicg = Array1::zeros(n);
        let cfg_bicg = KrylovConfig { method: KrylovMethod::BiCgStab, ..KrylovConfig::default() };
        let r1 = solve(&a, &pc, &b, &mut x_bicg, &cfg_bicg).unwrap();

        let mut x_gmres = Array1::zeros(n);
        let cfg_gmres = KrylovConfig { method: KrylovMethod::Gmres, ..KrylovConfig::default() };
        let r2 = solve(&a, &pc, &b, &mut x_gmres, &cfg_gmres).unwrap();

        prop_assert!(r1.converged && r2.converged);
        let diff = (&x_bicg - &x_gmres).mapv(f64::abs).fold(0.0_f64, |m, v| m.max(*v));
        prop_assert!(diff < 1e-7, "max difference {}", diff);
    }
}
