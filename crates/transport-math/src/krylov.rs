// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Krylov Solvers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Preconditioned Krylov solvers for the assembled transport operators.
//!
//! - [`cg_solve`]: conjugate gradients for symmetric positive-definite
//!   systems (single-component operators).
//! - [`bicgstab_solve`]: right-preconditioned BiCGStab for general
//!   operators, the default for systems coupled by implicit reflection.
//! - [`crate::gmres::gmres_solve`]: restarted GMRES(m), the robust
//!   non-symmetric fallback.
//!
//! All solvers take the initial guess in `x` and report the outcome in a
//! [`SolveResult`] rather than failing; callers decide how to treat
//! non-convergence. CG and BiCGStab stop on `‖b − A x‖₂ ≤ tol · ‖b‖₂`;
//! GMRES measures the left-preconditioned residual instead.

use ndarray::Array1;
use transport_types::error::{TransportError, TransportResult};

use crate::gmres::gmres_solve;
use crate::precond::Preconditioner;

// ───────────────────────────── interfaces ────────────────────────────

/// Square operator `y = A x`.
pub trait LinearOperator: Sync {
    fn n_rows(&self) -> usize;

    /// Whether assembly has been finalized.
    fn is_ready(&self) -> bool {
        true
    }

    fn apply(&self, x: &Array1<f64>, y: &mut Array1<f64>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrylovMethod {
    Cg,
    BiCgStab,
    Gmres,
}

/// Configuration shared by all Krylov methods.
#[derive(Debug, Clone)]
pub struct KrylovConfig {
    pub method: KrylovMethod,
    /// Relative residual tolerance (default: 1e-10).
    pub tol: f64,
    /// Maximum matrix-vector products (default: 5000).
    pub max_iter: usize,
    /// GMRES restart length (default: 30).
    pub restart: usize,
}

impl Default for KrylovConfig {
    fn default() -> Self {
        KrylovConfig {
            method: KrylovMethod::Cg,
            tol: 1e-10,
            max_iter: 5000,
            restart: 30,
        }
    }
}

/// Result of a Krylov solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub iterations: usize,
    /// Final unpreconditioned L2 residual norm.
    pub residual: f64,
    pub converged: bool,
}

// ───────────────────────── BLAS-like helpers ─────────────────────────

#[inline]
pub(crate) fn norm2(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// `r = b - A x`
pub(crate) fn residual<A: LinearOperator + ?Sized>(
    op: &A,
    b: &Array1<f64>,
    x: &Array1<f64>,
    r: &mut Array1<f64>,
) {
    op.apply(x, r);
    r.zip_mut_with(b, |ri, &bi| *ri = bi - *ri);
}

fn check_shapes<A: LinearOperator + ?Sized>(
    op: &A,
    b: &Array1<f64>,
    x: &Array1<f64>,
) -> TransportResult<()> {
    if !op.is_ready() {
        return Err(TransportError::LinAlg(
            "operator used before compress()".to_string(),
        ));
    }
    let n = op.n_rows();
    for len in [b.len(), x.len()] {
        if len != n {
            return Err(TransportError::DimensionMismatch {
                expected: n,
                found: len,
            });
        }
    }
    Ok(())
}

// ───────────────────────────── dispatch ──────────────────────────────

/// Solve `A x = b` with the configured method.
pub fn solve<A, P>(
    op: &A,
    precond: &P,
    b: &Array1<f64>,
    x: &mut Array1<f64>,
    config: &KrylovConfig,
) -> TransportResult<SolveResult>
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    check_shapes(op, b, x)?;
    let result = match config.method {
        KrylovMethod::Cg => cg_solve(op, precond, b, x, config.tol, config.max_iter),
        KrylovMethod::BiCgStab => bicgstab_solve(op, precond, b, x, config.tol, config.max_iter),
        KrylovMethod::Gmres => gmres_solve(op, precond, b, x, config),
    };
    if !result.converged {
        log::debug!(
            "{:?} stopped after {} iterations at residual {:.3e}",
            config.method,
            result.iterations,
            result.residual
        );
    }
    Ok(result)
}

/// Zero right-hand side has the exact solution zero.
fn trivial_rhs(b: &Array1<f64>, x: &mut Array1<f64>) -> Option<SolveResult> {
    if norm2(b) < 1e-300 {
        x.fill(0.0);
        return Some(SolveResult {
            iterations: 0,
            residual: 0.0,
            converged: true,
        });
    }
    None
}

// ───────────────────────── conjugate gradients ───────────────────────

/// Preconditioned conjugate gradients.
pub fn cg_solve<A, P>(
    op: &A,
    precond: &P,
    b: &Array1<f64>,
    x: &mut Array1<f64>,
    tol: f64,
    max_iter: usize,
) -> SolveResult
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    if let Some(done) = trivial_rhs(b, x) {
        return done;
    }
    let n = b.len();
    let abs_tol = tol * norm2(b);

    let mut r = Array1::zeros(n);
    residual(op, b, x, &mut r);
    let mut res_norm = norm2(&r);
    if res_norm <= abs_tol {
        return SolveResult {
            iterations: 0,
            residual: res_norm,
            converged: true,
        };
    }

    let mut z = Array1::zeros(n);
    precond.apply(&r, &mut z);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut q = Array1::zeros(n);

    for it in 1..=max_iter {
        op.apply(&p, &mut q);
        let pq = p.dot(&q);
        if pq.is_nan() || pq <= 0.0 {
            // Operator not positive definite along p
            return SolveResult {
                iterations: it,
                residual: res_norm,
                converged: false,
            };
        }
        let alpha = rz / pq;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);
        res_norm = norm2(&r);
        if res_norm <= abs_tol {
            return SolveResult {
                iterations: it,
                residual: res_norm,
                converged: true,
            };
        }

        precond.apply(&r, &mut z);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p.zip_mut_with(&z, |pi, &zi| *pi = zi + beta * *pi);
    }

    SolveResult {
        iterations: max_iter,
        residual: res_norm,
        converged: false,
    }
}

// ──────────────────────────── BiCGStab ───────────────────────────────

/// Right-preconditioned BiCGStab.
pub fn bicgstab_solve<A, P>(
    op: &A,
    precond: &P,
    b: &Array1<f64>,
    x: &mut Array1<f64>,
    tol: f64,
    max_iter: usize,
) -> SolveResult
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    if let Some(done) = trivial_rhs(b, x) {
        return done;
    }
    let n = b.len();
    let abs_tol = tol * norm2(b);

    let mut r = Array1::zeros(n);
    residual(op, b, x, &mut r);
    let mut res_norm = norm2(&r);
    if res_norm <= abs_tol {
        return SolveResult {
            iterations: 0,
            residual: res_norm,
            converged: true,
        };
    }

    let r_hat = r.clone();
    let mut rho = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;
    let mut v = Array1::<f64>::zeros(n);
    let mut p = Array1::<f64>::zeros(n);
    let mut y = Array1::zeros(n);
    let mut z = Array1::zeros(n);
    let mut s = Array1::zeros(n);
    let mut t = Array1::zeros(n);
    let mut iterations = 0;

    for it in 1..=max_iter {
        iterations = it;
        let rho_new = r_hat.dot(&r);
        if rho_new.abs() < 1e-300 {
            break;
        }
        let beta = (rho_new / rho) * (alpha / omega);
        rho = rho_new;
        // p = r + beta (p - omega v)
        ndarray::Zip::from(&mut p)
            .and(&r)
            .and(&v)
            .for_each(|pi, &ri, &vi| *pi = ri + beta * (*pi - omega * vi));

        precond.apply(&p, &mut y);
        op.apply(&y, &mut v);
        let denom = r_hat.dot(&v);
        if denom.abs() < 1e-300 {
            break;
        }
        alpha = rho / denom;

        s.assign(&r);
        s.scaled_add(-alpha, &v);
        let s_norm = norm2(&s);
        if s_norm <= abs_tol {
            x.scaled_add(alpha, &y);
            return SolveResult {
                iterations: it,
                residual: s_norm,
                converged: true,
            };
        }

        precond.apply(&s, &mut z);
        op.apply(&z, &mut t);
        let tt = t.dot(&t);
        if tt < 1e-300 {
            break;
        }
        omega = t.dot(&s) / tt;
        x.scaled_add(alpha, &y);
        x.scaled_add(omega, &z);
        r.assign(&s);
        r.scaled_add(-omega, &t);
        res_norm = norm2(&r);
        if res_norm <= abs_tol {
            return SolveResult {
                iterations: it,
                residual: res_norm,
                converged: true,
            };
        }
        if omega.abs() < 1e-300 {
            break;
        }
    }

    // Breakdown or cap: report the true residual.
    residual(op, b, x, &mut r);
    let res_norm = norm2(&r);
    SolveResult {
        iterations,
        residual: res_norm,
        converged: res_norm <= abs_tol,
    }
}

// ═══════════════════════════════ tests ═══════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precond::{BlockJacobi, IdentityPreconditioner, Jacobi};
    use crate::sparse::{SparseMatrix, SparsityPattern};
    use std::sync::Arc;

    /// 1-D Laplacian plus a reaction term; `skew` adds an antisymmetric
    /// convection part.
    fn tridiagonal(n: usize, skew: f64) -> SparseMatrix {
        let rows = (0..n)
            .map(|i| (i.saturating_sub(1)..(i + 2).min(n)).collect())
            .collect();
        let pattern = Arc::new(SparsityPattern::from_rows(n, rows).unwrap());
        let mut a = SparseMatrix::new(pattern);
        for i in 0..n {
            a.add(i, i, 2.5).unwrap();
            if i > 0 {
                a.add(i, i - 1, -1.0 - skew).unwrap();
            }
            if i + 1 < n {
                a.add(i, i + 1, -1.0 + skew).unwrap();
            }
        }
        a.compress();
        a
    }

    fn rhs(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| ((i + 1) as f64).sin())
    }

    fn true_residual(a: &SparseMatrix, b: &Array1<f64>, x: &Array1<f64>) -> f64 {
        let mut r = Array1::zeros(b.len());
        residual(a, b, x, &mut r);
        norm2(&r) / norm2(b)
    }

    #[test]
    fn test_cg_spd_convergence() {
        let a = tridiagonal(60, 0.0);
        let b = rhs(60);
        let mut x = Array1::zeros(60);
        let res = cg_solve(&a, &Jacobi::new(&a).unwrap(), &b, &mut x, 1e-12, 500);
        assert!(res.converged, "CG should converge: {res:?}");
        assert!(true_residual(&a, &b, &x) < 1e-11);
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let a = tridiagonal(60, 0.4);
        let b = rhs(60);
        let mut x = Array1::zeros(60);
        let res = bicgstab_solve(&a, &Jacobi::new(&a).unwrap(), &b, &mut x, 1e-12, 500);
        assert!(res.converged, "BiCGStab should converge: {res:?}");
        assert!(true_residual(&a, &b, &x) < 1e-10);
    }

    #[test]
    fn test_dispatch_gmres_block_jacobi() {
        let a = tridiagonal(40, 0.3);
        let b = rhs(40);
        let mut x = Array1::zeros(40);
        let config = KrylovConfig {
            method: KrylovMethod::Gmres,
            tol: 1e-12,
            ..KrylovConfig::default()
        };
        let pc = BlockJacobi::new(&a, 4).unwrap();
        let res = solve(&a, &pc, &b, &mut x, &config).unwrap();
        assert!(res.converged, "GMRES should converge: {res:?}");
        assert!(true_residual(&a, &b, &x) < 1e-10);
    }

    #[test]
    fn test_zero_rhs_gives_zero() {
        let a = tridiagonal(10, 0.0);
        let b = Array1::zeros(10);
        let mut x = Array1::from_elem(10, 3.0);
        let res = cg_solve(&a, &IdentityPreconditioner, &b, &mut x, 1e-12, 10);
        assert!(res.converged);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_warm_start_already_converged() {
        let a = tridiagonal(20, 0.0);
        let b = rhs(20);
        let mut x = Array1::zeros(20);
        cg_solve(&a, &IdentityPreconditioner, &b, &mut x, 1e-13, 500);
        let res = cg_solve(&a, &IdentityPreconditioner, &b, &mut x, 1e-10, 500);
        assert_eq!(res.iterations, 0, "warm start should need no iterations");
    }

    #[test]
    fn test_dimension_mismatch_and_uncompressed() {
        let a = tridiagonal(10, 0.0);
        let b = rhs(9);
        let mut x = Array1::zeros(10);
        let config = KrylovConfig::default();
        assert!(matches!(
            solve(&a, &IdentityPreconditioner, &b, &mut x, &config),
            Err(TransportError::DimensionMismatch { .. })
        ));

        let mut open = tridiagonal(10, 0.0);
        open.add(0, 0, 1.0).unwrap();
        let b = rhs(10);
        assert!(matches!(
            solve(&open, &IdentityPreconditioner, &b, &mut x, &config),
            Err(TransportError::LinAlg(_))
        ));
    }

    #[test]
    fn test_cap_reports_not_converged() {
        let a = tridiagonal(200, 0.0);
        let b = rhs(200);
        let mut x = Array1::zeros(200);
        let res = cg_solve(&a, &IdentityPreconditioner, &b, &mut x, 1e-14, 2);
        assert!(!res.converged);
        assert_eq!(res.iterations, 2);
    }
}
