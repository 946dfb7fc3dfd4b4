// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — GMRES
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Restarted GMRES(m) Krylov subspace solver for non-symmetric transport
//! operators.
//!
//! GMRES (Generalised Minimal RESidual) builds an orthonormal Krylov
//! basis via Arnoldi iteration with modified Gram-Schmidt, then solves
//! the projected least-squares problem using Givens rotations on the
//! upper Hessenberg matrix.  When the basis reaches size `m` without
//! convergence the solver restarts from the current approximate
//! solution.
//!
//! A left-preconditioner is applied: instead of solving `A x = b`, we
//! solve `M⁻¹ A x = M⁻¹ b`.  Convergence is measured on the
//! preconditioned residual relative to `‖M⁻¹ b‖₂`.

use ndarray::Array1;

use crate::krylov::{norm2, residual, KrylovConfig, LinearOperator, SolveResult};
use crate::precond::Preconditioner;

// ───────────────────── Givens rotation helpers ──────────────────────

/// A single Givens rotation storing (c, s) such that
/// ```text
/// | c  s | | a |   | r |
/// |-s  c | | b | = | 0 |
/// ```
#[derive(Clone, Copy)]
struct GivensRotation {
    c: f64,
    s: f64,
}

impl GivensRotation {
    /// Compute the rotation that zeroes `b` in (a, b).
    fn compute(a: f64, b: f64) -> Self {
        if b.abs() < 1e-300 {
            GivensRotation { c: 1.0, s: 0.0 }
        } else if b.abs() > a.abs() {
            let tau = -a / b;
            let s = 1.0 / (1.0 + tau * tau).sqrt();
            let c = s * tau;
            GivensRotation { c, s }
        } else {
            let tau = -b / a;
            let c = 1.0 / (1.0 + tau * tau).sqrt();
            let s = c * tau;
            GivensRotation { c, s }
        }
    }

    /// Apply this rotation to (a, b) in place.
    #[inline]
    fn apply(&self, a: &mut f64, b: &mut f64) {
        let ta = *a;
        let tb = *b;
        *a = self.c * ta - self.s * tb;
        *b = self.s * ta + self.c * tb;
    }
}

// ─────────────────────────── main solver ─────────────────────────────

/// Solve `A x = b` using restarted GMRES(m) with left preconditioning.
///
/// `x` is the initial guess on entry and the solution on exit.
///
/// # Algorithm
///
/// ```text
/// for each restart cycle:
///   z = M⁻¹ (b - A·x)             (preconditioned residual)
///   beta = ||z||₂
///   V[0] = z / beta
///   for j = 0 .. m-1:             (Arnoldi)
///     w = M⁻¹ A V[j]
///     for i = 0 .. j:             (modified Gram-Schmidt)
///       H[i,j] = <w, V[i]>
///       w -= H[i,j] V[i]
///     H[j+1,j] = ||w||₂
///     V[j+1]   = w / H[j+1,j]
///     apply previous Givens to H[:,j]
///     compute new Givens to zero H[j+1,j]
///     if |g[j+1]| small: break
///   solve upper triangular system for y
///   x += V · y
/// ```
pub fn gmres_solve<A, P>(
    op: &A,
    precond: &P,
    b: &Array1<f64>,
    x: &mut Array1<f64>,
    config: &KrylovConfig,
) -> SolveResult
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    let n = b.len();
    if n == 0 || norm2(b) < 1e-300 {
        x.fill(0.0);
        return SolveResult {
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let m = config.restart.clamp(1, n); // Krylov dimension cannot exceed n

    let mut pb = Array1::zeros(n);
    precond.apply(b, &mut pb);
    let abs_tol = config.tol * norm2(&pb);

    let mut r = Array1::zeros(n);
    let mut z = Array1::zeros(n);
    let mut av = Array1::zeros(n);
    let mut total_iters: usize = 0;

    // ───── outer restart loop ─────
    while total_iters < config.max_iter {
        residual(op, b, x, &mut r);
        precond.apply(&r, &mut z);

        let beta = norm2(&z);
        if beta <= abs_tol {
            return SolveResult {
                iterations: total_iters,
                residual: norm2(&r),
                converged: true,
            };
        }

        let mut v_basis: Vec<Array1<f64>> = Vec::with_capacity(m + 1);
        v_basis.push(&z / beta);

        // Upper Hessenberg matrix H[(m+1) x m] stored column-major
        // H[i][j] => h_store[j * (m+1) + i]
        let h_rows = m + 1;
        let mut h_store = vec![0.0; h_rows * m];
        let mut givens: Vec<GivensRotation> = Vec::with_capacity(m);

        // Right-hand side of the Hessenberg least-squares: g = beta * e_1
        let mut g = vec![0.0; m + 1];
        g[0] = beta;

        let mut converged_inner = false;
        let mut inner_iters: usize = 0;

        // ───── Arnoldi iteration ─────
        for j in 0..m {
            if total_iters >= config.max_iter {
                break;
            }
            inner_iters = j + 1;
            total_iters += 1;

            // w = M⁻¹ A V[j]
            op.apply(&v_basis[j], &mut av);
            let mut w = Array1::zeros(n);
            precond.apply(&av, &mut w);

            // Modified Gram-Schmidt orthogonalisation
            for i in 0..=j {
                let h_ij = w.dot(&v_basis[i]);
                h_store[j * h_rows + i] = h_ij;
                w.scaled_add(-h_ij, &v_basis[i]);
            }

            let h_jp1_j = norm2(&w);
            h_store[j * h_rows + (j + 1)] = h_jp1_j;

            if h_jp1_j > 1e-300 {
                v_basis.push(w / h_jp1_j);
            } else {
                // Happy breakdown: residual is zero in the Krylov subspace
                v_basis.push(Array1::zeros(n));
            }

            // Apply all previous Givens rotations to column j of H
            for (i, rot) in givens.iter().enumerate() {
                let a_ptr = j * h_rows + i;
                let b_ptr = j * h_rows + i + 1;
                let mut ha = h_store[a_ptr];
                let mut hb = h_store[b_ptr];
                rot.apply(&mut ha, &mut hb);
                h_store[a_ptr] = ha;
                h_store[b_ptr] = hb;
            }

            // Compute new Givens rotation to zero H[j+1, j]
            let rot =
                GivensRotation::compute(h_store[j * h_rows + j], h_store[j * h_rows + (j + 1)]);
            {
                let a_ptr = j * h_rows + j;
                let b_ptr = j * h_rows + (j + 1);
                let mut ha = h_store[a_ptr];
                let mut hb = h_store[b_ptr];
                rot.apply(&mut ha, &mut hb);
                h_store[a_ptr] = ha;
                h_store[b_ptr] = hb;
            }
            {
                let mut ga = g[j];
                let mut gb = g[j + 1];
                rot.apply(&mut ga, &mut gb);
                g[j] = ga;
                g[j + 1] = gb;
            }
            givens.push(rot);

            // The residual norm estimate is |g[j+1]|
            if g[j + 1].abs() <= abs_tol || h_jp1_j < 1e-300 {
                converged_inner = true;
                break;
            }
        }

        // ───── solve the upper triangular system H y = g ─────
        let k = inner_iters;
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for jj in (i + 1)..k {
                sum -= h_store[jj * h_rows + i] * y[jj];
            }
            let diag = h_store[i * h_rows + i];
            y[i] = if diag.abs() > 1e-300 { sum / diag } else { 0.0 };
        }

        // ───── update solution: x = x + V * y ─────
        for (yi, vi) in y.iter().zip(v_basis.iter()) {
            x.scaled_add(*yi, vi);
        }

        if converged_inner {
            residual(op, b, x, &mut r);
            return SolveResult {
                iterations: total_iters,
                residual: norm2(&r),
                converged: true,
            };
        }
    }

    // Exhausted the iteration budget: report the preconditioned check
    residual(op, b, x, &mut r);
    precond.apply(&r, &mut z);
    SolveResult {
        iterations: total_iters,
        residual: norm2(&r),
        converged: norm2(&z) <= abs_tol,
    }
}

// ═══════════════════════════════ tests ═══════════════════════════════
