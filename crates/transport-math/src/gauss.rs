// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Gauss-Legendre Quadrature
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gauss-Legendre points and weights.
//!
//! Roots of `P_n` are found by Newton iteration from the Tricomi initial
//! guess. Only the non-negative half is computed; the negative half is
//! its exact mirror, so `x[i] == -x[n-1-i]` bitwise. Polar levels and
//! reflective direction matching rely on that symmetry.

use std::f64::consts::PI;

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITER: usize = 100;

/// Evaluate `(P_n(x), P_n'(x))` by the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// `n`-point Gauss-Legendre rule on `[-1, 1]`, points ascending.
///
/// Integrates polynomials of degree `2n - 1` exactly. `n == 0` yields
/// empty vectors.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let nf = n as f64;

    for i in 0..n.div_ceil(2) {
        // i-th largest root
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..NEWTON_MAX_ITER {
            let (p, d) = legendre_with_derivative(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                let (_, d) = legendre_with_derivative(n, x);
                dp = d;
                break;
            }
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        let hi = n - 1 - i;
        if i == hi {
            points[i] = 0.0;
            weights[i] = w;
        } else {
            points[hi] = x;
            points[i] = -x;
            weights[hi] = w;
            weights[i] = w;
        }
    }
    (points, weights)
}

/// `n`-point Gauss-Legendre rule mapped to `[0, 1]`; weights sum to one.
pub fn gauss_legendre_unit(n: usize) -> (Vec<f64>, Vec<f64>) {
    let (x, w) = gauss_legendre(n);
    (
        x.iter().map(|xi| 0.5 * (xi + 1.0)).collect(),
        w.iter().map(|wi| 0.5 * wi).collect(),
    )
}
