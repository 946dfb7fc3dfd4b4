// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Angular Quadrature
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Discrete-ordinates direction sets for the even-parity equation.
//!
//! Since ψ⁺(Ω) = ψ⁺(−Ω), only half of the sphere is stored (a quarter in
//! 2-D, where the ±z pair also projects to one point). A Gauss-Legendre
//! rule of `n = SN order` points on the polar cosine fixes the levels;
//! azimuths sit at `(j + ½)·2π/N_l` and are generated from the first
//! quadrant by sign flips, so mirrored directions are exact copies.
//!
//! | dim | levels       | N_l        | kept        | count      |
//! |-----|--------------|------------|-------------|------------|
//! | 1   | μ < 0        | -          | μ           | n/2        |
//! | 2   | μ > 0        | 4(n − i)   | cos φ > 0   | n(n+2)/4   |
//! | 3   | μ < 0        | 4(i + 1)   | all         | n(n+2)/2   |
//!
//! Weights sum to W = 2 in 1-D and 4π otherwise; scalar moments carry
//! the factor 4π/W.

use std::f64::consts::PI;

use ndarray::Array1;
use transport_math::gauss::gauss_legendre;
use transport_types::config::validate_sn_order;
use transport_types::constants::FOUR_PI;
use transport_types::error::{TransportError, TransportResult};

/// One discrete ordinate. Unused components are zero; in 2-D `omega` is
/// the (x, y) projection of a unit vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    pub omega: [f64; 3],
    pub weight: f64,
}

impl Direction {
    #[inline]
    pub fn dot(&self, v: &[f64; 3]) -> f64 {
        dot(&self.omega, v)
    }
}

#[inline]
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Mirror image `Ω − 2(n·Ω)n` about a plane with unit normal `n`.
pub fn reflect(omega: &[f64; 3], normal: &[f64; 3]) -> [f64; 3] {
    let on = dot(omega, normal);
    [
        omega[0] - 2.0 * on * normal[0],
        omega[1] - 2.0 * on * normal[1],
        omega[2] - 2.0 * on * normal[2],
    ]
}

#[derive(Debug, Clone)]
pub struct AngularQuadrature {
    dim: usize,
    sn_order: usize,
    directions: Vec<Direction>,
    tensor_norms: Vec<f64>,
    total_weight: f64,
}

/// Azimuthal cosines and sines of one level, built from the first
/// quadrant so each angle's mirrors are bit-exact.
fn azimuths(n_level: usize) -> Vec<(f64, f64)> {
    let quarter = n_level / 4;
    let first: Vec<(f64, f64)> = (0..quarter)
        .map(|j| {
            let phi = (j as f64 + 0.5) * 2.0 * PI / n_level as f64;
            (phi.cos(), phi.sin())
        })
        .collect();
    let mut out = Vec::with_capacity(n_level);
    out.extend(first.iter().copied());
    out.extend(first.iter().rev().map(|&(c, s)| (-c, s)));
    out.extend(first.iter().map(|&(c, s)| (-c, -s)));
    out.extend(first.iter().rev().map(|&(c, s)| (c, -s)));
    out
}

impl AngularQuadrature {
    /// Generate the set for an even SN order in 1, 2 or 3 dimensions.
    pub fn new(sn_order: usize, dim: usize) -> TransportResult<Self> {
        validate_sn_order(sn_order)?;
        if !(1..=3).contains(&dim) {
            return Err(TransportError::Config(format!(
                "angular quadrature needs dimension 1, 2 or 3, got {dim}"
            )));
        }
        let n = sn_order;
        let (mu, w) = gauss_legendre(n);
        let mut directions = Vec::new();

        match dim {
            1 => {
                for i in 0..n / 2 {
                    directions.push(Direction {
                        omega: [mu[i], 0.0, 0.0],
                        weight: 2.0 * w[i],
                    });
                }
            }
            2 => {
                for i in n / 2..n {
                    let n_level = 4 * (n - i);
                    let sin_theta = (1.0 - mu[i] * mu[i]).sqrt();
                    let weight = 8.0 * PI * w[i] / n_level as f64;
                    for (c, s) in azimuths(n_level).into_iter().filter(|&(c, _)| c > 0.0) {
                        directions.push(Direction {
                            omega: [sin_theta * c, sin_theta * s, 0.0],
                            weight,
                        });
                    }
                }
            }
            _ => {
                for i in 0..n / 2 {
                    let n_level = 4 * (i + 1);
                    let sin_theta = (1.0 - mu[i] * mu[i]).sqrt();
                    let weight = FOUR_PI * w[i] / n_level as f64;
                    for (c, s) in azimuths(n_level) {
                        directions.push(Direction {
                            omega: [sin_theta * c, sin_theta * s, mu[i]],
                            weight,
                        });
                    }
                }
            }
        }

        // ‖d ⊗ d‖_F = |d|²
        let tensor_norms = directions.iter().map(|d| d.dot(&d.omega)).collect();
        let total_weight = if dim == 1 { 2.0 } else { FOUR_PI };

        log::debug!(
            "S{sn_order} quadrature in {dim}-D: {} directions, weight sum {:.12}",
            directions.len(),
            directions.iter().map(|d| d.weight).sum::<f64>()
        );

        Ok(AngularQuadrature {
            dim,
            sn_order,
            directions,
            tensor_norms,
            total_weight,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn sn_order(&self) -> usize {
        self.sn_order
    }

    pub fn n_directions(&self) -> usize {
        self.directions.len()
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn direction(&self, d: usize) -> TransportResult<&Direction> {
        self.directions.get(d).ok_or(TransportError::InvalidIndex {
            what: "direction",
            index: d,
            len: self.directions.len(),
        })
    }

    /// Frobenius norm of `d ⊗ d` for direction `d`.
    pub fn tensor_norm(&self, d: usize) -> f64 {
        self.tensor_norms[d]
    }

    pub fn tensor_norms(&self) -> &[f64] {
        &self.tensor_norms
    }

    /// Solid angle the weights are normalized to.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// `4π / W`.
    pub fn moment_factor(&self) -> f64 {
        FOUR_PI / self.total_weight
    }

    // ───────────────────────── flux integrals ────────────────────────

    /// Scalar moment `(4π/W) Σ_d w_d ψ_d` of one group. `angular` holds
    /// the component fields, `component(d)` maps a direction to its slot.
    pub fn scalar_moment<F>(&self, angular: &[Array1<f64>], component: F) -> Array1<f64>
    where
        F: Fn(usize) -> usize,
    {
        let n = angular.first().map_or(0, |a| a.len());
        let mut phi = Array1::zeros(n);
        let factor = self.moment_factor();
        for (d, dir) in self.directions.iter().enumerate() {
            phi.scaled_add(factor * dir.weight, &angular[component(d)]);
        }
        phi
    }

    /// Partial current `(4π/W) Σ_{d·n>0} w (d·n) ψ_d` from point values.
    pub fn directional_current(&self, psi: &[f64], normal: &[f64; 3]) -> f64 {
        self.moment_factor()
            * self
                .directions
                .iter()
                .zip(psi)
                .map(|(dir, p)| (dir.weight * dir.dot(normal), p))
                .filter(|(wn, _)| *wn > 0.0)
                .map(|(wn, p)| wn * p)
                .sum::<f64>()
    }

    /// Directional flux `(4π/W) Σ_{d·n>0} w ψ_d` from point values.
    pub fn directional_flux(&self, psi: &[f64], normal: &[f64; 3]) -> f64 {
        self.moment_factor()
            * self
                .directions
                .iter()
                .zip(psi)
                .filter(|(dir, _)| dir.dot(normal) > 0.0)
                .map(|(dir, p)| dir.weight * p)
                .sum::<f64>()
    }

    /// Odd-parity current `(4π/W) Σ_d w d (d·∇ψ_d) / σt` from point
    /// gradients. The net current is its negative.
    pub fn eddington_current(&self, grad_psi: &[[f64; 3]], sigma_t: f64) -> [f64; 3] {
        let factor = self.moment_factor() / sigma_t;
        let mut j = [0.0; 3];
        for (dir, g) in self.directions.iter().zip(grad_psi) {
            let s = factor * dir.weight * dir.dot(g);
            for a in 0..3 {
                j[a] += s * dir.omega[a];
            }
        }
        j
    }
}
