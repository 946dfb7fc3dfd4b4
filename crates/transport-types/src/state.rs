// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array1;

use crate::constants::FOUR_PI;

/// Scalar and angular flux coefficient vectors over the DG space.
#[derive(Debug, Clone)]
pub struct FluxState {
    /// Scalar flux per group driving the scattering source. With the
    /// low-order corrector enabled this is the corrected iterate.
    pub scalar: Vec<Array1<f64>>,
    /// Latest moment of the angular fluxes, per group.
    pub ho_scalar: Vec<Array1<f64>>,
    /// Snapshot taken before the current inner iteration.
    pub previous: Vec<Array1<f64>>,
    /// Snapshot taken at the start of the current generation.
    pub previous_generation: Vec<Array1<f64>>,
    /// Angular flux per component index.
    pub angular: Vec<Array1<f64>>,
    /// Incoming angular flux per component at the quadrature points of
    /// the reflective faces, when reflection is lagged. Empty otherwise.
    pub incoming: Vec<Array1<f64>>,
}

impl FluxState {
    pub fn new(n_groups: usize, n_components: usize, n_dofs: usize) -> Self {
        let zeros = |n: usize| (0..n).map(|_| Array1::zeros(n_dofs)).collect::<Vec<_>>();
        FluxState {
            scalar: zeros(n_groups),
            ho_scalar: zeros(n_groups),
            previous: zeros(n_groups),
            previous_generation: zeros(n_groups),
            angular: zeros(n_components),
            incoming: Vec::new(),
        }
    }

    pub fn n_groups(&self) -> usize {
        self.scalar.len()
    }

    pub fn n_dofs(&self) -> usize {
        self.scalar.first().map_or(0, |v| v.len())
    }

    /// Set every moment to `value` and every angular flux to the matching
    /// isotropic value `value / 4π`.
    pub fn reset_moments(&mut self, value: f64) {
        for field in self
            .scalar
            .iter_mut()
            .chain(self.ho_scalar.iter_mut())
            .chain(self.previous.iter_mut())
            .chain(self.previous_generation.iter_mut())
        {
            field.fill(value);
        }
        for psi in self.angular.iter_mut().chain(self.incoming.iter_mut()) {
            psi.fill(value / FOUR_PI);
        }
    }
}

/// Eigenvalue bookkeeping of the power iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenvalueState {
    pub k: f64,
    pub k_prev_gen: f64,
    pub fission_source: f64,
    pub fission_source_prev_gen: f64,
}

impl Default for EigenvalueState {
    fn default() -> Self {
        EigenvalueState {
            k: 1.0,
            k_prev_gen: 1.0,
            fission_source: 0.0,
            fission_source_prev_gen: 0.0,
        }
    }
}

/// Everything the iteration mutates, handed from step to step.
#[derive(Debug, Clone)]
pub struct SolverState {
    pub flux: FluxState,
    pub eigen: EigenvalueState,
    /// Source iterations in the current inner solve.
    pub inner_iterations: usize,
    /// Source iterations summed over the whole run.
    pub total_inner_iterations: usize,
    /// Completed power-iteration generations.
    pub generation: usize,
    /// Relative flux change of the most recent inner step.
    pub last_inner_error: f64,
}

impl SolverState {
    /// Fresh state with unit moments and k = 1.
    pub fn initialized(n_groups: usize, n_components: usize, n_dofs: usize) -> Self {
        let mut flux = FluxState::new(n_groups, n_components, n_dofs);
        flux.reset_moments(1.0);
        SolverState {
            flux,
            eigen: EigenvalueState::default(),
            inner_iterations: 0,
            total_inner_iterations: 0,
            generation: 0,
            last_inner_error: f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialized_state_is_flat() {
        let state = SolverState::initialized(2, 6, 16);
        assert_eq!(state.flux.n_groups(), 2);
        assert_eq!(state.flux.angular.len(), 6);
        assert_eq!(state.flux.n_dofs(), 16);
        assert!(state.flux.scalar.iter().all(|v| v.iter().all(|&x| x == 1.0)));
        let psi0 = 1.0 / FOUR_PI;
        assert!(state.flux.angular[5].iter().all(|&x| (x - psi0).abs() < 1e-15));
        assert_eq!(state.eigen.k, 1.0);
        assert!(state.flux.incoming.is_empty());
    }

    #[test]
    fn test_reset_moments_covers_incoming_traces() {
        let mut flux = FluxState::new(1, 2, 4);
        flux.incoming = vec![Array1::zeros(3); 2];
        flux.reset_moments(FOUR_PI * 2.0);
        assert!(flux.incoming.iter().flatten().all(|&x| (x - 2.0).abs() < 1e-14));
        assert!(flux.scalar[0].iter().all(|&x| (x - FOUR_PI * 2.0).abs() < 1e-14));
    }
}
