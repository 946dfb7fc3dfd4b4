// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Particle Balance
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Global absorption / leakage / source tally of a converged state.
//!
//! Leakage is the even-parity vacuum term `(4π/W) Σ_d w_d ∫ |n·d| ψ_d`
//! over non-reflective boundary faces, which is what the discrete
//! equations conserve when tested with `v = 1`.

use serde::Serialize;
use transport_types::error::TransportResult;
use transport_types::state::SolverState;

use crate::discretization::Discretization;
use crate::finite_element::FiniteElement;
use crate::mesh::FaceNeighbor;
use crate::parallel::Communicator;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceTally {
    pub absorption: Vec<f64>,
    pub leakage: Vec<f64>,
    pub source: Vec<f64>,
    /// `|Σ absorption + Σ leakage − Σ source| / Σ source`
    pub residual: f64,
}

impl BalanceTally {
    pub fn compute(
        disc: &Discretization,
        state: &SolverState,
        eigenvalue: bool,
        comm: &dyn Communicator,
    ) -> TransportResult<Self> {
        let n_groups = disc.n_groups();
        let phi = &state.flux.scalar;
        let mut absorption = vec![0.0; n_groups];
        let mut leakage = vec![0.0; n_groups];
        let mut source = vec![0.0; n_groups];
        let volume = disc.mesh.cell_volume();
        let factor = disc.quadrature.moment_factor();

        for part in &disc.partitions {
            for cell in part.cells() {
                let mat = disc.cell_material(cell)?;
                let production = if eigenvalue && mat.fissile {
                    (0..n_groups)
                        .map(|g| mat.nu_sigma_f[g] * disc.cell_integral(&phi[g], cell))
                        .sum::<f64>()
                        / state.eigen.k
                } else {
                    0.0
                };
                for g in 0..n_groups {
                    absorption[g] += mat.sigma_a(g) * disc.cell_integral(&phi[g], cell);
                    source[g] += mat.source[g] * volume + mat.chi[g] * production;
                }

                for face in 0..disc.mesh.faces_per_cell() {
                    let FaceNeighbor::Boundary(b) = disc.mesh.neighbor(cell, face) else {
                        continue;
                    };
                    if disc.reflective.is_reflective(b) {
                        continue;
                    }
                    let fv = disc.fe.face_values(cell, b);
                    for (d, dir) in disc.quadrature.directions().iter().enumerate() {
                        let dn = dir.dot(&fv.normal()).abs();
                        for (g, leak) in leakage.iter_mut().enumerate() {
                            let k = disc.indexer.component_index(d, g)?;
                            let psi = disc.local(&state.flux.angular[k], cell);
                            let integral: f64 = (0..fv.n_quadrature_points())
                                .map(|q| fv.evaluate(psi, q) * fv.jxw(q))
                                .sum();
                            *leak += factor * dir.weight * dn * integral;
                        }
                    }
                }
            }
        }

        for v in absorption.iter_mut().chain(&mut leakage).chain(&mut source) {
            *v = comm.sum(*v);
        }
        let total_source: f64 = source.iter().sum();
        let total_loss: f64 = absorption.iter().sum::<f64>() + leakage.iter().sum::<f64>();
        let residual = if total_source > 0.0 {
            (total_loss - total_source).abs() / total_source
        } else {
            total_loss.abs()
        };
        log::info!(
            "balance: source {total_source:.6e}, absorption {:.6e}, leakage {:.6e}, residual {residual:.2e}",
            absorption.iter().sum::<f64>(),
            leakage.iter().sum::<f64>()
        );
        Ok(BalanceTally {
            absorption,
            leakage,
            source,
            residual,
        })
    }

    pub fn total_absorption(&self) -> f64 {
        self.absorption.iter().sum()
    }

    pub fn total_leakage(&self) -> f64 {
        self.leakage.iter().sum()
    }

    pub fn total_source(&self) -> f64 {
        self.source.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialCommunicator;
    use transport_types::config::ProblemConfig;

    fn flat_slab(reflective: &str) -> Discretization {
        let json = format!(
            r#"{{
            "name": "bal", "dimension": 1, "sn_order": 4, "n_groups": 1,
            "problem": "fixed-source",
            "geometry": {{ "extents": [2.0], "cells": [4] }},
            "reflective_boundaries": {reflective},
            "materials": [ {{ "id": 0, "sigma_t": [1.0], "sigma_s": [[0.5]], "source": [1.0] }} ]
        }}"#
        );
        let cfg: ProblemConfig = serde_json::from_str(&json).unwrap();
        Discretization::new(&cfg, 1).unwrap()
    }

    #[test]
    fn test_infinite_medium_balances() {
        let disc = flat_slab("[0, 1]");
        let mut state = SolverState::initialized(1, disc.n_components(), disc.n_dofs());
        state.flux.reset_moments(2.0);
        let tally = BalanceTally::compute(&disc, &state, false, &SerialCommunicator).unwrap();
        assert_eq!(tally.leakage, vec![0.0]);
        assert!((tally.total_source() - 2.0).abs() < 1e-13);
        assert!((tally.total_absorption() - 2.0).abs() < 1e-12);
        assert!(tally.residual < 1e-12, "residual {}", tally.residual);
    }

    #[test]
    fn test_vacuum_leakage_of_flat_flux() {
        let disc = flat_slab("[]");
        let mut state = SolverState::initialized(1, disc.n_components(), disc.n_dofs());
        state.flux.reset_moments(1.0);
        let tally = BalanceTally::compute(&disc, &state, false, &SerialCommunicator).unwrap();
        // ψ = 1/4π on both faces: leakage = 2 (4π/W) Σ_d w_d |μ_d| / 4π
        let q = &disc.quadrature;
        let expected: f64 = 2.0
            * q.moment_factor()
            * q.directions().iter().map(|d| d.weight * d.omega[0].abs()).sum::<f64>()
            / transport_types::constants::FOUR_PI;
        assert!((tally.leakage[0] - expected).abs() < 1e-13);
    }
}
