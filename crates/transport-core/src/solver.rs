// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Transport Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Top-level entry point: configuration in, [`TransportOutcome`] out.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array1;
use serde::Serialize;
use transport_types::config::ProblemConfig;
use transport_types::error::TransportResult;

use crate::balance::BalanceTally;
use crate::discretization::Discretization;
use crate::iteration::IterationController;

/// Result of a run. Only produced on convergence; every failure to
/// converge surfaces as an error from [`TransportSolver::run`].
#[derive(Debug, Clone, Serialize)]
pub struct TransportOutcome {
    /// Per-group scalar-flux coefficients.
    pub scalar_flux: Vec<Array1<f64>>,
    /// Multiplication factor (eigenvalue problems only).
    pub k_eff: Option<f64>,
    pub inner_iterations: usize,
    pub outer_iterations: usize,
    pub solve_time_ms: f64,
    pub balance: BalanceTally,
}

/// Assembled problem ready to iterate.
pub struct TransportSolver {
    config: ProblemConfig,
    disc: Arc<Discretization>,
    controller: IterationController,
}

impl TransportSolver {
    pub fn new(config: ProblemConfig) -> TransportResult<Self> {
        Self::with_partitions(config, 1)
    }

    /// Split the cells over `nranks` partitions visited in rank order.
    pub fn with_partitions(config: ProblemConfig, nranks: usize) -> TransportResult<Self> {
        let disc = Arc::new(Discretization::new(&config, nranks)?);
        let controller = IterationController::new(Arc::clone(&disc), &config)?;
        Ok(TransportSolver {
            config,
            disc,
            controller,
        })
    }

    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.controller = self.controller.with_cancel_token(token);
        self
    }

    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.controller.cancel_token()
    }

    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    pub fn discretization(&self) -> &Discretization {
        &self.disc
    }

    pub fn controller(&self) -> &IterationController {
        &self.controller
    }

    pub fn run(&self) -> TransportResult<TransportOutcome> {
        let start = Instant::now();
        let state = self.controller.run(self.controller.initial_state())?;
        let solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let eigenvalue = self.config.is_eigenvalue();
        let balance = BalanceTally::compute(
            &self.disc,
            &state,
            eigenvalue,
            self.controller.communicator(),
        )?;
        log::info!(
            "{}: converged in {} inner / {} outer iterations, {solve_time_ms:.1} ms",
            self.config.name,
            state.total_inner_iterations,
            state.generation
        );
        Ok(TransportOutcome {
            k_eff: eigenvalue.then_some(state.eigen.k),
            inner_iterations: state.total_inner_iterations,
            outer_iterations: state.generation,
            solve_time_ms,
            balance,
            scalar_flux: state.flux.scalar,
        })
    }

    /// Cell-averaged flux `[group][cell]`.
    pub fn cell_averages(&self, outcome: &TransportOutcome) -> Vec<Vec<f64>> {
        outcome
            .scalar_flux
            .iter()
            .map(|phi| {
                (0..self.disc.mesh.n_cells())
                    .map(|cell| self.disc.cell_average(phi, cell))
                    .collect()
            })
            .collect()
    }
}
