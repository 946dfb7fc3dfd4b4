// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Source and Power Iteration
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Iteration state machine.
//!
//! `Init → InnerIterate → (FissionSource → UpdateK → CheckOuter) → Done`.
//! Every step takes a [`SolverState`] by value and hands back the next
//! one together with its convergence flag. Operators are assembled once
//! at construction and read-only afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{s, Array1};
use rayon::prelude::*;
use transport_math::krylov::{solve, KrylovConfig, KrylovMethod};
use transport_math::precond::BlockJacobi;
use transport_types::config::{IterationConfig, NonSymmetricMethod, ProblemConfig};
use transport_types::error::{TransportError, TransportResult};
use transport_types::state::SolverState;

use crate::assembler::{HoAssembler, OperatorSet};
use crate::convergence::{fission_source, phi_difference, update_k};
use crate::discretization::Discretization;
use crate::nda::NdaCorrector;
use crate::parallel::{Communicator, SerialCommunicator};

pub struct IterationController {
    disc: Arc<Discretization>,
    assembler: HoAssembler,
    operators: OperatorSet,
    preconditioners: Vec<BlockJacobi>,
    nda: Option<NdaCorrector>,
    krylov: KrylovConfig,
    limits: IterationConfig,
    eigenvalue: bool,
    comm: Arc<dyn Communicator>,
    cancel: Arc<AtomicBool>,
    /// `[group][direction] → component`
    components: Vec<Vec<usize>>,
}

impl IterationController {
    pub fn new(disc: Arc<Discretization>, config: &ProblemConfig) -> TransportResult<Self> {
        Self::with_communicator(disc, config, Arc::new(SerialCommunicator))
    }

    pub fn with_communicator(
        disc: Arc<Discretization>,
        config: &ProblemConfig,
        comm: Arc<dyn Communicator>,
    ) -> TransportResult<Self> {
        let assembler = HoAssembler::new(&disc, config.explicit_reflection);
        let operators = assembler.assemble_operators(&disc)?;
        let preconditioners = operators
            .systems
            .par_iter()
            .map(|system| BlockJacobi::new(&system.matrix, disc.dofs_per_cell()))
            .collect::<TransportResult<Vec<_>>>()?;
        let nda = if config.nda {
            Some(NdaCorrector::new(&disc, &config.linear_solver)?)
        } else {
            None
        };

        // Systems coupled through implicit reflection go to the configured
        // general-purpose method.
        let solver = &config.linear_solver;
        let method = if operators.coupled {
            match solver.nonsymmetric {
                NonSymmetricMethod::BiCgStab => KrylovMethod::BiCgStab,
                NonSymmetricMethod::Gmres => KrylovMethod::Gmres,
            }
        } else {
            KrylovMethod::Cg
        };
        log::info!(
            "HO solver: {method:?}, {} systems over {} components, NDA {}",
            operators.systems.len(),
            disc.n_components(),
            if nda.is_some() { "on" } else { "off" }
        );

        let components = (0..disc.n_groups())
            .map(|g| {
                (0..disc.quadrature.n_directions())
                    .map(|d| disc.indexer.component_index(d, g))
                    .collect::<TransportResult<Vec<_>>>()
            })
            .collect::<TransportResult<Vec<_>>>()?;

        Ok(IterationController {
            assembler,
            operators,
            preconditioners,
            nda,
            krylov: KrylovConfig {
                method,
                tol: solver.relative_tolerance,
                max_iter: solver.max_iterations,
                restart: solver.gmres_restart,
            },
            limits: config.iteration.clone(),
            eigenvalue: config.is_eigenvalue(),
            comm,
            cancel: Arc::new(AtomicBool::new(false)),
            components,
            disc,
        })
    }

    /// Replace the cancellation flag with a caller-owned one.
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn discretization(&self) -> &Arc<Discretization> {
        &self.disc
    }

    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    pub fn communicator(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn is_eigenvalue(&self) -> bool {
        self.eigenvalue
    }

    /// Fresh state: unit moments, isotropic angular flux, k = 1, and with
    /// lagged reflection the incoming flux set to the initial traces.
    pub fn initial_state(&self) -> SolverState {
        let mut state = SolverState::initialized(
            self.disc.n_groups(),
            self.disc.n_components(),
            self.disc.n_dofs(),
        );
        if self.assembler.lags_reflection() {
            state.flux.incoming = self
                .assembler
                .reflective_faces()
                .traces(&self.disc, &state.flux.angular);
        }
        state
    }

    /// `φ_g = (4π/W) Σ_d w_d ψ_{d,g}` for every group.
    pub fn scalar_moments(&self, angular: &[Array1<f64>]) -> Vec<Array1<f64>> {
        self.components
            .iter()
            .map(|comps| self.disc.quadrature.scalar_moment(angular, |d| comps[d]))
            .collect()
    }

    /// One source iteration: rebuild sources, solve every component,
    /// take moments, optionally correct, measure the change.
    pub fn inner_step(&self, mut state: SolverState) -> TransportResult<(SolverState, bool)> {
        let disc = self.disc.as_ref();
        let group_sources = self.assembler.group_sources(
            disc,
            &state.flux.scalar,
            &state.flux.previous_generation,
            state.eigen.k,
            self.eigenvalue,
        )?;

        let rhs = (0..disc.n_components())
            .into_par_iter()
            .map(|k| {
                self.assembler
                    .component_rhs(disc, k, &group_sources, &state.flux.incoming)
            })
            .collect::<TransportResult<Vec<_>>>()?;

        let angular = &state.flux.angular;
        let solved = self
            .operators
            .systems
            .par_iter()
            .zip(self.preconditioners.par_iter())
            .map(|(system, precond)| {
                let b = stack(&system.components, &rhs);
                let mut x = stack(&system.components, angular);
                let result = solve(&system.matrix, precond, &b, &mut x, &self.krylov)?;
                if !result.converged {
                    return Err(TransportError::SolverFailure {
                        iteration: result.iterations,
                        message: format!(
                            "components {:?} stalled at residual {:.3e}",
                            system.components, result.residual
                        ),
                    });
                }
                Ok((result.iterations, x))
            })
            .collect::<TransportResult<Vec<_>>>()?;

        let n_dofs = disc.n_dofs();
        let mut linear_iterations = 0;
        for (system, (iterations, x)) in self.operators.systems.iter().zip(solved) {
            linear_iterations = linear_iterations.max(iterations);
            for (block, &k) in system.components.iter().enumerate() {
                state.flux.angular[k].assign(&x.slice(s![block * n_dofs..(block + 1) * n_dofs]));
            }
        }

        let faces = self.assembler.reflective_faces();
        if self.assembler.lags_reflection() {
            state.flux.incoming = faces.exchange(disc, &state.flux.angular, &state.flux.incoming)?;
        }

        let ho = self.scalar_moments(&state.flux.angular);
        let scalar = match &self.nda {
            Some(nda) => {
                let corrected = nda.correct(disc, &ho, &state.flux.scalar)?;
                if self.assembler.lags_reflection() {
                    faces.rescale(disc, &mut state.flux.incoming, &ho, &corrected)?;
                }
                corrected
            }
            None => ho.clone(),
        };
        let err = phi_difference(&scalar, &state.flux.scalar)?;

        state.flux.previous = std::mem::replace(&mut state.flux.scalar, scalar);
        state.flux.ho_scalar = ho;
        state.inner_iterations += 1;
        state.total_inner_iterations += 1;
        state.last_inner_error = err;
        log::debug!(
            "inner {:>4}: dphi = {err:.3e}, linear its max {}",
            state.inner_iterations,
            self.comm.max(linear_iterations as f64)
        );
        let converged = err < self.limits.inner_tolerance;
        Ok((state, converged))
    }

    /// Repeat [`Self::inner_step`] until converged or the cap is reached.
    pub fn source_iteration(&self, mut state: SolverState) -> TransportResult<SolverState> {
        state.inner_iterations = 0;
        for _ in 0..self.limits.max_inner_iterations {
            let (next, converged) = self.inner_step(state)?;
            state = next;
            if converged {
                return Ok(state);
            }
        }
        Err(TransportError::SolverFailure {
            iteration: state.total_inner_iterations,
            message: format!(
                "source iteration not converged after {} iterations (dphi = {:.3e})",
                self.limits.max_inner_iterations, state.last_inner_error
            ),
        })
    }

    /// One power-iteration generation with the fission source frozen at
    /// the start-of-generation flux.
    pub fn outer_step(&self, mut state: SolverState) -> TransportResult<(SolverState, bool)> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(TransportError::Cancelled {
                generation: state.generation,
            });
        }
        let disc = self.disc.as_ref();
        state.flux.previous_generation = state.flux.scalar.clone();
        state.eigen.k_prev_gen = state.eigen.k;
        let f_prev = fission_source(disc, &state.flux.previous_generation, self.comm.as_ref())?;
        state.eigen.fission_source_prev_gen = f_prev;

        let mut state = self.source_iteration(state)?;

        let f_new = fission_source(disc, &state.flux.scalar, self.comm.as_ref())?;
        let k = update_k(state.eigen.k_prev_gen, f_prev, f_new).map_err(|e| match e {
            TransportError::SolverFailure { message, .. } => TransportError::SolverFailure {
                iteration: state.generation,
                message,
            },
            other => other,
        })?;
        let err_phi = phi_difference(&state.flux.scalar, &state.flux.previous_generation)?;
        let err_k = (k - state.eigen.k_prev_gen).abs() / k;

        state.eigen.k = k;
        state.eigen.fission_source = f_new;
        state.generation += 1;
        log::info!(
            "generation {:>3}: k = {k:.6}, dk = {err_k:.3e}, dphi = {err_phi:.3e}, inner {}",
            state.generation,
            state.inner_iterations
        );
        let converged = err_phi < self.limits.flux_tolerance && err_k < self.limits.k_tolerance;
        Ok((state, converged))
    }

    /// Drive `state` to convergence: a single source iteration for fixed
    /// sources, power iteration otherwise.
    pub fn run(&self, mut state: SolverState) -> TransportResult<SolverState> {
        if !self.eigenvalue {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(TransportError::Cancelled { generation: 0 });
            }
            return self.source_iteration(state);
        }
        for _ in 0..self.limits.max_outer_iterations {
            let (next, converged) = self.outer_step(state)?;
            state = next;
            if converged {
                return Ok(state);
            }
        }
        Err(TransportError::SolverFailure {
            iteration: state.generation,
            message: format!(
                "power iteration not converged after {} generations (k = {:.6})",
                self.limits.max_outer_iterations, state.eigen.k
            ),
        })
    }
}

/// Fields of `components` laid end to end.
fn stack(components: &[usize], fields: &[Array1<f64>]) -> Array1<f64> {
    components
        .iter()
        .flat_map(|&k| fields[k].iter().copied())
        .collect()
}
