// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Nonlinear Diffusion Acceleration
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Low-order diffusion corrector applied after each high-order sweep.
//!
//! Per group the LO operator is `A_diff + (σt − σs_gg) M` with
//! `A_diff` an interior-penalty diffusion operator, `D = 1/(3σt)`,
//! Marshak `½ v u` on vacuum faces and nothing on reflective faces.
//! The right-hand side is built from the HO moment so that the LO fixed
//! point is exactly the HO scalar flux:
//!
//! ```text
//! (A_diff + σt M) φ_HO + M Σ_{g'≠g} σs[g'][g] (φ_LO,g' − φ_src,g') − M σs[g][g] φ_src,g
//! ```

use std::sync::Arc;

use ndarray::{Array1, Array2};
use transport_math::krylov::{solve, KrylovConfig, KrylovMethod};
use transport_math::precond::BlockJacobi;
use transport_math::sparse::{SparseMatrix, SparsityPattern};
use transport_types::config::LinearSolverConfig;
use transport_types::constants::MIN_PENALTY;
use transport_types::error::{TransportError, TransportResult};

use crate::angular::dot;
use crate::assembler::{penalty_factor, sparsity_pattern, FaceKernel};
use crate::discretization::Discretization;
use crate::finite_element::{CellValues, FiniteElement};
use crate::mesh::FaceNeighbor;

/// Marshak vacuum coefficient.
const MARSHAK: f64 = 0.5;

/// `∫ ∇φ_i · ∇φ_j`
pub fn stiffness_matrix(values: &CellValues) -> Array2<f64> {
    let n = values.n_dofs();
    Array2::from_shape_fn((n, n), |(i, j)| {
        (0..values.n_quadrature_points())
            .map(|q| dot(&values.gradient(i, q), &values.gradient(j, q)) * values.jxw(q))
            .sum::<f64>()
    })
}

/// Diffusion coefficient `1/(3σt)`.
pub fn diffusion_coefficient(sigma_t: f64) -> f64 {
    1.0 / (3.0 * sigma_t)
}

#[derive(Debug, Clone)]
pub struct NdaCorrector {
    /// `A_diff + (σt − σs_gg) M` per group.
    lo_operators: Vec<SparseMatrix>,
    /// `A_diff + σt M` per group.
    ho_diffusion: Vec<SparseMatrix>,
    preconditioners: Vec<BlockJacobi>,
    krylov: KrylovConfig,
}

impl NdaCorrector {
    pub fn new(disc: &Discretization, solver: &LinearSolverConfig) -> TransportResult<Self> {
        let pattern = sparsity_pattern(disc)?;
        let mut lo_operators = Vec::with_capacity(disc.n_groups());
        let mut ho_diffusion = Vec::with_capacity(disc.n_groups());
        let mut preconditioners = Vec::with_capacity(disc.n_groups());
        for g in 0..disc.n_groups() {
            let diffusion = assemble_diffusion(disc, &pattern, g)?;
            let mut lo = diffusion.clone();
            let mut ho = diffusion;
            for part in &disc.partitions {
                for cell in part.cells() {
                    let mat = disc.cell_material(cell)?;
                    let dofs: Vec<usize> = disc.fe.dof_range(cell).collect();
                    let removal = mat.sigma_t[g] - mat.sigma_s[g][g];
                    lo.add_block(&dofs, &dofs, &(disc.mass() * removal))?;
                    ho.add_block(&dofs, &dofs, &(disc.mass() * mat.sigma_t[g]))?;
                }
            }
            lo.compress();
            ho.compress();
            preconditioners.push(BlockJacobi::new(&lo, disc.dofs_per_cell())?);
            lo_operators.push(lo);
            ho_diffusion.push(ho);
        }
        log::debug!("NDA corrector ready: {} group operators", lo_operators.len());
        Ok(NdaCorrector {
            lo_operators,
            ho_diffusion,
            preconditioners,
            krylov: KrylovConfig {
                method: KrylovMethod::Cg,
                tol: solver.relative_tolerance,
                max_iter: solver.max_iterations,
                restart: solver.gmres_restart,
            },
        })
    }

    pub fn lo_operator(&self, g: usize) -> &SparseMatrix {
        &self.lo_operators[g]
    }

    /// Corrected scalar flux from the HO moment `ho` and the flux `src`
    /// that fed the HO scattering source.
    pub fn correct(
        &self,
        disc: &Discretization,
        ho: &[Array1<f64>],
        src: &[Array1<f64>],
    ) -> TransportResult<Vec<Array1<f64>>> {
        let n_groups = self.lo_operators.len();
        for found in [ho.len(), src.len()] {
            if found != n_groups {
                return Err(TransportError::DimensionMismatch {
                    expected: n_groups,
                    found,
                });
            }
        }

        let mut lo: Vec<Array1<f64>> = src.to_vec();
        for g in 0..n_groups {
            disc.check_field(&ho[g])?;
            let mut rhs = Array1::zeros(disc.n_dofs());
            self.ho_diffusion[g].matvec(&ho[g], &mut rhs)?;

            disc.add_weighted_mass(
                |cell| Ok(-disc.cell_material(cell)?.sigma_s[g][g]),
                &src[g],
                &mut rhs,
            )?;
            for from in (0..n_groups).filter(|&from| from != g) {
                let delta = &lo[from] - &src[from];
                disc.add_weighted_mass(
                    |cell| Ok(disc.cell_material(cell)?.sigma_s[from][g]),
                    &delta,
                    &mut rhs,
                )?;
            }

            let mut phi = ho[g].clone();
            let result = solve(
                &self.lo_operators[g],
                &self.preconditioners[g],
                &rhs,
                &mut phi,
                &self.krylov,
            )?;
            if !result.converged {
                return Err(TransportError::SolverFailure {
                    iteration: result.iterations,
                    message: format!(
                        "low-order solve for group {g} stalled at residual {:.3e}",
                        result.residual
                    ),
                });
            }
            log::debug!("NDA group {g}: {} CG iterations", result.iterations);
            lo[g] = phi;
        }
        Ok(lo)
    }
}

/// Interior-penalty diffusion operator of group `g`, not yet compressed.
fn assemble_diffusion(
    disc: &Discretization,
    pattern: &Arc<SparsityPattern>,
    g: usize,
) -> TransportResult<SparseMatrix> {
    let fe = &disc.fe;
    let c_p = penalty_factor(fe.degree());
    let h = disc.mesh.spacing();
    let stiffness = stiffness_matrix(fe.cell_values(0));
    let face_kernels: Vec<FaceKernel> = (0..disc.mesh.dim())
        .map(|axis| {
            FaceKernel::diffusion(fe.face_values(0, 2 * axis), fe.face_values(0, 2 * axis + 1))
        })
        .collect();
    let marshak: Vec<Array2<f64>> = (0..disc.mesh.n_boundaries())
        .map(|b| {
            let face = fe.face_values(0, b);
            let n = face.n_dofs();
            Array2::from_shape_fn((n, n), |(i, j)| {
                (0..face.n_quadrature_points())
                    .map(|q| MARSHAK * face.value(i, q) * face.value(j, q) * face.jxw(q))
                    .sum::<f64>()
            })
        })
        .collect();

    let mut a = SparseMatrix::new(Arc::clone(pattern));
    for part in &disc.partitions {
        for cell in part.cells() {
            let d_cell = diffusion_coefficient(disc.cell_material(cell)?.sigma_t[g]);
            let dofs: Vec<usize> = fe.dof_range(cell).collect();
            a.add_block(&dofs, &dofs, &(&stiffness * d_cell))?;

            for face in 0..disc.mesh.faces_per_cell() {
                match disc.mesh.neighbor(cell, face) {
                    FaceNeighbor::Interior(nb) => {
                        if nb > cell {
                            continue;
                        }
                        let axis = face / 2;
                        let d_nb = diffusion_coefficient(disc.cell_material(nb)?.sigma_t[g]);
                        let sigma_e = MIN_PENALTY.max(c_p * (d_cell + d_nb) / h[axis]);
                        let nb_dofs: Vec<usize> = fe.dof_range(nb).collect();
                        let [pp, pn, np, nn] = face_kernels[axis].sip_blocks(d_cell, d_nb, sigma_e);
                        a.add_block(&dofs, &dofs, &pp)?;
                        a.add_block(&dofs, &nb_dofs, &pn)?;
                        a.add_block(&nb_dofs, &dofs, &np)?;
                        a.add_block(&nb_dofs, &nb_dofs, &nn)?;
                    }
                    FaceNeighbor::Boundary(b) => {
                        if !disc.reflective.is_reflective(b) {
                            a.add_block(&dofs, &dofs, &marshak[b])?;
                        }
                    }
                }
            }
        }
    }
    Ok(a)
}
