// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Preconditioners
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Point and block Jacobi preconditioners.
//!
//! DG operators are dominated by their cell blocks, so inverting each
//! `dofs_per_cell × dofs_per_cell` diagonal block is a cheap and robust
//! approximation of `A⁻¹`.

use ndarray::{s, Array1, Array2};
use transport_types::error::{TransportError, TransportResult};

use crate::linalg::invert_small;
use crate::sparse::SparseMatrix;

/// Approximate inverse applied as `z = M⁻¹ r`.
pub trait Preconditioner: Sync {
    fn apply(&self, r: &Array1<f64>, z: &mut Array1<f64>);
}

/// `M = I`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &Array1<f64>, z: &mut Array1<f64>) {
        z.assign(r);
    }
}

/// Diagonal scaling.
#[derive(Debug, Clone)]
pub struct Jacobi {
    inv_diag: Array1<f64>,
}

impl Jacobi {
    pub fn new(matrix: &SparseMatrix) -> TransportResult<Self> {
        let diag = matrix.diagonal();
        if let Some(i) = diag.iter().position(|d| d.abs() < 1e-300) {
            return Err(TransportError::LinAlg(format!(
                "zero diagonal entry at row {i}"
            )));
        }
        Ok(Jacobi {
            inv_diag: diag.mapv(|d| 1.0 / d),
        })
    }
}

impl Preconditioner for Jacobi {
    fn apply(&self, r: &Array1<f64>, z: &mut Array1<f64>) {
        ndarray::Zip::from(z)
            .and(r)
            .and(&self.inv_diag)
            .for_each(|zi, &ri, &di| *zi = ri * di);
    }
}

/// Inverse of each diagonal block of size `block_size`.
#[derive(Debug, Clone)]
pub struct BlockJacobi {
    block_size: usize,
    inv_blocks: Vec<Array2<f64>>,
}

impl BlockJacobi {
    pub fn new(matrix: &SparseMatrix, block_size: usize) -> TransportResult<Self> {
        let blocks = matrix.diagonal_blocks(block_size)?;
        let inv_blocks = blocks
            .iter()
            .enumerate()
            .map(|(b, block)| {
                invert_small(block).ok_or_else(|| {
                    TransportError::LinAlg(format!("diagonal block {b} is singular"))
                })
            })
            .collect::<TransportResult<Vec<_>>>()?;
        Ok(BlockJacobi {
            block_size,
            inv_blocks,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Preconditioner for BlockJacobi {
    fn apply(&self, r: &Array1<f64>, z: &mut Array1<f64>) {
        let bs = self.block_size;
        for (b, inv) in self.inv_blocks.iter().enumerate() {
            let range = b * bs..(b + 1) * bs;
            let local = inv.dot(&r.slice(s![range.clone()]));
            z.slice_mut(s![range]).assign(&local);
        }
    }
}
