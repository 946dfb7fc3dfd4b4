// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Convergence Measures
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array1;
use transport_types::error::{TransportError, TransportResult};

use crate::discretization::Discretization;
use crate::parallel::Communicator;

/// Total fission production `Σ_cells Σ_g ∫ νσf_g φ_g` over fissile
/// cells, reduced across ranks.
pub fn fission_source(
    disc: &Discretization,
    phi: &[Array1<f64>],
    comm: &dyn Communicator,
) -> TransportResult<f64> {
    if phi.len() != disc.n_groups() {
        return Err(TransportError::DimensionMismatch {
            expected: disc.n_groups(),
            found: phi.len(),
        });
    }
    for field in phi {
        disc.check_field(field)?;
    }

    let mut local = 0.0;
    for part in &disc.partitions {
        for cell in part.cells() {
            let mat = disc.cell_material(cell)?;
            if !mat.fissile {
                continue;
            }
            for (g, field) in phi.iter().enumerate() {
                local += mat.nu_sigma_f[g] * disc.cell_integral(field, cell);
            }
        }
    }
    Ok(comm.sum(local))
}

/// Largest per-group relative L1 change `‖new − old‖₁ / ‖new‖₁`.
pub fn phi_difference(new: &[Array1<f64>], old: &[Array1<f64>]) -> TransportResult<f64> {
    if new.len() != old.len() {
        return Err(TransportError::DimensionMismatch {
            expected: new.len(),
            found: old.len(),
        });
    }
    let mut worst = 0.0_f64;
    for (n, o) in new.iter().zip(old) {
        if n.len() != o.len() {
            return Err(TransportError::DimensionMismatch {
                expected: n.len(),
                found: o.len(),
            });
        }
        let diff: f64 = n.iter().zip(o).map(|(a, b)| (a - b).abs()).sum();
        let norm: f64 = n.iter().map(|a| a.abs()).sum();
        let rel = if diff == 0.0 {
            0.0
        } else if norm == 0.0 {
            f64::INFINITY
        } else {
            diff / norm
        };
        worst = worst.max(rel);
    }
    Ok(worst)
}

/// `k_prev · F / F_prev`.
pub fn update_k(k_prev: f64, fission_prev: f64, fission: f64) -> TransportResult<f64> {
    for (name, value) in [("fission source", fission), ("previous fission source", fission_prev)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(TransportError::SolverFailure {
                iteration: 0,
                message: format!("{name} must be positive and finite, got {value}"),
            });
        }
    }
    Ok(k_prev * fission / fission_prev)
}
