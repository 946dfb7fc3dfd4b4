// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INNER_TOLERANCE, DEFAULT_K_TOLERANCE, DEFAULT_MAX_INNER_ITERATIONS,
    DEFAULT_MAX_OUTER_ITERATIONS, DEFAULT_OUTER_FLUX_TOLERANCE, MAX_POLYNOMIAL_DEGREE,
};
use crate::error::{TransportError, TransportResult};

/// Top-level problem description.
/// One JSON document per run; immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConfig {
    pub name: String,
    /// Spatial dimension (1, 2 or 3).
    pub dimension: usize,
    /// Discrete-ordinates order; must be even.
    pub sn_order: usize,
    pub n_groups: usize,
    /// Degree of the DG Lagrange basis (default: 1).
    #[serde(default = "default_polynomial_degree")]
    pub polynomial_degree: usize,
    pub problem: ProblemKind,
    /// Enable the low-order diffusion corrector.
    #[serde(default)]
    pub nda: bool,
    pub geometry: GeometryConfig,
    /// Boundary ids (0: −x, 1: +x, 2: −y, 3: +y, 4: −z, 5: +z) with
    /// specular reflection. All others are vacuum.
    #[serde(default)]
    pub reflective_boundaries: Vec<usize>,
    /// Lag the reflected flux into the right-hand side (default: true).
    #[serde(default = "default_explicit_reflection")]
    pub explicit_reflection: bool,
    pub materials: Vec<MaterialConfig>,
    #[serde(default)]
    pub fissile_materials: Vec<usize>,
    #[serde(default)]
    pub iteration: IterationConfig,
    #[serde(default)]
    pub linear_solver: LinearSolverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    FixedSource,
    Eigenvalue,
}

/// Rectangular domain `[0, extents[a]]` split into `cells[a]` uniform
/// cells per axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub extents: Vec<f64>,
    pub cells: Vec<usize>,
    /// Material id per cell, x fastest, then y, then z.
    /// Empty means material 0 everywhere.
    #[serde(default)]
    pub material_ids: Vec<usize>,
}

/// Multigroup data of one material, in macroscopic (1/cm) units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub id: usize,
    pub sigma_t: Vec<f64>,
    /// Transfer matrix `sigma_s[g_from][g_to]`.
    pub sigma_s: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nu_sigma_f: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chi: Vec<f64>,
    /// Isotropic volumetric source per group (fixed-source problems).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationConfig {
    /// Relative L1 flux change ending a source iteration (default: 1e-7).
    #[serde(default = "default_inner_tolerance")]
    pub inner_tolerance: f64,
    /// Relative k change ending power iteration (default: 1e-6).
    #[serde(default = "default_k_tolerance")]
    pub k_tolerance: f64,
    /// Relative L1 flux change between generations (default: 1e-6).
    #[serde(default = "default_flux_tolerance")]
    pub flux_tolerance: f64,
    #[serde(default = "default_max_inner_iterations")]
    pub max_inner_iterations: usize,
    #[serde(default = "default_max_outer_iterations")]
    pub max_outer_iterations: usize,
}

fn default_polynomial_degree() -> usize {
    1
}
fn default_explicit_reflection() -> bool {
    true
}
fn default_inner_tolerance() -> f64 {
    DEFAULT_INNER_TOLERANCE
}
fn default_k_tolerance() -> f64 {
    DEFAULT_K_TOLERANCE
}
fn default_flux_tolerance() -> f64 {
    DEFAULT_OUTER_FLUX_TOLERANCE
}
fn default_max_inner_iterations() -> usize {
    DEFAULT_MAX_INNER_ITERATIONS
}
fn default_max_outer_iterations() -> usize {
    DEFAULT_MAX_OUTER_ITERATIONS
}

impl Default for IterationConfig {
    fn default() -> Self {
        IterationConfig {
            inner_tolerance: default_inner_tolerance(),
            k_tolerance: default_k_tolerance(),
            flux_tolerance: default_flux_tolerance(),
            max_inner_iterations: default_max_inner_iterations(),
            max_outer_iterations: default_max_outer_iterations(),
        }
    }
}

/// Krylov method for the systems that implicit reflection couples
/// across mirrored directions. Single-component systems always use CG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonSymmetricMethod {
    BiCgStab,
    Gmres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    /// Residual reduction relative to ‖b‖₂ (default: 1e-10).
    #[serde(default = "default_relative_tolerance")]
    pub relative_tolerance: f64,
    /// Iteration cap per solve (default: 5000).
    #[serde(default = "default_linear_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_nonsymmetric")]
    pub nonsymmetric: NonSymmetricMethod,
    /// Krylov dimension before a GMRES restart (default: 30).
    #[serde(default = "default_gmres_restart")]
    pub gmres_restart: usize,
}

fn default_relative_tolerance() -> f64 {
    1e-10
}
fn default_linear_max_iterations() -> usize {
    5000
}
fn default_nonsymmetric() -> NonSymmetricMethod {
    NonSymmetricMethod::BiCgStab
}
fn default_gmres_restart() -> usize {
    30
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        LinearSolverConfig {
            relative_tolerance: default_relative_tolerance(),
            max_iterations: default_linear_max_iterations(),
            nonsymmetric: default_nonsymmetric(),
            gmres_restart: default_gmres_restart(),
        }
    }
}

impl ProblemConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> TransportResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn is_eigenvalue(&self) -> bool {
        self.problem == ProblemKind::Eigenvalue
    }

    pub fn total_cells(&self) -> usize {
        self.geometry.cells.iter().product()
    }

    /// Structural checks on the snapshot. The SN order is checked first so
    /// that an invalid angular set is reported before anything touches the
    /// mesh or the cross sections.
    pub fn validate(&self) -> TransportResult<()> {
        validate_sn_order(self.sn_order)?;

        if !(1..=3).contains(&self.dimension) {
            return Err(TransportError::Config(format!(
                "dimension must be 1, 2 or 3, got {}",
                self.dimension
            )));
        }
        if self.n_groups == 0 {
            return Err(TransportError::Config(
                "at least one energy group is required".to_string(),
            ));
        }
        if self.polynomial_degree == 0 || self.polynomial_degree > MAX_POLYNOMIAL_DEGREE {
            return Err(TransportError::Config(format!(
                "polynomial_degree must be in 1..={MAX_POLYNOMIAL_DEGREE}, got {}",
                self.polynomial_degree
            )));
        }

        let geo = &self.geometry;
        if geo.extents.len() != self.dimension || geo.cells.len() != self.dimension {
            return Err(TransportError::Config(format!(
                "geometry needs {} extents and cell counts, got {} and {}",
                self.dimension,
                geo.extents.len(),
                geo.cells.len()
            )));
        }
        if let Some(bad) = geo.extents.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
            return Err(TransportError::Config(format!(
                "geometry extents must be positive, got {bad}"
            )));
        }
        if geo.cells.contains(&0) {
            return Err(TransportError::Config(
                "every axis needs at least one cell".to_string(),
            ));
        }
        let n_cells = self.total_cells();
        if !geo.material_ids.is_empty() && geo.material_ids.len() != n_cells {
            return Err(TransportError::Config(format!(
                "material map has {} entries for {} cells",
                geo.material_ids.len(),
                n_cells
            )));
        }

        let n_boundaries = 2 * self.dimension;
        if let Some(b) = self
            .reflective_boundaries
            .iter()
            .find(|&&b| b >= n_boundaries)
        {
            return Err(TransportError::Config(format!(
                "reflective boundary id {b} does not exist in {}-D (ids 0..{n_boundaries})",
                self.dimension
            )));
        }

        if self.materials.is_empty() {
            return Err(TransportError::Config(
                "no materials declared".to_string(),
            ));
        }

        let it = &self.iteration;
        for (name, tol) in [
            ("inner_tolerance", it.inner_tolerance),
            ("k_tolerance", it.k_tolerance),
            ("flux_tolerance", it.flux_tolerance),
            ("linear_solver.relative_tolerance", self.linear_solver.relative_tolerance),
        ] {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(TransportError::Config(format!(
                    "{name} must be positive, got {tol}"
                )));
            }
        }
        if it.max_inner_iterations == 0 || it.max_outer_iterations == 0 {
            return Err(TransportError::Config(
                "iteration caps must be at least 1".to_string(),
            ));
        }
        if self.linear_solver.max_iterations == 0 || self.linear_solver.gmres_restart == 0 {
            return Err(TransportError::Config(
                "linear solver needs max_iterations >= 1 and gmres_restart >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reject odd or zero SN orders.
pub fn validate_sn_order(sn_order: usize) -> TransportResult<()> {
    if sn_order == 0 || sn_order % 2 != 0 {
        return Err(TransportError::Config(format!(
            "SN order must be a positive even integer, got {sn_order}"
        )));
    }
    Ok(())
}
