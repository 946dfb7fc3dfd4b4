// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Cross Sections
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Multigroup cross-section table indexed by material id.
//!
//! Scattering, fission and source data are also kept divided by 4π,
//! which is the form the per-direction right-hand sides consume.

use transport_types::config::{MaterialConfig, ProblemConfig};
use transport_types::constants::{FOUR_PI, XS_SPARSITY_FLOOR};
use transport_types::error::{TransportError, TransportResult};

/// Cross sections of one material.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: usize,
    pub sigma_t: Vec<f64>,
    /// `sigma_s[g_from][g_to]`
    pub sigma_s: Vec<Vec<f64>>,
    /// `sigma_s / 4π`, same layout.
    pub sigma_s_per_sr: Vec<Vec<f64>>,
    pub fissile: bool,
    pub nu_sigma_f: Vec<f64>,
    pub chi: Vec<f64>,
    /// `χ[g_to] νσf[g_from] / 4π`, indexed `[g_from][g_to]`.
    pub fission_transfer_per_sr: Vec<Vec<f64>>,
    pub source: Vec<f64>,
    pub source_per_sr: Vec<f64>,
}

impl Material {
    /// Absorption `σt − Σ_g' σs[g][g']` of group `g`.
    pub fn sigma_a(&self, g: usize) -> f64 {
        self.sigma_t[g] - self.sigma_s[g].iter().sum::<f64>()
    }
}

#[derive(Debug, Clone)]
pub struct CrossSectionTable {
    n_groups: usize,
    /// Dense by material id; ids not declared are `None`.
    materials: Vec<Option<Material>>,
}

fn check_len(what: &str, id: usize, found: usize, n_groups: usize) -> TransportResult<()> {
    if found != n_groups {
        return Err(TransportError::Config(format!(
            "material {id}: {what} has {found} groups, expected {n_groups}"
        )));
    }
    Ok(())
}

impl CrossSectionTable {
    /// Build and validate against the problem snapshot. Every id used by
    /// the material map must be declared, and eigenvalue problems need
    /// at least one fissile material in use.
    pub fn from_config(config: &ProblemConfig) -> TransportResult<Self> {
        let n_groups = config.n_groups;
        let eigen = config.is_eigenvalue();
        let max_id = config.materials.iter().map(|m| m.id).max().unwrap_or(0);
        let mut materials: Vec<Option<Material>> = vec![None; max_id + 1];

        for m in &config.materials {
            if materials[m.id].is_some() {
                return Err(TransportError::Config(format!(
                    "material {} declared twice",
                    m.id
                )));
            }
            let fissile = config.fissile_materials.contains(&m.id);
            materials[m.id] = Some(Self::build_material(m, n_groups, fissile, eigen)?);
        }

        for &f in &config.fissile_materials {
            if materials.get(f).map_or(true, Option::is_none) {
                return Err(TransportError::Config(format!(
                    "fissile material {f} is not declared"
                )));
            }
        }

        let used: Vec<usize> = if config.geometry.material_ids.is_empty() {
            vec![0]
        } else {
            let mut ids = config.geometry.material_ids.clone();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        if let Some(&missing) = used
            .iter()
            .find(|&&id| materials.get(id).map_or(true, Option::is_none))
        {
            return Err(TransportError::Config(format!(
                "material id {missing} used in the geometry has no cross sections"
            )));
        }
        if eigen
            && !used
                .iter()
                .any(|&id| materials[id].as_ref().is_some_and(|m| m.fissile))
        {
            return Err(TransportError::Config(
                "eigenvalue problem has no fissile material in the geometry".to_string(),
            ));
        }

        Ok(CrossSectionTable {
            n_groups,
            materials,
        })
    }

    fn build_material(
        m: &MaterialConfig,
        n_groups: usize,
        fissile: bool,
        eigen: bool,
    ) -> TransportResult<Material> {
        check_len("sigma_t", m.id, m.sigma_t.len(), n_groups)?;
        if let Some(bad) = m.sigma_t.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(TransportError::Config(format!(
                "material {}: sigma_t must be positive, got {bad}",
                m.id
            )));
        }
        check_len("sigma_s", m.id, m.sigma_s.len(), n_groups)?;
        for row in &m.sigma_s {
            check_len("sigma_s row", m.id, row.len(), n_groups)?;
            if row.iter().any(|s| !(s.is_finite() && *s >= 0.0)) {
                return Err(TransportError::Config(format!(
                    "material {}: scattering cross sections must be non-negative",
                    m.id
                )));
            }
        }

        let (nu_sigma_f, chi) = if fissile {
            check_len("nu_sigma_f", m.id, m.nu_sigma_f.len(), n_groups)?;
            check_len("chi", m.id, m.chi.len(), n_groups)?;
            (m.nu_sigma_f.clone(), m.chi.clone())
        } else {
            if !m.nu_sigma_f.is_empty() || !m.chi.is_empty() {
                return Err(TransportError::Config(format!(
                    "material {} carries fission data but is not flagged fissile",
                    m.id
                )));
            }
            (vec![0.0; n_groups], vec![0.0; n_groups])
        };

        let source = if eigen || m.source.is_empty() {
            vec![0.0; n_groups]
        } else {
            check_len("source", m.id, m.source.len(), n_groups)?;
            m.source.clone()
        };

        let per_sr = |v: f64| if v.abs() < XS_SPARSITY_FLOOR { 0.0 } else { v / FOUR_PI };
        let sigma_s_per_sr = m
            .sigma_s
            .iter()
            .map(|row| row.iter().map(|&s| per_sr(s)).collect())
            .collect();
        let fission_transfer_per_sr = (0..n_groups)
            .map(|from| {
                (0..n_groups)
                    .map(|to| per_sr(chi[to] * nu_sigma_f[from]))
                    .collect()
            })
            .collect();

        Ok(Material {
            id: m.id,
            sigma_t: m.sigma_t.clone(),
            sigma_s: m.sigma_s.clone(),
            sigma_s_per_sr,
            fissile,
            fission_transfer_per_sr,
            source_per_sr: source.iter().map(|q| q / FOUR_PI).collect(),
            nu_sigma_f,
            chi,
            source,
        })
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn get(&self, id: usize) -> TransportResult<&Material> {
        self.materials
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| TransportError::Config(format!("unknown material id {id}")))
    }
}
