// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Discretization
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Static problem structure built once from a configuration snapshot:
//! angular set, mesh, element, cross sections, component indexing,
//! reflective map and cell ownership.

use ndarray::{s, Array1, Array2, ArrayView1};
use transport_types::config::ProblemConfig;
use transport_types::error::{TransportError, TransportResult};

use crate::angular::AngularQuadrature;
use crate::finite_element::{CellValues, DgLagrange, FiniteElement};
use crate::indexer::{ComponentIndexer, ReflectiveMap};
use crate::materials::{CrossSectionTable, Material};
use crate::mesh::CartesianMesh;
use crate::parallel::Partition;

#[derive(Debug, Clone)]
pub struct Discretization {
    pub quadrature: AngularQuadrature,
    pub mesh: CartesianMesh,
    pub fe: DgLagrange,
    pub xs: CrossSectionTable,
    pub indexer: ComponentIndexer,
    pub reflective: ReflectiveMap,
    pub partitions: Vec<Partition>,
    /// Cell mass matrix, shared by every cell of the uniform mesh.
    mass: Array2<f64>,
    /// `∫ φ_j` over a cell.
    basis_integrals: Array1<f64>,
}

/// `M_ij = ∫ φ_i φ_j`
pub fn mass_matrix(values: &CellValues) -> Array2<f64> {
    let n = values.n_dofs();
    Array2::from_shape_fn((n, n), |(i, j)| {
        (0..values.n_quadrature_points())
            .map(|q| values.value(i, q) * values.value(j, q) * values.jxw(q))
            .sum::<f64>()
    })
}

impl Discretization {
    /// Build everything the assembler and the iteration need. The angular
    /// set is generated first, so an invalid SN order fails before the
    /// mesh or the cross sections are looked at.
    pub fn new(config: &ProblemConfig, nranks: usize) -> TransportResult<Self> {
        config.validate()?;
        let quadrature = AngularQuadrature::new(config.sn_order, config.dimension)?;
        let mesh = CartesianMesh::from_config(config.dimension, &config.geometry)?;
        let fe = DgLagrange::new(&mesh, config.polynomial_degree)?;
        let xs = CrossSectionTable::from_config(config)?;
        let indexer = ComponentIndexer::initialize(quadrature.n_directions(), config.n_groups);
        let reflective = ReflectiveMap::build(&quadrature, &config.reflective_boundaries)?;
        let partitions = Partition::decompose(mesh.n_cells(), nranks)?;

        let values = fe.cell_values(0);
        let mass = mass_matrix(values);
        let basis_integrals = Array1::from_shape_fn(values.n_dofs(), |j| {
            (0..values.n_quadrature_points())
                .map(|q| values.value(j, q) * values.jxw(q))
                .sum::<f64>()
        });

        let disc = Discretization {
            quadrature,
            mesh,
            fe,
            xs,
            indexer,
            reflective,
            partitions,
            mass,
            basis_integrals,
        };
        log::info!(
            "{}: {} cells, {} dofs/cell, {} dofs, {} directions, {} groups, {} components, {} ranks",
            config.name,
            disc.mesh.n_cells(),
            disc.dofs_per_cell(),
            disc.n_dofs(),
            disc.quadrature.n_directions(),
            disc.n_groups(),
            disc.n_components(),
            disc.partitions.len()
        );
        Ok(disc)
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.fe.dofs_per_cell()
    }

    pub fn n_dofs(&self) -> usize {
        self.mesh.n_cells() * self.dofs_per_cell()
    }

    pub fn n_groups(&self) -> usize {
        self.xs.n_groups()
    }

    pub fn n_components(&self) -> usize {
        self.indexer.n_components()
    }

    pub fn cell_material(&self, cell: usize) -> TransportResult<&Material> {
        self.xs.get(self.mesh.material_id(cell))
    }

    pub fn mass(&self) -> &Array2<f64> {
        &self.mass
    }

    /// Local coefficients of `field` on `cell`.
    pub fn local<'a>(&self, field: &'a Array1<f64>, cell: usize) -> ArrayView1<'a, f64> {
        field.slice(s![self.fe.dof_range(cell)])
    }

    /// `∫_cell u`
    pub fn cell_integral(&self, field: &Array1<f64>, cell: usize) -> f64 {
        self.local(field, cell).dot(&self.basis_integrals)
    }

    /// `∫_cell u / |cell|`
    pub fn cell_average(&self, field: &Array1<f64>, cell: usize) -> f64 {
        self.cell_integral(field, cell) / self.mesh.cell_volume()
    }

    /// `out += Σ_cells coef(cell) · M_cell · u_cell` over owned cells.
    pub fn add_weighted_mass<F>(
        &self,
        coef: F,
        field: &Array1<f64>,
        out: &mut Array1<f64>,
    ) -> TransportResult<()>
    where
        F: Fn(usize) -> TransportResult<f64>,
    {
        self.check_field(field)?;
        self.check_field(out)?;
        for part in &self.partitions {
            for cell in part.cells() {
                let c = coef(cell)?;
                if c == 0.0 {
                    continue;
                }
                let local = self.mass.dot(&self.local(field, cell));
                out.slice_mut(s![self.fe.dof_range(cell)])
                    .scaled_add(c, &local);
            }
        }
        Ok(())
    }

    pub fn check_field(&self, field: &Array1<f64>) -> TransportResult<()> {
        if field.len() != self.n_dofs() {
            return Err(TransportError::DimensionMismatch {
                expected: self.n_dofs(),
                found: field.len(),
            });
        }
        Ok(())
    }
}
