// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — High-Order Assembly
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-component even-parity DG operators and right-hand sides.
//!
//! For component `k = (d, g)` the bilinear form is
//!
//! ```text
//! a(u, v) = Σ_K ∫ (d·∇v)(d·∇u)/σt + σt v u
//!         + Σ_F SIP terms with flux (d·n)(d·∇u)/σt and penalty σe
//!         + Σ_∂ boundary terms
//! ```
//!
//! Interior faces are assembled once, by the cell with the larger linear
//! id; cells are visited partition by partition in rank order, so the
//! accumulation order into every entry is independent of the partition
//! count. Kernel tables are computed per face orientation and direction
//! and reused for every group and cell.

use std::sync::Arc;

use ndarray::{s, Array1, Array2};
use rayon::prelude::*;
use transport_math::sparse::{SparseMatrix, SparsityPattern};
use transport_types::constants::MIN_PENALTY;
use transport_types::error::{TransportError, TransportResult};

use crate::angular::{dot, reflect};
use crate::discretization::Discretization;
use crate::finite_element::{CellValues, FaceValues, FiniteElement};
use crate::mesh::FaceNeighbor;

// ───────────────────────────── kernels ───────────────────────────────

/// Volume streaming table `∫ (d·∇φ_i)(d·∇φ_j)` of one direction.
#[derive(Debug, Clone)]
pub struct CellKernel {
    pub streaming: Array2<f64>,
}

impl CellKernel {
    pub fn compute(values: &CellValues, omega: &[f64; 3]) -> Self {
        let n = values.n_dofs();
        let n_q = values.n_quadrature_points();
        let mut dg = Array2::zeros((n, n_q));
        for i in 0..n {
            for q in 0..n_q {
                dg[[i, q]] = dot(omega, &values.gradient(i, q));
            }
        }
        let streaming = Array2::from_shape_fn((n, n), |(i, j)| {
            (0..n_q)
                .map(|q| dg[[i, q]] * dg[[j, q]] * values.jxw(q))
                .sum::<f64>()
        });
        CellKernel { streaming }
    }
}

/// Interior-face tables between the `+` cell (larger id, face `2a`) and
/// the `−` cell (face `2a + 1`); `n` is the outward normal of `+`.
///
/// Index `[x][y]` is (test side, trial side) with 0 = `+`, 1 = `−`:
/// `mass[x][y]_ij = ∫ φˣ_i φʸ_j` and
/// `flux[x][y]_ij = ½ ∫ L(∇φʸ_j) φˣ_i` for the normal flux functional `L`.
#[derive(Debug, Clone)]
pub struct FaceKernel {
    pub axis: usize,
    pub mass: [[Array2<f64>; 2]; 2],
    pub flux: [[Array2<f64>; 2]; 2],
}

impl FaceKernel {
    fn compute<L>(plus: &FaceValues, minus: &FaceValues, normal_flux: L) -> Self
    where
        L: Fn(&[f64; 3]) -> f64,
    {
        let n = plus.n_dofs();
        let n_q = plus.n_quadrature_points();
        let sides = [plus, minus];
        let table = |x: usize, y: usize, with_flux: bool| {
            Array2::from_shape_fn((n, n), |(i, j)| {
                (0..n_q)
                    .map(|q| {
                        let trial = if with_flux {
                            0.5 * normal_flux(&sides[y].gradient(j, q))
                        } else {
                            sides[y].value(j, q)
                        };
                        sides[x].value(i, q) * trial * plus.jxw(q)
                    })
                    .sum::<f64>()
            })
        };
        FaceKernel {
            axis: plus.axis(),
            mass: [
                [table(0, 0, false), table(0, 1, false)],
                [table(1, 0, false), table(1, 1, false)],
            ],
            flux: [
                [table(0, 0, true), table(0, 1, true)],
                [table(1, 0, true), table(1, 1, true)],
            ],
        }
    }

    /// Even-parity streaming flux `(d·n)(d·∇u)`.
    pub fn streaming(plus: &FaceValues, minus: &FaceValues, omega: &[f64; 3]) -> Self {
        let dn = dot(omega, &plus.normal());
        Self::compute(plus, minus, |g| dn * dot(omega, g))
    }

    /// Diffusion flux `n·∇u`.
    pub fn diffusion(plus: &FaceValues, minus: &FaceValues) -> Self {
        let normal = plus.normal();
        Self::compute(plus, minus, |g| dot(&normal, g))
    }

    /// Symmetric interior-penalty blocks `[v⁺u⁺, v⁺u⁻, v⁻u⁺, v⁻u⁻]` for
    /// flux coefficients `c⁺`, `c⁻` and penalty `σe`.
    pub fn sip_blocks(&self, c_plus: f64, c_minus: f64, sigma_e: f64) -> [Array2<f64>; 4] {
        let [[m_pp, m_pn], [m_np, m_nn]] = &self.mass;
        let [[g_pp, g_pn], [g_np, g_nn]] = &self.flux;
        let vp_up = m_pp * sigma_e - &((g_pp + &g_pp.t()) * c_plus);
        let vp_un = -(m_pn * sigma_e) - &(g_pn * c_minus) + &(&g_np.t() * c_plus);
        let vn_up = -(m_np * sigma_e) + &(g_np * c_plus) - &(&g_pn.t() * c_minus);
        let vn_un = m_nn * sigma_e + &((g_nn + &g_nn.t()) * c_minus);
        [vp_up, vp_un, vn_up, vn_un]
    }
}

/// Boundary-face tables of one direction on one boundary.
///
/// `flux` and `mirror_flux` carry the even-parity normal flux of the
/// component itself and of its mirror image across the face, which is
/// what a reflective face sees in the neighbouring mirrored cell.
#[derive(Debug, Clone)]
pub struct BoundaryKernel {
    /// `d·n`
    pub dn: f64,
    /// `d − 2(d·n)n`
    pub reflected: [f64; 3],
    /// `∫ φ_i φ_j`
    pub mass: Array2<f64>,
    /// `∫ |d·n| φ_i φ_j`
    pub abs_mass: Array2<f64>,
    /// `½ ∫ (d·n) φ_i (d·∇φ_j)`
    pub flux: Array2<f64>,
    /// `½ ∫ (d·n) φ_i (d_r·∇φ_j)`
    pub mirror_flux: Array2<f64>,
}

impl BoundaryKernel {
    pub fn compute(face: &FaceValues, omega: &[f64; 3]) -> Self {
        let normal = face.normal();
        let dn = dot(omega, &normal);
        let reflected = reflect(omega, &normal);
        let n = face.n_dofs();
        let n_q = face.n_quadrature_points();
        let table = |trial: &dyn Fn(usize, usize) -> f64| {
            Array2::from_shape_fn((n, n), |(i, j)| {
                (0..n_q)
                    .map(|q| face.value(i, q) * trial(j, q) * face.jxw(q))
                    .sum::<f64>()
            })
        };
        let mass = table(&|j, q| face.value(j, q));
        BoundaryKernel {
            dn,
            reflected,
            abs_mass: &mass * dn.abs(),
            flux: table(&|j, q| 0.5 * dn * dot(omega, &face.gradient(j, q))),
            mirror_flux: table(&|j, q| 0.5 * dn * dot(&reflected, &face.gradient(j, q))),
            mass,
        }
    }

    /// Interior-penalty blocks `[v_d u_d, v_d u_r]` of a reflective face
    /// treated as an interior face shared with the mirrored cell, whose
    /// unknown in direction `d` is the component of the mirror `r`.
    pub fn ghost_blocks(&self, c: f64, sigma_e: f64) -> [Array2<f64>; 2] {
        let own = &self.mass * sigma_e - &((&self.flux + &self.flux.t()) * c);
        let mirror = -(&self.mass * sigma_e) - &(&self.mirror_flux * c) + &(&self.flux.t() * c);
        [own, mirror]
    }
}

/// Interior-penalty coefficient `max(0.25, c_p (t/mfp⁺ + t/mfp⁻))` where
/// `mfp` is σt times the cell extent normal to the face.
pub fn penalty(c_p: f64, tensor_norm: f64, mfp_plus: f64, mfp_minus: f64) -> f64 {
    MIN_PENALTY.max(c_p * (tensor_norm / mfp_plus + tensor_norm / mfp_minus))
}

/// `p(p+1)/2`
pub fn penalty_factor(degree: usize) -> f64 {
    (degree * (degree + 1)) as f64 / 2.0
}

// ───────────────────────────── pattern ───────────────────────────────

/// Couplings of every dof to its own cell and its face neighbours.
pub fn sparsity_pattern(disc: &Discretization) -> TransportResult<Arc<SparsityPattern>> {
    let n = disc.dofs_per_cell();
    let mut rows = Vec::with_capacity(disc.n_dofs());
    for cell in 0..disc.mesh.n_cells() {
        let mut cols: Vec<usize> = disc.fe.dof_range(cell).collect();
        for nb in disc.mesh.face_neighbors(cell) {
            cols.extend(disc.fe.dof_range(nb));
        }
        for _ in 0..n {
            rows.push(cols.clone());
        }
    }
    Ok(Arc::new(SparsityPattern::from_rows(disc.n_dofs(), rows)?))
}

/// Pattern of the stacked system over `directions`: block `a` holds the
/// dofs of `directions[a]`, and a cell on a reflective face also couples
/// to the same cell in the block of the mirrored direction.
pub fn coupled_pattern(
    disc: &Discretization,
    directions: &[usize],
) -> TransportResult<Arc<SparsityPattern>> {
    let n = disc.dofs_per_cell();
    let n_dofs = disc.n_dofs();
    let mut rows = Vec::with_capacity(directions.len() * n_dofs);
    for (block, &d) in directions.iter().enumerate() {
        for cell in 0..disc.mesh.n_cells() {
            let mut cols: Vec<usize> = shifted(disc, cell, block * n_dofs);
            for nb in disc.mesh.face_neighbors(cell) {
                cols.extend(shifted(disc, nb, block * n_dofs));
            }
            for face in 0..disc.mesh.faces_per_cell() {
                let FaceNeighbor::Boundary(b) = disc.mesh.neighbor(cell, face) else {
                    continue;
                };
                if !disc.reflective.is_reflective(b) {
                    continue;
                }
                let r = disc.reflective.reflective_index(b, d)?;
                if r != d {
                    cols.extend(shifted(disc, cell, block_of(directions, r)? * n_dofs));
                }
            }
            for _ in 0..n {
                rows.push(cols.clone());
            }
        }
    }
    Ok(Arc::new(SparsityPattern::from_rows(
        directions.len() * n_dofs,
        rows,
    )?))
}

fn shifted(disc: &Discretization, cell: usize, offset: usize) -> Vec<usize> {
    disc.fe.dof_range(cell).map(|j| offset + j).collect()
}

fn block_of(directions: &[usize], direction: usize) -> TransportResult<usize> {
    directions
        .iter()
        .position(|&d| d == direction)
        .ok_or(TransportError::InvalidIndex {
            what: "mirrored direction",
            index: direction,
            len: directions.len(),
        })
}

/// Directions linked through the mirrors of every reflective boundary,
/// each orbit sorted and the orbits ordered by their first direction.
pub fn mirror_orbits(disc: &Discretization) -> TransportResult<Vec<Vec<usize>>> {
    fn find(root: &mut [usize], mut d: usize) -> usize {
        while root[d] != d {
            root[d] = root[root[d]];
            d = root[d];
        }
        d
    }

    let n = disc.quadrature.n_directions();
    let mut root: Vec<usize> = (0..n).collect();
    for b in (0..disc.mesh.n_boundaries()).filter(|&b| disc.reflective.is_reflective(b)) {
        for d in 0..n {
            let r = disc.reflective.reflective_index(b, d)?;
            let (a, c) = (find(&mut root, d), find(&mut root, r));
            if a != c {
                root[a.max(c)] = a.min(c);
            }
        }
    }

    let mut slot = vec![usize::MAX; n];
    let mut orbits: Vec<Vec<usize>> = Vec::new();
    for d in 0..n {
        let r = find(&mut root, d);
        if slot[r] == usize::MAX {
            slot[r] = orbits.len();
            orbits.push(Vec::new());
        }
        orbits[slot[r]].push(d);
    }
    Ok(orbits)
}

// ───────────────────────── reflective faces ──────────────────────────

/// Boundary faces on reflective boundaries in rank order, and the layout
/// of per-component traces at their quadrature points.
///
/// With explicit reflection each component carries its incoming flux on
/// these faces. Since `ψ_out = 2ψ⁺ − ψ_in` on a face, the incoming flux of
/// `d` is the outgoing flux of its mirror `r`, `2u_r − ψ_in,r`, taken
/// from the previous iterate.
#[derive(Debug, Clone, Default)]
pub struct ReflectiveFaces {
    /// `(cell, boundary)`
    faces: Vec<(usize, usize)>,
    offsets: Vec<usize>,
    n_points: usize,
}

impl ReflectiveFaces {
    pub fn new(disc: &Discretization) -> Self {
        let mut faces = Vec::new();
        let mut offsets = Vec::new();
        let mut n_points = 0;
        for part in &disc.partitions {
            for cell in part.cells() {
                for face in 0..disc.mesh.faces_per_cell() {
                    let FaceNeighbor::Boundary(b) = disc.mesh.neighbor(cell, face) else {
                        continue;
                    };
                    if disc.reflective.is_reflective(b) {
                        faces.push((cell, b));
                        offsets.push(n_points);
                        n_points += disc.fe.face_values(cell, b).n_quadrature_points();
                    }
                }
            }
        }
        ReflectiveFaces {
            faces,
            offsets,
            n_points,
        }
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    /// Trace values per component.
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// `(cell, boundary, first point)` of every face.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.faces
            .iter()
            .zip(&self.offsets)
            .map(|(&(cell, b), &offset)| (cell, b, offset))
    }

    /// Face traces of every angular flux.
    pub fn traces(&self, disc: &Discretization, angular: &[Array1<f64>]) -> Vec<Array1<f64>> {
        angular
            .par_iter()
            .map(|psi| {
                let mut out = Array1::zeros(self.n_points);
                for (cell, b, offset) in self.iter() {
                    let fv = disc.fe.face_values(cell, b);
                    let local = disc.local(psi, cell);
                    for q in 0..fv.n_quadrature_points() {
                        out[offset + q] = fv.evaluate(local, q);
                    }
                }
                out
            })
            .collect()
    }

    /// Next incoming flux `2u_r − ψ_in,r` of every component from the
    /// freshly solved `angular` and the `incoming` it was solved with.
    /// A direction that is its own mirror keeps its trace.
    pub fn exchange(
        &self,
        disc: &Discretization,
        angular: &[Array1<f64>],
        incoming: &[Array1<f64>],
    ) -> TransportResult<Vec<Array1<f64>>> {
        self.check(disc, incoming)?;
        let traces = self.traces(disc, angular);
        (0..disc.n_components())
            .into_par_iter()
            .map(|k| {
                let d = disc.indexer.direction_of(k)?;
                let g = disc.indexer.group_of(k)?;
                let mut out = Array1::zeros(self.n_points);
                for (_, b, offset) in self.iter() {
                    let r = disc.reflective.reflective_index(b, d)?;
                    let kr = disc.indexer.component_index(r, g)?;
                    let n_q = self.points_of(offset);
                    for p in offset..offset + n_q {
                        out[p] = if r == d {
                            traces[k][p]
                        } else {
                            2.0 * traces[kr][p] - incoming[kr][p]
                        };
                    }
                }
                Ok(out)
            })
            .collect()
    }

    /// Scale the incoming flux on each face by the ratio of the corrected
    /// to the high-order cell average of the face's cell and group.
    pub fn rescale(
        &self,
        disc: &Discretization,
        incoming: &mut [Array1<f64>],
        ho: &[Array1<f64>],
        corrected: &[Array1<f64>],
    ) -> TransportResult<()> {
        self.check(disc, incoming)?;
        for (cell, _, offset) in self.iter() {
            let n_q = self.points_of(offset);
            for g in 0..disc.n_groups() {
                let before = disc.cell_average(&ho[g], cell);
                let after = disc.cell_average(&corrected[g], cell);
                let ratio = after / before;
                if before <= 0.0 || !ratio.is_finite() || ratio <= 0.0 {
                    continue;
                }
                for d in 0..disc.quadrature.n_directions() {
                    let k = disc.indexer.component_index(d, g)?;
                    incoming[k]
                        .slice_mut(s![offset..offset + n_q])
                        .mapv_inplace(|v| v * ratio);
                }
            }
        }
        Ok(())
    }

    fn points_of(&self, offset: usize) -> usize {
        match self.offsets.binary_search(&offset) {
            Ok(i) if i + 1 < self.offsets.len() => self.offsets[i + 1] - offset,
            _ => self.n_points - offset,
        }
    }

    fn check(&self, disc: &Discretization, incoming: &[Array1<f64>]) -> TransportResult<()> {
        if incoming.len() != disc.n_components() {
            return Err(TransportError::DimensionMismatch {
                expected: disc.n_components(),
                found: incoming.len(),
            });
        }
        for trace in incoming {
            if trace.len() != self.n_points {
                return Err(TransportError::DimensionMismatch {
                    expected: self.n_points,
                    found: trace.len(),
                });
            }
        }
        Ok(())
    }
}

// ──────────────────────────── operators ──────────────────────────────

/// Components solved together, stacked in block order, and their
/// operator.
#[derive(Debug, Clone)]
pub struct ComponentSystem {
    pub components: Vec<usize>,
    pub matrix: SparseMatrix,
}

/// Every component operator, finalized. Without implicit reflection each
/// system holds a single component and `systems[k]` solves component `k`.
#[derive(Debug, Clone)]
pub struct OperatorSet {
    pub systems: Vec<ComponentSystem>,
    /// Whether implicit reflection couples mirrored components.
    pub coupled: bool,
}

#[derive(Debug, Clone)]
pub struct HoAssembler {
    cell_kernels: Vec<CellKernel>,
    /// `[axis][direction]`
    face_kernels: Vec<Vec<FaceKernel>>,
    /// `[boundary][direction]`
    boundary_kernels: Vec<Vec<BoundaryKernel>>,
    reflective_faces: ReflectiveFaces,
    penalty_factor: f64,
    explicit_reflection: bool,
}

impl HoAssembler {
    pub fn new(disc: &Discretization, explicit_reflection: bool) -> Self {
        let fe = &disc.fe;
        let dirs = disc.quadrature.directions();
        let cell_values = fe.cell_values(0);
        let cell_kernels = dirs
            .iter()
            .map(|d| CellKernel::compute(cell_values, &d.omega))
            .collect();
        let face_kernels = (0..disc.mesh.dim())
            .map(|axis| {
                let plus = fe.face_values(0, 2 * axis);
                let minus = fe.face_values(0, 2 * axis + 1);
                dirs.iter()
                    .map(|d| FaceKernel::streaming(plus, minus, &d.omega))
                    .collect()
            })
            .collect();
        let boundary_kernels = (0..disc.mesh.n_boundaries())
            .map(|b| {
                let face = fe.face_values(0, b);
                dirs.iter()
                    .map(|d| BoundaryKernel::compute(face, &d.omega))
                    .collect()
            })
            .collect();
        HoAssembler {
            cell_kernels,
            face_kernels,
            boundary_kernels,
            reflective_faces: ReflectiveFaces::new(disc),
            penalty_factor: penalty_factor(fe.degree()),
            explicit_reflection,
        }
    }

    pub fn explicit_reflection(&self) -> bool {
        self.explicit_reflection
    }

    pub fn cell_kernel(&self, direction: usize) -> &CellKernel {
        &self.cell_kernels[direction]
    }

    pub fn face_kernel(&self, axis: usize, direction: usize) -> &FaceKernel {
        &self.face_kernels[axis][direction]
    }

    pub fn boundary_kernel(&self, boundary: usize, direction: usize) -> &BoundaryKernel {
        &self.boundary_kernels[boundary][direction]
    }

    pub fn reflective_faces(&self) -> &ReflectiveFaces {
        &self.reflective_faces
    }

    /// Whether mirrored components share one system.
    pub fn is_coupled(&self) -> bool {
        !self.explicit_reflection && !self.reflective_faces.is_empty()
    }

    /// Whether the iteration lags an incoming flux on reflective faces.
    pub fn lags_reflection(&self) -> bool {
        self.explicit_reflection && !self.reflective_faces.is_empty()
    }

    /// Build and finalize every system: one per component, or one per
    /// mirror orbit and group with implicit reflection.
    pub fn assemble_operators(&self, disc: &Discretization) -> TransportResult<OperatorSet> {
        let coupled = self.is_coupled();
        let mut layout: Vec<(Vec<usize>, Arc<SparsityPattern>)> = Vec::new();
        if coupled {
            for orbit in mirror_orbits(disc)? {
                let pattern = coupled_pattern(disc, &orbit)?;
                for g in 0..disc.n_groups() {
                    let components = orbit
                        .iter()
                        .map(|&d| disc.indexer.component_index(d, g))
                        .collect::<TransportResult<Vec<_>>>()?;
                    layout.push((components, Arc::clone(&pattern)));
                }
            }
        } else {
            let pattern = sparsity_pattern(disc)?;
            layout.extend((0..disc.n_components()).map(|k| (vec![k], Arc::clone(&pattern))));
        }

        let systems = layout
            .into_par_iter()
            .map(|(components, pattern)| {
                let matrix = self.assemble_system(disc, &pattern, &components)?;
                Ok(ComponentSystem { components, matrix })
            })
            .collect::<TransportResult<Vec<_>>>()?;
        log::debug!(
            "assembled {} systems over {} components{}",
            systems.len(),
            disc.n_components(),
            if coupled { ", mirrors coupled" } else { "" }
        );
        Ok(OperatorSet { systems, coupled })
    }

    /// Operator of the components in `components`, stacked in that order.
    /// Reflective faces of a direction that is its own mirror carry no
    /// term; other reflective faces carry the `|d·n|` mass with explicit
    /// reflection and the mirrored interior-penalty coupling otherwise.
    pub fn assemble_system(
        &self,
        disc: &Discretization,
        pattern: &Arc<SparsityPattern>,
        components: &[usize],
    ) -> TransportResult<SparseMatrix> {
        let directions = components
            .iter()
            .map(|&k| disc.indexer.direction_of(k))
            .collect::<TransportResult<Vec<_>>>()?;
        let h = disc.mesh.spacing();
        let mass = disc.mass();
        let n_dofs = disc.n_dofs();
        let mut a = SparseMatrix::new(Arc::clone(pattern));

        for (block, (&k, &d)) in components.iter().zip(&directions).enumerate() {
            let g = disc.indexer.group_of(k)?;
            let offset = block * n_dofs;
            let tensor_norm = disc.quadrature.tensor_norm(d);

            for part in &disc.partitions {
                for cell in part.cells() {
                    let sigma_t = disc.cell_material(cell)?.sigma_t[g];
                    let dofs = shifted(disc, cell, offset);
                    let local = &self.cell_kernels[d].streaming / sigma_t + &(mass * sigma_t);
                    a.add_block(&dofs, &dofs, &local)?;

                    for face in 0..disc.mesh.faces_per_cell() {
                        match disc.mesh.neighbor(cell, face) {
                            FaceNeighbor::Interior(nb) => {
                                if nb > cell {
                                    continue;
                                }
                                let axis = face / 2;
                                let sigma_nb = disc.cell_material(nb)?.sigma_t[g];
                                let sigma_e = penalty(
                                    self.penalty_factor,
                                    tensor_norm,
                                    sigma_t * h[axis],
                                    sigma_nb * h[axis],
                                );
                                let nb_dofs = shifted(disc, nb, offset);
                                let [pp, pn, np, nn] = self.face_kernels[axis][d].sip_blocks(
                                    1.0 / sigma_t,
                                    1.0 / sigma_nb,
                                    sigma_e,
                                );
                                a.add_block(&dofs, &dofs, &pp)?;
                                a.add_block(&dofs, &nb_dofs, &pn)?;
                                a.add_block(&nb_dofs, &dofs, &np)?;
                                a.add_block(&nb_dofs, &nb_dofs, &nn)?;
                            }
                            FaceNeighbor::Boundary(b) => {
                                let kernel = &self.boundary_kernels[b][d];
                                if !disc.reflective.is_reflective(b) {
                                    a.add_block(&dofs, &dofs, &kernel.abs_mass)?;
                                    continue;
                                }
                                let r = disc.reflective.reflective_index(b, d)?;
                                if r == d {
                                    continue;
                                }
                                if self.explicit_reflection {
                                    a.add_block(&dofs, &dofs, &kernel.abs_mass)?;
                                    continue;
                                }
                                let mfp = sigma_t * h[b / 2];
                                let sigma_e = penalty(
                                    self.penalty_factor,
                                    tensor_norm.max(disc.quadrature.tensor_norm(r)),
                                    mfp,
                                    mfp,
                                );
                                let mirror_dofs =
                                    shifted(disc, cell, block_of(&directions, r)? * n_dofs);
                                let [own, mirror] = kernel.ghost_blocks(1.0 / sigma_t, sigma_e);
                                a.add_block(&dofs, &dofs, &own)?;
                                a.add_block(&dofs, &mirror_dofs, &mirror)?;
                            }
                        }
                    }
                }
            }
        }
        a.compress();
        Ok(a)
    }

    // ───────────────────────── right-hand sides ──────────────────────

    /// Isotropic volumetric load of every group, shared by all directions:
    /// `M (Σ_g' σs[g'][g] φ_g' + χ_g Σ_g' νσf_g' φgen_g' / k + Q_g) / 4π`.
    ///
    /// `generation_flux` and `k_eff` are only read when `eigenvalue` is set.
    pub fn group_sources(
        &self,
        disc: &Discretization,
        scalar: &[Array1<f64>],
        generation_flux: &[Array1<f64>],
        k_eff: f64,
        eigenvalue: bool,
    ) -> TransportResult<Vec<Array1<f64>>> {
        let n_groups = disc.n_groups();
        let n = disc.dofs_per_cell();
        for field in scalar.iter().chain(generation_flux) {
            disc.check_field(field)?;
        }
        let mut out = vec![Array1::zeros(disc.n_dofs()); n_groups];
        for part in &disc.partitions {
            for cell in part.cells() {
                let mat = disc.cell_material(cell)?;
                let range = disc.fe.dof_range(cell);
                for (g, rhs) in out.iter_mut().enumerate() {
                    let mut density = Array1::from_elem(n, mat.source_per_sr[g]);
                    for (from, phi) in scalar.iter().enumerate() {
                        let xs = mat.sigma_s_per_sr[from][g];
                        if xs != 0.0 {
                            density.scaled_add(xs, &disc.local(phi, cell));
                        }
                    }
                    if eigenvalue && mat.fissile {
                        for (from, phi) in generation_flux.iter().enumerate() {
                            let xs = mat.fission_transfer_per_sr[from][g];
                            if xs != 0.0 {
                                density.scaled_add(xs / k_eff, &disc.local(phi, cell));
                            }
                        }
                    }
                    rhs.slice_mut(s![range.clone()])
                        .assign(&disc.mass().dot(&density));
                }
            }
        }
        Ok(out)
    }

    /// Right-hand side of component `k`: the group load plus, with
    /// explicit reflection, `∫ |d·n| v ψ_in` on every reflective face
    /// whose mirror is another direction.
    pub fn component_rhs(
        &self,
        disc: &Discretization,
        k: usize,
        group_sources: &[Array1<f64>],
        incoming: &[Array1<f64>],
    ) -> TransportResult<Array1<f64>> {
        let d = disc.indexer.direction_of(k)?;
        let g = disc.indexer.group_of(k)?;
        let mut rhs = group_sources[g].clone();
        if !self.lags_reflection() {
            return Ok(rhs);
        }
        let trace = incoming.get(k).ok_or(TransportError::DimensionMismatch {
            expected: disc.n_components(),
            found: incoming.len(),
        })?;
        if trace.len() != self.reflective_faces.n_points() {
            return Err(TransportError::DimensionMismatch {
                expected: self.reflective_faces.n_points(),
                found: trace.len(),
            });
        }
        for (cell, b, offset) in self.reflective_faces.iter() {
            if disc.reflective.reflective_index(b, d)? == d {
                continue;
            }
            let dn = self.boundary_kernels[b][d].dn.abs();
            let fv = disc.fe.face_values(cell, b);
            let mut local = rhs.slice_mut(s![disc.fe.dof_range(cell)]);
            for q in 0..fv.n_quadrature_points() {
                let density = dn * trace[offset + q] * fv.jxw(q);
                for (i, bi) in local.iter_mut().enumerate() {
                    *bi += density * fv.value(i, q);
                }
            }
        }
        Ok(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angular::AngularQuadrature;
    use crate::finite_element::DgLagrange;
    use crate::mesh::CartesianMesh;
    use transport_types::config::ProblemConfig;

    fn config(json_extra: &str) -> ProblemConfig {
        let json = format!(
            r#"{{
            "name": "asm", "dimension": 2, "sn_order": 4, "n_groups": 2,
            "problem": "fixed-source",
            "geometry": {{ "extents": [1.0, 1.0], "cells": [3, 3],
                           "material_ids": [0, 1, 0, 1, 0, 1, 0, 1, 0] }},
            "materials": [
                {{ "id": 0, "sigma_t": [1.0, 2.0], "sigma_s": [[0.5, 0.2], [0.0, 1.5]], "source": [1.0, 0.0] }},
                {{ "id": 1, "sigma_t": [4.0, 0.5], "sigma_s": [[1.0, 0.0], [0.0, 0.1]] }}
            ]
            {json_extra}
        }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_cell_kernel_symmetric_psd() {
        let mesh = CartesianMesh::new(2, &[1.0, 1.0], &[2, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, 2).unwrap();
        let q = AngularQuadrature::new(4, 2).unwrap();
        let kernel = CellKernel::compute(fe.cell_values(0), &q.directions()[0].omega);
        let s = &kernel.streaming;
        for i in 0..s.nrows() {
            assert!(s[[i, i]] >= 0.0);
            for j in 0..s.ncols() {
                assert!((s[[i, j]] - s[[j, i]]).abs() < 1e-14);
            }
        }
        // Constants are in the kernel of the streaming operator
        let row_sums = s.sum_axis(ndarray::Axis(1));
        assert!(row_sums.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_sip_blocks_transpose_pair() {
        let mesh = CartesianMesh::new(2, &[1.0, 1.0], &[2, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, 1).unwrap();
        let kernel = FaceKernel::streaming(fe.face_values(0, 0), fe.face_values(0, 1), &[0.6, 0.3, 0.0]);
        let [pp, pn, np, nn] = kernel.sip_blocks(1.0 / 3.0, 1.0 / 0.7, 1.4);
        let diff = (&pn.t() - &np).mapv(f64::abs).sum();
        assert!(diff < 1e-14, "v+u- must be the transpose of v-u+, diff = {diff}");
        for m in [&pp, &nn] {
            assert!((m - &m.t()).mapv(f64::abs).sum() < 1e-14);
        }
        // With v = u = 1 on both sides the jump vanishes
        let total = pp.sum() + pn.sum() + np.sum() + nn.sum();
        assert!(total.abs() < 1e-12, "total = {total}");
    }

    #[test]
    fn test_penalty_floor() {
        assert_eq!(penalty(1.0, 0.01, 10.0, 10.0), MIN_PENALTY);
        assert!((penalty(3.0, 1.0, 1.0, 2.0) - 4.5).abs() < 1e-15);
        assert_eq!(penalty_factor(1), 1.0);
        assert_eq!(penalty_factor(3), 6.0);
    }

    #[test]
    fn test_boundary_kernel_reflection() {
        let mesh = CartesianMesh::new(2, &[1.0, 1.0], &[2, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, 1).unwrap();
        let k = BoundaryKernel::compute(fe.face_values(0, 1), &[0.6, -0.2, 0.0]);
        assert!((k.dn - 0.6).abs() < 1e-15);
        assert!((k.reflected[0] + 0.6).abs() < 1e-15 && (k.reflected[1] + 0.2).abs() < 1e-15);
        // Trace mass of a 0.5-long face with |d·n| = 0.6
        assert!((k.abs_mass.sum() - 0.3).abs() < 1e-14);
    }

    #[test]
    fn test_ghost_blocks_mirror_pair_transposed() {
        let mesh = CartesianMesh::new(2, &[1.0, 1.0], &[2, 2], vec![]).unwrap();
        let fe = DgLagrange::new(&mesh, 2).unwrap();
        let face = fe.face_values(0, 0);
        let kd = BoundaryKernel::compute(face, &[0.6, 0.3, 0.0]);
        let kr = BoundaryKernel::compute(face, &kd.reflected);
        let [own_d, mirror_d] = kd.ghost_blocks(0.5, 2.0);
        let [own_r, mirror_r] = kr.ghost_blocks(0.5, 2.0);
        for own in [&own_d, &own_r] {
            assert!((own - &own.t()).mapv(f64::abs).sum() < 1e-13);
        }
        let diff = (&mirror_d - &mirror_r.t()).mapv(f64::abs).sum();
        assert!(diff < 1e-13, "mirror blocks must pair up, diff = {diff}");
        // Equal traces on both sides of the mirror leave no jump
        let total = own_d.sum() + mirror_d.sum();
        assert!(total.abs() < 1e-12, "total = {total}");
    }

    #[test]
    fn test_mirror_orbits() {
        let disc = Discretization::new(&config(r#", "reflective_boundaries": [0]"#), 1).unwrap();
        let orbits = mirror_orbits(&disc).unwrap();
        let n = disc.quadrature.n_directions();
        assert_eq!(orbits.len(), n / 2);
        for orbit in &orbits {
            let &[d, r] = orbit.as_slice() else {
                panic!("orbit {orbit:?}")
            };
            assert_eq!(disc.reflective.reflective_index(0, d).unwrap(), r);
        }

        let disc = Discretization::new(&config(r#", "reflective_boundaries": [0, 3]"#), 1).unwrap();
        let orbits = mirror_orbits(&disc).unwrap();
        assert_eq!(orbits.len(), n / 4);
        assert_eq!(orbits.iter().map(Vec::len).sum::<usize>(), n);
        assert!(orbits.windows(2).all(|w| w[0][0] < w[1][0]));

        let disc = Discretization::new(&config(""), 1).unwrap();
        assert_eq!(mirror_orbits(&disc).unwrap().len(), n);
    }

    #[test]
    fn test_operators_symmetric_vacuum_and_explicit() {
        for extra in ["", r#", "reflective_boundaries": [0, 3]"#] {
            let disc = Discretization::new(&config(extra), 1).unwrap();
            let asm = HoAssembler::new(&disc, true);
            let ops = asm.assemble_operators(&disc).unwrap();
            assert!(!ops.coupled);
            assert_eq!(ops.systems.len(), disc.n_components());
            for (k, system) in ops.systems.iter().enumerate() {
                assert_eq!(system.components, vec![k]);
                assert!(system.matrix.is_compressed());
                assert!(system.matrix.is_symmetric(1e-12));
            }
        }
    }

    #[test]
    fn test_implicit_reflection_couples_mirrors() {
        let disc = Discretization::new(
            &config(r#", "reflective_boundaries": [1], "explicit_reflection": false"#),
            1,
        )
        .unwrap();
        let asm = HoAssembler::new(&disc, false);
        assert!(asm.is_coupled());
        let ops = asm.assemble_operators(&disc).unwrap();
        assert!(ops.coupled);
        assert_eq!(ops.systems.len(), disc.n_components() / 2);
        let mut seen = vec![false; disc.n_components()];
        for system in &ops.systems {
            assert_eq!(system.components.len(), 2);
            assert_eq!(system.matrix.n_rows(), 2 * disc.n_dofs());
            assert!(system.matrix.is_symmetric(1e-12));
            for &k in &system.components {
                assert!(!seen[k]);
                seen[k] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_partition_count_bitwise_identical() {
        for extra in ["", r#", "reflective_boundaries": [0], "explicit_reflection": false"#] {
            let serial = Discretization::new(&config(extra), 1).unwrap();
            let split = Discretization::new(&config(extra), 4).unwrap();
            let explicit = extra.is_empty();
            let a = HoAssembler::new(&serial, explicit).assemble_operators(&serial).unwrap();
            let b = HoAssembler::new(&split, explicit).assemble_operators(&split).unwrap();
            assert_eq!(a.systems.len(), b.systems.len());
            for (sa, sb) in a.systems.iter().zip(&b.systems) {
                assert_eq!(sa.components, sb.components);
                assert_eq!(sa.matrix.values(), sb.matrix.values());
            }
        }
    }

    #[test]
    fn test_reflective_faces_layout_and_exchange() {
        let disc = Discretization::new(&config(r#", "reflective_boundaries": [0, 3]"#), 2).unwrap();
        let faces = ReflectiveFaces::new(&disc);
        // Three cells on x = 0 and three on y = 1, two points per face
        assert_eq!(faces.n_faces(), 6);
        assert_eq!(faces.n_points(), 12);

        let psi = vec![Array1::from_elem(disc.n_dofs(), 0.75); disc.n_components()];
        let traces = faces.traces(&disc, &psi);
        assert!(traces.iter().flatten().all(|v| (v - 0.75).abs() < 1e-14));
        // Incoming equal to the trace reproduces itself
        let next = faces.exchange(&disc, &psi, &traces).unwrap();
        assert!(next.iter().flatten().all(|v| (v - 0.75).abs() < 1e-14));

        let short = vec![Array1::zeros(3); disc.n_components()];
        assert!(matches!(
            faces.exchange(&disc, &psi, &short),
            Err(TransportError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_reflective_rescale_by_cell_ratio() {
        let disc = Discretization::new(&config(r#", "reflective_boundaries": [0]"#), 1).unwrap();
        let faces = ReflectiveFaces::new(&disc);
        let mut incoming = vec![Array1::from_elem(faces.n_points(), 1.0); disc.n_components()];
        let ho = vec![Array1::from_elem(disc.n_dofs(), 2.0), Array1::zeros(disc.n_dofs())];
        let corrected = vec![Array1::from_elem(disc.n_dofs(), 3.0); 2];
        faces.rescale(&disc, &mut incoming, &ho, &corrected).unwrap();
        for k in 0..disc.n_components() {
            let expected = if disc.indexer.group_of(k).unwrap() == 0 { 1.5 } else { 1.0 };
            assert!(incoming[k].iter().all(|v| (v - expected).abs() < 1e-14));
        }
    }

    #[test]
    fn test_explicit_rhs_adds_incoming_on_mirrored_faces() {
        let disc = Discretization::new(&config(r#", "reflective_boundaries": [0]"#), 1).unwrap();
        let asm = HoAssembler::new(&disc, true);
        assert!(asm.lags_reflection());
        let zero = vec![Array1::zeros(disc.n_dofs()); 2];
        let incoming = vec![Array1::from_elem(asm.reflective_faces().n_points(), 1.0); disc.n_components()];
        for k in 0..disc.n_components() {
            let d = disc.indexer.direction_of(k).unwrap();
            let rhs = asm.component_rhs(&disc, k, &zero, &incoming).unwrap();
            // |d·n| over the unit-length x = 0 face
            let expected = asm.boundary_kernel(0, d).dn.abs();
            assert!((rhs.sum() - expected).abs() < 1e-13, "{} vs {expected}", rhs.sum());
        }
        assert!(asm.component_rhs(&disc, 0, &zero, &[]).is_err());

        let implicit = HoAssembler::new(&disc, false);
        let rhs = implicit.component_rhs(&disc, 0, &zero, &[]).unwrap();
        assert_eq!(rhs.sum(), 0.0);
    }

    #[test]
    fn test_group_source_row_sums() {
        let disc = Discretization::new(&config(""), 1).unwrap();
        let asm = HoAssembler::new(&disc, true);
        let phi = vec![Array1::from_elem(disc.n_dofs(), 1.0); 2];
        let src = asm.group_sources(&disc, &phi, &phi, 1.0, false).unwrap();
        // Group 1 receives 0.2 from group 0 and 1.5 within, in the five
        // material-0 cells, and 0.1 within in the four material-1 cells.
        let cell = 1.0 / 9.0;
        let expected = (5.0 * (0.2 + 1.5) + 4.0 * 0.1) * cell / transport_types::constants::FOUR_PI;
        assert!((src[1].sum() - expected).abs() < 1e-13, "{} vs {expected}", src[1].sum());
    }
}
