// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Cartesian Mesh
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Uniform box mesh in 1, 2 or 3 dimensions.
//!
//! Cells are numbered linearly with x fastest, then y, then z. Face `f`
//! of a cell lies on axis `f / 2`, on the low side for even `f` and the
//! high side for odd `f`. Domain boundary faces carry the same id as the
//! cell face that touches them: the minimum face on axis `a` is boundary
//! `2a`, the maximum face is `2a + 1`.

use transport_types::config::GeometryConfig;
use transport_types::error::{TransportError, TransportResult};

/// What lies across a cell face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceNeighbor {
    Interior(usize),
    Boundary(usize),
}

#[derive(Debug, Clone)]
pub struct CartesianMesh {
    dim: usize,
    extents: [f64; 3],
    cells: [usize; 3],
    spacing: [f64; 3],
    material_ids: Vec<usize>,
}

impl CartesianMesh {
    /// Build a mesh over `[0, extents[a]]` per axis. An empty material map
    /// assigns material 0 to every cell.
    pub fn new(
        dim: usize,
        extents: &[f64],
        cells: &[usize],
        material_ids: Vec<usize>,
    ) -> TransportResult<Self> {
        if !(1..=3).contains(&dim) || extents.len() != dim || cells.len() != dim {
            return Err(TransportError::Config(format!(
                "mesh needs {dim} extents and cell counts in 1..=3 dimensions"
            )));
        }
        let mut ext = [1.0; 3];
        let mut n = [1usize; 3];
        let mut h = [1.0; 3];
        for a in 0..dim {
            if !(extents[a].is_finite() && extents[a] > 0.0) || cells[a] == 0 {
                return Err(TransportError::Config(format!(
                    "axis {a}: extent {} with {} cells is not a valid mesh",
                    extents[a], cells[a]
                )));
            }
            ext[a] = extents[a];
            n[a] = cells[a];
            h[a] = extents[a] / cells[a] as f64;
        }
        let n_cells = n[0] * n[1] * n[2];
        let material_ids = if material_ids.is_empty() {
            vec![0; n_cells]
        } else if material_ids.len() == n_cells {
            material_ids
        } else {
            return Err(TransportError::Config(format!(
                "material map has {} entries for {n_cells} cells",
                material_ids.len()
            )));
        };
        Ok(CartesianMesh {
            dim,
            extents: ext,
            cells: n,
            spacing: h,
            material_ids,
        })
    }

    pub fn from_config(dim: usize, geometry: &GeometryConfig) -> TransportResult<Self> {
        Self::new(
            dim,
            &geometry.extents,
            &geometry.cells,
            geometry.material_ids.clone(),
        )
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_cells(&self) -> usize {
        self.material_ids.len()
    }

    pub fn cells_per_axis(&self) -> [usize; 3] {
        self.cells
    }

    pub fn extents(&self) -> [f64; 3] {
        self.extents
    }

    /// Cell edge lengths; unused axes report 1.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn cell_volume(&self) -> f64 {
        self.spacing[..self.dim].iter().product()
    }

    /// Measure of a face normal to `axis` (1 for the point faces of 1-D).
    pub fn face_area(&self, axis: usize) -> f64 {
        (0..self.dim)
            .filter(|&a| a != axis)
            .map(|a| self.spacing[a])
            .product()
    }

    pub fn faces_per_cell(&self) -> usize {
        2 * self.dim
    }

    pub fn n_boundaries(&self) -> usize {
        2 * self.dim
    }

    #[inline]
    pub fn cell_coords(&self, cell: usize) -> [usize; 3] {
        let [nx, ny, _] = self.cells;
        [cell % nx, (cell / nx) % ny, cell / (nx * ny)]
    }

    #[inline]
    pub fn cell_index(&self, coords: [usize; 3]) -> usize {
        let [nx, ny, _] = self.cells;
        coords[0] + nx * (coords[1] + ny * coords[2])
    }

    /// Lower corner of `cell`.
    pub fn cell_origin(&self, cell: usize) -> [f64; 3] {
        let c = self.cell_coords(cell);
        let mut origin = [0.0; 3];
        for a in 0..self.dim {
            origin[a] = c[a] as f64 * self.spacing[a];
        }
        origin
    }

    pub fn material_id(&self, cell: usize) -> usize {
        self.material_ids[cell]
    }

    pub fn material_ids(&self) -> &[usize] {
        &self.material_ids
    }

    /// Neighbour across `face` of `cell`.
    pub fn neighbor(&self, cell: usize, face: usize) -> FaceNeighbor {
        let axis = face / 2;
        let mut c = self.cell_coords(cell);
        if face % 2 == 0 {
            if c[axis] == 0 {
                return FaceNeighbor::Boundary(face);
            }
            c[axis] -= 1;
        } else {
            if c[axis] + 1 == self.cells[axis] {
                return FaceNeighbor::Boundary(face);
            }
            c[axis] += 1;
        }
        FaceNeighbor::Interior(self.cell_index(c))
    }

    /// Cells sharing a face with `cell`.
    pub fn face_neighbors(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.faces_per_cell()).filter_map(move |f| match self.neighbor(cell, f) {
            FaceNeighbor::Interior(n) => Some(n),
            FaceNeighbor::Boundary(_) => None,
        })
    }
}

/// Outward unit normal of boundary (or cell face) `id`.
pub fn face_normal(id: usize) -> [f64; 3] {
    let mut n = [0.0; 3];
    n[id / 2] = if id % 2 == 0 { -1.0 } else { 1.0 };
    n
}
