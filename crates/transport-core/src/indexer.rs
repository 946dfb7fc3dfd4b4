// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Component Indexing
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! (direction, group) ↔ component bijection and reflective-direction
//! lookup.
//!
//! Component `k = d · n_groups + g`. Both maps are dense arrays built
//! once; every accessor checks its range and reports `InvalidIndex`.

use transport_types::constants::{MAX_BOUNDARIES, MIRROR_TOLERANCE};
use transport_types::error::{TransportError, TransportResult};

use crate::angular::{reflect, AngularQuadrature};
use crate::mesh::face_normal;

/// Forward and inverse component maps. `Default` is the uninitialized
/// indexer, on which every lookup fails.
#[derive(Debug, Clone, Default)]
pub struct ComponentIndexer {
    n_directions: usize,
    n_groups: usize,
    direction_of: Vec<usize>,
    group_of: Vec<usize>,
}

impl ComponentIndexer {
    pub fn initialize(n_directions: usize, n_groups: usize) -> Self {
        let n = n_directions * n_groups;
        ComponentIndexer {
            n_directions,
            n_groups,
            direction_of: (0..n).map(|k| k / n_groups).collect(),
            group_of: (0..n).map(|k| k % n_groups).collect(),
        }
    }

    pub fn n_components(&self) -> usize {
        self.direction_of.len()
    }

    pub fn n_directions(&self) -> usize {
        self.n_directions
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn component_index(&self, direction: usize, group: usize) -> TransportResult<usize> {
        if direction >= self.n_directions {
            return Err(TransportError::InvalidIndex {
                what: "direction",
                index: direction,
                len: self.n_directions,
            });
        }
        if group >= self.n_groups {
            return Err(TransportError::InvalidIndex {
                what: "group",
                index: group,
                len: self.n_groups,
            });
        }
        Ok(direction * self.n_groups + group)
    }

    pub fn direction_of(&self, component: usize) -> TransportResult<usize> {
        self.direction_of
            .get(component)
            .copied()
            .ok_or(TransportError::InvalidIndex {
                what: "component",
                index: component,
                len: self.direction_of.len(),
            })
    }

    pub fn group_of(&self, component: usize) -> TransportResult<usize> {
        self.group_of
            .get(component)
            .copied()
            .ok_or(TransportError::InvalidIndex {
                what: "component",
                index: component,
                len: self.group_of.len(),
            })
    }
}

/// `[boundary][direction] → mirrored direction` for the boundaries of the
/// problem dimension.
#[derive(Debug, Clone)]
pub struct ReflectiveMap {
    reflective: [bool; MAX_BOUNDARIES],
    mirrors: Vec<Vec<Option<usize>>>,
}

impl ReflectiveMap {
    /// Match every direction against the reflection about each boundary
    /// normal. A stored `d_r` matches when `d_r` or `−d_r` lies within the
    /// mirror tolerance of `Ω − 2(n·Ω)n`.
    pub fn build(quadrature: &AngularQuadrature, reflective_ids: &[usize]) -> TransportResult<Self> {
        let n_boundaries = 2 * quadrature.dim();
        let mut reflective = [false; MAX_BOUNDARIES];
        for &b in reflective_ids {
            if b >= n_boundaries {
                return Err(TransportError::InvalidIndex {
                    what: "boundary",
                    index: b,
                    len: n_boundaries,
                });
            }
            reflective[b] = true;
        }

        let dirs = quadrature.directions();
        let mirrors = (0..n_boundaries)
            .map(|b| {
                let normal = face_normal(b);
                dirs.iter()
                    .map(|dir| {
                        let target = reflect(&dir.omega, &normal);
                        dirs.iter().position(|cand| {
                            let plus = distance(&cand.omega, &target, 1.0);
                            let minus = distance(&cand.omega, &target, -1.0);
                            plus.min(minus) < MIRROR_TOLERANCE
                        })
                    })
                    .collect()
            })
            .collect();

        Ok(ReflectiveMap { reflective, mirrors })
    }

    pub fn is_reflective(&self, boundary_id: usize) -> bool {
        self.reflective.get(boundary_id).copied().unwrap_or(false)
    }

    /// Mirrored direction of `direction` on reflective `boundary_id`.
    pub fn reflective_index(&self, boundary_id: usize, direction: usize) -> TransportResult<usize> {
        let per_dir = self.mirrors.get(boundary_id).ok_or(TransportError::InvalidIndex {
            what: "boundary",
            index: boundary_id,
            len: self.mirrors.len(),
        })?;
        if !self.reflective[boundary_id] {
            return Err(TransportError::NotReflective { boundary_id });
        }
        let entry = per_dir.get(direction).ok_or(TransportError::InvalidIndex {
            what: "direction",
            index: direction,
            len: per_dir.len(),
        })?;
        entry.ok_or(TransportError::NoMirrorFound {
            boundary_id,
            direction,
        })
    }
}

/// `‖a − s·b‖₂`
fn distance(a: &[f64; 3], b: &[f64; 3], s: f64) -> f64 {
    ((a[0] - s * b[0]).powi(2) + (a[1] - s * b[1]).powi(2) + (a[2] - s * b[2]).powi(2)).sqrt()
}
