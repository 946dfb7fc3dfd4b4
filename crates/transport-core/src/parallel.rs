// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Domain Partitioning
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Deterministic cell ownership and global reductions.
//!
//! Ranks own contiguous ranges of the linear cell numbering. The
//! [`Communicator`] trait carries the reductions the iteration needs; the
//! serial implementation treats the whole process as one rank, and
//! multi-rank runs are reproduced by visiting the partitions in rank
//! order over one address space.

use std::ops::Range;

use transport_types::error::{TransportError, TransportResult};

/// Cells owned by one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub nranks: usize,
    pub cell_start: usize,
    pub cell_end: usize,
}

impl Partition {
    /// Split `n_cells` into `nranks` contiguous ranges; the first
    /// `n_cells % nranks` ranks get one extra cell.
    pub fn decompose(n_cells: usize, nranks: usize) -> TransportResult<Vec<Partition>> {
        if nranks < 1 {
            return Err(TransportError::Config(
                "decomposition requires nranks >= 1".to_string(),
            ));
        }
        if nranks > n_cells {
            return Err(TransportError::Config(format!(
                "cannot split {n_cells} cells across {nranks} ranks"
            )));
        }

        let base = n_cells / nranks;
        let rem = n_cells % nranks;
        let mut out = Vec::with_capacity(nranks);
        let mut cursor = 0usize;
        for rank in 0..nranks {
            let local = base + usize::from(rank < rem);
            out.push(Partition {
                rank,
                nranks,
                cell_start: cursor,
                cell_end: cursor + local,
            });
            cursor += local;
        }
        Ok(out)
    }

    pub fn cells(&self) -> Range<usize> {
        self.cell_start..self.cell_end
    }

    pub fn n_local_cells(&self) -> usize {
        self.cell_end - self.cell_start
    }
}

/// Global reductions across ranks.
pub trait Communicator: Send + Sync {
    fn sum(&self, local: f64) -> f64;

    fn max(&self, local: f64) -> f64;
}

/// One process, one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn sum(&self, local: f64) -> f64 {
        local
    }

    fn max(&self, local: f64) -> f64 {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_covers_all_cells() {
        let parts = Partition::decompose(10, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].cells(), 0..4);
        assert_eq!(parts[1].cells(), 4..7);
        assert_eq!(parts[2].cells(), 7..10);
        let total: usize = parts.iter().map(Partition::n_local_cells).sum();
        assert_eq!(total, 10);
        assert!(parts.iter().all(|p| p.nranks == 3));
        assert_eq!(parts.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_decompose_rejects_bad_counts() {
        assert!(Partition::decompose(4, 0).is_err());
        assert!(Partition::decompose(4, 5).is_err());
    }

    #[test]
    fn test_serial_reductions_are_identity() {
        let comm = SerialCommunicator;
        assert_eq!(comm.sum(2.5), 2.5);
        assert_eq!(comm.max(-1.0), -1.0);
    }
}
