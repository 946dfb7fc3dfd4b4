// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Sparse Matrices
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Compressed-sparse-row storage with a shared, immutable sparsity
//! pattern.
//!
//! Every per-component transport operator couples the same degrees of
//! freedom, so one [`SparsityPattern`] is built from the mesh
//! connectivity and shared by all matrices through an `Arc`. Entries are
//! accumulated additively; a matrix must be finalized with
//! [`SparseMatrix::compress`] before it can be applied or solved.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use transport_types::error::{TransportError, TransportResult};

use crate::krylov::LinearOperator;

// ───────────────────────────── pattern ───────────────────────────────

/// Column structure of a CSR matrix. Columns are sorted within each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl SparsityPattern {
    /// Build from per-row column lists. Duplicates are merged.
    pub fn from_rows(n_cols: usize, rows: Vec<Vec<usize>>) -> TransportResult<Self> {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for (i, mut cols) in rows.into_iter().enumerate() {
            cols.sort_unstable();
            cols.dedup();
            if let Some(&last) = cols.last() {
                if last >= n_cols {
                    return Err(TransportError::LinAlg(format!(
                        "row {i} references column {last} of a {n_cols}-column pattern"
                    )));
                }
            }
            col_idx.extend_from_slice(&cols);
            row_ptr.push(col_idx.len());
        }
        Ok(SparsityPattern {
            n_cols,
            row_ptr,
            col_idx,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// Sorted column indices of `row`.
    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// Position of `(row, col)` in the value array.
    #[inline]
    pub fn find(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.n_rows() {
            return None;
        }
        let start = self.row_ptr[row];
        self.row(row)
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }
}

// ───────────────────────────── matrix ────────────────────────────────

/// CSR matrix over a shared pattern.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pattern: Arc<SparsityPattern>,
    values: Vec<f64>,
    compressed: bool,
}

impl SparseMatrix {
    /// Zero matrix over `pattern`, ready for assembly.
    pub fn new(pattern: Arc<SparsityPattern>) -> Self {
        let nnz = pattern.nnz();
        SparseMatrix {
            pattern,
            values: vec![0.0; nnz],
            compressed: false,
        }
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn n_rows(&self) -> usize {
        self.pattern.n_rows()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Accumulate `value` into `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> TransportResult<()> {
        let pos = self.pattern.find(row, col).ok_or_else(|| {
            TransportError::LinAlg(format!("entry ({row}, {col}) is outside the sparsity pattern"))
        })?;
        self.values[pos] += value;
        self.compressed = false;
        Ok(())
    }

    /// Accumulate a dense local block into the rows/columns given.
    pub fn add_block(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        block: &Array2<f64>,
    ) -> TransportResult<()> {
        if block.dim() != (rows.len(), cols.len()) {
            return Err(TransportError::DimensionMismatch {
                expected: rows.len() * cols.len(),
                found: block.len(),
            });
        }
        for (i, &row) in rows.iter().enumerate() {
            for (j, &col) in cols.iter().enumerate() {
                self.add(row, col, block[[i, j]])?;
            }
        }
        Ok(())
    }

    /// Finalize assembly. Entries added afterwards reopen the matrix.
    pub fn compress(&mut self) {
        self.compressed = true;
    }

    /// Value at `(row, col)`; zero outside the pattern.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .find(row, col)
            .map_or(0.0, |pos| self.values[pos])
    }

    pub fn diagonal(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_rows(), |i| self.get(i, i))
    }

    /// Dense copies of the consecutive diagonal blocks of size `block_size`.
    pub fn diagonal_blocks(&self, block_size: usize) -> TransportResult<Vec<Array2<f64>>> {
        let n = self.n_rows();
        if block_size == 0 || n % block_size != 0 {
            return Err(TransportError::LinAlg(format!(
                "block size {block_size} does not divide {n} rows"
            )));
        }
        let blocks = (0..n / block_size)
            .map(|b| {
                let base = b * block_size;
                Array2::from_shape_fn((block_size, block_size), |(i, j)| {
                    self.get(base + i, base + j)
                })
            })
            .collect();
        Ok(blocks)
    }

    /// Structural and numerical symmetry up to `tol` (relative to the
    /// largest entry).
    pub fn is_symmetric(&self, tol: f64) -> bool {
        let scale = self
            .values
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()))
            .max(1e-300);
        (0..self.n_rows()).all(|i| {
            self.pattern
                .row(i)
                .iter()
                .all(|&j| (self.get(i, j) - self.get(j, i)).abs() <= tol * scale)
        })
    }

    /// `y = A x` without the finalize check.
    fn spmv(&self, x: &Array1<f64>, y: &mut Array1<f64>) {
        for i in 0..self.n_rows() {
            let start = self.pattern.row_ptr[i];
            let mut sum = 0.0;
            for (offset, &j) in self.pattern.row(i).iter().enumerate() {
                sum += self.values[start + offset] * x[j];
            }
            y[i] = sum;
        }
    }

    /// `y = A x`. The matrix must be compressed.
    pub fn matvec(&self, x: &Array1<f64>, y: &mut Array1<f64>) -> TransportResult<()> {
        if !self.compressed {
            return Err(TransportError::LinAlg(
                "matrix used before compress()".to_string(),
            ));
        }
        if x.len() != self.pattern.n_cols() || y.len() != self.n_rows() {
            return Err(TransportError::DimensionMismatch {
                expected: self.pattern.n_cols(),
                found: x.len(),
            });
        }
        self.spmv(x, y);
        Ok(())
    }
}

impl LinearOperator for SparseMatrix {
    fn n_rows(&self) -> usize {
        self.pattern.n_rows()
    }

    fn is_ready(&self) -> bool {
        self.compressed
    }

    fn apply(&self, x: &Array1<f64>, y: &mut Array1<f64>) {
        self.spmv(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal_pattern(n: usize) -> Arc<SparsityPattern> {
        let rows = (0..n)
            .map(|i| {
                let mut r = vec![i];
                if i > 0 {
                    r.push(i - 1);
                }
                if i + 1 < n {
                    r.push(i + 1);
                }
                r
            })
            .collect();
        Arc::new(SparsityPattern::from_rows(n, rows).unwrap())
    }

    #[test]
    fn test_pattern_sorted_and_deduplicated() {
        let p = SparsityPattern::from_rows(4, vec![vec![3, 1, 1, 0], vec![2]]).unwrap();
        assert_eq!(p.row(0), &[0, 1, 3]);
        assert_eq!(p.nnz(), 4);
        assert_eq!(p.find(0, 3), Some(2));
        assert_eq!(p.find(1, 0), None);
    }

    #[test]
    fn test_pattern_rejects_wide_column() {
        assert!(SparsityPattern::from_rows(2, vec![vec![0, 2]]).is_err());
    }

    #[test]
    fn test_additive_accumulation() {
        let mut a = SparseMatrix::new(tridiagonal_pattern(3));
        a.add(1, 1, 2.0).unwrap();
        a.add(1, 1, 0.5).unwrap();
        assert!((a.get(1, 1) - 2.5).abs() < 1e-15);
        assert!(a.add(0, 2, 1.0).is_err(), "entry outside pattern must fail");
    }

    #[test]
    fn test_matvec_requires_compress() {
        let mut a = SparseMatrix::new(tridiagonal_pattern(3));
        for i in 0..3 {
            a.add(i, i, 2.0).unwrap();
        }
        let x = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let mut y = Array1::zeros(3);
        assert!(a.matvec(&x, &mut y).is_err());
        a.compress();
        a.matvec(&x, &mut y).unwrap();
        assert_eq!(y.to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_block_add_and_symmetry() {
        let mut a = SparseMatrix::new(tridiagonal_pattern(4));
        let block = Array2::from_shape_vec((2, 2), vec![2.0, -1.0, -1.0, 2.0]).unwrap();
        a.add_block(&[0, 1], &[0, 1], &block).unwrap();
        a.add_block(&[2, 3], &[2, 3], &block).unwrap();
        a.add(1, 2, -0.5).unwrap();
        assert!(!a.is_symmetric(1e-12));
        a.add(2, 1, -0.5).unwrap();
        assert!(a.is_symmetric(1e-12));
        let blocks = a.diagonal_blocks(2).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], block);
    }
}
