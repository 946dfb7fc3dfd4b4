//! Small dense linear algebra.
//!
//! Inversion of the per-cell diagonal blocks used by the block-Jacobi
//! preconditioner.

use ndarray::Array2;

/// Invert a small square matrix by Gauss-Jordan elimination with partial
/// pivoting. Returns `None` if the matrix is not square or is singular to
/// working precision.
pub fn invert_small(a: &Array2<f64>) -> Option<Array2<f64>> {
    let (n, m) = a.dim();
    if n != m {
        return None;
    }
    let scale = a.iter().fold(0.0_f64, |s, v| s.max(v.abs()));
    if scale == 0.0 {
        return None;
    }

    let mut work = a.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        // Partial pivot
        let pivot_row = (col..n).max_by(|&i, &j| {
            work[[i, col]]
                .abs()
                .partial_cmp(&work[[j, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        let pivot = work[[pivot_row, col]];
        if pivot.abs() <= 1e-14 * scale {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                work.swap([col, k], [pivot_row, k]);
                inv.swap([col, k], [pivot_row, k]);
            }
        }

        let inv_pivot = 1.0 / work[[col, col]];
        for k in 0..n {
            work[[col, k]] *= inv_pivot;
            inv[[col, k]] *= inv_pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                work[[row, k]] -= factor * work[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Some(inv)
}
