//! Dense linear solving for the small systems used by the homography solvers.

use nalgebra::{DMatrix, DVector, SMatrix, SVector};

/// Pivot magnitudes below this are treated as zero and the system as singular.
pub const SINGULAR_PIVOT_EPS: f64 = 1e-12;

/// Solve `A x = b` for a square `A` with Gauss–Jordan elimination and partial pivoting.
///
/// Every pivot column is eliminated from all other rows (not only the rows below),
/// so once all columns are processed the last column of the augmented `[A | b]`
/// matrix holds the solution directly.
///
/// Returns `None` when `A` is not square, `b` has the wrong length, or no
/// candidate pivot in some column reaches [`SINGULAR_PIVOT_EPS`] in magnitude.
pub fn solve_linear_system(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    let mut aug = DMatrix::<f64>::from_fn(n, n + 1, |r, c| if c < n { a[(r, c)] } else { b[r] });

    for col in 0..n {
        let mut pivot_row = col;
        let mut max_val = aug[(col, col)].abs();
        for row in (col + 1)..n {
            let v = aug[(row, col)].abs();
            if v > max_val {
                max_val = v;
                pivot_row = row;
            }
        }
        if max_val.is_nan() || max_val < SINGULAR_PIVOT_EPS {
            return None;
        }
        if pivot_row != col {
            aug.swap_rows(col, pivot_row);
        }

        let pivot = aug[(col, col)];
        for j in col..=n {
            aug[(col, j)] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in col..=n {
                aug[(row, j)] -= factor * aug[(col, j)];
            }
        }
    }

    Some(aug.column(n).into_owned())
}

/// Fixed-size front end for [`solve_linear_system`].
pub fn solve_fixed<const N: usize>(
    a: &SMatrix<f64, N, N>,
    b: &SVector<f64, N>,
) -> Option<SVector<f64, N>> {
    let a_dyn = DMatrix::from_column_slice(N, N, a.as_slice());
    let b_dyn = DVector::from_column_slice(b.as_slice());
    let x = solve_linear_system(&a_dyn, &b_dyn)?;
    Some(SVector::<f64, N>::from_column_slice(x.as_slice()))
}
