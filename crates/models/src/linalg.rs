//! Dense least squares on the normal equations

use ndarray::{Array1, Array2};
use sdb_core::{Error, Result};

/// Relative size below which a pivot counts as linearly dependent
const RANK_TOLERANCE: f64 = 1e-10;

/// Solve `min ||X b - y||²`.
///
/// Columns that are linearly dependent on earlier-selected ones get a zero
/// coefficient, so collinear inputs still produce a fit.
pub(crate) fn least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
    let p = x.ncols();
    let gram = x.t().dot(x);
    let rhs = x.t().dot(y);

    let selected = independent_columns(&gram);
    let k = selected.len();
    let mut beta = Array1::zeros(p);
    if k == 0 {
        return Ok(beta);
    }
    if k < p {
        tracing::debug!(rank = k, columns = p, "rank-deficient design, dependent columns zeroed");
    }

    let mut mat = vec![0.0_f64; k * k];
    let mut b = vec![0.0_f64; k];
    for (r, &i) in selected.iter().enumerate() {
        b[r] = rhs[i];
        for (c, &j) in selected.iter().enumerate() {
            mat[r * k + c] = gram[[i, j]];
        }
    }

    let solution = solve_dense(&mut mat, &mut b, k)?;
    for (r, &i) in selected.iter().enumerate() {
        beta[i] = solution[r];
    }
    Ok(beta)
}

/// Indices of a maximal independent set of columns, found by diagonal
/// pivoting on the Gram matrix (a pivoted Cholesky sweep).
fn independent_columns(gram: &Array2<f64>) -> Vec<usize> {
    let p = gram.nrows();
    let scale = (0..p).map(|i| gram[[i, i]]).fold(0.0_f64, f64::max);
    if !(scale > 0.0) {
        return Vec::new();
    }
    let tol = scale * RANK_TOLERANCE;

    let mut s = gram.clone();
    let mut remaining: Vec<usize> = (0..p).collect();
    let mut selected = Vec::with_capacity(p);

    while !remaining.is_empty() {
        let (pos, &k) = remaining
            .iter()
            .enumerate()
            .max_by(|a, b| s[[*a.1, *a.1]].total_cmp(&s[[*b.1, *b.1]]))
            .unwrap_or((0, &remaining[0]));
        let pivot = s[[k, k]];
        if !(pivot > tol) {
            break;
        }
        selected.push(k);
        remaining.swap_remove(pos);

        for &i in &remaining {
            let factor = s[[i, k]] / pivot;
            for &j in &remaining {
                s[[i, j]] -= factor * s[[k, j]];
            }
        }
    }

    selected.sort_unstable();
    selected
}

/// Gaussian elimination with partial pivoting on a row-major `n × n` system
pub(crate) fn solve_dense(mat: &mut [f64], rhs: &mut [f64], n: usize) -> Result<Vec<f64>> {
    for col in 0..n {
        let mut max_val = mat[col * n + col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = mat[row * n + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if !(max_val > 1e-300) {
            return Err(Error::Fit {
                stage: "fit",
                reason: "singular normal equations".into(),
            });
        }

        if max_row != col {
            for j in 0..n {
                mat.swap(col * n + j, max_row * n + j);
            }
            rhs.swap(col, max_row);
        }

        let pivot = mat[col * n + col];
        for row in (col + 1)..n {
            let factor = mat[row * n + col] / pivot;
            mat[row * n + col] = 0.0;
            for j in (col + 1)..n {
                mat[row * n + j] -= factor * mat[col * n + j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0_f64; n];
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for j in (row + 1)..n {
            sum -= mat[row * n + j] * x[j];
        }
        x[row] = sum / mat[row * n + row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_exact_fit() {
        // y = 2 + 3a - b
        let x = array![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 1.0], [1.0, 2.0, 3.0]];
        let y = array![2.0, 5.0, 1.0, 5.0];
        let beta = least_squares(&x, &y).unwrap();
        assert_relative_eq!(beta[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(beta[1], 3.0, epsilon = 1e-9);
        assert_relative_eq!(beta[2], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_duplicate_column_gets_zero() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![2.0, 4.0, 6.0];
        let beta = least_squares(&x, &y).unwrap();
        assert_relative_eq!(beta.sum(), 2.0, epsilon = 1e-9);
        assert!(beta.iter().any(|&b| b == 0.0));
        assert_relative_eq!(x.dot(&beta)[2], 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_all_zero_design() {
        let x = Array2::zeros((3, 2));
        let beta = least_squares(&x, &array![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(beta, array![0.0, 0.0]);
    }

    #[test]
    fn test_singular_dense_system() {
        let mut mat = vec![1.0, 2.0, 2.0, 4.0];
        let mut rhs = vec![1.0, 2.0];
        assert!(solve_dense(&mut mat, &mut rhs, 2).is_err());
    }
}
