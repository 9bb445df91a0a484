//! Small dense linear-algebra helpers for the EM engine.
//!
//! Matrices here are covariance blocks of a handful of attributes, so plain
//! `O(n^3)` routines over `ndarray` are enough.

use ndarray::{Array1, Array2};

/// Pivots smaller than this (relative to the largest entry) count as zero.
const SINGULAR_EPSILON: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 100;

fn scale(m: &Array2<f64>) -> f64 {
    m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0)
}

/// Determinant by LU decomposition with partial pivoting.
pub fn determinant(m: &Array2<f64>) -> f64 {
    let n = m.nrows();
    if n != m.ncols() {
        return 0.0;
    }
    if n == 0 {
        return 1.0;
    }
    let mut lu = m.clone();
    let mut det = 1.0;
    for col in 0..n {
        let mut pivot_row = col;
        for row in col + 1..n {
            if lu[[row, col]].abs() > lu[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if lu[[pivot_row, col]] == 0.0 {
            return 0.0;
        }
        if pivot_row != col {
            for j in 0..n {
                lu.swap([col, j], [pivot_row, j]);
            }
            det = -det;
        }
        let pivot = lu[[col, col]];
        det *= pivot;
        for row in col + 1..n {
            let factor = lu[[row, col]] / pivot;
            for j in col..n {
                lu[[row, j]] -= factor * lu[[col, j]];
            }
        }
    }
    det
}

/// Inverse by Gauss-Jordan elimination, `None` if the matrix is singular.
pub fn inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }
    let tolerance = SINGULAR_EPSILON * scale(m);

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }
        if aug[[col, col]].abs() < tolerance {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                if factor != 0.0 {
                    for j in 0..2 * n {
                        aug[[row, j]] -= factor * aug[[col, j]];
                    }
                }
            }
        }
    }

    let inv = aug.slice(ndarray::s![.., n..]).to_owned();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns the eigenvalues and the eigenvectors as columns.
pub fn symmetric_eigen(m: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = m.nrows();
    let mut a = m.clone();
    let mut v = Array2::eye(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]] * a[[i, j]])
            .sum();
        if off.sqrt() < SINGULAR_EPSILON * scale(&a) {
            break;
        }
        for p in 0..n {
            for q in p + 1..n {
                if a[[p, q]].abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

/// Moore-Penrose pseudo-inverse of a symmetric matrix, dropping
/// eigenvalues that are numerically zero.
pub fn pseudo_inverse(m: &Array2<f64>) -> Array2<f64> {
    let n = m.nrows();
    let (values, vectors) = symmetric_eigen(m);
    let largest = values.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
    let cutoff = SINGULAR_EPSILON * n.max(1) as f64 * largest;
    let mut out = Array2::zeros((n, n));
    for (k, &lambda) in values.iter().enumerate() {
        if lambda.abs() <= cutoff {
            continue;
        }
        let column = vectors.column(k);
        for i in 0..n {
            for j in 0..n {
                out[[i, j]] += column[i] * column[j] / lambda;
            }
        }
    }
    out
}

/// Inverse when it exists, otherwise the pseudo-inverse.
pub fn inverse_or_pseudo(m: &Array2<f64>) -> Array2<f64> {
    inverse(m).unwrap_or_else(|| pseudo_inverse(m))
}

/// Lower-triangular Cholesky factor `L` with `m = L Lᵀ`, `None` unless `m`
/// is positive definite.
pub fn cholesky(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = m[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (m[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // ========================================================================
    // determinant / inverse
    // ========================================================================

    #[test]
    fn test_determinant() {
        assert_relative_eq!(determinant(&array![[4.0, 3.0], [6.0, 3.0]]), -6.0, epsilon = 1e-12);
        assert_relative_eq!(
            determinant(&array![[2.0, 0.0, 1.0], [1.0, 3.0, 2.0], [1.0, 1.0, 2.0]]),
            6.0,
            epsilon = 1e-12
        );
        assert_eq!(determinant(&array![[1.0, 2.0], [2.0, 4.0]]), 0.0);
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = inverse(&m).unwrap();
        let product = m.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_inverse_of_singular_is_none() {
        assert!(inverse(&array![[1.0, 2.0], [2.0, 4.0]]).is_none());
    }

    // ========================================================================
    // pseudo-inverse
    // ========================================================================

    #[test]
    fn test_pseudo_inverse_matches_inverse_when_regular() {
        let m = array![[2.0, 1.0], [1.0, 3.0]];
        let inv = inverse(&m).unwrap();
        let pinv = pseudo_inverse(&m);
        for (a, b) in inv.iter().zip(pinv.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pseudo_inverse_of_rank_one() {
        // [[1,1],[1,1]] has pseudo-inverse [[0.25,0.25],[0.25,0.25]]
        let pinv = pseudo_inverse(&array![[1.0, 1.0], [1.0, 1.0]]);
        for v in pinv.iter() {
            assert_relative_eq!(*v, 0.25, epsilon = 1e-9);
        }
        assert_eq!(inverse_or_pseudo(&array![[0.0]]), array![[0.0]]);
    }

    // ========================================================================
    // cholesky
    // ========================================================================

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let m = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&m).unwrap();
        assert_eq!(l[[0, 1]], 0.0);
        let back = l.dot(&l.t());
        for (a, b) in m.iter().zip(back.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
        assert!(cholesky(&array![[0.0]]).is_none());
    }
}
