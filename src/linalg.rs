//! Dense linear-algebra helpers on top of `faer`.
//!
//! Pseudo-inverses are computed from a symmetric eigendecomposition: for
//! $A = U \Lambda U^T$, $A^+ = U \Lambda^+ U^T$ where $\Lambda^+$ inverts the
//! eigenvalues above a relative cutoff and zeroes the rest. For a general
//! $X$, $X^+ = (X^T X)^+ X^T$, with a looser cutoff since the Gram matrix
//! squares the condition number.

use faer::{Mat, MatRef, Side};

/// Relative eigenvalue cutoff for a Gram matrix `XᵀX`, whose eigenvalues are
/// squared singular values.
const GRAM_RTOL: f64 = 1e-12;

/// Absolute cutoff below which eigenvalues are treated as zero.
fn cutoff(eigenvalues: &[f64], rtol: f64) -> f64 {
    let largest = eigenvalues.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    largest * rtol
}

/// Symmetrize `(A + A^T) / 2`.
pub fn symmetrize(a: MatRef<'_, f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| 0.5 * (a[(i, j)] + a[(j, i)]))
}

/// Eigenvalues of a symmetric matrix, ascending.
pub fn symmetric_eigenvalues(a: MatRef<'_, f64>) -> Vec<f64> {
    let sym = symmetrize(a);
    let mut values = sym.selfadjoint_eigenvalues(Side::Lower);
    values.sort_by(|x, y| x.total_cmp(y));
    values
}

/// Smallest eigenvalue of a symmetric matrix (`+inf` for an empty matrix).
pub fn min_eigenvalue(a: MatRef<'_, f64>) -> f64 {
    symmetric_eigenvalues(a)
        .first()
        .copied()
        .unwrap_or(f64::INFINITY)
}

/// Moore–Penrose pseudo-inverse of a symmetric matrix.
pub fn pinv_symmetric(a: MatRef<'_, f64>) -> Mat<f64> {
    pinv_eigen(a, a.nrows().max(1) as f64 * f64::EPSILON)
}

/// Moore–Penrose pseudo-inverse of a general matrix.
pub fn pinv(x: MatRef<'_, f64>) -> Mat<f64> {
    let gram = x.transpose() * x;
    let gram_inv = pinv_eigen(gram.as_ref(), gram.nrows().max(1) as f64 * GRAM_RTOL);
    gram_inv.as_ref() * x.transpose()
}

fn pinv_eigen(a: MatRef<'_, f64>, rtol: f64) -> Mat<f64> {
    let dim = a.nrows();
    let sym = symmetrize(a);
    let eigen = sym.selfadjoint_eigendecomposition(Side::Lower);
    let u = eigen.u();
    let s = eigen.s().column_vector();

    let values: Vec<f64> = (0..dim).map(|k| s.read(k)).collect();
    let tol = cutoff(&values, rtol);
    let inverted: Vec<f64> = values
        .iter()
        .map(|&v| if v.abs() > tol { 1.0 / v } else { 0.0 })
        .collect();

    let scaled = Mat::from_fn(dim, dim, |i, k| u[(i, k)] * inverted[k]);
    scaled.as_ref() * u.transpose()
}

/// Kronecker product `A ⊗ B`.
pub fn kron(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Mat<f64> {
    let (br, bc) = (b.nrows(), b.ncols());
    Mat::from_fn(a.nrows() * br, a.ncols() * bc, |i, j| {
        a[(i / br, j / bc)] * b[(i % br, j % bc)]
    })
}

/// Rows of `a` in the given order.
pub fn select_rows(a: MatRef<'_, f64>, rows: &[usize]) -> Mat<f64> {
    Mat::from_fn(rows.len(), a.ncols(), |i, j| a[(rows[i], j)])
}

/// Columns of `a` in the given order.
pub fn select_cols(a: MatRef<'_, f64>, cols: &[usize]) -> Mat<f64> {
    Mat::from_fn(a.nrows(), cols.len(), |i, j| a[(i, cols[j])])
}

/// Diagonal matrix from a vector.
pub fn diag(values: &[f64]) -> Mat<f64> {
    let n = values.len();
    Mat::from_fn(n, n, |i, j| if i == j { values[i] } else { 0.0 })
}

/// Largest absolute elementwise difference.
pub fn max_abs_diff(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> f64 {
    let mut worst = 0.0f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            worst = worst.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    worst
}

/// Copy an `ndarray` view into a faer matrix.
#[cfg(feature = "ndarray")]
pub fn mat_from_ndarray(array: ndarray::ArrayView2<'_, f64>) -> Mat<f64> {
    let (rows, cols) = array.dim();
    Mat::from_fn(rows, cols, |i, j| array[[i, j]])
}

/// Copy a faer matrix into an owned `ndarray`.
#[cfg(feature = "ndarray")]
pub fn mat_to_ndarray(mat: MatRef<'_, f64>) -> ndarray::Array2<f64> {
    ndarray::Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(rows: &[&[f64]]) -> Mat<f64> {
        Mat::from_fn(rows.len(), rows[0].len(), |i, j| rows[i][j])
    }

    #[test]
    fn pinv_of_invertible_is_inverse() {
        let a = mat(&[&[4.0, 1.0], &[1.0, 3.0]]);
        let inv = pinv_symmetric(a.as_ref());
        let product = a.as_ref() * inv.as_ref();
        let identity = Mat::<f64>::identity(2, 2);
        assert!(max_abs_diff(product.as_ref(), identity.as_ref()) < 1e-12);
    }

    #[test]
    fn pinv_of_singular_satisfies_penrose_identity() {
        // Rank one: [1 1; 1 1].
        let a = mat(&[&[1.0, 1.0], &[1.0, 1.0]]);
        let inv = pinv_symmetric(a.as_ref());
        let aga = a.as_ref() * inv.as_ref() * a.as_ref();
        assert!(max_abs_diff(aga.as_ref(), a.as_ref()) < 1e-12);
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn pinv_of_tall_matrix_is_left_inverse() {
        let x = mat(&[&[1.0, 0.0], &[0.0, 2.0], &[1.0, 1.0]]);
        let inv = pinv(x.as_ref());
        assert_eq!((inv.nrows(), inv.ncols()), (2, 3));
        let left = inv.as_ref() * x.as_ref();
        let identity = Mat::<f64>::identity(2, 2);
        assert!(max_abs_diff(left.as_ref(), identity.as_ref()) < 1e-10);
    }

    #[test]
    fn eigenvalues_are_sorted() {
        let a = diag(&[3.0, -1.0, 2.0]);
        let values = symmetric_eigenvalues(a.as_ref());
        assert!((values[0] + 1.0).abs() < 1e-12);
        assert!((values[2] - 3.0).abs() < 1e-12);
        assert!((min_eigenvalue(a.as_ref()) + 1.0).abs() < 1e-12);
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn ndarray_bridge_preserves_layout() {
        let a = mat(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let array = mat_to_ndarray(a.as_ref());
        assert_eq!(array.dim(), (2, 3));
        assert_eq!(array[[1, 0]], 4.0);
        let back = mat_from_ndarray(array.view());
        assert_eq!(max_abs_diff(back.as_ref(), a.as_ref()), 0.0);
    }

    #[test]
    fn kron_layout() {
        let a = mat(&[&[1.0, 2.0]]);
        let b = mat(&[&[1.0], &[10.0]]);
        let k = kron(a.as_ref(), b.as_ref());
        assert_eq!((k.nrows(), k.ncols()), (2, 2));
        assert_eq!(k[(0, 0)], 1.0);
        assert_eq!(k[(1, 0)], 10.0);
        assert_eq!(k[(0, 1)], 2.0);
        assert_eq!(k[(1, 1)], 20.0);
    }

    #[test]
    fn select_rows_and_cols() {
        let a = mat(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let r = select_rows(a.as_ref(), &[2, 0]);
        assert_eq!(r[(0, 1)], 6.0);
        let c = select_cols(a.as_ref(), &[1]);
        assert_eq!(c[(2, 0)], 6.0);
    }
}
