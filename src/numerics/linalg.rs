//! numerics::linalg: ndarray ↔ nalgebra bridge, Gaussian log-densities,
//! and the log-Cholesky covariance link.
//!
//! Purpose
//! -------
//! Keep every dense factorization in one place. Batch data and regression
//! targets live in `ndarray`; Cholesky factorizations, triangular solves,
//! and log-determinants go through `nalgebra`.
//!
//! Key behaviors
//! -------------
//! - Copy between `ndarray` and `DMatrix`/`DVector` ([`to_dmatrix`],
//!   [`to_dvector`], [`to_array2`]).
//! - Evaluate `log N(r; 0, Σ)` through a Cholesky factor
//!   ([`gaussian_log_density`]); a failed factorization is reported as
//!   [`NumericError::SingularMatrix`], never as `NaN`.
//! - Map a Cholesky factor to its unconstrained "link" vector (row-major
//!   lower triangle, diagonal log-transformed) and back to a covariance
//!   ([`factor_to_link`], [`link_to_factor`], [`link_to_covariance`]).
//!
//! Invariants & assumptions
//! ------------------------
//! - Link vectors for dimension `n` have length `n(n+1)/2` ([`tril_len`]).
//! - [`link_to_covariance`] always returns an exactly symmetric matrix;
//!   it is positive semidefinite by construction (`L·Lᵀ`).
//!
//! Conventions
//! -----------
//! - Lower-triangular entries are ordered `(0,0), (1,0), (1,1), (2,0), …`.
//! - Sample covariances use the unbiased `(n − 1)` denominator.
//!
//! Testing notes
//! -------------
//! - Unit tests compare the log-density against the closed form for a
//!   diagonal covariance, check the singular error path, and round-trip a
//!   factor through the link.
use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::numerics::errors::{NumericError, NumericResult};

/// Copy a 2-D `ndarray` view into a column-major `DMatrix`.
pub fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a 1-D `ndarray` view into a `DVector`.
pub fn to_dvector(a: ArrayView1<'_, f64>) -> DVector<f64> {
    DVector::from_iterator(a.len(), a.iter().copied())
}

/// Copy a `DMatrix` back into a row-major `Array2`.
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Number of lower-triangular entries (diagonal included) of an `n×n` matrix.
pub fn tril_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// gaussian_log_density: `log N(r; 0, Σ)` via Cholesky.
///
/// Parameters
/// ----------
/// - `residual`: `&DVector<f64>`
///   Observation minus mean.
/// - `cov`: `DMatrix<f64>`
///   Covariance `Σ`; consumed by the factorization.
///
/// Returns
/// -------
/// `-½ (n·ln 2π + ln|Σ| + rᵀ Σ⁻¹ r)` with `ln|Σ| = 2 Σᵢ ln Lᵢᵢ`.
///
/// Errors
/// ------
/// - [`NumericError::DimensionMismatch`] when `Σ` is not `n×n`.
/// - [`NumericError::SingularMatrix`] when `Σ` is not positive definite.
pub fn gaussian_log_density(residual: &DVector<f64>, cov: DMatrix<f64>) -> NumericResult<f64> {
    let n = residual.len();
    if cov.nrows() != n || cov.ncols() != n {
        return Err(NumericError::DimensionMismatch {
            context: "gaussian log-density covariance",
            expected: n,
            found: cov.nrows().max(cov.ncols()),
        });
    }
    let chol =
        cov.cholesky().ok_or(NumericError::SingularMatrix { context: "gaussian log-density" })?;
    let l = chol.l_dirty();
    let log_det = 2.0 * (0..n).map(|i| l[(i, i)].ln()).sum::<f64>();
    let z = l
        .solve_lower_triangular(residual)
        .ok_or(NumericError::SingularMatrix { context: "gaussian log-density solve" })?;
    Ok(-0.5 * (n as f64 * (2.0 * PI).ln() + log_det + z.norm_squared()))
}

/// Flatten a lower-triangular factor into its link vector.
///
/// Entries are taken row-major from the lower triangle; diagonal entries are
/// replaced by their natural logarithm.
pub fn factor_to_link(l: &DMatrix<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut out = Array1::<f64>::zeros(tril_len(n));
    let mut idx = 0;
    for i in 0..n {
        for j in 0..=i {
            out[idx] = if i == j { l[(i, j)].ln() } else { l[(i, j)] };
            idx += 1;
        }
    }
    out
}

/// Rebuild the lower-triangular factor from a link vector.
///
/// # Errors
/// - [`NumericError::DimensionMismatch`] when `link.len() != tril_len(n)`.
pub fn link_to_factor(link: ArrayView1<'_, f64>, n: usize) -> NumericResult<DMatrix<f64>> {
    if link.len() != tril_len(n) {
        return Err(NumericError::DimensionMismatch {
            context: "covariance link vector",
            expected: tril_len(n),
            found: link.len(),
        });
    }
    let mut l = DMatrix::<f64>::zeros(n, n);
    let mut idx = 0;
    for i in 0..n {
        for j in 0..=i {
            l[(i, j)] = if i == j { link[idx].exp() } else { link[idx] };
            idx += 1;
        }
    }
    Ok(l)
}

/// Covariance `L·Lᵀ` for a link vector, symmetrized to remove rounding
/// asymmetry.
///
/// # Errors
/// - [`NumericError::DimensionMismatch`] when `link.len() != tril_len(n)`.
pub fn link_to_covariance(link: ArrayView1<'_, f64>, n: usize) -> NumericResult<DMatrix<f64>> {
    let l = link_to_factor(link, n)?;
    let cov = &l * l.transpose();
    Ok((&cov + cov.transpose()) * 0.5)
}

/// Unbiased sample covariance of the rows of `samples` (`(n − 1)`
/// denominator).
///
/// Fewer than two rows give the zero matrix.
pub fn sample_covariance(samples: ArrayView2<'_, f64>) -> Array2<f64> {
    let (n, d) = samples.dim();
    if n < 2 {
        return Array2::zeros((d, d));
    }
    let mean = samples.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
    let centered = &samples - &mean;
    centered.t().dot(&centered) / (n - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // The Cholesky-based log-density agrees with the closed form for a
    // diagonal covariance.
    //
    // Given
    // -----
    // - r = (1, -2), Σ = diag(2, 0.5).
    //
    // Expect
    // ------
    // - Σᵢ log N(rᵢ; 0, σᵢ²).
    fn gaussian_log_density_matches_diagonal_closed_form() {
        // Arrange
        let r = DVector::from_vec(vec![1.0, -2.0]);
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.5]));
        let univariate =
            |x: f64, var: f64| -0.5 * ((2.0 * PI * var).ln() + x * x / var);
        let expected = univariate(1.0, 2.0) + univariate(-2.0, 0.5);

        // Act
        let got = gaussian_log_density(&r, cov).unwrap();

        // Assert
        assert_relative_eq!(got, expected, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_log_density_reports_singular_covariance() {
        let r = DVector::from_vec(vec![0.1, 0.2, 0.3]);
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01, 0.0]));

        let err = gaussian_log_density(&r, cov).unwrap_err();

        assert!(matches!(err, NumericError::SingularMatrix { .. }));
    }

    #[test]
    // Purpose
    // -------
    // Factor → link → covariance reproduces L·Lᵀ, and the Cholesky factor
    // of the result is the original factor.
    fn link_round_trip_reproduces_factor() {
        // Arrange
        let l = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, -0.5, 0.3, 0.0, 1.2, 0.4, 0.7]);

        // Act
        let link = factor_to_link(&l);
        let cov = link_to_covariance(link.view(), 3).unwrap();
        let back = cov.clone().cholesky().unwrap().l();

        // Assert
        assert_eq!(link.len(), 6);
        assert_relative_eq!(link[0], 2.0_f64.ln(), epsilon = 1e-15);
        assert_relative_eq!(link[1], -0.5, epsilon = 1e-15);
        assert_eq!(cov, cov.transpose());
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(back[(i, j)], l[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn link_with_wrong_length_is_rejected() {
        let err = link_to_covariance(array![0.0, 0.0].view(), 2).unwrap_err();
        assert!(matches!(err, NumericError::DimensionMismatch { expected: 3, found: 2, .. }));
    }

    #[test]
    fn bridge_preserves_entries() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let m = to_dmatrix(a.view());
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(to_array2(&m), a);
        assert_eq!(to_dvector(array![7.0, 8.0].view())[1], 8.0);
    }

    #[test]
    fn sample_covariance_uses_unbiased_denominator() {
        let x = array![[1.0, 2.0], [3.0, 2.0], [5.0, 8.0]];

        let cov = sample_covariance(x.view());

        assert_relative_eq!(cov[[0, 0]], 4.0, epsilon = 1e-12);
        assert_relative_eq!(cov[[1, 1]], 12.0, epsilon = 1e-12);
        assert_relative_eq!(cov[[0, 1]], 6.0, epsilon = 1e-12);
        assert_eq!(sample_covariance(x.slice(ndarray::s![..1, ..])), Array2::<f64>::zeros((2, 2)));
    }
}
