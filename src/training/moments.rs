//! training::moments: local mean and covariance of simulated derivatives.
//!
//! For each sample, the derivatives of its `k` nearest baseline neighbours
//! are pooled into a mean vector and an unbiased covariance. The covariance
//! is shrunk by `λ·I`, Cholesky-factorized, and stored as a link vector
//! (row-major lower triangle, log diagonal) so it can be regressed without
//! constraints.
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::{
    model::errors::{ChangeError, ChangeResult},
    numerics::{
        errors::NumericError,
        linalg::{factor_to_link, sample_covariance, tril_len},
    },
};

/// Per-sample regression targets for one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMoments {
    /// `n_samples × n_dim` neighbour-mean derivatives.
    pub means: Array2<f64>,
    /// `n_samples × n_dim(n_dim+1)/2` covariance link vectors.
    pub links: Array2<f64>,
}

/// local_moments: pool derivatives over precomputed neighbourhoods.
///
/// Parameters
/// ----------
/// - `direction`: name used in error messages.
/// - `neighbourhoods`: neighbour indices per sample (see
///   [`KdTree::neighbourhoods`](crate::training::kdtree::KdTree::neighbourhoods)).
/// - `derivatives`: `n_samples × n_dim` finite-difference derivatives.
/// - `shrinkage`: `λ` added to each covariance diagonal.
///
/// Errors
/// ------
/// - [`ChangeError::ShapeMismatch`] when the neighbourhood count differs
///   from the number of derivative rows.
/// - [`ChangeError::MomentEstimation`] naming a sample whose shrunk
///   covariance is not positive definite.
pub fn local_moments(
    direction: &str, neighbourhoods: &[Vec<usize>], derivatives: ArrayView2<'_, f64>,
    shrinkage: f64,
) -> ChangeResult<LocalMoments> {
    let n_samples = derivatives.nrows();
    let n_dim = derivatives.ncols();
    if neighbourhoods.len() != n_samples {
        return Err(ChangeError::ShapeMismatch {
            context: "neighbourhood count",
            expected: n_samples,
            found: neighbourhoods.len(),
        });
    }

    let rows = neighbourhoods
        .par_iter()
        .enumerate()
        .map(|(sample, hood)| {
            pooled_moments(hood, derivatives, shrinkage).map_err(|source| {
                ChangeError::MomentEstimation { direction: direction.to_string(), sample, source }
            })
        })
        .collect::<ChangeResult<Vec<_>>>()?;

    let mut means = Array2::<f64>::zeros((n_samples, n_dim));
    let mut links = Array2::<f64>::zeros((n_samples, tril_len(n_dim)));
    for (i, (mean, link)) in rows.into_iter().enumerate() {
        means.row_mut(i).assign(&mean);
        links.row_mut(i).assign(&link);
    }
    Ok(LocalMoments { means, links })
}

// ---- Helper methods ----

fn pooled_moments(
    hood: &[usize], derivatives: ArrayView2<'_, f64>, shrinkage: f64,
) -> Result<(Array1<f64>, Array1<f64>), NumericError> {
    let pool = derivatives.select(Axis(0), hood);
    let n_dim = derivatives.ncols();
    let mean = pool.mean_axis(Axis(0)).ok_or(NumericError::DimensionMismatch {
        context: "empty neighbourhood",
        expected: 1,
        found: 0,
    })?;
    let mut cov = sample_covariance(pool.view());
    cov.diag_mut().mapv_inplace(|v| v + shrinkage);
    let chol = DMatrix::from_fn(n_dim, n_dim, |i, j| cov[[i, j]])
        .cholesky()
        .ok_or(NumericError::SingularMatrix { context: "local derivative covariance" })?;
    Ok((mean, factor_to_link(&chol.l())))
}
