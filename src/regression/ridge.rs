//! regression::ridge: polynomial ridge regressor with multi-output targets.
//!
//! Purpose
//! -------
//! Map a baseline signal `y ∈ ℝᵈ` to a vector of targets (mean change or
//! covariance link entries) with a fixed-degree polynomial expansion and an
//! L2-penalized least-squares fit without a separate intercept.
//!
//! Key behaviors
//! -------------
//! - [`PolyRidge::fit`] solves `(XᵀX + αI) W = XᵀY` with a Cholesky
//!   factorization, where `X` holds the polynomial features of the inputs.
//!   The degree-0 column is penalized like every other column.
//! - [`PolyRidge::predict`] / [`PolyRidge::predict_row`] evaluate
//!   `features(y) · W`.
//! - Serialization stores `(degree, alpha, n_inputs, coefficients)`; the
//!   feature expansion is rebuilt and the coefficient shape re-validated on
//!   load.
//!
//! Invariants & assumptions
//! ------------------------
//! - `coefficients` has shape `n_features × n_targets` with
//!   `n_features = C(n_inputs + degree, degree)`.
//! - `alpha ≥ 0`; with `alpha = 0` the fit fails for rank-deficient designs
//!   instead of returning an arbitrary solution.
//!
//! Testing notes
//! -------------
//! - Unit tests recover an exactly polynomial target, check the penalty on
//!   a constant target, and cover the shape / singular error paths.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    numerics::{
        errors::{NumericError, NumericResult},
        linalg::{to_array2, to_dmatrix},
    },
    regression::features::PolynomialFeatures,
};

/// Fitted polynomial ridge regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RidgeRecord", into = "RidgeRecord")]
pub struct PolyRidge {
    alpha: f64,
    features: PolynomialFeatures,
    coefficients: Array2<f64>,
}

/// On-disk layout of a [`PolyRidge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RidgeRecord {
    degree: usize,
    alpha: f64,
    n_inputs: usize,
    coefficients: Array2<f64>,
}

impl PolyRidge {
    /// fit: penalized least squares on polynomial features.
    ///
    /// Parameters
    /// ----------
    /// - `x`: `ArrayView2<f64>`, `n_samples × n_inputs` regressors.
    /// - `y`: `ArrayView2<f64>`, `n_samples × n_targets` targets.
    /// - `degree`: polynomial degree of the expansion.
    /// - `alpha`: ridge penalty, finite and `≥ 0`.
    ///
    /// Errors
    /// ------
    /// - [`NumericError::DimensionMismatch`] when the row counts differ or
    ///   there are no samples.
    /// - [`NumericError::InvalidTolerance`] for an invalid `alpha`.
    /// - [`NumericError::SingularMatrix`] when `XᵀX + αI` is not positive
    ///   definite.
    pub fn fit(
        x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, degree: usize, alpha: f64,
    ) -> NumericResult<Self> {
        if x.nrows() != y.nrows() {
            return Err(NumericError::DimensionMismatch {
                context: "ridge targets",
                expected: x.nrows(),
                found: y.nrows(),
            });
        }
        if x.nrows() == 0 {
            return Err(NumericError::DimensionMismatch {
                context: "ridge samples",
                expected: 1,
                found: 0,
            });
        }
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(NumericError::InvalidTolerance {
                name: "alpha",
                value: alpha,
                reason: "ridge penalty must be finite and non-negative",
            });
        }

        let features = PolynomialFeatures::new(x.ncols(), degree);
        let design = features.transform(x);
        let mut gram = design.t().dot(&design);
        gram.diag_mut().mapv_inplace(|v| v + alpha);
        let rhs = design.t().dot(&y);

        let chol = to_dmatrix(gram.view())
            .cholesky()
            .ok_or(NumericError::SingularMatrix { context: "ridge normal equations" })?;
        let coefficients = to_array2(&chol.solve(&to_dmatrix(rhs.view())));
        Ok(Self { alpha, features, coefficients })
    }

    pub fn degree(&self) -> usize {
        self.features.degree()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn n_inputs(&self) -> usize {
        self.features.n_inputs()
    }

    pub fn n_targets(&self) -> usize {
        self.coefficients.ncols()
    }

    /// `n_features × n_targets` coefficient matrix.
    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    /// Predict the targets for one input row.
    ///
    /// # Errors
    /// - [`NumericError::DimensionMismatch`] when `x.len() != n_inputs`.
    pub fn predict_row(&self, x: ArrayView1<'_, f64>) -> NumericResult<Array1<f64>> {
        self.check_width(x.len())?;
        Ok(self.features.transform_row(x).dot(&self.coefficients))
    }

    /// Predict the targets for every row of `x`.
    ///
    /// # Errors
    /// - [`NumericError::DimensionMismatch`] when `x.ncols() != n_inputs`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> NumericResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        Ok(self.features.transform(x).dot(&self.coefficients))
    }

    fn check_width(&self, found: usize) -> NumericResult<()> {
        if found != self.n_inputs() {
            return Err(NumericError::DimensionMismatch {
                context: "ridge inputs",
                expected: self.n_inputs(),
                found,
            });
        }
        Ok(())
    }
}

impl TryFrom<RidgeRecord> for PolyRidge {
    type Error = NumericError;

    fn try_from(record: RidgeRecord) -> Result<Self, Self::Error> {
        let features = PolynomialFeatures::new(record.n_inputs, record.degree);
        if record.coefficients.nrows() != features.n_outputs() {
            return Err(NumericError::DimensionMismatch {
                context: "stored ridge coefficients",
                expected: features.n_outputs(),
                found: record.coefficients.nrows(),
            });
        }
        Ok(Self { alpha: record.alpha, features, coefficients: record.coefficients })
    }
}

impl From<PolyRidge> for RidgeRecord {
    fn from(model: PolyRidge) -> Self {
        Self {
            degree: model.features.degree(),
            alpha: model.alpha,
            n_inputs: model.features.n_inputs(),
            coefficients: model.coefficients,
        }
    }
}
