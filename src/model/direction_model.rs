//! model::direction_model: one fitted change direction and its
//! magnitude posterior.
//!
//! Purpose
//! -------
//! Bind a unit [`DirectionVector`] and a [`DomainConstraint`] to the pair of
//! regressors fitted for that direction, and turn a single observation
//! `(y, Δy, Σₙ)` into a log-posterior density over the scalar change
//! magnitude `dv`.
//!
//! Key behaviors
//! -------------
//! - [`ChangeDirectionModel::estimate_change`] evaluates the regressors at
//!   `y` and maps the covariance link back to `Σ_p(y)`.
//! - [`ChangeDirectionModel::log_posterior`] returns a [`LogPosterior`]
//!   evaluating `log p(dv) + log N(Δy; μ·dv, Σ_p·dv² + Σₙ)`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Both regressors take `n_dim` inputs; the mean regressor has `n_dim`
//!   outputs and the covariance regressor `n_dim(n_dim+1)/2`.
//! - The prior is exponential with scale `3·√(μᵀΣₙμ) / ‖μ‖²` on the
//!   sign-adjusted magnitude; a two-sided direction halves it. A prior
//!   density of exactly zero is clamped to the log floor
//!   [`PRIOR_LOG_FLOOR`] instead of `-∞`.
//! - Models are immutable after construction; regressors are shared via
//!   `Arc` between the constraint variants of one direction.
//!
//! Downstream usage
//! ----------------
//! - `ChangeModel` calls [`ChangeDirectionModel::log_posterior`] once per
//!   sample and class, then hands the density to the range finder and the
//!   quadrature.
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Exp};
use tracing::warn;

use crate::{
    direction::vector::{DirectionVector, DomainConstraint},
    model::{
        diagnostics::Diagnostic,
        errors::{ChangeError, ChangeResult},
    },
    numerics::{
        errors::{NumericError, NumericResult},
        linalg::{gaussian_log_density, link_to_covariance, to_array2, to_dvector, tril_len},
    },
    regression::ridge::PolyRidge,
};

/// Log-prior value used when the prior density is exactly zero.
pub const PRIOR_LOG_FLOOR: f64 = -1e6;

/// ChangeDirectionModel: fitted regressors plus direction metadata.
///
/// Fields
/// ------
/// - `name`: display name, `"<canonical direction>, <constraint>"` when
///   produced by the trainer.
/// - `vector`: unit-norm direction in parameter space.
/// - `constraint`: admissible sign of the change magnitude.
/// - `prior_weight`: relative prior mass against the other classes.
/// - `mean_regressor`: `y ↦ μ(y)`.
/// - `cov_regressor`: `y ↦ link(Σ_p(y))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDirectionModel {
    name: String,
    vector: DirectionVector,
    constraint: DomainConstraint,
    prior_weight: f64,
    mean_regressor: Arc<PolyRidge>,
    cov_regressor: Arc<PolyRidge>,
}

impl ChangeDirectionModel {
    /// Build a validated change-direction model.
    ///
    /// A direction whose norm does not round to 1 is accepted with a
    /// warning; [`ChangeModel`](crate::model::ChangeModel) inference reports
    /// it again as [`Diagnostic::NonUnitDirection`].
    ///
    /// # Errors
    /// - [`ChangeError::InvalidPriorWeight`] for a negative or non-finite
    ///   prior weight.
    /// - [`ChangeError::ShapeMismatch`] when the regressor shapes disagree.
    pub fn new(
        name: impl Into<String>, vector: DirectionVector, constraint: DomainConstraint,
        prior_weight: f64, mean_regressor: Arc<PolyRidge>, cov_regressor: Arc<PolyRidge>,
    ) -> ChangeResult<Self> {
        let model =
            Self { name: name.into(), vector, constraint, prior_weight, mean_regressor, cov_regressor };
        model.validate()?;
        if let Some(Diagnostic::NonUnitDirection { direction, norm }) = model.unit_norm_diagnostic() {
            warn!(%direction, norm, "change direction does not have unit length");
        }
        Ok(model)
    }

    /// [`Diagnostic::NonUnitDirection`] when the direction is not unit length.
    pub fn unit_norm_diagnostic(&self) -> Option<Diagnostic> {
        (!self.vector.is_unit()).then(|| Diagnostic::NonUnitDirection {
            direction: self.name.clone(),
            norm: self.vector.norm(),
        })
    }

    pub(crate) fn validate(&self) -> ChangeResult<()> {
        if !(self.prior_weight.is_finite() && self.prior_weight >= 0.0) {
            return Err(ChangeError::InvalidPriorWeight { index: 0, value: self.prior_weight });
        }
        let n_dim = self.mean_regressor.n_inputs();
        let checks = [
            ("mean regressor outputs", n_dim, self.mean_regressor.n_targets()),
            ("covariance regressor inputs", n_dim, self.cov_regressor.n_inputs()),
            ("covariance regressor outputs", tril_len(n_dim), self.cov_regressor.n_targets()),
        ];
        for (context, expected, found) in checks {
            if expected != found {
                return Err(ChangeError::ShapeMismatch { context, expected, found });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vector(&self) -> &DirectionVector {
        &self.vector
    }

    pub fn constraint(&self) -> DomainConstraint {
        self.constraint
    }

    pub fn prior_weight(&self) -> f64 {
        self.prior_weight
    }

    /// Dimensionality of the summary signal.
    pub fn n_dim(&self) -> usize {
        self.mean_regressor.n_inputs()
    }

    pub fn mean_regressor(&self) -> &Arc<PolyRidge> {
        &self.mean_regressor
    }

    pub fn cov_regressor(&self) -> &Arc<PolyRidge> {
        &self.cov_regressor
    }

    /// estimate_change: predicted mean `μ(y)` and covariance `Σ_p(y)` of
    /// the change per unit magnitude.
    ///
    /// # Errors
    /// - [`NumericError::DimensionMismatch`] when `y.len() != n_dim`.
    pub fn estimate_change(&self, y: ArrayView1<'_, f64>) -> NumericResult<(Array1<f64>, Array2<f64>)> {
        let (mu, sigma_p) = self.moments(y)?;
        Ok((mu.iter().copied().collect(), to_array2(&sigma_p)))
    }

    /// log_posterior: magnitude log-posterior for one observation.
    ///
    /// Parameters
    /// ----------
    /// - `y`: baseline signal (`n_dim`).
    /// - `dy`: observed change (`n_dim`).
    /// - `sigma_n`: noise covariance (`n_dim × n_dim`).
    ///
    /// Errors
    /// ------
    /// - [`NumericError::DimensionMismatch`] for wrong input lengths.
    /// - [`NumericError::InvalidPriorScale`] when `μ = 0` or `μᵀΣₙμ ≤ 0`,
    ///   so that no exponential prior can be formed.
    pub fn log_posterior(
        &self, y: ArrayView1<'_, f64>, dy: &DVector<f64>, sigma_n: &DMatrix<f64>,
    ) -> NumericResult<LogPosterior> {
        let n = self.n_dim();
        if dy.len() != n || sigma_n.nrows() != n || sigma_n.ncols() != n {
            return Err(NumericError::DimensionMismatch {
                context: "log-posterior observation",
                expected: n,
                found: if dy.len() != n { dy.len() } else { sigma_n.nrows() },
            });
        }
        let (mu, sigma_p) = self.moments(y)?;
        let signal = mu.dot(&(sigma_n * &mu));
        let scale = 3.0 * signal.sqrt() / mu.norm_squared();
        let invalid_scale = NumericError::InvalidPriorScale {
            value: scale,
            reason: "needs a non-zero mean change and positive noise along it",
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(invalid_scale);
        }
        let prior = Exp::new(1.0 / scale).map_err(|_| invalid_scale)?;
        Ok(LogPosterior {
            mu,
            sigma_p,
            sigma_n: sigma_n.clone(),
            dy: dy.clone(),
            constraint: self.constraint,
            prior,
        })
    }

    fn moments(&self, y: ArrayView1<'_, f64>) -> NumericResult<(DVector<f64>, DMatrix<f64>)> {
        let mu = self.mean_regressor.predict_row(y)?;
        let link = self.cov_regressor.predict_row(y)?;
        let sigma_p = link_to_covariance(link.view(), self.n_dim())?;
        Ok((to_dvector(mu.view()), sigma_p))
    }
}

/// Log-posterior density of the change magnitude for one observation.
#[derive(Debug, Clone)]
pub struct LogPosterior {
    mu: DVector<f64>,
    sigma_p: DMatrix<f64>,
    sigma_n: DMatrix<f64>,
    dy: DVector<f64>,
    constraint: DomainConstraint,
    prior: Exp,
}

impl LogPosterior {
    /// Scale of the exponential magnitude prior.
    pub fn prior_scale(&self) -> f64 {
        1.0 / self.prior.rate()
    }

    /// Log of the magnitude prior at `dv`, floored at [`PRIOR_LOG_FLOOR`].
    pub fn log_prior(&self, dv: f64) -> f64 {
        let mut p = self.prior.pdf(self.constraint.fold(dv));
        if p == 0.0 {
            return PRIOR_LOG_FLOOR;
        }
        if self.constraint == DomainConstraint::TwoSided {
            p /= 2.0;
        }
        p.ln()
    }

    /// `log N(Δy; μ·dv, Σ_p·dv² + Σₙ)`.
    ///
    /// # Errors
    /// - [`NumericError::SingularMatrix`] when the combined covariance is
    ///   not positive definite.
    pub fn log_likelihood(&self, dv: f64) -> NumericResult<f64> {
        let residual = &self.dy - &self.mu * dv;
        let cov = &self.sigma_p * (dv * dv) + &self.sigma_n;
        gaussian_log_density(&residual, cov)
    }

    /// Log-prior plus log-likelihood at `dv`.
    pub fn value(&self, dv: f64) -> NumericResult<f64> {
        Ok(self.log_prior(dv) + self.log_likelihood(dv)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    /// Degree-0 regressors returning constant `μ` and a constant link vector.
    fn constant_model(mu: &[f64], link: &[f64], constraint: DomainConstraint) -> ChangeDirectionModel {
        let n = mu.len();
        let x = Array2::from_shape_fn((4, n), |(i, j)| (i + j) as f64);
        let fit_const = |values: &[f64]| {
            let y = Array2::from_shape_fn((4, values.len()), |(_, j)| values[j]);
            Arc::new(PolyRidge::fit(x.view(), y.view(), 0, 0.0).unwrap())
        };
        ChangeDirectionModel::new(
            "a, test",
            DirectionVector::unit("a"),
            constraint,
            1.0,
            fit_const(mu),
            fit_const(link),
        )
        .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // `estimate_change` maps the link output back to `L·Lᵀ` with the
    // exponentiated diagonal.
    fn estimate_change_inverts_the_link() {
        let model = constant_model(&[1.0, 0.0], &[0.0, 0.5, 2.0_f64.ln()], DomainConstraint::TwoSided);

        let (mu, sigma) = model.estimate_change(array![0.3, 0.1].view()).unwrap();

        assert_relative_eq!(mu[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sigma[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sigma[[1, 0]], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sigma[[0, 1]], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sigma[[1, 1]], 0.25 + 4.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // For a positive direction every negative magnitude hits the prior floor.
    //
    // Given
    // -----
    // - μ = (1, 1), Σₙ = 0.01·I, positive constraint.
    //
    // Expect
    // ------
    // - log_prior(dv) = -1e6 for dv < 0, and value(dv) is exactly the floor
    //   plus the log-likelihood.
    fn positive_direction_floors_negative_magnitudes() {
        // Arrange
        let model = constant_model(&[1.0, 1.0], &[-5.0, 0.0, -5.0], DomainConstraint::Positive);
        let dy = DVector::from_vec(vec![0.1, 0.1]);
        let sigma_n = DMatrix::identity(2, 2) * 0.01;

        // Act
        let post = model.log_posterior(array![0.0, 0.0].view(), &dy, &sigma_n).unwrap();

        // Assert
        for dv in [-1e-3, -0.2, -5.0] {
            assert_eq!(post.log_prior(dv), PRIOR_LOG_FLOOR);
            let likelihood = post.log_likelihood(dv).unwrap();
            assert_eq!(post.value(dv).unwrap(), PRIOR_LOG_FLOOR + likelihood);
            assert!(post.value(dv).unwrap() < PRIOR_LOG_FLOOR / 2.0);
        }
        assert!(post.log_prior(0.1) > PRIOR_LOG_FLOOR);
    }

    #[test]
    // Purpose
    // -------
    // The prior scale is 3·√(μᵀΣₙμ)/‖μ‖² and the two-sided density is the
    // halved one-sided density of |dv|.
    fn prior_scale_and_two_sided_halving() {
        let model = constant_model(&[1.0, 0.0, 1.0], &[0.0; 6], DomainConstraint::TwoSided);
        let dy = DVector::from_vec(vec![0.3, 0.0, 0.3]);
        let sigma_n = DMatrix::identity(3, 3) * 0.01;

        let post = model.log_posterior(array![1.0, 1.0, 2.0].view(), &dy, &sigma_n).unwrap();

        let scale = 3.0 * 0.02_f64.sqrt() / 2.0;
        assert_relative_eq!(post.prior_scale(), scale, epsilon = 1e-9);
        let expected = (0.5 / scale).ln() - 0.3 / scale;
        assert_relative_eq!(post.log_prior(-0.3), expected, epsilon = 1e-9);
        assert_relative_eq!(post.log_prior(0.3), expected, epsilon = 1e-9);
    }

    #[test]
    fn singular_noise_surfaces_at_zero_magnitude() {
        let model = constant_model(&[1.0, 1.0], &[0.0, 0.0, 0.0], DomainConstraint::TwoSided);
        let dy = DVector::from_vec(vec![0.1, 0.1]);
        let sigma_n = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.0]));

        let post = model.log_posterior(array![0.0, 0.0].view(), &dy, &sigma_n).unwrap();

        assert!(matches!(post.log_likelihood(0.0), Err(NumericError::SingularMatrix { .. })));
        assert!(post.log_likelihood(0.5).is_ok());
    }

    #[test]
    fn non_unit_direction_is_reported() {
        let model = constant_model(&[1.0, 1.0], &[0.0, 0.0, 0.0], DomainConstraint::TwoSided);
        let long = ChangeDirectionModel::new(
            "2.0*a, twosided",
            DirectionVector::new(vec![("a", 2.0)]).unwrap(),
            DomainConstraint::TwoSided,
            1.0,
            Arc::clone(model.mean_regressor()),
            Arc::clone(model.cov_regressor()),
        )
        .unwrap();

        assert_eq!(model.unit_norm_diagnostic(), None);
        assert_eq!(
            long.unit_norm_diagnostic(),
            Some(Diagnostic::NonUnitDirection { direction: "2.0*a, twosided".to_string(), norm: 2.0 })
        );
    }

    #[test]
    fn zero_mean_change_has_no_prior() {
        let model = constant_model(&[0.0, 0.0], &[0.0, 0.0, 0.0], DomainConstraint::TwoSided);
        let err = model
            .log_posterior(
                array![0.0, 0.0].view(),
                &DVector::zeros(2),
                &DMatrix::identity(2, 2),
            )
            .unwrap_err();
        assert!(matches!(err, NumericError::InvalidPriorScale { .. }));
    }
}
