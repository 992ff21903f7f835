//! regression: polynomial ridge regressors mapping baseline signal to
//! per-direction change moments.
//!
//! Purpose
//! -------
//! Fit the smooth maps `y ↦ μ(y)` (mean change) and `y ↦ link(Σ_p(y))`
//! (log-Cholesky covariance entries) that a change-direction model
//! evaluates at inference time.
//!
//! Key behaviors
//! -------------
//! - [`PolynomialFeatures`] expands inputs into all monomials up to a fixed
//!   degree (bias column included).
//! - [`PolyRidge`] solves the ridge normal equations once per fit and
//!   predicts single rows or whole batches.
//!
//! Conventions
//! -----------
//! - Regularization strength and degree are configuration inputs; nothing
//!   is tuned from data.
//! - Errors are reported as `NumericError`.

pub mod features;
pub mod ridge;

pub use self::features::PolynomialFeatures;
pub use self::ridge::PolyRidge;
