//! numerics: dense linear algebra, scalar search, and quadrature kernels.
//!
//! Purpose
//! -------
//! Collect the numerical building blocks shared by training and inference:
//! Gaussian log-densities and the log-Cholesky covariance link, `argmin`
//! adapters for scalar log-densities, the peak/interval finder, and
//! adaptive quadrature.
//!
//! Key behaviors
//! -------------
//! - [`linalg`]: `ndarray` ↔ `nalgebra` copies, `log N(r; 0, Σ)` via
//!   Cholesky, link ↔ covariance transforms.
//! - [`adapter`]: expose a log-density to `argmin` as `-f` (minimization)
//!   or `f - level` (root finding).
//! - [`range`]: MAP magnitude and integration interval ([`find_range`]).
//! - [`quadrature`]: adaptive Gauss–Kronrod integration ([`integrate`]).
//!
//! Invariants & assumptions
//! ------------------------
//! - Every failure is a typed [`NumericError`]; no routine panics or
//!   returns `NaN` on singular input.
//! - Routines are pure and re-entrant, so they may run concurrently on
//!   worker threads.
//!
//! Conventions
//! -----------
//! - Log-densities are natural-log valued.
//! - Option structs validate in `new` and implement `Default` with the
//!   values used by the change model.
//!
//! Downstream usage
//! ----------------
//! - `model` uses all four submodules per sample and class; `training` uses
//!   [`linalg`] for moment estimation.
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests against closed-form results.

pub mod adapter;
pub mod errors;
pub mod linalg;
pub mod quadrature;
pub mod range;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::adapter::{ArgMinAdapter, LevelCrossing, LogDensity};
pub use self::errors::{NumericError, NumericResult};
pub use self::linalg::{
    factor_to_link, gaussian_log_density, link_to_covariance, link_to_factor, sample_covariance,
    tril_len,
};
pub use self::quadrature::{QuadratureOptions, QuadratureOutcome, integrate};
pub use self::range::{RangeOptions, RangeOutcome, find_range};
