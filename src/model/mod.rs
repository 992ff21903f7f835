//! model: trained change models, batch inference, persistence, and
//! evaluation.
//!
//! Purpose
//! -------
//! Everything that exists after training: the per-direction models with
//! their magnitude posteriors, the aggregate [`ChangeModel`] that scores
//! observations against the null class and every direction, versioned
//! storage, and summaries for simulated test batches.
//!
//! Key behaviors
//! -------------
//! - [`ChangeDirectionModel`]: `μ(y)`, `Σ_p(y)`, and the log-posterior of
//!   the change magnitude.
//! - [`ChangeModel::predict`] / [`ChangeModel::compute_log_likelihood`]:
//!   parallel per-sample scoring with sentinel handling for failed classes.
//! - [`ChangeModel::save`] / [`ChangeModel::load`]: JSON with an explicit
//!   schema version.
//! - [`performance_measures`] / [`confusion_matrix`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Class 0 is always "no change"; class `k ≥ 1` is `models[k - 1]`.
//! - Models are immutable once built and are shared read-only across
//!   worker threads.
//!
//! Conventions
//! -----------
//! - Crate-level failures are [`ChangeError`]; recoverable events are
//!   [`Diagnostic`]s returned with the results.
//!
//! Testing notes
//! -------------
//! - Unit tests per submodule; the full train → save → load → predict
//!   cycle is exercised in `tests/`.

pub mod change_model;
pub mod diagnostics;
pub mod direction_model;
pub mod errors;
pub mod evaluation;
pub mod persistence;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::change_model::{
    ChangeModel, FAILED_CLASS_LOG_PROB, Inference, InferenceOptions, LogLikelihoods, NO_CHANGE,
};
pub use self::diagnostics::{BoundSide, Diagnostic, Diagnostics, ProgressSink};
pub use self::direction_model::{ChangeDirectionModel, LogPosterior, PRIOR_LOG_FLOOR};
pub use self::errors::{ChangeError, ChangeResult};
pub use self::evaluation::{PerformanceMeasures, confusion_matrix, performance_measures};
pub use self::persistence::SCHEMA_VERSION;
