//! Crate-level errors for training, inference, and persistence.
//!
//! Configuration and persistence failures terminate the operation and are
//! reported through [`ChangeError`]. Per-sample numerical failures during
//! inference never surface here; they become sentinel scores plus
//! diagnostics.
use std::path::PathBuf;

use thiserror::Error;

use crate::{direction::errors::DirectionError, numerics::errors::NumericError};

/// Result alias for crate-level operations.
pub type ChangeResult<T> = Result<T, ChangeError>;

#[derive(Debug, Error)]
pub enum ChangeError {
    // ---- Configuration ----
    /// Direction text or weights are invalid.
    #[error("Invalid direction: {0}")]
    Direction(#[from] DirectionError),

    /// A direction references a parameter the forward model does not have.
    #[error("Direction '{direction}' uses unknown parameter '{name}'; free parameters are {available:?}")]
    UnknownParameter { name: String, direction: String, available: Vec<String> },

    /// The number of prior weights does not match the number of directions.
    #[error("Expected {expected} prior weights (one per direction) but got {found}")]
    PriorWeightMismatch { expected: usize, found: usize },

    /// A prior weight is negative or non-finite.
    #[error("Prior weight {index} must be finite and non-negative; got {value}")]
    InvalidPriorWeight { index: usize, value: f64 },

    /// A configuration value is out of range.
    #[error("Invalid option {name} = {value}: {reason}")]
    InvalidOption { name: &'static str, value: f64, reason: &'static str },

    /// A change model needs at least one direction.
    #[error("A change model needs at least one change direction")]
    EmptyModel,

    /// Two priors were given for the same parameter.
    #[error("Parameter '{name}' has more than one prior")]
    DuplicateParameter { name: String },

    /// At least one parameter prior is required.
    #[error("No parameter priors were provided")]
    NoParameters,

    /// The forward model failed.
    #[error("Forward model failed: {message}")]
    ForwardModel { message: String },

    /// The forward model produced too few outputs.
    #[error("Forward model must produce at least 2 outputs; got {found}")]
    ForwardModelDimension { found: usize },

    /// Input arrays do not agree in shape.
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch { context: &'static str, expected: usize, found: usize },

    // ---- Training ----
    /// The pooled neighbour covariance could not be factorized.
    #[error("Moment estimation failed for direction '{direction}' at sample {sample}: {source}")]
    MomentEstimation { direction: String, sample: usize, source: NumericError },

    /// No admissible test sample was found within the retry budget.
    #[error("No admissible test sample after {attempts} draws")]
    TestSampleRejected { attempts: usize },

    /// The dedicated worker pool could not be built.
    #[error("Failed to build worker pool: {message}")]
    ThreadPool { message: String },

    /// Numerical failure outside a per-sample context.
    #[error(transparent)]
    Numeric(#[from] NumericError),

    // ---- Persistence ----
    /// The model file does not exist.
    #[error("Change model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// The stored schema version is not supported.
    #[error("Unsupported change model schema version {found}; expected {expected}")]
    SchemaVersion { expected: u32, found: u32 },

    /// Reading or writing the model file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    /// The model blob is not valid JSON for this schema.
    #[error("Malformed change model: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<anyhow::Error> for ChangeError {
    fn from(err: anyhow::Error) -> Self {
        ChangeError::ForwardModel { message: format!("{err:#}") }
    }
}

impl From<rayon::ThreadPoolBuildError> for ChangeError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ChangeError::ThreadPool { message: err.to_string() }
    }
}
