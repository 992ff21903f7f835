//! Errors raised by the numerical kernels (linear algebra, scalar
//! optimization, root finding, quadrature).
//!
//! `argmin` failures are converted into [`NumericError`] by downcasting: an
//! error that started life as a [`NumericError`] inside a cost function comes
//! back unchanged, an [`ArgminError`] is mapped onto the matching wrapper
//! variant, and anything else becomes [`NumericError::BackendError`].
use argmin::core::{ArgminError, Error};
use thiserror::Error;

/// Result alias for numerical routines.
pub type NumericResult<T> = Result<T, NumericError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericError {
    // ---- Linear algebra ----
    /// Cholesky factorization failed (matrix not positive definite).
    #[error("Singular or non-positive-definite matrix in {context}")]
    SingularMatrix { context: &'static str },

    /// Operand shapes are incompatible.
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch { context: &'static str, expected: usize, found: usize },

    // ---- Densities ----
    /// A log-density evaluated to NaN or +∞.
    #[error("Non-finite log-density {value} at {x}")]
    NonFiniteDensity { x: f64, value: f64 },

    /// The magnitude-prior scale is not finite and positive.
    #[error("Invalid magnitude prior scale {value}: {reason}")]
    InvalidPriorScale { value: f64, reason: &'static str },

    // ---- Options ----
    /// A tolerance or search setting is out of range.
    #[error("Invalid {name} = {value}: {reason}")]
    InvalidTolerance { name: &'static str, value: f64, reason: &'static str },

    /// A search domain is empty or reversed.
    #[error("Invalid search domain [{lower}, {upper}]")]
    InvalidDomain { lower: f64, upper: f64 },

    // ---- Root finding ----
    /// The root finder hit its iteration cap before converging.
    #[error("Root finding did not converge within {max_iter} iterations")]
    RootNotConverged { max_iter: u64 },

    /// The solver stopped without producing a usable point.
    #[error("Solver returned no solution")]
    MissingSolution,

    // ---- Argmin ----
    /// Wrapper for argmin::InvalidParameter
    #[error("Invalid parameter: {text}")]
    InvalidParameter { text: String },
    /// Wrapper for argmin::NotImplemented
    #[error("Not implemented: {text}")]
    NotImplemented { text: String },
    /// Wrapper for argmin::NotInitialized
    #[error("Not initialized: {text}")]
    NotInitialized { text: String },
    /// Wrapper for argmin::ConditionViolated
    #[error("Condition violated: {text}")]
    ConditionViolated { text: String },
    /// Wrapper for argmin::CheckpointNotFound
    #[error("Checkpoint not found: {text}")]
    CheckPointNotFound { text: String },
    /// Wrapper for argmin::PotentialBug
    #[error("Potential bug: {text}")]
    PotentialBug { text: String },
    /// Wrapper for argmin::ImpossibleError
    #[error("Impossible error: {text}")]
    ImpossibleError { text: String },
    /// Wrapper for other argmin::Error types
    #[error("Backend error: {text}")]
    BackendError { text: String },
}

impl From<Error> for NumericError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<NumericError>() {
            Ok(numeric_err) => return numeric_err,
            Err(err) => err,
        };
        match original_err.downcast::<ArgminError>() {
            Ok(argmin_err) => match argmin_err {
                ArgminError::InvalidParameter { text } => NumericError::InvalidParameter { text },
                ArgminError::NotImplemented { text } => NumericError::NotImplemented { text },
                ArgminError::NotInitialized { text } => NumericError::NotInitialized { text },
                ArgminError::ConditionViolated { text } => {
                    NumericError::ConditionViolated { text }
                }
                ArgminError::CheckpointNotFound { text } => {
                    NumericError::CheckPointNotFound { text }
                }
                ArgminError::PotentialBug { text } => NumericError::PotentialBug { text },
                ArgminError::ImpossibleError { text } => NumericError::ImpossibleError { text },
                other => NumericError::BackendError { text: other.to_string() },
            },
            Err(err) => NumericError::BackendError { text: err.to_string() },
        }
    }
}
