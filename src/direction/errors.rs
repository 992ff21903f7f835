//! Errors raised while parsing or validating change directions.
//!
//! Every variant is a configuration error: it is reported before any
//! simulation runs and is never silently defaulted.
use thiserror::Error;

/// Result alias for direction parsing and validation.
pub type DirectionResult<T> = Result<T, DirectionError>;

/// Parsing and validation failures for change directions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectionError {
    // ---- Grammar ----
    /// Direction text contains no terms after comment stripping.
    #[error("Direction specification is empty: '{text}'")]
    EmptySpec { text: String },

    /// A term could not be split into coefficient and parameter name.
    #[error("Malformed direction term '{term}': {reason}")]
    MalformedTerm { term: String, reason: &'static str },

    /// A coefficient is not a valid number.
    #[error("Invalid coefficient '{coefficient}' in direction term '{term}'")]
    InvalidCoefficient { term: String, coefficient: String },

    /// A domain-constraint keyword is not recognized.
    #[error("Domain constraints should be any of {valid} but got '{keyword}'")]
    UnknownConstraint { keyword: String, valid: &'static str },

    // ---- Weights ----
    /// A weight is NaN or infinite.
    #[error("Weight for parameter '{name}' must be finite; got {value}")]
    NonFiniteWeight { name: String, value: f64 },

    /// All weights are zero, so the direction has no unit-norm version.
    #[error("Direction '{name}' has zero norm and cannot be normalized")]
    ZeroNorm { name: String },
}
