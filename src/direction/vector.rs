//! direction::vector: direction weights, domain constraints, and specs.
//!
//! [`DirectionVector`] keeps parameter weights in the order they were
//! written, which is also the order used for its canonical name.
//! [`DomainConstraint`] maps each sign restriction onto the magnitude domain
//! used by the range finder and the magnitude prior.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::direction::{
    errors::{DirectionError, DirectionResult},
    parse::{format_terms, parse_spec},
};

/// Keywords accepted for [`DomainConstraint`], in display order.
pub const CONSTRAINT_KEYWORDS: &str = "['negative', 'positive', 'twosided']";

/// Sign restriction on the change magnitude along a direction.
///
/// Variants:
/// - `Negative`: magnitudes in `(−∞, 0]`.
/// - `Positive`: magnitudes in `[0, ∞)`.
/// - `TwoSided`: magnitudes in `(−∞, ∞)`; the prior is the symmetric,
///   halved one-sided density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainConstraint {
    Negative,
    Positive,
    TwoSided,
}

impl DomainConstraint {
    /// Keyword used in direction files and in model names.
    pub fn keyword(&self) -> &'static str {
        match self {
            DomainConstraint::Negative => "negative",
            DomainConstraint::Positive => "positive",
            DomainConstraint::TwoSided => "twosided",
        }
    }

    /// Closed magnitude domain `(lower, upper)`; unbounded sides are infinite.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            DomainConstraint::Negative => (f64::NEG_INFINITY, 0.0),
            DomainConstraint::Positive => (0.0, f64::INFINITY),
            DomainConstraint::TwoSided => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    /// Map a signed magnitude onto the argument of the one-sided prior.
    ///
    /// `Negative` flips the sign, `TwoSided` folds onto the positive axis.
    pub fn fold(&self, dv: f64) -> f64 {
        match self {
            DomainConstraint::Negative => -dv,
            DomainConstraint::Positive => dv,
            DomainConstraint::TwoSided => dv.abs(),
        }
    }
}

impl FromStr for DomainConstraint {
    type Err = DirectionError;

    /// Parse a constraint keyword (case-insensitive, surrounding whitespace
    /// ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "negative" => Ok(DomainConstraint::Negative),
            "positive" => Ok(DomainConstraint::Positive),
            "twosided" => Ok(DomainConstraint::TwoSided),
            _ => Err(DirectionError::UnknownConstraint {
                keyword: s.trim().to_string(),
                valid: CONSTRAINT_KEYWORDS,
            }),
        }
    }
}

impl fmt::Display for DomainConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// DirectionVector: ordered signed weights over named parameters.
///
/// Purpose
/// -------
/// Represent one hypothesised mode of change as a linear combination of
/// forward-model parameters, e.g. `a - 0.5*b`.
///
/// Fields
/// ------
/// - `weights`: `Vec<(String, f64)>`
///   `(parameter, weight)` pairs in the order they were specified. A
///   parameter appears at most once; parameters absent from the list have
///   weight zero.
///
/// Invariants
/// ----------
/// - All weights are finite (enforced by [`DirectionVector::new`]).
/// - After training, stored directions have unit Euclidean norm; see
///   [`DirectionVector::normalized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionVector {
    weights: Vec<(String, f64)>,
}

impl DirectionVector {
    /// Build a direction from `(parameter, weight)` pairs.
    ///
    /// A repeated parameter keeps its last weight but its first position.
    ///
    /// # Errors
    /// - [`DirectionError::NonFiniteWeight`] for NaN/±∞ weights.
    pub fn new<S: Into<String>>(weights: Vec<(S, f64)>) -> DirectionResult<Self> {
        let mut out: Vec<(String, f64)> = Vec::with_capacity(weights.len());
        for (name, value) in weights {
            let name = name.into();
            if !value.is_finite() {
                return Err(DirectionError::NonFiniteWeight { name, value });
            }
            match out.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => out.push((name, value)),
            }
        }
        Ok(Self { weights: out })
    }

    /// Unit direction along a single parameter.
    pub fn unit(name: &str) -> Self {
        Self { weights: vec![(name.to_string(), 1.0)] }
    }

    /// `(parameter, weight)` pairs in specification order.
    pub fn weights(&self) -> &[(String, f64)] {
        &self.weights
    }

    /// Parameter names referenced by this direction.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|(name, _)| name.as_str())
    }

    /// Weight of `name`, zero when the parameter is not referenced.
    pub fn weight(&self, name: &str) -> f64 {
        self.weights.iter().find(|(p, _)| p == name).map_or(0.0, |(_, w)| *w)
    }

    /// Euclidean norm of the weight vector.
    pub fn norm(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// Whether the norm is 1 after rounding to three decimals.
    pub fn is_unit(&self) -> bool {
        ((self.norm() * 1e3).round() / 1e3 - 1.0).abs() == 0.0
    }

    /// Copy of this direction scaled to unit Euclidean norm.
    ///
    /// # Errors
    /// - [`DirectionError::ZeroNorm`] when every weight is zero.
    pub fn normalized(&self) -> DirectionResult<Self> {
        let norm = self.norm();
        if norm == 0.0 {
            return Err(DirectionError::ZeroNorm { name: self.canonical_name() });
        }
        let weights = self.weights.iter().map(|(p, w)| (p.clone(), w / norm)).collect();
        Ok(Self { weights })
    }

    /// Deterministic human-readable name, e.g. `a - 0.5*b`.
    pub fn canonical_name(&self) -> String {
        format_terms(&self.weights)
    }
}

impl fmt::Display for DirectionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// DirectionSpec: one parsed line of a direction file.
///
/// A direction together with every constraint it should be trained under.
/// Each constraint becomes a separate change-direction model sharing the
/// same fitted regressors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSpec {
    pub vector: DirectionVector,
    pub constraints: Vec<DomainConstraint>,
}

impl DirectionSpec {
    pub fn new(vector: DirectionVector, constraints: Vec<DomainConstraint>) -> Self {
        let constraints =
            if constraints.is_empty() { vec![DomainConstraint::TwoSided] } else { constraints };
        Self { vector, constraints }
    }

    /// Two-sided unit direction along one parameter.
    pub fn unit(name: &str) -> Self {
        Self::new(DirectionVector::unit(name), vec![DomainConstraint::TwoSided])
    }
}

impl FromStr for DirectionSpec {
    type Err = DirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_spec(s)
    }
}
