//! direction: change directions, domain constraints, and their text grammar.
//!
//! Purpose
//! -------
//! Describe the hypothesised modes of change that a change model is trained
//! for. A direction is a signed linear combination of forward-model
//! parameters; a domain constraint restricts the admissible sign of the
//! change magnitude along that direction.
//!
//! Key behaviors
//! -------------
//! - Represent directions as ordered `(parameter, weight)` lists
//!   ([`DirectionVector`]) with normalization to unit Euclidean norm and a
//!   deterministic canonical name.
//! - Enumerate sign restrictions via [`DomainConstraint`] and expose the
//!   magnitude domain each one implies.
//! - Parse the textual grammar `[+|-]coef*param ... [, keyword ...]` into
//!   [`DirectionSpec`] values, one per line, with `#` comments stripped.
//!
//! Invariants & assumptions
//! ------------------------
//! - Weights are finite; a direction whose weights are all zero cannot be
//!   normalized and is rejected.
//! - Canonical names are derived from the weights exactly as supplied, so
//!   `2*a` and `a` produce different names even though both normalize to the
//!   same unit vector.
//! - A spec without a constraint list defaults to `twosided`.
//!
//! Conventions
//! -----------
//! - Keywords are case-insensitive: `negative`, `positive`, `twosided`.
//! - Canonical formatting prints one decimal with a leading sign, elides a
//!   unit coefficient, omits zero weights, and separates terms with
//!   ` + ` / ` - ` (e.g. `a - 0.5*b`).
//! - Errors are reported via [`DirectionError`] / [`DirectionResult`].
//!
//! Downstream usage
//! ----------------
//! - The trainer parses user direction files with [`parse_direction_specs`]
//!   and checks every referenced parameter against the forward model's free
//!   parameters before any simulation runs.
//! - Fitted change-direction models carry a normalized [`DirectionVector`]
//!   and a single [`DomainConstraint`].
//!
//! Testing notes
//! -------------
//! - Unit tests cover term parsing (default coefficients, spacing, signs),
//!   constraint keywords and their error path, comment stripping, the
//!   canonical form, and normalization.

pub mod errors;
pub mod parse;
pub mod vector;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{DirectionError, DirectionResult};
pub use self::parse::{parse_direction_specs, parse_terms};
pub use self::vector::{DirectionSpec, DirectionVector, DomainConstraint};
