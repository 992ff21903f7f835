//! direction::parse: text grammar for change directions.
//!
//! Grammar (one direction per line):
//!
//! ```text
//! line        := terms [ "," keywords ] [ "#" comment ]
//! terms       := term { whitespace term }
//! term        := [ "+" | "-" ] [ coefficient "*" ] parameter
//! keywords    := keyword { ( whitespace | "," ) keyword }
//! keyword     := "negative" | "positive" | "twosided"
//! ```
//!
//! Whitespace between a sign and its term and around `*` is tolerated, so
//! `a - 0.5 * b` and `a -0.5*b` are equivalent. An omitted coefficient is 1
//! and an omitted keyword list means `twosided`.
use crate::direction::{
    errors::{DirectionError, DirectionResult},
    vector::{DirectionSpec, DirectionVector, DomainConstraint},
};

/// Parse every non-empty, non-comment line of `text` into a [`DirectionSpec`].
///
/// # Errors
/// Propagates the first [`DirectionError`] encountered; no partial list is
/// returned.
pub fn parse_direction_specs(text: &str) -> DirectionResult<Vec<DirectionSpec>> {
    text.lines()
        .map(strip_comment)
        .filter(|line| !line.trim().is_empty())
        .map(parse_spec)
        .collect()
}

/// Parse a single direction line (terms plus optional constraint list).
pub fn parse_spec(line: &str) -> DirectionResult<DirectionSpec> {
    let line = strip_comment(line);
    let (terms, keywords) = match line.find(',') {
        Some(idx) => (&line[..idx], &line[idx + 1..]),
        None => (line, ""),
    };
    let vector = parse_terms(terms)?;
    let constraints = keywords
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|kw| !kw.is_empty())
        .map(str::parse::<DomainConstraint>)
        .collect::<DirectionResult<Vec<_>>>()?;
    Ok(DirectionSpec::new(vector, constraints))
}

/// Parse the signed-term part of a direction, e.g. `a - 0.5*b`.
///
/// # Errors
/// - [`DirectionError::EmptySpec`] when no term is present.
/// - [`DirectionError::MalformedTerm`] / [`DirectionError::InvalidCoefficient`]
///   for terms that do not follow the grammar.
pub fn parse_terms(text: &str) -> DirectionResult<DirectionVector> {
    let normalized = glue_operators(strip_comment(text));
    if normalized.is_empty() {
        return Err(DirectionError::EmptySpec { text: text.to_string() });
    }
    let weights = normalized.split(' ').map(parse_term).collect::<DirectionResult<Vec<_>>>()?;
    DirectionVector::new(weights)
}

/// Canonical string for `(parameter, weight)` pairs.
///
/// Each non-zero weight is printed with one decimal and a leading sign, a
/// coefficient of exactly `1.0` is elided, the first `+` is dropped, and
/// terms are joined with ` + ` / ` - `.
pub fn format_terms(weights: &[(String, f64)]) -> String {
    let mut out = String::new();
    for (name, value) in weights.iter().filter(|(_, v)| *v != 0.0) {
        let coef = format!("{value:+.1}");
        let (sign, magnitude) = coef.split_at(1);
        let term =
            if magnitude == "1.0" { name.clone() } else { format!("{magnitude}*{name}") };
        if out.is_empty() {
            if sign == "-" {
                out.push('-');
            }
        } else {
            out.push_str(if sign == "-" { " - " } else { " + " });
        }
        out.push_str(&term);
    }
    out
}

// ---- Helper methods ----

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Collapse whitespace and attach signs and `*` to their operands so that
/// every term becomes a single space-free token.
fn glue_operators(text: &str) -> String {
    let mut s = text.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let next = s.replace("+ ", "+").replace("- ", "-").replace("* ", "*").replace(" *", "*");
        if next == s {
            return s;
        }
        s = next;
    }
}

fn parse_term(term: &str) -> DirectionResult<(String, f64)> {
    let (sign, body) = match term.chars().next() {
        Some('+') => (1.0, &term[1..]),
        Some('-') => (-1.0, &term[1..]),
        _ => (1.0, term),
    };
    let (coef, name) = match body.split_once('*') {
        Some((coef, name)) => {
            let value = coef.parse::<f64>().map_err(|_| DirectionError::InvalidCoefficient {
                term: term.to_string(),
                coefficient: coef.to_string(),
            })?;
            (value, name)
        }
        None => (1.0, body),
    };
    if name.is_empty() {
        return Err(DirectionError::MalformedTerm {
            term: term.to_string(),
            reason: "missing parameter name",
        });
    }
    if name.contains('*') {
        return Err(DirectionError::MalformedTerm {
            term: term.to_string(),
            reason: "a term may contain at most one '*'",
        });
    }
    Ok((name.to_string(), sign * coef))
}
