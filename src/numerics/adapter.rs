//! Adapters that expose a scalar log-density as `argmin` problems.
//!
//! Mode finding maximizes `f(x)` by minimizing the cost `c(x) = -f(x)`
//! ([`ArgMinAdapter`]). Interval search solves `f(x) - level = 0`
//! ([`LevelCrossing`]). Both reject non-finite evaluations with
//! [`NumericError::NonFiniteDensity`] so that the solver never sees `NaN`.
use argmin::core::{CostFunction, Error};

use crate::numerics::errors::{NumericError, NumericResult};

/// A scalar log-density `x ↦ f(x)`.
///
/// Implemented for every `Fn(f64) -> NumericResult<f64>`, so closures can be
/// handed to the range finder directly.
pub trait LogDensity {
    fn value(&self, x: f64) -> NumericResult<f64>;
}

impl<F> LogDensity for F
where
    F: Fn(f64) -> NumericResult<f64>,
{
    fn value(&self, x: f64) -> NumericResult<f64> {
        self(x)
    }
}

/// Evaluate `f` at `x` and reject non-finite values.
pub fn finite_value<F: LogDensity + ?Sized>(f: &F, x: f64) -> NumericResult<f64> {
    let value = f.value(x)?;
    if !value.is_finite() {
        return Err(NumericError::NonFiniteDensity { x, value });
    }
    Ok(value)
}

/// Bridges a [`LogDensity`] to `argmin`'s `CostFunction` with cost `-f(x)`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: LogDensity + ?Sized> {
    pub f: &'a F,
}

impl<'a, F: LogDensity + ?Sized> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F) -> Self {
        Self { f }
    }
}

impl<'a, F: LogDensity + ?Sized> CostFunction for ArgMinAdapter<'a, F> {
    type Param = f64;
    type Output = f64;

    /// Evaluate the cost `c(x) = -f(x)`.
    ///
    /// # Errors
    /// Propagates errors from `f` and returns `NonFiniteDensity` for
    /// non-finite values.
    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(-finite_value(self.f, *x)?)
    }
}

/// Bridges a [`LogDensity`] to a root-finding problem `f(x) - level`.
#[derive(Debug, Clone)]
pub struct LevelCrossing<'a, F: LogDensity + ?Sized> {
    pub f: &'a F,
    pub level: f64,
}

impl<'a, F: LogDensity + ?Sized> LevelCrossing<'a, F> {
    pub fn new(f: &'a F, level: f64) -> Self {
        Self { f, level }
    }

    /// `f(x) - level`, with the same finiteness guard as the solver sees.
    pub fn eval(&self, x: f64) -> NumericResult<f64> {
        Ok(finite_value(self.f, x)? - self.level)
    }
}

impl<'a, F: LogDensity + ?Sized> CostFunction for LevelCrossing<'a, F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.eval(*x)?)
    }
}
