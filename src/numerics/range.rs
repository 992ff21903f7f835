//! numerics::range: mode and effective support of a unimodal log-density.
//!
//! Purpose
//! -------
//! Provide the MAP magnitude ("peak") of a change-direction posterior and a
//! finite interval `[lower, upper]` that carries essentially all of its
//! mass, so that the evidence integral can be computed by bounded
//! quadrature.
//!
//! Key behaviors
//! -------------
//! - Bracket the mode on a fixed log-spaced magnitude grid restricted to the
//!   domain, then refine with Brent's bounded minimizer on `-f`.
//! - From the peak, step out by `search_radius` on each side. Where the
//!   density has dropped below `scale · f_max` at that point, solve
//!   `f(x) = f(peak) + ln(scale)` with Brent's root finder.
//! - Root-finding failures fall back to `peak ± search_radius` and are
//!   recorded in [`RangeOutcome`]; evaluation failures of `f` itself are
//!   returned as errors.
//!
//! Invariants & assumptions
//! ------------------------
//! - `lower ≤ peak ≤ upper`, and all three lie inside the domain.
//! - The log-density is assumed unimodal; for multimodal input the peak is
//!   the best local mode around the best grid point.
//!
//! Conventions
//! -----------
//! - Domains are `(lower, upper)` pairs with infinite sides allowed, as
//!   produced by `DomainConstraint::bounds`.
//!
//! Testing notes
//! -------------
//! - Unit tests use closed-form Gaussian log-densities (interior peak,
//!   boundary peak, density wider than the search radius) and a failing
//!   density to check error propagation.
use argmin::{
    core::{Executor, State, TerminationReason, TerminationStatus},
    solver::brent::{BrentOpt, BrentRoot},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::numerics::{
    adapter::{ArgMinAdapter, LevelCrossing, LogDensity, finite_value},
    errors::{NumericError, NumericResult},
};

/// Relative x-tolerance for Brent's minimizer.
const PEAK_REL_TOL: f64 = 1.490_116_119_384_765_6e-8;
/// Absolute x-tolerance for Brent's minimizer.
const PEAK_ABS_TOL: f64 = 1e-10;
/// x-tolerance for Brent's root finder.
const ROOT_TOL: f64 = 2e-12;
/// Exponent range of the mode-bracketing grid: `10^(j/4)` for `j` in this range.
const GRID_EXPONENTS: std::ops::RangeInclusive<i32> = -16..=12;

/// RangeOptions: settings for [`find_range`].
///
/// Fields
/// ------
/// - `scale`: density ratio (relative to the peak) that defines the interval
///   ends. Must lie in `(0, 1)`. Default `1e-2`.
/// - `search_radius`: distance from the peak at which the bracket for each
///   root is opened. Must be finite and `> 0`. Default `0.2`.
/// - `max_iter`: iteration cap shared by the minimizer and the root finder.
///   Must be `> 0`. Default `100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeOptions {
    pub scale: f64,
    pub search_radius: f64,
    pub max_iter: u64,
}

impl RangeOptions {
    /// Construct validated range options.
    ///
    /// # Errors
    /// - [`NumericError::InvalidTolerance`] for out-of-range values.
    pub fn new(scale: f64, search_radius: f64, max_iter: u64) -> NumericResult<Self> {
        if !(scale > 0.0 && scale < 1.0) {
            return Err(NumericError::InvalidTolerance {
                name: "scale",
                value: scale,
                reason: "must lie strictly between 0 and 1",
            });
        }
        if !(search_radius.is_finite() && search_radius > 0.0) {
            return Err(NumericError::InvalidTolerance {
                name: "search_radius",
                value: search_radius,
                reason: "must be finite and positive",
            });
        }
        if max_iter == 0 {
            return Err(NumericError::InvalidTolerance {
                name: "max_iter",
                value: 0.0,
                reason: "must be greater than zero",
            });
        }
        Ok(Self { scale, search_radius, max_iter })
    }
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self { scale: 1e-2, search_radius: 0.2, max_iter: 100 }
    }
}

/// Result of [`find_range`].
///
/// `lower_fallback` / `upper_fallback` hold the root-finding error when the
/// corresponding end fell back to `peak ∓ search_radius`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome {
    pub peak: f64,
    pub lower: f64,
    pub upper: f64,
    pub lower_fallback: Option<NumericError>,
    pub upper_fallback: Option<NumericError>,
}

impl RangeOutcome {
    pub fn used_fallback(&self) -> bool {
        self.lower_fallback.is_some() || self.upper_fallback.is_some()
    }
}

/// find_range: peak and integration interval of a unimodal log-density.
///
/// Parameters
/// ----------
/// - `f`: `&F`
///   Log-density of the scalar magnitude.
/// - `domain`: `(f64, f64)`
///   Admissible magnitudes; either side may be infinite.
/// - `opts`: `&RangeOptions`
///
/// Returns
/// -------
/// `RangeOutcome` with `lower ≤ peak ≤ upper`.
///
/// Errors
/// ------
/// - [`NumericError::InvalidDomain`] for an empty or reversed domain.
/// - Any error raised by `f` (or a non-finite value) while locating the
///   peak or probing the interval ends.
pub fn find_range<F>(f: &F, domain: (f64, f64), opts: &RangeOptions) -> NumericResult<RangeOutcome>
where
    F: LogDensity + ?Sized,
{
    let (lo, hi) = domain;
    if lo.is_nan() || hi.is_nan() || lo >= hi {
        return Err(NumericError::InvalidDomain { lower: lo, upper: hi });
    }
    let peak = locate_peak(f, domain, opts)?;
    let level = finite_value(f, peak)? + opts.scale.ln();
    let crossing = LevelCrossing::new(f, level);

    let (lower, lower_fallback) =
        locate_end(&crossing, peak, (peak - opts.search_radius).max(lo), opts.max_iter)?;
    let (upper, upper_fallback) =
        locate_end(&crossing, peak, (peak + opts.search_radius).min(hi), opts.max_iter)?;
    if let Some(err) = &lower_fallback {
        warn!(peak, lower, error = %err, "lower integration limit fell back to search radius");
    }
    if let Some(err) = &upper_fallback {
        warn!(peak, upper, error = %err, "upper integration limit fell back to search radius");
    }
    Ok(RangeOutcome { peak, lower, upper, lower_fallback, upper_fallback })
}

/// Bracketing grid: `0` and `±10^(j/4)` inside the domain, plus any finite
/// domain end, sorted ascending.
pub fn magnitude_grid(domain: (f64, f64)) -> Vec<f64> {
    let (lo, hi) = domain;
    let mut grid: Vec<f64> = GRID_EXPONENTS
        .flat_map(|j| {
            let m = 10f64.powf(f64::from(j) / 4.0);
            [-m, m]
        })
        .chain([0.0, lo, hi])
        .filter(|x| x.is_finite() && *x >= lo && *x <= hi)
        .collect();
    grid.sort_by(f64::total_cmp);
    grid.dedup();
    grid
}

// ---- Helper methods ----

fn locate_peak<F>(f: &F, domain: (f64, f64), opts: &RangeOptions) -> NumericResult<f64>
where
    F: LogDensity + ?Sized,
{
    let grid = magnitude_grid(domain);
    if grid.is_empty() {
        return Err(NumericError::InvalidDomain { lower: domain.0, upper: domain.1 });
    }
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (idx, &x) in grid.iter().enumerate() {
        let value = finite_value(f, x)?;
        if value > best_value {
            best = idx;
            best_value = value;
        }
    }
    let left = grid[best.saturating_sub(1)];
    let right = grid[(best + 1).min(grid.len() - 1)];
    if left >= right {
        return Ok(grid[best]);
    }

    let solver = BrentOpt::new(left, right).set_tolerance(PEAK_REL_TOL, PEAK_ABS_TOL);
    let result = Executor::new(ArgMinAdapter::new(f), solver)
        .configure(|state| state.max_iters(opts.max_iter))
        .run()?;
    let state = result.state();
    match state.get_best_param() {
        Some(&x) if -state.get_best_cost() >= best_value => Ok(x),
        _ => Ok(grid[best]),
    }
}

/// Find one end of the interval between `peak` and `edge`.
///
/// Returns `(end, fallback_reason)`. Evaluation errors at `edge` propagate;
/// failures inside the root finder are converted into a fallback to `edge`.
fn locate_end<F>(
    crossing: &LevelCrossing<'_, F>, peak: f64, edge: f64, max_iter: u64,
) -> NumericResult<(f64, Option<NumericError>)>
where
    F: LogDensity + ?Sized,
{
    if edge == peak || crossing.eval(edge)? >= 0.0 {
        return Ok((edge, None));
    }
    match solve_crossing(crossing, peak.min(edge), peak.max(edge), max_iter) {
        Ok(root) => Ok((root, None)),
        Err(err) => Ok((edge, Some(err))),
    }
}

fn solve_crossing<F>(
    crossing: &LevelCrossing<'_, F>, min: f64, max: f64, max_iter: u64,
) -> NumericResult<f64>
where
    F: LogDensity + ?Sized,
{
    let solver = BrentRoot::new(min, max, ROOT_TOL);
    let result = Executor::new(LevelCrossing::new(crossing.f, crossing.level), solver)
        .configure(|state| state.max_iters(max_iter))
        .run()?;
    let state = result.state();
    if matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::MaxItersReached)
    ) {
        return Err(NumericError::RootNotConverged { max_iter });
    }
    let root = state
        .get_best_param()
        .or_else(|| state.get_param())
        .copied()
        .ok_or(NumericError::MissingSolution)?;
    Ok(root.clamp(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian(mean: f64, sd: f64) -> impl Fn(f64) -> NumericResult<f64> {
        move |x| Ok(-0.5 * ((x - mean) / sd).powi(2))
    }

    #[test]
    // Purpose
    // -------
    // For a narrow Gaussian the peak is the mean and both ends sit where the
    // density is 1% of the peak.
    //
    // Given
    // -----
    // - f(x) = -½((x - 0.5)/0.05)², two-sided domain, default options.
    //
    // Expect
    // ------
    // - lower < peak < upper, peak ≈ 0.5, f(lower) ≈ f(upper) ≈ f(peak) + ln(0.01),
    //   no fallbacks.
    fn gaussian_interior_peak_and_level_crossings() {
        // Arrange
        let f = gaussian(0.5, 0.05);
        let opts = RangeOptions::default();

        // Act
        let out = find_range(&f, (f64::NEG_INFINITY, f64::INFINITY), &opts).unwrap();

        // Assert
        let target = f(out.peak).unwrap() + opts.scale.ln();
        assert!(out.lower < out.peak && out.peak < out.upper);
        assert_relative_eq!(out.peak, 0.5, epsilon = 1e-6);
        assert_relative_eq!(f(out.lower).unwrap(), target, epsilon = 1e-6);
        assert_relative_eq!(f(out.upper).unwrap(), target, epsilon = 1e-6);
        assert!(!out.used_fallback());
    }

    #[test]
    // Purpose
    // -------
    // A density wider than the search radius keeps `peak ± search_radius`
    // without invoking the root finder.
    fn wide_density_uses_search_radius() {
        let f = gaussian(-2.0, 1.0);
        let out = find_range(&f, (f64::NEG_INFINITY, f64::INFINITY), &RangeOptions::default())
            .unwrap();

        assert_relative_eq!(out.peak, -2.0, epsilon = 1e-6);
        assert_relative_eq!(out.lower, out.peak - 0.2, epsilon = 1e-12);
        assert_relative_eq!(out.upper, out.peak + 0.2, epsilon = 1e-12);
        assert!(!out.used_fallback());
    }

    #[test]
    // Purpose
    // -------
    // A root finder that runs out of iterations falls back to
    // `peak ± search_radius` and records why on both ends.
    //
    // Given
    // -----
    // - f(x) = -½((x - 0.5)/0.01)², two-sided domain, max_iter = 3.
    //
    // Expect
    // ------
    // - lower = peak - 0.2, upper = peak + 0.2, both fallbacks set.
    fn unconverged_root_finder_falls_back_to_search_radius() {
        // Arrange
        let f = gaussian(0.5, 0.01);
        let opts = RangeOptions::new(1e-2, 0.2, 3).unwrap();

        // Act
        let out = find_range(&f, (f64::NEG_INFINITY, f64::INFINITY), &opts).unwrap();

        // Assert
        assert_relative_eq!(out.peak, 0.5, epsilon = 1e-3);
        assert_eq!(out.lower, out.peak - 0.2);
        assert_eq!(out.upper, out.peak + 0.2);
        assert!(matches!(out.lower_fallback, Some(NumericError::RootNotConverged { max_iter: 3 })));
        assert!(matches!(out.upper_fallback, Some(NumericError::RootNotConverged { max_iter: 3 })));
        assert!(out.used_fallback());
    }

    #[test]
    // Purpose
    // -------
    // When the unconstrained mode lies outside a one-sided domain the peak
    // sits on the boundary and the interval never leaves the domain.
    fn boundary_peak_stays_inside_domain() {
        let f = gaussian(-1.0, 1.0);

        let out = find_range(&f, (0.0, f64::INFINITY), &RangeOptions::default()).unwrap();

        assert_eq!(out.peak, 0.0);
        assert_eq!(out.lower, 0.0);
        assert_relative_eq!(out.upper, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn evaluation_errors_propagate() {
        let f = |_: f64| -> NumericResult<f64> {
            Err(NumericError::SingularMatrix { context: "test" })
        };
        let err = find_range(&f, (0.0, 1.0), &RangeOptions::default()).unwrap_err();
        assert_eq!(err, NumericError::SingularMatrix { context: "test" });
    }

    #[test]
    fn invalid_options_and_domains_are_rejected() {
        assert!(RangeOptions::new(1.5, 0.2, 100).is_err());
        assert!(RangeOptions::new(0.01, 0.0, 100).is_err());
        assert!(RangeOptions::new(0.01, 0.2, 0).is_err());
        let f = gaussian(0.0, 1.0);
        assert!(matches!(
            find_range(&f, (1.0, 1.0), &RangeOptions::default()),
            Err(NumericError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn grid_respects_domain() {
        let grid = magnitude_grid((f64::NEG_INFINITY, 0.0));
        assert!(grid.iter().all(|x| *x <= 0.0));
        assert_eq!(*grid.last().unwrap(), 0.0);
        assert_relative_eq!(grid[0], -1e3, epsilon = 1e-9);
    }
}
