//! numerics::quadrature: adaptive Gauss–Kronrod integration on a finite
//! interval.
//!
//! Each panel is integrated with the 15-point Kronrod rule and its embedded
//! 7-point Gauss rule; `|K15 − G7|` is the panel's error estimate. The panel
//! with the largest estimate is bisected until the summed estimate meets
//! `max(abs_tol, rel_tol·|integral|)` or the subdivision budget is spent.
use serde::{Deserialize, Serialize};

use crate::numerics::errors::{NumericError, NumericResult};

/// Kronrod nodes on `[0, 1]` (symmetric), outermost first.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

/// Kronrod weights matching [`XGK`].
const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Gauss weights for the odd-indexed Kronrod nodes `XGK[1], XGK[3], XGK[5], XGK[7]`.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

/// QuadratureOptions: stopping rules for [`integrate`].
///
/// Fields
/// ------
/// - `rel_tol`: relative error target, `≥ 0`. Default `1e-3`.
/// - `abs_tol`: absolute error target, `≥ 0`. Default `0`.
/// - `max_subdivisions`: maximum number of panels, `≥ 1`. Default `50`.
///
/// At least one of the two tolerances must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureOptions {
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_subdivisions: usize,
}

impl QuadratureOptions {
    /// Construct validated quadrature options.
    ///
    /// # Errors
    /// - [`NumericError::InvalidTolerance`] for negative or non-finite
    ///   tolerances, two zero tolerances, or a zero subdivision budget.
    pub fn new(rel_tol: f64, abs_tol: f64, max_subdivisions: usize) -> NumericResult<Self> {
        for (name, value) in [("rel_tol", rel_tol), ("abs_tol", abs_tol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(NumericError::InvalidTolerance {
                    name,
                    value,
                    reason: "must be finite and non-negative",
                });
            }
        }
        if rel_tol == 0.0 && abs_tol == 0.0 {
            return Err(NumericError::InvalidTolerance {
                name: "rel_tol",
                value: rel_tol,
                reason: "at least one of rel_tol and abs_tol must be positive",
            });
        }
        if max_subdivisions == 0 {
            return Err(NumericError::InvalidTolerance {
                name: "max_subdivisions",
                value: 0.0,
                reason: "must be at least one",
            });
        }
        Ok(Self { rel_tol, abs_tol, max_subdivisions })
    }
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self { rel_tol: 1e-3, abs_tol: 0.0, max_subdivisions: 50 }
    }
}

/// Result of [`integrate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureOutcome {
    pub value: f64,
    pub abs_error: f64,
    pub n_intervals: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Panel {
    a: f64,
    b: f64,
    value: f64,
    error: f64,
}

/// integrate: `∫ₐᵇ f(x) dx` by adaptive G7-K15.
///
/// Parameters
/// ----------
/// - `f`: integrand; errors abort the integration and are returned.
/// - `a`, `b`: finite limits; `a > b` yields the negated integral.
/// - `opts`: stopping rules.
///
/// Returns
/// -------
/// [`QuadratureOutcome`]; `converged == false` means the subdivision budget
/// ran out before the tolerance was met and `value` is the best estimate.
///
/// Errors
/// ------
/// - [`NumericError::InvalidDomain`] for non-finite limits.
/// - [`NumericError::NonFiniteDensity`] when `f` returns a non-finite value.
/// - Any error raised by `f`.
pub fn integrate<F>(f: F, a: f64, b: f64, opts: &QuadratureOptions) -> NumericResult<QuadratureOutcome>
where
    F: Fn(f64) -> NumericResult<f64>,
{
    if !(a.is_finite() && b.is_finite()) {
        return Err(NumericError::InvalidDomain { lower: a, upper: b });
    }
    if a == b {
        return Ok(QuadratureOutcome { value: 0.0, abs_error: 0.0, n_intervals: 0, converged: true });
    }
    if a > b {
        let out = integrate(f, b, a, opts)?;
        return Ok(QuadratureOutcome { value: -out.value, ..out });
    }

    let mut panels = vec![kronrod_panel(&f, a, b)?];
    loop {
        let value: f64 = panels.iter().map(|p| p.value).sum();
        let abs_error: f64 = panels.iter().map(|p| p.error).sum();
        let target = opts.abs_tol.max(opts.rel_tol * value.abs());
        let converged = abs_error <= target;
        if converged || panels.len() >= opts.max_subdivisions {
            return Ok(QuadratureOutcome { value, abs_error, n_intervals: panels.len(), converged });
        }
        let worst = panels
            .iter()
            .enumerate()
            .max_by(|(_, p), (_, q)| p.error.total_cmp(&q.error))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let panel = panels.swap_remove(worst);
        let mid = 0.5 * (panel.a + panel.b);
        panels.push(kronrod_panel(&f, panel.a, mid)?);
        panels.push(kronrod_panel(&f, mid, panel.b)?);
    }
}

// ---- Helper methods ----

fn kronrod_panel<F>(f: &F, a: f64, b: f64) -> NumericResult<Panel>
where
    F: Fn(f64) -> NumericResult<f64>,
{
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);
    let eval = |x: f64| -> NumericResult<f64> {
        let value = f(x)?;
        if !value.is_finite() {
            return Err(NumericError::NonFiniteDensity { x, value });
        }
        Ok(value)
    };

    let fc = eval(center)?;
    let mut kronrod = WGK[7] * fc;
    let mut gauss = WG[3] * fc;
    for (i, (&x, &w)) in XGK[..7].iter().zip(&WGK[..7]).enumerate() {
        let pair = eval(center - half * x)? + eval(center + half * x)?;
        kronrod += w * pair;
        if i % 2 == 1 {
            gauss += WG[i / 2] * pair;
        }
    }
    Ok(Panel { a, b, value: kronrod * half, error: ((kronrod - gauss) * half).abs() })
}
