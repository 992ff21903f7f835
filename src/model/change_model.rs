//! model::change_model: the aggregate change model and batch inference.
//!
//! Purpose
//! -------
//! Hold the ordered change-direction models of one trained model plus the
//! implicit null class, and score batches of observations against all
//! classes.
//!
//! Key behaviors
//! -------------
//! - [`ChangeModel::compute_log_likelihood`] computes, per sample and
//!   class, the log-evidence and the MAP magnitude ("peak"):
//!   - class 0 ("no change"): `log N(Δy; 0, Σₙ)`;
//!   - class `k ≥ 1`: `f(peak) + ln ∫ exp(f − f(peak))` over the interval
//!     returned by the range finder, where `f` is the direction's
//!     magnitude log-posterior.
//! - [`ChangeModel::predict`] adds the log class priors, normalizes each
//!   row in log space, and takes the first arg-max as the prediction.
//! - Samples are scored in parallel on `rayon`, optionally inside a
//!   dedicated pool of `InferenceOptions::n_threads` workers.
//!
//! Invariants & assumptions
//! ------------------------
//! - `n_classes = models.len() + 1`; all models share one `n_dim`.
//! - Samples never share mutable state; each owns its output row.
//! - A sample with any non-finite input gets an all-zero log-probability
//!   row and zero peaks, and is flagged invalid. Its posterior therefore
//!   equals the normalized class priors.
//! - A class whose score cannot be computed (singular covariance, invalid
//!   prior scale, …) gets [`FAILED_CLASS_LOG_PROB`]; the sample is flagged
//!   degenerate and a `ClassFailure` diagnostic carries the noise
//!   variances. The batch always completes.
//!
//! Conventions
//! -----------
//! - Inputs: `y` and `dy` are `n_samples × n_dim`, `sigma_n` is
//!   `n_samples × n_dim × n_dim`. Shape errors are reported before any
//!   sample is processed.
//!
//! Downstream usage
//! ----------------
//! - Front-ends map [`Inference::posteriors`], [`Inference::predictions`],
//!   and [`Inference::peaks`] back to spatial coordinates.
//!
//! Testing notes
//! -------------
//! - Unit tests use hand-built constant regressors so that the evidence of
//!   each class is known in closed form; the end-to-end training scenario
//!   lives in `tests/`.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    model::{
        diagnostics::{BoundSide, Diagnostic, Diagnostics, ProgressCounter, ProgressSink},
        direction_model::ChangeDirectionModel,
        errors::{ChangeError, ChangeResult},
    },
    numerics::{
        errors::NumericResult,
        linalg::{gaussian_log_density, to_dmatrix, to_dvector},
        quadrature::{QuadratureOptions, integrate},
        range::{RangeOptions, find_range},
    },
};

/// Log-probability assigned to a class whose score could not be computed.
pub const FAILED_CLASS_LOG_PROB: f64 = -1e3;

/// Name of the null class in [`ChangeModel::class_names`].
pub const NO_CHANGE: &str = "no change";

/// InferenceOptions: numerical settings for batch inference.
///
/// Fields
/// ------
/// - `range`: peak / interval search settings.
/// - `quadrature`: evidence-integral settings (`rel_tol = 1e-3` by default).
/// - `n_threads`: size of a dedicated worker pool; `None` uses the global
///   `rayon` pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub range: RangeOptions,
    pub quadrature: QuadratureOptions,
    pub n_threads: Option<usize>,
}

impl InferenceOptions {
    /// # Errors
    /// - [`ChangeError::InvalidOption`] when `n_threads == Some(0)`.
    pub fn new(
        range: RangeOptions, quadrature: QuadratureOptions, n_threads: Option<usize>,
    ) -> ChangeResult<Self> {
        if n_threads == Some(0) {
            return Err(ChangeError::InvalidOption {
                name: "n_threads",
                value: 0.0,
                reason: "worker pool needs at least one thread",
            });
        }
        Ok(Self { range, quadrature, n_threads })
    }
}

/// Per-sample, per-class scores from [`ChangeModel::compute_log_likelihood`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogLikelihoods {
    /// `n_samples × n_classes` log-evidence.
    pub log_probabilities: Array2<f64>,
    /// `n_samples × n_classes` MAP magnitudes (0 for the null class).
    pub peaks: Array2<f64>,
    /// Samples with non-finite inputs.
    pub invalid: Vec<bool>,
    /// Samples where at least one class received the failure sentinel.
    pub degenerate: Vec<bool>,
    pub diagnostics: Diagnostics,
}

/// Output of [`ChangeModel::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// `n_samples × n_classes`, rows sum to 1.
    pub posteriors: Array2<f64>,
    /// Arg-max class per sample (0 = no change).
    pub predictions: Array1<usize>,
    pub peaks: Array2<f64>,
    pub log_probabilities: Array2<f64>,
    pub invalid: Vec<bool>,
    pub degenerate: Vec<bool>,
    pub diagnostics: Diagnostics,
}

/// ChangeModel: named collection of change-direction models.
///
/// Deserialization goes through [`ChangeModel::new`], so a stored model is
/// validated exactly like a freshly trained one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChangeModelRecord", into = "ChangeModelRecord")]
pub struct ChangeModel {
    model_name: String,
    models: Vec<ChangeDirectionModel>,
}

/// On-disk layout of a [`ChangeModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChangeModelRecord {
    model_name: String,
    models: Vec<ChangeDirectionModel>,
}

impl TryFrom<ChangeModelRecord> for ChangeModel {
    type Error = ChangeError;

    fn try_from(record: ChangeModelRecord) -> Result<Self, Self::Error> {
        ChangeModel::new(record.model_name, record.models)
    }
}

impl From<ChangeModel> for ChangeModelRecord {
    fn from(model: ChangeModel) -> Self {
        Self { model_name: model.model_name, models: model.models }
    }
}

/// Scores of one sample.
struct SampleScores {
    log_probs: Vec<f64>,
    peaks: Vec<f64>,
    invalid: bool,
    degenerate: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Evidence of one direction class for one sample.
struct ClassScore {
    log_evidence: f64,
    peak: f64,
    diagnostics: Vec<Diagnostic>,
}

impl ChangeModel {
    /// Build a change model from its direction models.
    ///
    /// # Errors
    /// - [`ChangeError::EmptyModel`] when `models` is empty.
    /// - [`ChangeError::ShapeMismatch`] when the models disagree on `n_dim`.
    /// - Any validation error of the individual models.
    pub fn new(model_name: impl Into<String>, models: Vec<ChangeDirectionModel>) -> ChangeResult<Self> {
        let first = models.first().ok_or(ChangeError::EmptyModel)?;
        let n_dim = first.n_dim();
        for (index, model) in models.iter().enumerate() {
            model.validate().map_err(|err| match err {
                ChangeError::InvalidPriorWeight { value, .. } => {
                    ChangeError::InvalidPriorWeight { index, value }
                }
                other => other,
            })?;
            if model.n_dim() != n_dim {
                return Err(ChangeError::ShapeMismatch {
                    context: "change model dimensionality",
                    expected: n_dim,
                    found: model.n_dim(),
                });
            }
        }
        Ok(Self { model_name: model_name.into(), models })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn models(&self) -> &[ChangeDirectionModel] {
        &self.models
    }

    /// Number of classes including the null class.
    pub fn n_classes(&self) -> usize {
        self.models.len() + 1
    }

    pub fn n_dim(&self) -> usize {
        self.models[0].n_dim()
    }

    /// `["no change", <model names>…]`.
    pub fn class_names(&self) -> Vec<String> {
        std::iter::once(NO_CHANGE.to_string())
            .chain(self.models.iter().map(|m| m.name().to_string()))
            .collect()
    }

    /// Class priors `[1, w₁, …, w_K] / (1 + Σ w)`.
    pub fn priors(&self) -> Array1<f64> {
        let raw: Array1<f64> =
            std::iter::once(1.0).chain(self.models.iter().map(|m| m.prior_weight())).collect();
        let total = raw.sum();
        raw / total
    }

    /// predict: posterior class probabilities for a batch.
    ///
    /// Parameters
    /// ----------
    /// - `y`: `n_samples × n_dim` baseline signal.
    /// - `dy`: `n_samples × n_dim` observed change.
    /// - `sigma_n`: `n_samples × n_dim × n_dim` noise covariances.
    /// - `opts`: numerical settings.
    ///
    /// Returns
    /// -------
    /// [`Inference`] with posteriors, predictions, peaks, the raw
    /// log-evidence, validity flags, and diagnostics.
    ///
    /// Errors
    /// ------
    /// - [`ChangeError::ShapeMismatch`] for inconsistent input shapes.
    /// - [`ChangeError::ThreadPool`] when a dedicated pool cannot be built.
    pub fn predict(
        &self, y: ArrayView2<'_, f64>, dy: ArrayView2<'_, f64>, sigma_n: ArrayView3<'_, f64>,
        opts: &InferenceOptions,
    ) -> ChangeResult<Inference> {
        self.predict_with_progress(y, dy, sigma_n, opts, None)
    }

    /// [`ChangeModel::predict`] with a progress callback invoked once per
    /// finished sample.
    pub fn predict_with_progress(
        &self, y: ArrayView2<'_, f64>, dy: ArrayView2<'_, f64>, sigma_n: ArrayView3<'_, f64>,
        opts: &InferenceOptions, progress: Option<&dyn ProgressSink>,
    ) -> ChangeResult<Inference> {
        info!(n_samples = y.nrows(), model = %self.model_name, "running inference");
        let lls = self.compute_log_likelihood_with_progress(y, dy, sigma_n, opts, progress)?;
        let posteriors = posteriors_from_log_probabilities(lls.log_probabilities.view(), self.priors().view());
        let predictions = posteriors.outer_iter().map(first_argmax).collect();
        Ok(Inference {
            posteriors,
            predictions,
            peaks: lls.peaks,
            log_probabilities: lls.log_probabilities,
            invalid: lls.invalid,
            degenerate: lls.degenerate,
            diagnostics: lls.diagnostics,
        })
    }

    /// compute_log_likelihood: per-class log-evidence and peaks.
    ///
    /// See the module docs for the per-class definition and the handling
    /// of invalid samples and failed classes.
    ///
    /// # Errors
    /// - [`ChangeError::ShapeMismatch`] for inconsistent input shapes.
    /// - [`ChangeError::ThreadPool`] when a dedicated pool cannot be built.
    pub fn compute_log_likelihood(
        &self, y: ArrayView2<'_, f64>, dy: ArrayView2<'_, f64>, sigma_n: ArrayView3<'_, f64>,
        opts: &InferenceOptions,
    ) -> ChangeResult<LogLikelihoods> {
        self.compute_log_likelihood_with_progress(y, dy, sigma_n, opts, None)
    }

    fn compute_log_likelihood_with_progress(
        &self, y: ArrayView2<'_, f64>, dy: ArrayView2<'_, f64>, sigma_n: ArrayView3<'_, f64>,
        opts: &InferenceOptions, progress: Option<&dyn ProgressSink>,
    ) -> ChangeResult<LogLikelihoods> {
        self.check_shapes(y, dy, sigma_n)?;
        let n_samples = y.nrows();
        let counter = ProgressCounter::new(progress, n_samples);

        let run = || -> Vec<SampleScores> {
            (0..n_samples)
                .into_par_iter()
                .map(|idx| {
                    let scores = self.score_sample(
                        idx,
                        y.row(idx),
                        dy.row(idx),
                        sigma_n.index_axis(Axis(0), idx),
                        opts,
                    );
                    counter.tick();
                    scores
                })
                .collect()
        };
        let samples = match opts.n_threads {
            Some(n) => rayon::ThreadPoolBuilder::new().num_threads(n).build()?.install(run),
            None => run(),
        };

        let n_classes = self.n_classes();
        let mut log_probabilities = Array2::<f64>::zeros((n_samples, n_classes));
        let mut peaks = Array2::<f64>::zeros((n_samples, n_classes));
        let mut invalid = Vec::with_capacity(n_samples);
        let mut degenerate = Vec::with_capacity(n_samples);
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(self.models.iter().filter_map(ChangeDirectionModel::unit_norm_diagnostic));
        for (idx, sample) in samples.into_iter().enumerate() {
            log_probabilities.row_mut(idx).assign(&Array1::from(sample.log_probs));
            peaks.row_mut(idx).assign(&Array1::from(sample.peaks));
            invalid.push(sample.invalid);
            degenerate.push(sample.degenerate);
            diagnostics.extend(sample.diagnostics);
        }
        let n_invalid = invalid.iter().filter(|f| **f).count();
        let n_degenerate = degenerate.iter().filter(|f| **f).count();
        if n_invalid > 0 || n_degenerate > 0 {
            warn!(n_invalid, n_degenerate, n_samples, "some samples were not fully scored");
        }
        Ok(LogLikelihoods { log_probabilities, peaks, invalid, degenerate, diagnostics })
    }

    // ---- Helper methods ----

    fn check_shapes(
        &self, y: ArrayView2<'_, f64>, dy: ArrayView2<'_, f64>, sigma_n: ArrayView3<'_, f64>,
    ) -> ChangeResult<()> {
        let n_samples = y.nrows();
        let n_dim = self.n_dim();
        let checks = [
            ("baseline dimensionality", n_dim, y.ncols()),
            ("delta sample count", n_samples, dy.nrows()),
            ("delta dimensionality", n_dim, dy.ncols()),
            ("noise covariance sample count", n_samples, sigma_n.shape()[0]),
            ("noise covariance rows", n_dim, sigma_n.shape()[1]),
            ("noise covariance columns", n_dim, sigma_n.shape()[2]),
        ];
        for (context, expected, found) in checks {
            if expected != found {
                return Err(ChangeError::ShapeMismatch { context, expected, found });
            }
        }
        Ok(())
    }

    fn score_sample(
        &self, idx: usize, y: ArrayView1<'_, f64>, dy: ArrayView1<'_, f64>,
        sigma_n: ArrayView2<'_, f64>, opts: &InferenceOptions,
    ) -> SampleScores {
        let n_classes = self.n_classes();
        let finite = y.iter().chain(dy.iter()).chain(sigma_n.iter()).all(|v| v.is_finite());
        if !finite {
            debug!(sample = idx, "non-finite input; sample marked invalid");
            return SampleScores {
                log_probs: vec![0.0; n_classes],
                peaks: vec![0.0; n_classes],
                invalid: true,
                degenerate: false,
                diagnostics: vec![Diagnostic::InvalidSample { sample: idx }],
            };
        }

        let dy = to_dvector(dy);
        let sigma_n = to_dmatrix(sigma_n);
        let mut scores = SampleScores {
            log_probs: vec![0.0; n_classes],
            peaks: vec![0.0; n_classes],
            invalid: false,
            degenerate: false,
            diagnostics: Vec::new(),
        };

        match gaussian_log_density(&dy, sigma_n.clone()) {
            Ok(value) => scores.log_probs[0] = value,
            Err(err) => record_failure(&mut scores, idx, 0, &err.to_string(), &sigma_n),
        }
        for (offset, model) in self.models.iter().enumerate() {
            let class = offset + 1;
            match score_class(model, idx, class, y, &dy, &sigma_n, opts) {
                Ok(score) => {
                    scores.log_probs[class] = score.log_evidence;
                    scores.peaks[class] = score.peak;
                    scores.diagnostics.extend(score.diagnostics);
                }
                Err(err) => record_failure(&mut scores, idx, class, &err.to_string(), &sigma_n),
            }
        }
        scores
    }
}

/// Evidence and peak of one direction class.
fn score_class(
    model: &ChangeDirectionModel, sample: usize, class: usize, y: ArrayView1<'_, f64>,
    dy: &DVector<f64>, sigma_n: &DMatrix<f64>, opts: &InferenceOptions,
) -> NumericResult<ClassScore> {
    let posterior = model.log_posterior(y, dy, sigma_n)?;
    let f = |dv: f64| posterior.value(dv);
    let range = find_range(&f, model.constraint().bounds(), &opts.range)?;
    let f_peak = posterior.value(range.peak)?;
    let quad = integrate(
        |dv| Ok((posterior.value(dv)? - f_peak).exp()),
        range.lower,
        range.upper,
        &opts.quadrature,
    )?;

    let mut diagnostics = Vec::new();
    for (side, reason) in [(BoundSide::Lower, &range.lower_fallback), (BoundSide::Upper, &range.upper_fallback)] {
        if let Some(err) = reason {
            diagnostics.push(Diagnostic::RangeFallback { sample, class, side, reason: err.to_string() });
        }
    }
    if !quad.converged {
        debug!(sample, class, abs_error = quad.abs_error, "evidence integral hit subdivision limit");
        diagnostics.push(Diagnostic::QuadratureNotConverged {
            sample,
            class,
            value: quad.value,
            abs_error: quad.abs_error,
        });
    }
    let log_evidence = if quad.value > 0.0 { f_peak + quad.value.ln() } else { f64::NEG_INFINITY };
    Ok(ClassScore { log_evidence, peak: range.peak, diagnostics })
}

fn record_failure(
    scores: &mut SampleScores, sample: usize, class: usize, reason: &str, sigma_n: &DMatrix<f64>,
) {
    let noise_variances: Vec<f64> = sigma_n.diagonal().iter().copied().collect();
    warn!(sample, class, reason, ?noise_variances, "class score failed; using sentinel log-probability");
    scores.log_probs[class] = FAILED_CLASS_LOG_PROB;
    scores.degenerate = true;
    scores.diagnostics.push(Diagnostic::ClassFailure {
        sample,
        class,
        reason: reason.to_string(),
        noise_variances,
    });
}

/// Row-normalized `exp(log_prob + log_prior)`, computed in log space.
pub fn posteriors_from_log_probabilities(
    log_probabilities: ArrayView2<'_, f64>, priors: ArrayView1<'_, f64>,
) -> Array2<f64> {
    let log_priors = priors.mapv(f64::ln);
    let mut out = &log_probabilities + &log_priors;
    for mut row in out.outer_iter_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        if !max.is_finite() {
            row.assign(&priors);
            continue;
        }
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row /= total;
    }
    out
}

/// Index of the first maximum; NaN entries are skipped.
pub fn first_argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (idx, &value) in row.iter().enumerate() {
        if value > best_value {
            best = idx;
            best_value = value;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        direction::vector::{DirectionVector, DomainConstraint},
        regression::ridge::PolyRidge,
    };
    use approx::assert_relative_eq;
    use ndarray::{Array3, array};
    use std::sync::Arc;

    fn constant_regressor(values: &[f64], n_dim: usize) -> Arc<PolyRidge> {
        let x = Array2::from_shape_fn((4, n_dim), |(i, j)| (i * n_dim + j) as f64);
        let y = Array2::from_shape_fn((4, values.len()), |(_, j)| values[j]);
        Arc::new(PolyRidge::fit(x.view(), y.view(), 0, 0.0).unwrap())
    }

    /// Two unit directions in 2-D with tiny signal covariance.
    fn toy_model() -> ChangeModel {
        let link = [-6.0, 0.0, -6.0];
        let models = vec![
            ChangeDirectionModel::new(
                "a, twosided",
                DirectionVector::unit("a"),
                DomainConstraint::TwoSided,
                1.0,
                constant_regressor(&[1.0, 0.0], 2),
                constant_regressor(&link, 2),
            )
            .unwrap(),
            ChangeDirectionModel::new(
                "b, positive",
                DirectionVector::unit("b"),
                DomainConstraint::Positive,
                1.0,
                constant_regressor(&[0.0, 1.0], 2),
                constant_regressor(&link, 2),
            )
            .unwrap(),
        ];
        ChangeModel::new("toy", models).unwrap()
    }

    fn noise(n: usize, diag: [f64; 2]) -> Array3<f64> {
        Array3::from_shape_fn((n, 2, 2), |(_, i, j)| if i == j { diag[i] } else { 0.0 })
    }

    #[test]
    // Purpose
    // -------
    // A clear change along `a` is attributed to class 1, with rows summing
    // to one.
    //
    // Given
    // -----
    // - Δy = (0.5, 0), Σₙ = 0.01·I, equal prior weights.
    //
    // Expect
    // ------
    // - Prediction 1, posterior > 0.9, peak ≈ 0.5.
    fn clear_change_is_attributed_to_its_direction() {
        // Arrange
        let model = toy_model();
        let y = array![[0.0, 0.0]];
        let dy = array![[0.5, 0.0]];

        // Act
        let out = model
            .predict(y.view(), dy.view(), noise(1, [0.01, 0.01]).view(), &InferenceOptions::default())
            .unwrap();

        // Assert
        assert_eq!(out.predictions[0], 1);
        assert!(out.posteriors[[0, 1]] > 0.9);
        assert_relative_eq!(out.posteriors.row(0).sum(), 1.0, epsilon = 1e-12);
        // The exponential prior pulls the peak slightly towards zero.
        assert!(out.peaks[[0, 1]] > 0.4 && out.peaks[[0, 1]] < 0.5);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn no_change_prefers_null_class() {
        let model = toy_model();
        let out = model
            .predict(
                array![[0.0, 0.0]].view(),
                array![[0.0, 0.0]].view(),
                noise(1, [0.01, 0.01]).view(),
                &InferenceOptions::default(),
            )
            .unwrap();
        assert_eq!(out.predictions[0], 0);
    }

    #[test]
    // Purpose
    // -------
    // Non-finite inputs give an all-zero log-probability row, posteriors
    // equal to the priors, and an invalid flag, without touching the other
    // rows.
    fn non_finite_row_is_flagged_and_uniform() {
        let model = toy_model();
        let y = array![[0.0, f64::NAN], [0.0, 0.0]];
        let dy = array![[0.5, 0.0], [0.5, 0.0]];

        let out = model
            .predict(y.view(), dy.view(), noise(2, [0.01, 0.01]).view(), &InferenceOptions::default())
            .unwrap();

        assert_eq!(out.invalid, vec![true, false]);
        assert!(out.log_probabilities.row(0).iter().all(|v| *v == 0.0));
        for p in out.posteriors.row(0) {
            assert_relative_eq!(*p, 1.0 / 3.0, epsilon = 1e-12);
        }
        assert_eq!(out.predictions[1], 1);
    }

    #[test]
    // Purpose
    // -------
    // A singular noise covariance gives the null class the sentinel and a
    // diagnostic, while the other sample in the batch is unaffected.
    fn singular_noise_uses_sentinel_without_aborting() {
        let model = toy_model();
        let y = array![[0.0, 0.0], [0.0, 0.0]];
        let dy = array![[0.5, 0.0], [0.5, 0.0]];
        let mut sigma_n = noise(2, [0.01, 0.01]);
        sigma_n[[0, 1, 1]] = 0.0;
        let opts = InferenceOptions::default();

        let out = model.compute_log_likelihood(y.view(), dy.view(), sigma_n.view(), &opts).unwrap();
        let reference = model
            .compute_log_likelihood(
                y.slice(ndarray::s![1.., ..]),
                dy.slice(ndarray::s![1.., ..]),
                noise(1, [0.01, 0.01]).view(),
                &opts,
            )
            .unwrap();

        assert_eq!(out.log_probabilities[[0, 0]], FAILED_CLASS_LOG_PROB);
        assert_eq!(out.degenerate, vec![true, false]);
        assert!(out.diagnostics.failed_classes().contains(&(0, 0)));
        assert_eq!(out.log_probabilities.row(1), reference.log_probabilities.row(0));
    }

    #[test]
    // Purpose
    // -------
    // Integration limits whose root finder runs out of iterations fall back
    // to the search radius, are reported, and still give a proper posterior.
    //
    // Given
    // -----
    // - Δy = (0.5, 0), Σₙ = 1e-4·I, so the posterior is far narrower than
    //   the search radius; range max_iter = 3.
    //
    // Expect
    // ------
    // - At least one `RangeFallback` for sample 0, prediction 1, row sums to one.
    fn unconverged_range_search_is_reported() {
        // Arrange
        let model = toy_model();
        let opts = InferenceOptions {
            range: RangeOptions::new(1e-2, 0.2, 3).unwrap(),
            ..Default::default()
        };

        // Act
        let out = model
            .predict(
                array![[0.0, 0.0]].view(),
                array![[0.5, 0.0]].view(),
                noise(1, [1e-4, 1e-4]).view(),
                &opts,
            )
            .unwrap();

        // Assert
        assert!(out.diagnostics.fallback_count() > 0);
        assert!(out.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::RangeFallback { sample: 0, .. }
        )));
        assert_eq!(out.predictions[0], 1);
        assert_relative_eq!(out.posteriors.row(0).sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn non_unit_directions_are_reported_with_each_batch() {
        let mut models = toy_model().models().to_vec();
        models.push(
            ChangeDirectionModel::new(
                "2.0*a, positive",
                DirectionVector::new(vec![("a", 2.0)]).unwrap(),
                DomainConstraint::Positive,
                1.0,
                constant_regressor(&[2.0, 0.0], 2),
                constant_regressor(&[-6.0, 0.0, -6.0], 2),
            )
            .unwrap(),
        );
        let model = ChangeModel::new("mixed", models).unwrap();

        let out = model
            .compute_log_likelihood(
                array![[0.0, 0.0]].view(),
                array![[0.0, 0.0]].view(),
                noise(1, [0.01, 0.01]).view(),
                &InferenceOptions::default(),
            )
            .unwrap();

        let reported: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::NonUnitDirection { .. }))
            .collect();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].sample(), None);
    }

    #[test]
    fn shape_mismatch_is_reported_before_scoring() {
        let model = toy_model();
        let err = model
            .compute_log_likelihood(
                array![[0.0, 0.0, 0.0]].view(),
                array![[0.0, 0.0]].view(),
                noise(1, [1.0, 1.0]).view(),
                &InferenceOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ChangeError::ShapeMismatch { .. }));
    }

    #[test]
    fn dedicated_pool_matches_global_pool() {
        let model = toy_model();
        let y = array![[0.0, 0.0], [0.1, 0.2], [0.3, 0.1]];
        let dy = array![[0.5, 0.0], [0.0, 0.4], [0.0, 0.0]];
        let sigma_n = noise(3, [0.01, 0.02]);
        let pooled = InferenceOptions::new(RangeOptions::default(), QuadratureOptions::default(), Some(2))
            .unwrap();

        let a = model.predict(y.view(), dy.view(), sigma_n.view(), &InferenceOptions::default()).unwrap();
        let b = model.predict(y.view(), dy.view(), sigma_n.view(), &pooled).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn priors_and_class_names_include_null_class() {
        let model = toy_model();
        assert_eq!(model.n_classes(), 3);
        assert_eq!(model.class_names(), vec!["no change", "a, twosided", "b, positive"]);
        assert_eq!(model.priors(), array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
    }

    #[test]
    fn log_space_normalization_handles_large_magnitudes() {
        let lp = array![[-2000.0, -1000.0, -1000.0 - 2.0_f64.ln()]];
        let post = posteriors_from_log_probabilities(lp.view(), array![0.5, 0.25, 0.25].view());
        assert_relative_eq!(post[[0, 1]], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(post[[0, 2]], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(first_argmax(post.row(0)), 1);
    }
}
