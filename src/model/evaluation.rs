//! model::evaluation: accuracy summaries for simulated test batches.
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::model::{
    change_model::first_argmax,
    errors::{ChangeError, ChangeResult},
};

/// Summary of how well posteriors recover the true classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMeasures {
    /// Fraction of samples whose arg-max class is the true class. Rows
    /// containing NaN count as misclassified.
    pub accuracy: f64,
    /// Mean posterior of the true class over rows without NaN.
    pub true_posterior_mean: f64,
}

/// performance_measures: accuracy and mean true-class posterior.
///
/// Rows of `posteriors` are renormalized before use.
///
/// # Errors
/// - [`ChangeError::ShapeMismatch`] when `true_change` does not have one
///   entry per row, or a label is not a valid class index.
pub fn performance_measures(
    posteriors: ArrayView2<'_, f64>, true_change: ArrayView1<'_, usize>,
) -> ChangeResult<PerformanceMeasures> {
    let n_samples = posteriors.nrows();
    check_labels(true_change, n_samples, posteriors.ncols())?;
    if n_samples == 0 {
        return Ok(PerformanceMeasures { accuracy: f64::NAN, true_posterior_mean: f64::NAN });
    }

    let mut correct = 0usize;
    let mut posterior_sum = 0.0;
    let mut n_finite = 0usize;
    for (row, &label) in posteriors.outer_iter().zip(true_change) {
        if row.iter().any(|v| v.is_nan()) {
            continue;
        }
        let total = row.sum();
        if first_argmax(row) == label {
            correct += 1;
        }
        posterior_sum += row[label] / total;
        n_finite += 1;
    }
    let true_posterior_mean =
        if n_finite == 0 { f64::NAN } else { posterior_sum / n_finite as f64 };
    Ok(PerformanceMeasures { accuracy: correct as f64 / n_samples as f64, true_posterior_mean })
}

/// confusion_matrix: `n_classes × n_classes` table of true (rows) versus
/// predicted (columns) classes, each row normalized to sum to one.
///
/// Rows of classes that never occur stay zero.
///
/// # Errors
/// - [`ChangeError::ShapeMismatch`] for length mismatches or out-of-range
///   labels.
pub fn confusion_matrix(
    true_change: ArrayView1<'_, usize>, predictions: ArrayView1<'_, usize>, n_classes: usize,
) -> ChangeResult<Array2<f64>> {
    check_labels(true_change, predictions.len(), n_classes)?;
    check_labels(predictions, true_change.len(), n_classes)?;
    let mut counts = Array2::<f64>::zeros((n_classes, n_classes));
    for (&t, &p) in true_change.iter().zip(predictions) {
        counts[[t, p]] += 1.0;
    }
    for mut row in counts.outer_iter_mut() {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
    Ok(counts)
}

fn check_labels(labels: ArrayView1<'_, usize>, n_samples: usize, n_classes: usize) -> ChangeResult<()> {
    if labels.len() != n_samples {
        return Err(ChangeError::ShapeMismatch {
            context: "label count",
            expected: n_samples,
            found: labels.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(ChangeError::ShapeMismatch {
            context: "class label",
            expected: n_classes,
            found: label,
        });
    }
    Ok(())
}
