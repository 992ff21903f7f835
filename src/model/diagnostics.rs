//! model::diagnostics: structured, non-fatal events from training and
//! inference.
//!
//! Every recoverable problem (finite-difference instability, a class whose
//! likelihood could not be evaluated, a fallback integration limit, …) is
//! recorded as a [`Diagnostic`] and returned next to the results. The same
//! events are also emitted as `tracing` warnings, but callers never have to
//! install a subscriber to see them.
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Which end of an integration interval an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundSide {
    Lower,
    Upper,
}

/// One recoverable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// `|y₂ − y₁|` exceeded `1000 · step` for a training sample.
    DerivativeInstability { sample: usize, direction: String, max_jump: f64, threshold: f64 },

    /// A direction did not have unit norm where one was expected.
    NonUnitDirection { direction: String, norm: f64 },

    /// A sample contained a non-finite input and was given an
    /// uninformative log-probability row.
    InvalidSample { sample: usize },

    /// A class score could not be computed; the sentinel was used.
    ClassFailure { sample: usize, class: usize, reason: String, noise_variances: Vec<f64> },

    /// An integration limit fell back to `peak ± search_radius`.
    RangeFallback { sample: usize, class: usize, side: BoundSide, reason: String },

    /// The evidence integral stopped at its subdivision budget.
    QuadratureNotConverged { sample: usize, class: usize, value: f64, abs_error: f64 },
}

impl Diagnostic {
    /// Sample index the event refers to, if any.
    pub fn sample(&self) -> Option<usize> {
        match self {
            Diagnostic::DerivativeInstability { sample, .. }
            | Diagnostic::InvalidSample { sample }
            | Diagnostic::ClassFailure { sample, .. }
            | Diagnostic::RangeFallback { sample, .. }
            | Diagnostic::QuadratureNotConverged { sample, .. } => Some(*sample),
            Diagnostic::NonUnitDirection { .. } => None,
        }
    }
}

/// Ordered list of [`Diagnostic`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Number of finite-difference instability events.
    pub fn instability_count(&self) -> usize {
        self.iter().filter(|d| matches!(d, Diagnostic::DerivativeInstability { .. })).count()
    }

    /// `(sample, class)` pairs that received the failure sentinel.
    pub fn failed_classes(&self) -> Vec<(usize, usize)> {
        self.iter()
            .filter_map(|d| match d {
                Diagnostic::ClassFailure { sample, class, .. } => Some((*sample, *class)),
                _ => None,
            })
            .collect()
    }

    /// Number of integration limits that fell back to the search radius.
    pub fn fallback_count(&self) -> usize {
        self.iter().filter(|d| matches!(d, Diagnostic::RangeFallback { .. })).count()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Optional callback for reporting how many work items have finished.
///
/// Called from worker threads; implementations must be cheap and
/// thread-safe.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, done: usize, total: usize);
}

/// Shared completion counter that forwards to an optional [`ProgressSink`].
pub(crate) struct ProgressCounter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    done: AtomicUsize,
    total: usize,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(sink: Option<&'a dyn ProgressSink>, total: usize) -> Self {
        Self { sink, done: AtomicUsize::new(0), total }
    }

    pub(crate) fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sink) = self.sink {
            sink.on_progress(done, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<(usize, usize)>>);

    impl ProgressSink for Recorder {
        fn on_progress(&self, done: usize, total: usize) {
            self.0.lock().unwrap().push((done, total));
        }
    }

    #[test]
    fn counters_summarize_entries() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::InvalidSample { sample: 3 });
        diags.push(Diagnostic::ClassFailure {
            sample: 4,
            class: 0,
            reason: "singular".to_string(),
            noise_variances: vec![0.01, 0.0],
        });
        diags.push(Diagnostic::DerivativeInstability {
            sample: 1,
            direction: "a".to_string(),
            max_jump: 1.0,
            threshold: 1e-3,
        });

        assert_eq!(diags.len(), 3);
        assert_eq!(diags.instability_count(), 1);
        assert_eq!(diags.failed_classes(), vec![(4, 0)]);
        assert_eq!(diags.fallback_count(), 0);
        assert_eq!(diags.iter().filter_map(Diagnostic::sample).collect::<Vec<_>>(), vec![3, 4, 1]);
    }

    #[test]
    fn progress_counter_reports_every_tick() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        let counter = ProgressCounter::new(Some(&recorder), 2);

        counter.tick();
        counter.tick();

        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn diagnostics_serialize_with_kind_tag() {
        let json = serde_json::to_string(&Diagnostic::InvalidSample { sample: 7 }).unwrap();
        assert_eq!(json, r#"{"kind":"invalid_sample","sample":7}"#);
    }
}
