//! Per-dataset failure bookkeeping.
//!
//! One tracker lives for the duration of an atlas run. Every recoverable
//! resolution failure is appended under the identity of the dataset it
//! concerns, so the end-of-run report can list exactly which
//! (dataset, variable) pairs were skipped. Pure bookkeeping: recording never
//! influences resolution of other datasets.

use std::collections::BTreeMap;

/// A single recorded resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Logical variable that failed to resolve.
    pub variable: String,
    /// Human-readable reason, from the originating error.
    pub reason: String,
}

/// Append-only map from dataset identity to its resolution failures.
#[derive(Debug, Clone, Default)]
pub struct ErrorTracker {
    failures: BTreeMap<String, Vec<Failure>>,
}

impl ErrorTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `dataset_id`.
    pub fn record(
        &mut self,
        dataset_id: impl Into<String>,
        variable: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.failures.entry(dataset_id.into()).or_default().push(Failure {
            variable: variable.into(),
            reason: reason.into(),
        });
    }

    /// Failures recorded for one dataset, in insertion order.
    pub fn failures_for(&self, dataset_id: &str) -> &[Failure] {
        self.failures.get(dataset_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All recorded failures, keyed by dataset identity.
    pub fn all(&self) -> &BTreeMap<String, Vec<Failure>> {
        &self.failures
    }

    /// True if no failure has been recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Drop all entries. Called at the start of each atlas run.
    pub fn reset(&mut self) {
        self.failures.clear();
    }

    /// Render the end-of-run skip report.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "All datasets resolved successfully".to_string();
        }
        let mut out = String::from("Skipped (dataset: variables):\n");
        for (id, failures) in &self.failures {
            let vars: Vec<&str> = failures.iter().map(|f| f.variable.as_str()).collect();
            out.push_str(&format!("  {}: {}\n", id, vars.join(", ")));
        }
        out
    }
}
