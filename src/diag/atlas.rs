//! The atlas: every diagnostic group of one case, run over one dataset set.

use super::group::{DiagnosticGroup, OutputIndex};
use crate::data::{Dataset, StoreProvider};
use crate::errlog::ErrorTracker;
use crate::error::{AtlasError, Result};
use crate::resolve::VariableResolver;
use crate::sink::PlotSink;
use crate::vars::VariableCatalog;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// All diagnostic groups of one case/subcase, plus the datasets they run
/// over.
///
/// Reference datasets (observations, LES) and simulations are kept apart in
/// configuration but evaluated identically; references come first so the
/// sink draws them underneath.
#[derive(Debug, Clone)]
pub struct Atlas {
    /// Atlas name, used for the report heading.
    pub name: String,
    /// Case all datasets must belong to, e.g. "ARMCU".
    pub case: String,
    /// Subcase all datasets must belong to, e.g. "REF".
    pub subcase: String,
    /// Reference datasets.
    pub references: Vec<Dataset>,
    /// Simulation datasets.
    pub simulations: Vec<Dataset>,
    /// Diagnostic groups, rendered in order.
    pub groups: Vec<DiagnosticGroup>,
    /// Logical-variable registry shared by every group.
    pub catalog: VariableCatalog,
    tracker: ErrorTracker,
}

impl Atlas {
    /// Create an empty atlas for one case/subcase.
    pub fn new(
        name: impl Into<String>,
        case: impl Into<String>,
        subcase: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            case: case.into(),
            subcase: subcase.into(),
            references: Vec::new(),
            simulations: Vec::new(),
            groups: Vec::new(),
            catalog: VariableCatalog::standard(),
            tracker: ErrorTracker::new(),
        }
    }

    /// References followed by simulations, the order diagnostics see.
    pub fn datasets(&self) -> Vec<Dataset> {
        self.references.iter().chain(self.simulations.iter()).cloned().collect()
    }

    /// Reject datasets from another case/subcase and groups that fail their
    /// own validation.
    pub fn validate(&self) -> Result<()> {
        for ds in self.references.iter().chain(self.simulations.iter()) {
            if ds.case != self.case || ds.subcase != self.subcase {
                return Err(AtlasError::config(format!(
                    "dataset '{}' belongs to {}/{}, atlas covers {}/{}",
                    ds.name, ds.case, ds.subcase, self.case, self.subcase
                )));
            }
        }
        for group in &self.groups {
            group.validate()?;
        }
        Ok(())
    }

    /// Run every group, writing artifacts under `out_root/<group>/`.
    ///
    /// Returns the per-group output indexes. The failure tracker is reset at
    /// the start, so [`summary`](Self::summary) afterwards reflects exactly
    /// this run.
    pub fn run(
        &mut self,
        provider: &dyn StoreProvider,
        sink: &dyn PlotSink,
        out_root: &Path,
        compute: bool,
    ) -> Result<BTreeMap<String, OutputIndex>> {
        self.validate()?;
        self.tracker.reset();

        let datasets = self.datasets();
        for ds in &datasets {
            if !ds.is_valid() {
                warn!(dataset = %ds.id(), file = %ds.file.display(), "dataset file not found");
            }
        }

        let resolver = VariableResolver::new(&self.catalog);
        let mut indexes = BTreeMap::new();
        for group in &self.groups {
            info!(atlas = %self.name, group = %group.name, "running group");
            let index = group.run(
                &datasets,
                &resolver,
                provider,
                sink,
                out_root,
                compute,
                &mut self.tracker,
            )?;
            indexes.insert(group.name.clone(), index);
        }

        info!(atlas = %self.name, groups = indexes.len(), "atlas done");
        Ok(indexes)
    }

    /// Failures recorded by the last run.
    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    /// End-of-run skip report of the last run.
    pub fn summary(&self) -> String {
        self.tracker.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Field, MemoryProvider, MemoryStore};
    use crate::diag::{Diagnostic, DiagnosticKind};
    use crate::sink::RecordingSink;
    use ndarray::array;
    use tempfile::tempdir;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(Field {
            name: "shf".into(),
            long_name: "Sensible heat flux".into(),
            units: "W m-2".into(),
            data: array![10.0, 20.0].into_dyn(),
            time: array![0.0, 1.0],
            time_units: "hours since 1997-06-21 11:30:0.0".into(),
        });
        store
    }

    fn sample_atlas() -> Atlas {
        let mut atlas = Atlas::new("DIAGS", "ARMCU", "REF");
        atlas.references.push(Dataset::new("les", "ARMCU", "REF", "/nonexistent.nc"));
        atlas.simulations.push(Dataset::new("scm", "ARMCU", "REF", "/nonexistent.nc"));
        let mut group = DiagnosticGroup::new("surface", "Surface fluxes");
        group.diagnostics.push(Diagnostic::new(DiagnosticKind::TimeSeries, "shf"));
        atlas.groups.push(group);
        atlas
    }

    #[test]
    fn references_precede_simulations() {
        let atlas = sample_atlas();
        let names: Vec<String> = atlas.datasets().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["les", "scm"]);
    }

    #[test]
    fn foreign_case_dataset_is_rejected() {
        let mut atlas = sample_atlas();
        atlas.simulations.push(Dataset::new("scm2", "BOMEX", "REF", "/nonexistent.nc"));
        let err = atlas.validate().unwrap_err();
        assert!(matches!(err, AtlasError::Config(_)));
    }

    #[test]
    fn run_produces_index_and_resets_tracker() {
        let mut atlas = sample_atlas();
        let mut provider = MemoryProvider::new();
        provider.register("les", store());
        provider.register("scm", store());
        let sink = RecordingSink::new();
        let dir = tempdir().unwrap();

        // A stale failure from a hypothetical earlier run must not leak into
        // this run's report.
        atlas.tracker.record("stale/ARMCU/REF", "u", "old");

        let indexes = atlas.run(&provider, &sink, dir.path(), true).unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes["surface"].len(), 1);
        assert!(atlas.tracker().is_empty());
        assert_eq!(sink.calls(), vec![("shf_TS".to_string(), 2)]);
    }

    #[test]
    fn skipped_datasets_show_in_summary() {
        let mut atlas = sample_atlas();
        let mut provider = MemoryProvider::new();
        provider.register("les", store());
        provider.register("scm", MemoryStore::new());
        let sink = RecordingSink::new();
        let dir = tempdir().unwrap();

        atlas.run(&provider, &sink, dir.path(), true).unwrap();
        let report = atlas.summary();
        assert!(report.contains("scm/ARMCU/REF"));
        assert!(report.contains("shf"));
    }
}
