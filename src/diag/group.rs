//! Diagnostic groups: one output page, one directory.
//!
//! A group bundles diagnostics that render together. Panel diagnostics
//! (time-height sections) and curve diagnostics never share a group; the
//! mismatch is rejected up front, before any output is produced. Each
//! rendered artifact leaves a sidecar record next to it, so a later run can
//! rebuild the group's index without recomputing anything.

use super::Diagnostic;
use crate::data::{Dataset, StoreProvider};
use crate::errlog::ErrorTracker;
use crate::error::{AtlasError, Result};
use crate::resolve::VariableResolver;
use crate::sink::{artifact_stem, ArtifactMap, PlotSink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-dataset artifact paths of a group, keyed by artifact stem
/// (e.g. `lwp_TS`).
pub type OutputIndex = BTreeMap<String, ArtifactMap>;

#[derive(Debug, Serialize, Deserialize)]
struct OutputRecord {
    artifacts: ArtifactMap,
}

/// A named set of diagnostics rendered into one directory.
#[derive(Debug, Clone)]
pub struct DiagnosticGroup {
    /// Directory name under the atlas output root.
    pub name: String,
    /// Page heading.
    pub head: String,
    /// The diagnostics, in render order.
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticGroup {
    /// Create an empty group.
    pub fn new(name: impl Into<String>, head: impl Into<String>) -> Self {
        Self { name: name.into(), head: head.into(), diagnostics: Vec::new() }
    }

    /// Reject groups that mix panel and curve diagnostics.
    pub fn validate(&self) -> Result<()> {
        let has_panel = self.diagnostics.iter().any(|d| d.kind.is_panel());
        let has_curve = self.diagnostics.iter().any(|d| !d.kind.is_panel());
        if has_panel && has_curve {
            return Err(AtlasError::MixedDiagnosticKinds { group: self.name.clone() });
        }
        Ok(())
    }

    /// Path of the sidecar record for one diagnostic's artifact.
    fn sidecar_path(dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!(".output_{}.json", stem))
    }

    /// Run every diagnostic in the group.
    ///
    /// With `compute` set, diagnostics are evaluated, rendered through
    /// `sink`, and each artifact gets a sidecar record. Without it, the
    /// index is rebuilt from the sidecars of a previous run and nothing is
    /// recomputed.
    pub fn run(
        &self,
        datasets: &[Dataset],
        resolver: &VariableResolver<'_>,
        provider: &dyn StoreProvider,
        sink: &dyn PlotSink,
        out_root: &Path,
        compute: bool,
        tracker: &mut ErrorTracker,
    ) -> Result<OutputIndex> {
        self.validate()?;

        let dir = out_root.join(&self.name);
        if compute {
            std::fs::create_dir_all(&dir)?;
        }

        let mut index = OutputIndex::new();
        for diag in &self.diagnostics {
            let stem = artifact_stem(&diag.variable, diag.kind);
            let sidecar = Self::sidecar_path(&dir, &stem);

            if !compute {
                match read_record(&sidecar) {
                    Some(record) => {
                        index.insert(stem, record.artifacts);
                    }
                    None => {
                        debug!(group = %self.name, stem, "no sidecar from a previous run");
                    }
                }
                continue;
            }

            let results = diag.run(datasets, resolver, provider, tracker)?;
            if results.is_empty() {
                warn!(group = %self.name, variable = %diag.variable,
                    "no dataset produced data, artifact skipped");
                continue;
            }

            let artifacts = sink.render(diag, &results, &dir)?;
            write_record(&sidecar, &OutputRecord { artifacts: artifacts.clone() })?;
            index.insert(stem, artifacts);
        }

        info!(group = %self.name, artifacts = index.len(), "group done");
        Ok(index)
    }
}

fn read_record(path: &Path) -> Option<OutputRecord> {
    let file = File::open(path).ok()?;
    serde_json::from_reader(file).ok()
}

fn write_record(path: &Path, record: &OutputRecord) -> Result<()> {
    let file = File::create(path).map_err(|e| AtlasError::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::to_writer(BufWriter::new(file), record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Field, MemoryProvider, MemoryStore};
    use crate::diag::DiagnosticKind;
    use crate::sink::RecordingSink;
    use crate::vars::VariableCatalog;
    use ndarray::array;
    use tempfile::tempdir;

    fn fixtures() -> (Vec<Dataset>, MemoryProvider) {
        let mut store = MemoryStore::new();
        store.insert(Field {
            name: "shf".into(),
            long_name: "Sensible heat flux".into(),
            units: "W m-2".into(),
            data: array![10.0, 20.0].into_dyn(),
            time: array![0.0, 1.0],
            time_units: "hours since 1997-06-21 11:30:0.0".into(),
        });
        let mut provider = MemoryProvider::new();
        provider.register("scm", store);
        (vec![Dataset::new("scm", "ARMCU", "REF", "/nonexistent.nc")], provider)
    }

    #[test]
    fn mixed_kinds_are_rejected_before_output() {
        let mut group = DiagnosticGroup::new("mixed", "Mixed");
        group.diagnostics.push(Diagnostic::new(DiagnosticKind::TimeSeries, "shf"));
        group.diagnostics.push(Diagnostic::new(DiagnosticKind::Section2D, "u"));

        let err = group.validate().unwrap_err();
        assert!(matches!(err, AtlasError::MixedDiagnosticKinds { ref group } if group == "mixed"));

        // run() refuses the same way, before touching the output directory.
        let (datasets, provider) = fixtures();
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let mut tracker = ErrorTracker::new();
        let dir = tempdir().unwrap();
        let sink = RecordingSink::new();
        let err = group
            .run(&datasets, &resolver, &provider, &sink, dir.path(), true, &mut tracker)
            .unwrap_err();
        assert!(matches!(err, AtlasError::MixedDiagnosticKinds { .. }));
        assert!(!dir.path().join("mixed").exists());
    }

    #[test]
    fn homogeneous_groups_pass_validation() {
        let mut curves = DiagnosticGroup::new("ts", "Time series");
        curves.diagnostics.push(Diagnostic::new(DiagnosticKind::TimeSeries, "shf"));
        curves.diagnostics.push(Diagnostic::new(DiagnosticKind::InitProfile, "theta"));
        assert!(curves.validate().is_ok());

        let mut panels = DiagnosticGroup::new("2d", "Sections");
        panels.diagnostics.push(Diagnostic::new(DiagnosticKind::Section2D, "u"));
        assert!(panels.validate().is_ok());
    }

    #[test]
    fn sidecar_round_trip_rebuilds_index_without_compute() {
        let (datasets, provider) = fixtures();
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let mut tracker = ErrorTracker::new();
        let dir = tempdir().unwrap();
        let sink = RecordingSink::new();

        let mut group = DiagnosticGroup::new("surface", "Surface fluxes");
        group.diagnostics.push(Diagnostic::new(DiagnosticKind::TimeSeries, "shf"));

        let index = group
            .run(&datasets, &resolver, &provider, &sink, dir.path(), true, &mut tracker)
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(dir.path().join("surface").join(".output_shf_TS.json").exists());
        assert_eq!(sink.calls().len(), 1);

        // Second pass without compute: same index, no sink call.
        let replay_sink = RecordingSink::new();
        let replayed = group
            .run(&datasets, &resolver, &provider, &replay_sink, dir.path(), false, &mut tracker)
            .unwrap();
        assert_eq!(replayed, index);
        assert!(replay_sink.calls().is_empty());
    }

    #[test]
    fn unresolvable_diagnostic_produces_no_artifact() {
        let (datasets, provider) = fixtures();
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let mut tracker = ErrorTracker::new();
        let dir = tempdir().unwrap();
        let sink = RecordingSink::new();

        let mut group = DiagnosticGroup::new("surface", "Surface fluxes");
        group.diagnostics.push(Diagnostic::new(DiagnosticKind::TimeSeries, "tke"));

        let index = group
            .run(&datasets, &resolver, &provider, &sink, dir.path(), true, &mut tracker)
            .unwrap();
        assert!(index.is_empty());
        assert!(sink.calls().is_empty());
        assert_eq!(tracker.failures_for("scm/ARMCU/REF").len(), 1);
    }
}
