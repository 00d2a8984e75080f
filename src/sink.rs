//! Rendering seam.
//!
//! The engine normalizes data and hands it to a [`PlotSink`]; what the sink
//! does with it (write JSON, drive a plotting backend, collect for tests) is
//! its own business. The engine only keeps the returned artifact paths for
//! the group's output index.

use crate::diag::{Diagnostic, DiagnosticKind, NormalizedResult};
use crate::error::{AtlasError, Result};
use ndarray::Array2;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Artifact paths keyed by dataset name. Curve diagnostics share one
/// artifact across datasets; sections get one per dataset.
pub type ArtifactMap = BTreeMap<String, PathBuf>;

/// Consumes normalized diagnostic results and produces artifacts.
pub trait PlotSink {
    /// Render `results` for `diag` into `out_dir`, returning the artifact
    /// path per dataset.
    fn render(
        &self,
        diag: &Diagnostic,
        results: &[NormalizedResult],
        out_dir: &Path,
    ) -> Result<ArtifactMap>;
}

/// Artifact file stem for a diagnostic, e.g. `lwp_TS`.
pub fn artifact_stem(variable: &str, kind: DiagnosticKind) -> String {
    format!("{}_{}", variable, kind.label())
}

/// Writes each diagnostic as JSON documents holding the normalized arrays.
/// Curves go into one combined document; each section gets its own.
#[derive(Debug, Default)]
pub struct JsonSink;

impl JsonSink {
    fn result_json(result: &NormalizedResult) -> serde_json::Value {
        json!({
            "dataset": result.dataset,
            "long_name": result.long_name,
            "units": result.units,
            "values": result.values.iter().copied().collect::<Vec<f64>>(),
            "shape": result.values.shape(),
            "time": result.time.as_ref().map(|t| t.to_vec()),
            "time_units": result.time_units,
            "levels": result.levels.as_ref().map(|l| l.to_vec()),
            "level_sections": result.level_sections.as_ref().map(rows),
            "level_unit": result.level_unit.map(|u| u.label()),
            "line": result.line,
        })
    }

    fn write(path: &Path, doc: &serde_json::Value) -> Result<()> {
        let file = File::create(path).map_err(|e| AtlasError::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), doc)?;
        debug!(path = %path.display(), "artifact written");
        Ok(())
    }
}

fn rows(a: &Array2<f64>) -> Vec<Vec<f64>> {
    a.rows().into_iter().map(|r| r.to_vec()).collect()
}

impl PlotSink for JsonSink {
    fn render(
        &self,
        diag: &Diagnostic,
        results: &[NormalizedResult],
        out_dir: &Path,
    ) -> Result<ArtifactMap> {
        let stem = artifact_stem(&diag.variable, diag.kind);
        let mut artifacts = ArtifactMap::new();

        if diag.kind.is_panel() {
            // One panel per dataset.
            for result in results {
                let path = out_dir.join(format!("{}_{}.json", stem, result.dataset));
                let doc = json!({
                    "variable": diag.variable,
                    "kind": diag.kind.label(),
                    "title": diag.plot.title,
                    "results": [Self::result_json(result)],
                });
                Self::write(&path, &doc)?;
                artifacts.insert(result.dataset.clone(), path);
            }
        } else {
            // All curves overlaid in one document.
            let path = out_dir.join(format!("{}.json", stem));
            let doc = json!({
                "variable": diag.variable,
                "kind": diag.kind.label(),
                "title": diag.plot.title,
                "results": results.iter().map(Self::result_json).collect::<Vec<_>>(),
            });
            Self::write(&path, &doc)?;
            for result in results {
                artifacts.insert(result.dataset.clone(), path.clone());
            }
        }

        Ok(artifacts)
    }
}

/// Records render calls without touching the filesystem.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: std::cell::RefCell<Vec<(String, usize)>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// `(artifact stem, result count)` per render call, in order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.borrow().clone()
    }
}

impl PlotSink for RecordingSink {
    fn render(
        &self,
        diag: &Diagnostic,
        results: &[NormalizedResult],
        out_dir: &Path,
    ) -> Result<ArtifactMap> {
        let stem = artifact_stem(&diag.variable, diag.kind);
        self.calls.borrow_mut().push((stem.clone(), results.len()));
        let path = out_dir.join(format!("{}.json", stem));
        Ok(results
            .iter()
            .map(|r| (r.dataset.clone(), path.clone()))
            .collect())
    }
}
