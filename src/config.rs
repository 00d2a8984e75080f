//! JSON atlas configuration.
//!
//! One configuration file declares the case, the reference and simulation
//! datasets, and the diagnostic groups with their variables and plot
//! metadata. [`AtlasConfig::from_path`] parses it and [`AtlasConfig::build`]
//! turns it into a ready-to-run [`Atlas`].

use crate::coords::{LevelUnit, VerticalCoordinateKind};
use crate::data::Dataset;
use crate::diag::{Atlas, Diagnostic, DiagnosticGroup, DiagnosticKind, PlotSpec, TimeWindow};
use crate::error::{AtlasError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Top-level configuration document.
#[derive(Debug, Deserialize)]
pub struct AtlasConfig {
    /// Atlas name; defaults to the case name.
    pub name: Option<String>,
    /// Case, e.g. "ARMCU".
    pub case: String,
    /// Subcase; defaults to "REF".
    #[serde(default = "default_subcase")]
    pub subcase: String,
    /// Reference datasets (observations, LES), drawn first.
    #[serde(default)]
    pub references: Vec<DatasetConfig>,
    /// Simulation datasets.
    #[serde(default)]
    pub simulations: Vec<DatasetConfig>,
    /// Diagnostic groups, in render order.
    pub groups: Vec<GroupConfig>,
}

fn default_subcase() -> String {
    "REF".to_string()
}

/// One dataset entry.
#[derive(Debug, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name.
    pub name: String,
    /// NetCDF file path.
    pub file: String,
    /// Line style, opaque to the engine.
    pub line: Option<String>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Logical variable name -> dataset-local alias.
    #[serde(default)]
    pub varnames: HashMap<String, String>,
    /// Logical variable name -> scale coefficient override.
    #[serde(default)]
    pub coefs: HashMap<String, f64>,
}

/// One diagnostic group.
#[derive(Debug, Deserialize)]
pub struct GroupConfig {
    /// Directory name under the output root.
    pub name: String,
    /// Page heading.
    pub head: String,
    /// Diagnostic kind shared by the whole group.
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    /// Time window lower bound, in the files' time units.
    pub tmin: Option<f64>,
    /// Time window upper bound.
    pub tmax: Option<f64>,
    /// Vertical coordinate: "zh", "zf", "ph" or "pf". Defaults per kind.
    pub lev: Option<String>,
    /// Level display unit: "m", "km", "Pa" or "hPa".
    pub levunits: Option<String>,
    /// Express heights above the surface.
    #[serde(default)]
    pub above_surface: bool,
    /// Bias mode: subtract this reference dataset everywhere.
    pub bias: Option<String>,
    /// Group-wide plot metadata, overridable per variable.
    #[serde(flatten)]
    pub plot: PlotSpec,
    /// The variables to evaluate, in render order.
    pub variables: Vec<VariableConfig>,
}

/// One variable inside a group.
#[derive(Debug, Deserialize)]
pub struct VariableConfig {
    /// Logical variable name.
    pub name: String,
    /// Also plot the initial profile alongside the averaged one.
    #[serde(default)]
    pub init: bool,
    /// Per-variable coordinate override.
    pub lev: Option<String>,
    /// Per-variable plot metadata, overriding the group's.
    #[serde(flatten)]
    pub plot: PlotSpec,
}

impl AtlasConfig {
    /// Parse a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| AtlasError::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_reader(file)?;
        debug!(path = %path.display(), groups = config.groups.len(), "configuration loaded");
        Ok(config)
    }

    /// Build the atlas this configuration describes.
    pub fn build(&self) -> Result<Atlas> {
        let name = self.name.clone().unwrap_or_else(|| self.case.clone());
        let mut atlas = Atlas::new(name, &self.case, &self.subcase);

        for ds in &self.references {
            atlas.references.push(self.dataset(ds));
        }
        for ds in &self.simulations {
            atlas.simulations.push(self.dataset(ds));
        }
        for group in &self.groups {
            atlas.groups.push(self.group(group)?);
        }

        atlas.validate()?;
        Ok(atlas)
    }

    fn dataset(&self, config: &DatasetConfig) -> Dataset {
        let mut ds = Dataset::new(&config.name, &self.case, &self.subcase, &config.file);
        ds.line = config.line.clone();
        ds.comment = config.comment.clone();
        ds.varnames = config.varnames.clone();
        ds.coefs = config.coefs.clone();
        ds
    }

    fn group(&self, config: &GroupConfig) -> Result<DiagnosticGroup> {
        let mut group = DiagnosticGroup::new(&config.name, &config.head);
        let window = TimeWindow { tmin: config.tmin, tmax: config.tmax };
        let level_unit = match &config.levunits {
            Some(s) => parse_level_unit(s)?,
            None => LevelUnit::default(),
        };
        let group_lev = config.lev.as_deref().map(parse_level_kind).transpose()?;

        for var in &config.variables {
            let mut diag = Diagnostic::new(config.kind, &var.name);
            diag.window = window;
            diag.level_unit = level_unit;
            diag.level_kind = match var.lev.as_deref() {
                Some(s) => Some(parse_level_kind(s)?),
                None => group_lev,
            };
            diag.above_surface = config.above_surface;
            diag.bias_reference = config.bias.clone();
            diag.plot = merge_plot(&config.plot, &var.plot);

            if var.init && config.kind == DiagnosticKind::TimeAvgProfile {
                let mut init = diag.clone();
                init.kind = DiagnosticKind::InitProfile;
                group.diagnostics.push(diag);
                group.diagnostics.push(init);
            } else {
                group.diagnostics.push(diag);
            }
        }

        group.validate()?;
        Ok(group)
    }
}

fn parse_level_kind(s: &str) -> Result<VerticalCoordinateKind> {
    match s {
        "zh" | "zhalf" => Ok(VerticalCoordinateKind::HeightHalf),
        "zf" | "zfull" => Ok(VerticalCoordinateKind::HeightFull),
        "ph" | "phalf" => Ok(VerticalCoordinateKind::PressureHalf),
        "pf" | "pfull" => Ok(VerticalCoordinateKind::PressureFull),
        other => Err(AtlasError::config(format!("unknown vertical coordinate '{}'", other))),
    }
}

fn parse_level_unit(s: &str) -> Result<LevelUnit> {
    match s {
        "m" => Ok(LevelUnit::Meters),
        "km" => Ok(LevelUnit::Kilometers),
        "Pa" => Ok(LevelUnit::Pascals),
        "hPa" => Ok(LevelUnit::Hectopascals),
        other => Err(AtlasError::config(format!("unknown level unit '{}'", other))),
    }
}

/// Variable-level plot settings override group-level ones field by field.
fn merge_plot(group: &PlotSpec, var: &PlotSpec) -> PlotSpec {
    PlotSpec {
        title: var.title.clone().or_else(|| group.title.clone()),
        xname: var.xname.clone().or_else(|| group.xname.clone()),
        xmin: var.xmin.or(group.xmin),
        xmax: var.xmax.or(group.xmax),
        yname: var.yname.clone().or_else(|| group.yname.clone()),
        ymin: var.ymin.or(group.ymin),
        ymax: var.ymax.or(group.ymax),
        levels: var.levels.clone().or_else(|| group.levels.clone()),
        cmap: var.cmap.clone().or_else(|| group.cmap.clone()),
        extend: var.extend.clone().or_else(|| group.extend.clone()),
        firstwhite: var.firstwhite.or(group.firstwhite),
        dtlabel: var.dtlabel.clone().or_else(|| group.dtlabel.clone()),
    }
}
