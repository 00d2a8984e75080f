//! Diagnostic definitions and the per-dataset resolution loop.
//!
//! One [`Diagnostic`] evaluates one logical variable with one diagnostic
//! kind across the full set of datasets. Each dataset is processed
//! independently: a data-availability gap in one dataset is logged and
//! skipped without affecting its siblings, while configuration errors abort
//! the diagnostic.

mod atlas;
mod group;

pub use atlas::Atlas;
pub use group::{DiagnosticGroup, OutputIndex};

use crate::constants::{is_missing, MISSING};
use crate::coords::{
    resolve_levels, LengthRule, LevelArray, LevelUnit, ResolvedLevels, VerticalCoordinateKind,
};
use crate::data::{Dataset, Field, StoreProvider};
use crate::errlog::ErrorTracker;
use crate::error::{AtlasError, Result};
use crate::resolve::VariableResolver;
use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::Deserialize;
use tracing::{debug, warn};

/// The diagnostic kinds, selected once per request and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DiagnosticKind {
    /// Scalar time series.
    #[serde(rename = "plotTS", alias = "TS")]
    TimeSeries,
    /// Vertical profile averaged over a time window.
    #[serde(rename = "plotAvgP", alias = "AvgP")]
    TimeAvgProfile,
    /// Vertical profile at the first time step.
    #[serde(rename = "plotInitP", alias = "InitP")]
    InitProfile,
    /// Time-height section.
    #[serde(rename = "plot2D", alias = "2D")]
    Section2D,
    /// Vertical profile at an instant. Declared but not built; running it is
    /// an explicit error, never a silent no-op.
    #[serde(rename = "plotInstP", alias = "InstP")]
    InstantProfile,
}

impl DiagnosticKind {
    /// Short label used in artifact names and error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::TimeSeries => "TS",
            Self::TimeAvgProfile => "AvgP",
            Self::InitProfile => "InitP",
            Self::Section2D => "2D",
            Self::InstantProfile => "InstP",
        }
    }

    /// Whether this kind plots against a vertical coordinate.
    pub fn needs_levels(self) -> bool {
        !matches!(self, Self::TimeSeries)
    }

    /// Whether this kind renders as a 2D panel rather than a curve. A group
    /// cannot mix the two.
    pub fn is_panel(self) -> bool {
        matches!(self, Self::Section2D)
    }

    /// Default vertical coordinate for this kind.
    pub fn default_level_kind(self) -> VerticalCoordinateKind {
        match self {
            Self::Section2D => VerticalCoordinateKind::HeightHalf,
            _ => VerticalCoordinateKind::HeightFull,
        }
    }
}

/// Bounds on the time axis, in the numeric units of the stored time
/// coordinate. Unbounded sides take the full extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TimeWindow {
    /// Lower bound, inclusive.
    pub tmin: Option<f64>,
    /// Upper bound, inclusive.
    pub tmax: Option<f64>,
}

impl TimeWindow {
    /// A window spanning everything.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// True when neither side is bounded.
    pub fn is_unbounded(&self) -> bool {
        self.tmin.is_none() && self.tmax.is_none()
    }

    /// Inclusive index range of `time` covered by the window.
    fn range(&self, time: &Array1<f64>) -> Result<(usize, usize)> {
        let n = time.len();
        if n == 0 {
            return Err(AtlasError::shape("empty time axis"));
        }
        let first = match self.tmin {
            Some(tmin) => time.iter().position(|&t| t >= tmin),
            None => Some(0),
        };
        let last = match self.tmax {
            Some(tmax) => time.iter().rposition(|&t| t <= tmax),
            None => Some(n - 1),
        };
        match (first, last) {
            (Some(i0), Some(i1)) if i0 <= i1 => Ok((i0, i1)),
            // A run shorter than the window is a property of that dataset,
            // not of the configuration: recovered per dataset.
            _ => Err(AtlasError::EmptyTimeWindow { window: self.to_string() }),
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = |b: Option<f64>| b.map_or("..".to_string(), |v| v.to_string());
        write!(f, "[{}, {}]", side(self.tmin), side(self.tmax))
    }
}

/// Plot-range metadata forwarded untouched to the rendering sink.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlotSpec {
    /// Plot title override.
    pub title: Option<String>,
    /// X-axis label.
    pub xname: Option<String>,
    /// X-axis lower bound (profile value axis).
    pub xmin: Option<f64>,
    /// X-axis upper bound (profile value axis).
    pub xmax: Option<f64>,
    /// Y-axis label.
    pub yname: Option<String>,
    /// Y-axis lower bound.
    pub ymin: Option<f64>,
    /// Y-axis upper bound.
    pub ymax: Option<f64>,
    /// Contour levels for 2D panels.
    pub levels: Option<Vec<f64>>,
    /// Colormap name.
    pub cmap: Option<String>,
    /// Contour extension mode ("neither", "both", "min", "max").
    pub extend: Option<String>,
    /// Render the first contour band white.
    pub firstwhite: Option<bool>,
    /// Time-label cadence hint ("1h", "2h", "6h", "10d").
    pub dtlabel: Option<String>,
}

/// One diagnostic: one variable, one kind, evaluated across all datasets.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Diagnostic kind.
    pub kind: DiagnosticKind,
    /// Logical variable to evaluate.
    pub variable: String,
    /// Time window or full extent.
    pub window: TimeWindow,
    /// Vertical coordinate override; `None` uses the kind's default.
    pub level_kind: Option<VerticalCoordinateKind>,
    /// Display unit for the vertical coordinate.
    pub level_unit: LevelUnit,
    /// Express heights above the surface instead of above sea level.
    pub above_surface: bool,
    /// Bias mode: subtract this reference dataset from every other one.
    pub bias_reference: Option<String>,
    /// Opaque plot metadata for the sink.
    pub plot: PlotSpec,
}

impl Diagnostic {
    /// Create a diagnostic with defaults for everything but kind and
    /// variable.
    pub fn new(kind: DiagnosticKind, variable: impl Into<String>) -> Self {
        Self {
            kind,
            variable: variable.into(),
            window: TimeWindow::unbounded(),
            level_kind: None,
            level_unit: LevelUnit::default(),
            above_surface: false,
            bias_reference: None,
            plot: PlotSpec::default(),
        }
    }

    /// The vertical coordinate this diagnostic plots against.
    pub fn level_kind(&self) -> VerticalCoordinateKind {
        self.level_kind.unwrap_or_else(|| self.kind.default_level_kind())
    }

    /// Evaluate this diagnostic across `datasets`.
    ///
    /// Returns one [`NormalizedResult`] per dataset that resolved; datasets
    /// with data gaps are recorded in `tracker` and skipped. Configuration
    /// errors (unsupported unit, unimplemented kind, missing bias reference)
    /// abort the whole diagnostic.
    pub fn run(
        &self,
        datasets: &[Dataset],
        resolver: &VariableResolver<'_>,
        provider: &dyn StoreProvider,
        tracker: &mut ErrorTracker,
    ) -> Result<Vec<NormalizedResult>> {
        if self.kind == DiagnosticKind::InstantProfile {
            return Err(AtlasError::UnimplementedDiagnostic(
                self.kind.label().to_string(),
            ));
        }

        let mut results = Vec::new();
        for dataset in datasets {
            match self.run_one(dataset, resolver, provider) {
                Ok(result) => results.push(result),
                // Data gaps and unreadable stores skip this dataset only.
                Err(e) if e.is_data_gap() || matches!(e, AtlasError::NetCdf(_)) => {
                    debug!(dataset = %dataset.id(), variable = %self.variable, error = %e,
                        "dataset excluded from diagnostic");
                    tracker.record(dataset.id(), &self.variable, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(reference) = &self.bias_reference {
            apply_bias(&mut results, reference)?;
        }

        Ok(results)
    }

    fn run_one(
        &self,
        dataset: &Dataset,
        resolver: &VariableResolver<'_>,
        provider: &dyn StoreProvider,
    ) -> Result<NormalizedResult> {
        let store = provider.open(dataset)?;
        let (field, coef) = resolver.fetch(dataset, store.as_ref(), &self.variable)?;

        let mut result = match self.kind {
            DiagnosticKind::TimeSeries => self.time_series(&field, coef),
            DiagnosticKind::TimeAvgProfile => self.avg_profile(store.as_ref(), &field, coef),
            DiagnosticKind::InitProfile => self.init_profile(store.as_ref(), &field, coef),
            DiagnosticKind::Section2D => self.section(store.as_ref(), &field, coef),
            DiagnosticKind::InstantProfile => {
                Err(AtlasError::UnimplementedDiagnostic(self.kind.label().to_string()))
            }
        }?;

        result.dataset = dataset.name.clone();
        result.variable = self.variable.clone();
        result.long_name = resolver.catalog().long_name(&self.variable).to_string();
        result.units = resolver.catalog().units(&self.variable).to_string();
        result.line = dataset.line.clone();
        Ok(result)
    }

    fn resolve_coordinate(
        &self,
        store: &dyn crate::data::DataStore,
        nlev: usize,
        rule: LengthRule,
    ) -> Result<ResolvedLevels> {
        let mut resolved = resolve_levels(store, self.level_kind(), nlev, self.level_unit, rule)?;
        if self.above_surface && resolved.kind.is_height() {
            let min = resolved.values.min();
            resolved.values.shift(-min);
        }
        Ok(resolved)
    }

    fn time_series(&self, field: &Field, coef: f64) -> Result<NormalizedResult> {
        let series = field.series()?;
        let (i0, i1) = self.window.range(&field.time)?;
        let values = scale_missing_aware(
            &series.slice(ndarray::s![i0..=i1]).to_owned().into_dyn(),
            coef,
        );
        let time = field.time.slice(ndarray::s![i0..=i1]).to_owned();
        Ok(NormalizedResult {
            values,
            time: Some(time),
            time_units: Some(field.time_units.clone()),
            ..NormalizedResult::default()
        })
    }

    fn avg_profile(
        &self,
        store: &dyn crate::data::DataStore,
        field: &Field,
        coef: f64,
    ) -> Result<NormalizedResult> {
        let profile = field.profile()?;
        let nlev = profile.shape()[1];
        let resolved = self.resolve_coordinate(store, nlev, LengthRule::Exact)?;

        let (i0, i1) = self.window.range(&field.time)?;
        let window = profile.slice(ndarray::s![i0..=i1, ..]);

        // Mean per level over the window, skipping missing cells.
        let mut values = Array1::from_elem(nlev, MISSING);
        for (ilev, col) in window.axis_iter(Axis(1)).enumerate() {
            let valid: Vec<f64> = col.iter().copied().filter(|&v| !is_missing(v)).collect();
            if !valid.is_empty() {
                values[ilev] = valid.iter().sum::<f64>() / valid.len() as f64 * coef;
            }
        }

        let levels = match resolved.values {
            LevelArray::Static(a) => a,
            LevelArray::TimeVarying(a) => {
                a.slice(ndarray::s![i0..=i1, ..])
                    .mean_axis(Axis(0))
                    .ok_or_else(|| AtlasError::shape("empty level window"))?
            }
        };

        Ok(NormalizedResult {
            values: values.into_dyn(),
            levels: Some(levels),
            level_unit: Some(resolved.unit),
            ..NormalizedResult::default()
        })
    }

    fn init_profile(
        &self,
        store: &dyn crate::data::DataStore,
        field: &Field,
        coef: f64,
    ) -> Result<NormalizedResult> {
        let profile = field.profile()?;
        let nlev = profile.shape()[1];
        let resolved = self.resolve_coordinate(store, nlev, LengthRule::Exact)?;

        let values =
            scale_missing_aware(&profile.row(0).to_owned().into_dyn(), coef);
        let levels = match resolved.values {
            LevelArray::Static(a) => a,
            LevelArray::TimeVarying(a) => a.row(0).to_owned(),
        };

        Ok(NormalizedResult {
            values,
            levels: Some(levels),
            level_unit: Some(resolved.unit),
            ..NormalizedResult::default()
        })
    }

    fn section(
        &self,
        store: &dyn crate::data::DataStore,
        field: &Field,
        coef: f64,
    ) -> Result<NormalizedResult> {
        let profile = field.profile()?;
        let (nt, nlev) = profile.dim();
        let resolved = self.resolve_coordinate(store, nlev, LengthRule::CentersOrEdges)?;

        let values = scale_missing_aware(&profile.into_dyn(), coef);

        // Interface-centered coordinates carry one more level than the data;
        // the time axis then shifts to the grid edges so each cell spans its
        // own time step.
        let on_edges = resolved.values.nlev() == nlev + 1;
        let time = if on_edges {
            edge_time_axis(&field.time)?
        } else {
            field.time.clone()
        };

        let sections = match resolved.values {
            LevelArray::Static(a) => {
                Array2::from_shape_fn((time.len(), a.len()), |(_, j)| a[j])
            }
            LevelArray::TimeVarying(a) => {
                if on_edges {
                    // One extra row at the start, duplicating the initial
                    // coordinate state.
                    let mut out = Array2::zeros((nt + 1, a.shape()[1]));
                    out.row_mut(0).assign(&a.row(0));
                    for it in 0..nt {
                        out.row_mut(it + 1).assign(&a.row(it));
                    }
                    out
                } else {
                    a
                }
            }
        };

        Ok(NormalizedResult {
            values,
            time: Some(time),
            time_units: Some(field.time_units.clone()),
            level_sections: Some(sections),
            level_unit: Some(resolved.unit),
            ..NormalizedResult::default()
        })
    }
}

/// Half-step-shifted time axis with one extra entry, marking the edges of
/// each time step.
fn edge_time_axis(time: &Array1<f64>) -> Result<Array1<f64>> {
    let nt = time.len();
    if nt < 2 {
        return Err(AtlasError::shape("cannot build edge time axis from fewer than 2 steps"));
    }
    let dt = time[1] - time[0];
    let mut edges = Array1::zeros(nt + 1);
    for it in 0..nt {
        edges[it] = time[it] - dt / 2.0;
    }
    edges[nt] = time[nt - 1] + dt / 2.0;
    Ok(edges)
}

/// Scale values, leaving the missing sentinel untouched.
fn scale_missing_aware(values: &ArrayD<f64>, coef: f64) -> ArrayD<f64> {
    values.mapv(|v| if is_missing(v) { v } else { v * coef })
}

/// Subtract the reference dataset's values from every other result, zero the
/// reference's own values. Fatal when the reference produced no output.
fn apply_bias(results: &mut [NormalizedResult], reference: &str) -> Result<()> {
    let ref_idx = results
        .iter()
        .position(|r| r.dataset == reference)
        .ok_or_else(|| AtlasError::MissingReferenceDataset(reference.to_string()))?;
    let ref_values = results[ref_idx].values.clone();

    for (i, result) in results.iter_mut().enumerate() {
        if i == ref_idx {
            result.values.fill(0.0);
            continue;
        }
        subtract_truncated(&mut result.values, &ref_values);
    }
    Ok(())
}

/// Element-wise `a -= b` over the common leading extent; a missing cell on
/// either side leaves the sentinel in place. Datasets may differ in time
/// span; the comparison covers the shorter one.
fn subtract_truncated(a: &mut ArrayD<f64>, b: &ArrayD<f64>) {
    if a.ndim() != b.ndim() {
        warn!(
            a_shape = ?a.shape(),
            b_shape = ?b.shape(),
            "bias operands have different rank, skipping subtraction"
        );
        return;
    }
    match a.ndim() {
        1 => {
            let n = a.len().min(b.len());
            for i in 0..n {
                let (av, bv) = (a[[i]], b[[i]]);
                if !is_missing(av) && !is_missing(bv) {
                    a[[i]] = av - bv;
                } else {
                    a[[i]] = MISSING;
                }
            }
        }
        2 => {
            let nt = a.shape()[0].min(b.shape()[0]);
            let nlev = a.shape()[1].min(b.shape()[1]);
            for it in 0..nt {
                for il in 0..nlev {
                    let (av, bv) = (a[[it, il]], b[[it, il]]);
                    if !is_missing(av) && !is_missing(bv) {
                        a[[it, il]] = av - bv;
                    } else {
                        a[[it, il]] = MISSING;
                    }
                }
            }
        }
        _ => warn!(ndim = a.ndim(), "bias subtraction unsupported for this rank"),
    }
}

/// One dataset's contribution to a diagnostic, normalized for the sink.
#[derive(Debug, Clone)]
pub struct NormalizedResult {
    /// Dataset name.
    pub dataset: String,
    /// Logical variable.
    pub variable: String,
    /// Descriptive name from the catalog.
    pub long_name: String,
    /// Display units from the catalog.
    pub units: String,
    /// The normalized values: `(t,)` for series, `(lev,)` for profiles,
    /// `(t, lev)` for sections.
    pub values: ArrayD<f64>,
    /// Time axis, for series and sections.
    pub time: Option<Array1<f64>>,
    /// Units of the time axis.
    pub time_units: Option<String>,
    /// Level axis for profile curves.
    pub levels: Option<Array1<f64>>,
    /// Per-time-row level values for sections (rows match `time`).
    pub level_sections: Option<Array2<f64>>,
    /// Unit of the level values.
    pub level_unit: Option<LevelUnit>,
    /// Line style, opaque, from the dataset.
    pub line: Option<String>,
}

impl Default for NormalizedResult {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            variable: String::new(),
            long_name: String::new(),
            units: String::new(),
            values: ArrayD::zeros(ndarray::IxDyn(&[0])),
            time: None,
            time_units: None,
            levels: None,
            level_sections: None,
            level_unit: None,
            line: None,
        }
    }
}
