//! On-demand computation of quantities not stored in a dataset.
//!
//! Each derivation is a pure function of stored fields. The catalogue is a
//! closed enum so forgetting a formula is a compile error, not a runtime
//! string miss. A derivation either produces a complete [`Field`] or fails
//! with `MissingDependency` naming the absent input; it never emits a
//! partial result. Cells that are structurally undefined (a column with no
//! cloud) carry the [`MISSING`] sentinel, which downstream averaging must
//! exclude.

use crate::constants::{CLOUD_FRACTION_THRESHOLD, CPD, G, LV, MISSING};
use crate::coords::{LevelArray, VerticalCoordinateKind};
use crate::data::{DataStore, Field};
use crate::error::{AtlasError, Result};
use ndarray::{Array1, Array2};
use tracing::debug;

/// A fixed window for thickness-weighted layer averaging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerWindow {
    /// Lower altitude bound (m).
    pub zmin: f64,
    /// Upper altitude bound (m).
    pub zmax: f64,
}

/// The catalogue of derivable quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivedVariable {
    /// Cloud base height `zcb` from the cloud-fraction profile.
    CloudBaseHeight,
    /// Cloud top height `zct` from the cloud-fraction profile.
    CloudTopHeight,
    /// `ql`, two-species liquid water (`ql + qlc`) with single-species fallback.
    LiquidWater,
    /// `qi`, two-species ice water with single-species fallback.
    IceWater,
    /// `qr`, two-species rain water with single-species fallback.
    RainWater,
    /// `qsn`, two-species snow water with single-species fallback.
    SnowWater,
    /// `qc = ql + qi`.
    CondensedWater,
    /// `qp = qr + qsn (+ qg when the model carries graupel)`.
    PrecipitatingWater,
    /// `qt = qv + ql + qi + qr + qsn`.
    TotalWater,
    /// `thetal = theta - (Lv/Cpd) ql`.
    LiquidWaterPotentialTemperature,
    /// `lwp`, pressure-weighted vertical integral of `ql`.
    LiquidWaterPath,
    /// `iwp`, vertical integral of `qi`.
    IceWaterPath,
    /// `rwp`, vertical integral of `qr`.
    RainWaterPath,
    /// `swp`, vertical integral of `qsn`.
    SnowWaterPath,
    /// `gwp`, vertical integral of `qg`.
    GraupelWaterPath,
    /// `max_cf`, column maximum of the cloud fraction.
    MaxCloudFraction,
    /// Thickness-weighted mean of `theta` over a fixed altitude window.
    ThetaLayerMean(LayerWindow),
    /// Thickness-weighted mean of `qv` over a fixed altitude window.
    HumidityLayerMean(LayerWindow),
    /// `Qr_int`, integrated radiative heating from the surface/TOA fluxes.
    IntegratedRadiativeHeating,
    /// `TOA_cre_sw`, top-of-atmosphere shortwave cloud radiative effect.
    ToaShortwaveCre,
    /// `TOA_cre_lw`, top-of-atmosphere longwave cloud radiative effect.
    ToaLongwaveCre,
    /// `Qr_int_cre`, all-sky minus clear-sky integrated radiative heating.
    AtmosphericCre,
}

impl DerivedVariable {
    /// Map a logical variable name to its derivation plan, if one exists.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "zcb" => Some(Self::CloudBaseHeight),
            "zct" => Some(Self::CloudTopHeight),
            "ql" => Some(Self::LiquidWater),
            "qi" => Some(Self::IceWater),
            "qr" => Some(Self::RainWater),
            "qsn" => Some(Self::SnowWater),
            "qc" => Some(Self::CondensedWater),
            "qp" => Some(Self::PrecipitatingWater),
            "qt" => Some(Self::TotalWater),
            "thetal" => Some(Self::LiquidWaterPotentialTemperature),
            "lwp" => Some(Self::LiquidWaterPath),
            "iwp" => Some(Self::IceWaterPath),
            "rwp" => Some(Self::RainWaterPath),
            "swp" => Some(Self::SnowWaterPath),
            "gwp" => Some(Self::GraupelWaterPath),
            "max_cf" => Some(Self::MaxCloudFraction),
            "theta_0_500" => Some(Self::ThetaLayerMean(LayerWindow { zmin: 0.0, zmax: 500.0 })),
            "qv_0_500" => Some(Self::HumidityLayerMean(LayerWindow { zmin: 0.0, zmax: 500.0 })),
            "theta_2000_5000" => {
                Some(Self::ThetaLayerMean(LayerWindow { zmin: 2000.0, zmax: 5000.0 }))
            }
            "qv_2000_5000" => {
                Some(Self::HumidityLayerMean(LayerWindow { zmin: 2000.0, zmax: 5000.0 }))
            }
            "Qr_int" => Some(Self::IntegratedRadiativeHeating),
            "TOA_cre_sw" => Some(Self::ToaShortwaveCre),
            "TOA_cre_lw" => Some(Self::ToaLongwaveCre),
            "Qr_int_cre" => Some(Self::AtmosphericCre),
            _ => None,
        }
    }

    /// Compute this quantity from the fields stored in `store`.
    pub fn compute(self, store: &dyn DataStore) -> Result<Field> {
        match self {
            Self::CloudBaseHeight => cloud_boundary(store, Boundary::Base),
            Self::CloudTopHeight => cloud_boundary(store, Boundary::Top),
            Self::LiquidWater => {
                hydrometeor(store, "ql", "qlc", "Liquid water content")
            }
            Self::IceWater => hydrometeor(store, "qi", "qic", "Ice water content"),
            Self::RainWater => hydrometeor(store, "qr", "qrc", "Rain water content"),
            Self::SnowWater => hydrometeor(store, "qsn", "qsnc", "Snow water content"),
            Self::CondensedWater => condensed_water(store),
            Self::PrecipitatingWater => precipitating_water(store),
            Self::TotalWater => total_water(store),
            Self::LiquidWaterPotentialTemperature => thetal(store),
            Self::LiquidWaterPath => water_path(store, Self::LiquidWater, "lwp", "Liquid water path"),
            Self::IceWaterPath => water_path(store, Self::IceWater, "iwp", "Ice water path"),
            Self::RainWaterPath => water_path(store, Self::RainWater, "rwp", "Rain water path"),
            Self::SnowWaterPath => water_path(store, Self::SnowWater, "swp", "Snow water path"),
            Self::GraupelWaterPath => graupel_water_path(store),
            Self::MaxCloudFraction => max_cloud_fraction(store),
            Self::ThetaLayerMean(win) => layer_mean_of(store, "theta", "theta", win, "K"),
            Self::HumidityLayerMean(win) => layer_mean_of(store, "qv", "qv", win, "kg kg-1"),
            Self::IntegratedRadiativeHeating => radiative_heating(store, "Qr_int"),
            Self::ToaShortwaveCre => {
                flux_difference(store, "rsutcs", "rsut", "TOA_cre_sw", "TOA SW CRE")
            }
            Self::ToaLongwaveCre => {
                flux_difference(store, "rlutcs", "rlut", "TOA_cre_lw", "TOA LW CRE")
            }
            Self::AtmosphericCre => atmospheric_cre(store),
        }
    }
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Fetch a required input of a derivation, or fail with `MissingDependency`.
fn require(store: &dyn DataStore, derived: &str, dep: &str) -> Result<Field> {
    if store.has(dep) {
        store.get(dep)
    } else {
        Err(AtlasError::missing_dependency(derived, dep))
    }
}

/// Reject mismatched operands before elementwise arithmetic, which would
/// otherwise panic inside ndarray.
fn same_shape(derived: &str, a: &Field, b: &Field) -> Result<()> {
    if a.data.shape() != b.data.shape() {
        return Err(AtlasError::shape(format!(
            "'{}': inputs '{}' {:?} and '{}' {:?} have different shapes",
            derived,
            a.name,
            a.data.shape(),
            b.name,
            b.data.shape()
        )));
    }
    Ok(())
}

/// Vertical orientation of a level array, detected from its first two
/// values. Passed explicitly into the formulas instead of being re-inferred
/// inside each one.
pub fn is_ascending(levels: &Array2<f64>) -> Result<bool> {
    if levels.shape()[1] < 2 {
        return Err(AtlasError::shape("level array has fewer than two levels"));
    }
    Ok(levels[[0, 1]] > levels[[0, 0]])
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Base,
    Top,
}

/// Height of the first cloudy level, scanning from the surface (base) or the
/// top (top). A time step with no cloudy level yields [`MISSING`].
pub fn cloud_boundary_heights(
    heights: &Array2<f64>,
    cloud_fraction: &Array2<f64>,
    ascending: bool,
    from_surface: bool,
) -> Result<Array1<f64>> {
    let (nt, nlev) = cloud_fraction.dim();
    if heights.dim() != (nt, nlev) {
        return Err(AtlasError::shape(format!(
            "heights {:?} do not match cloud fraction {:?}",
            heights.dim(),
            cloud_fraction.dim()
        )));
    }
    let mut out = Array1::from_elem(nt, MISSING);
    // Surface-first index order given the array orientation.
    let surface_first = ascending == from_surface;
    for it in 0..nt {
        let indices: Box<dyn Iterator<Item = usize>> = if surface_first {
            Box::new(0..nlev)
        } else {
            Box::new((0..nlev).rev())
        };
        for ilev in indices {
            if cloud_fraction[[it, ilev]] >= CLOUD_FRACTION_THRESHOLD {
                out[it] = heights[[it, ilev]];
                break;
            }
        }
    }
    Ok(out)
}

fn cloud_boundary(store: &dyn DataStore, boundary: Boundary) -> Result<Field> {
    let (name, long_name) = match boundary {
        Boundary::Base => ("zcb", "Cloud base height"),
        Boundary::Top => ("zct", "Cloud top height"),
    };
    let cf = require(store, name, "rneb")?;
    let cf2 = cf.profile()?;
    let heights = store
        .levels(VerticalCoordinateKind::HeightFull)
        .ok_or_else(|| AtlasError::missing_dependency(name, "zfull"))?
        .tile(cf.ntime());
    let ascending = is_ascending(&heights)?;
    let from_surface = matches!(boundary, Boundary::Base);
    let values = cloud_boundary_heights(&heights, &cf2, ascending, from_surface)?;
    Ok(Field::series_like(&cf, name, long_name, "m", values))
}

/// Pressure-weighted vertical integral `sum(q dp) / g` over half-level
/// pressure differences, orientation-aware.
pub fn vertical_integral(
    half_pressures: &Array2<f64>,
    mixing_ratio: &Array2<f64>,
    ascending: bool,
) -> Result<Array1<f64>> {
    let (nt, nlev) = mixing_ratio.dim();
    if half_pressures.dim() != (nt, nlev + 1) {
        return Err(AtlasError::shape(format!(
            "half-level pressures have shape {:?}, expected ({}, {})",
            half_pressures.dim(),
            nt,
            nlev + 1
        )));
    }
    let sign = if ascending { 1.0 } else { -1.0 };
    let mut out = Array1::zeros(nt);
    for it in 0..nt {
        let mut acc = 0.0;
        for ilev in 0..nlev {
            let dp = (half_pressures[[it, ilev + 1]] - half_pressures[[it, ilev]]) * sign;
            acc += mixing_ratio[[it, ilev]] * dp / G;
        }
        out[it] = acc;
    }
    Ok(out)
}

fn water_path(
    store: &dyn DataStore,
    species: DerivedVariable,
    name: &str,
    long_name: &str,
) -> Result<Field> {
    let q = species.compute(store).map_err(|e| match e {
        // The path inherits its species' dependency failure under its own name.
        AtlasError::MissingDependency { dependency, .. } => {
            AtlasError::missing_dependency(name, dependency)
        }
        other => other,
    })?;
    integrate_species(store, &q, name, long_name)
}

fn graupel_water_path(store: &dyn DataStore) -> Result<Field> {
    let qg = require(store, "gwp", "qg")?;
    integrate_species(store, &qg, "gwp", "Graupel water path")
}

fn integrate_species(
    store: &dyn DataStore,
    q: &Field,
    name: &str,
    long_name: &str,
) -> Result<Field> {
    let q2 = q.profile()?;
    let ph = store
        .levels(VerticalCoordinateKind::PressureHalf)
        .ok_or_else(|| AtlasError::missing_dependency(name, "phalf"))?
        .tile(q.ntime());
    let ascending = is_ascending(&ph)?;
    let values = vertical_integral(&ph, &q2, ascending)?;
    Ok(Field::series_like(q, name, long_name, "kg m-2", values))
}

/// Thickness-weighted mean of a profile between `zmin` and `zmax`.
///
/// Each layer extends between the midpoints to its neighbors (outermost
/// interfaces at 0 and 1e20); its weight is the depth of its overlap with
/// the window, zero when fully outside.
pub fn layer_mean(
    heights: &Array2<f64>,
    profile: &Array2<f64>,
    window: LayerWindow,
    ascending: bool,
) -> Result<Array1<f64>> {
    let (nt, nlev) = profile.dim();
    if heights.dim() != (nt, nlev) {
        return Err(AtlasError::shape(format!(
            "heights {:?} do not match profile {:?}",
            heights.dim(),
            profile.dim()
        )));
    }
    let LayerWindow { zmin, zmax } = window;

    let mut out = Array1::zeros(nt);
    for it in 0..nt {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for ilev in 0..nlev {
            let z = heights[[it, ilev]];
            // Interfaces at the midpoints to the neighboring levels; the
            // outermost layers extend to the surface and to 1e20.
            let (below, above) = if ascending {
                (
                    if ilev == 0 { 0.0 } else { (heights[[it, ilev - 1]] + z) / 2.0 },
                    if ilev == nlev - 1 { 1.0e20 } else { (z + heights[[it, ilev + 1]]) / 2.0 },
                )
            } else {
                (
                    if ilev == nlev - 1 { 0.0 } else { (heights[[it, ilev + 1]] + z) / 2.0 },
                    if ilev == 0 { 1.0e20 } else { (heights[[it, ilev - 1]] + z) / 2.0 },
                )
            };
            let mut dz = 0.0;
            if below <= zmin && above > zmin {
                dz = above - zmin;
            }
            if below < zmax && above >= zmax {
                dz = zmax - below;
            }
            if below >= zmin && above <= zmax {
                dz = above - below;
            }
            weighted += profile[[it, ilev]] * dz;
            total += dz;
        }
        out[it] = weighted / total;
    }
    Ok(out)
}

fn layer_mean_of(
    store: &dyn DataStore,
    name: &str,
    input: &str,
    window: LayerWindow,
    units: &str,
) -> Result<Field> {
    let out_name = format!("{}_{}_{}", name, window.zmin as i64, window.zmax as i64);
    let field = require(store, &out_name, input)?;
    let profile = field.profile()?;
    let heights = store
        .levels(VerticalCoordinateKind::HeightFull)
        .ok_or_else(|| AtlasError::missing_dependency(&out_name, "zfull"))?
        .tile(field.ntime());
    let ascending = is_ascending(&heights)?;
    let values = layer_mean(&heights, &profile, window, ascending)?;
    let long_name = format!(
        "{} averaged between {}m and {}m",
        field.long_name, window.zmin, window.zmax
    );
    Ok(Field::series_like(&field, out_name, long_name, units, values))
}

/// Two-species hydrometeor sum (`base + companion`, the convective companion
/// being specific to the PCMT scheme) with fallback to the single species.
fn hydrometeor(
    store: &dyn DataStore,
    base: &str,
    companion: &str,
    long_name: &str,
) -> Result<Field> {
    let base_field = require(store, base, base)?;
    if store.has(companion) {
        let companion_field = store.get(companion)?;
        same_shape(base, &base_field, &companion_field)?;
        let sum = &base_field.data + &companion_field.data;
        return Ok(Field {
            name: base.to_string(),
            long_name: long_name.to_string(),
            units: "kg kg-1".to_string(),
            data: sum,
            time: base_field.time,
            time_units: base_field.time_units,
        });
    }
    debug!(species = base, "no convective companion, using single species");
    Ok(Field {
        long_name: long_name.to_string(),
        units: "kg kg-1".to_string(),
        ..base_field
    })
}

fn condensed_water(store: &dyn DataStore) -> Result<Field> {
    let ql = DerivedVariable::LiquidWater.compute(store).map_err(rename_dep("qc"))?;
    let qi = DerivedVariable::IceWater.compute(store).map_err(rename_dep("qc"))?;
    same_shape("qc", &ql, &qi)?;
    let data = &ql.data + &qi.data;
    Ok(Field {
        name: "qc".into(),
        long_name: "Condensed water content".into(),
        units: "kg kg-1".into(),
        data,
        time: ql.time,
        time_units: ql.time_units,
    })
}

fn precipitating_water(store: &dyn DataStore) -> Result<Field> {
    let qr = DerivedVariable::RainWater.compute(store).map_err(rename_dep("qp"))?;
    let qsn = DerivedVariable::SnowWater.compute(store).map_err(rename_dep("qp"))?;
    same_shape("qp", &qr, &qsn)?;
    let mut data = &qr.data + &qsn.data;
    if store.has("qg") {
        let qg = store.get("qg")?;
        same_shape("qp", &qr, &qg)?;
        data = &data + &qg.data;
    } else {
        debug!("no graupel field, assuming the model does not carry graupel");
    }
    Ok(Field {
        name: "qp".into(),
        long_name: "Precipitating water content".into(),
        units: "kg kg-1".into(),
        data,
        time: qr.time,
        time_units: qr.time_units,
    })
}

fn total_water(store: &dyn DataStore) -> Result<Field> {
    let qv = require(store, "qt", "qv")?;
    let ql = DerivedVariable::LiquidWater.compute(store).map_err(rename_dep("qt"))?;
    let qi = DerivedVariable::IceWater.compute(store).map_err(rename_dep("qt"))?;
    let qr = DerivedVariable::RainWater.compute(store).map_err(rename_dep("qt"))?;
    let qsn = DerivedVariable::SnowWater.compute(store).map_err(rename_dep("qt"))?;
    for species in [&ql, &qi, &qr, &qsn] {
        same_shape("qt", &qv, species)?;
    }
    let data = &(&(&(&qv.data + &ql.data) + &qi.data) + &qr.data) + &qsn.data;
    Ok(Field {
        name: "qt".into(),
        long_name: "Total water content".into(),
        units: "kg kg-1".into(),
        data,
        time: qv.time,
        time_units: qv.time_units,
    })
}

fn thetal(store: &dyn DataStore) -> Result<Field> {
    let theta = require(store, "thetal", "theta")?;
    let ql = DerivedVariable::LiquidWater.compute(store).map_err(rename_dep("thetal"))?;
    same_shape("thetal", &theta, &ql)?;
    let data = &theta.data - &ql.data.mapv(|q| (LV / CPD) * q);
    Ok(Field {
        name: "thetal".into(),
        long_name: "Liquid-water potential temperature".into(),
        units: "K".into(),
        data,
        time: theta.time,
        time_units: theta.time_units,
    })
}

fn max_cloud_fraction(store: &dyn DataStore) -> Result<Field> {
    let cf = require(store, "max_cf", "rneb")?;
    let cf2 = cf.profile()?;
    let values = cf2.map_axis(ndarray::Axis(1), |row| {
        row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    });
    Ok(Field::series_like(&cf, "max_cf", "Maximum cloud fraction", "-", values))
}

fn radiative_heating(store: &dyn DataStore, name: &str) -> Result<Field> {
    let terms = ["rsus", "rsds", "rlus", "rlds", "rsdt", "rsut", "rlut"];
    let signs = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, -1.0];
    signed_flux_sum(store, name, "Integrated radiative heating", &terms, &signs)
}

fn atmospheric_cre(store: &dyn DataStore) -> Result<Field> {
    let all_sky = radiative_heating(store, "Qr_int_cre")?;
    let clear_terms = ["rsuscs", "rsdscs", "rlus", "rldscs", "rsdt", "rsutcs", "rlutcs"];
    let clear_signs = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, -1.0];
    let clear_sky = signed_flux_sum(store, "Qr_int_cre", "", &clear_terms, &clear_signs)?;
    same_shape("Qr_int_cre", &all_sky, &clear_sky)?;
    let data = &all_sky.data - &clear_sky.data;
    Ok(Field {
        name: "Qr_int_cre".into(),
        long_name: "Atmospheric CRE".into(),
        units: "W m-2".into(),
        data,
        time: all_sky.time,
        time_units: all_sky.time_units,
    })
}

fn flux_difference(
    store: &dyn DataStore,
    clear: &str,
    all_sky: &str,
    name: &str,
    long_name: &str,
) -> Result<Field> {
    let clear_field = require(store, name, clear)?;
    let all_field = require(store, name, all_sky)?;
    same_shape(name, &clear_field, &all_field)?;
    let data = &clear_field.data - &all_field.data;
    Ok(Field {
        name: name.to_string(),
        long_name: long_name.to_string(),
        units: "W m-2".to_string(),
        data,
        time: clear_field.time,
        time_units: clear_field.time_units,
    })
}

fn signed_flux_sum(
    store: &dyn DataStore,
    name: &str,
    long_name: &str,
    terms: &[&str],
    signs: &[f64],
) -> Result<Field> {
    let first = require(store, name, terms[0])?;
    let mut data = first.data.mapv(|v| v * signs[0]);
    for (term, sign) in terms.iter().zip(signs).skip(1) {
        let field = require(store, name, term)?;
        same_shape(name, &first, &field)?;
        data = &data + &field.data.mapv(|v| v * sign);
    }
    Ok(Field {
        name: name.to_string(),
        long_name: long_name.to_string(),
        units: "W m-2".to_string(),
        data,
        time: first.time,
        time_units: first.time_units,
    })
}

/// Re-attribute a species' `MissingDependency` to the enclosing derivation.
fn rename_dep(derived: &'static str) -> impl Fn(AtlasError) -> AtlasError {
    move |e| match e {
        AtlasError::MissingDependency { dependency, .. } => {
            AtlasError::missing_dependency(derived, dependency)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn field(name: &str, data: Array2<f64>) -> Field {
        let nt = data.shape()[0];
        Field {
            name: name.into(),
            long_name: name.into(),
            units: "kg kg-1".into(),
            data: data.into_dyn(),
            time: Array1::from_iter((0..nt).map(|i| i as f64)),
            time_units: "hours since 2000-01-01 00:00:0.0".into(),
        }
    }

    fn series_field(name: &str, values: Array1<f64>) -> Field {
        Field {
            name: name.into(),
            long_name: name.into(),
            units: "W m-2".into(),
            data: values.into_dyn(),
            time: array![0.0, 1.0],
            time_units: "hours since 2000-01-01 00:00:0.0".into(),
        }
    }

    // Single contiguous cloud layer, fraction 0.5 between 1000 m and 2000 m.
    fn cloudy_store(ascending: bool) -> MemoryStore {
        let mut store = MemoryStore::new();
        let heights = array![0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0];
        let cf = array![0.0, 0.0, 0.5, 0.5, 0.5, 0.0];
        let (heights, cf) = if ascending {
            (heights, cf)
        } else {
            (
                Array1::from_iter(heights.iter().rev().copied()),
                Array1::from_iter(cf.iter().rev().copied()),
            )
        };
        let nt = 3;
        let cf2 = Array2::from_shape_fn((nt, cf.len()), |(_, j)| cf[j]);
        store.insert(field("rneb", cf2));
        store.set_levels(VerticalCoordinateKind::HeightFull, LevelArray::Static(heights));
        store
    }

    #[test]
    fn cloud_base_and_top_of_contiguous_layer() {
        for ascending in [true, false] {
            let store = cloudy_store(ascending);
            let zcb = DerivedVariable::CloudBaseHeight.compute(&store).unwrap();
            let zct = DerivedVariable::CloudTopHeight.compute(&store).unwrap();
            for it in 0..3 {
                assert_relative_eq!(zcb.series().unwrap()[it], 1000.0);
                assert_relative_eq!(zct.series().unwrap()[it], 2000.0);
            }
        }
    }

    #[test]
    fn cloud_free_column_yields_missing() {
        let mut store = MemoryStore::new();
        store.insert(field("rneb", Array2::zeros((2, 4))));
        store.set_levels(
            VerticalCoordinateKind::HeightFull,
            LevelArray::Static(array![0.0, 500.0, 1000.0, 1500.0]),
        );
        let zcb = DerivedVariable::CloudBaseHeight.compute(&store).unwrap();
        for &v in zcb.series().unwrap().iter() {
            assert!(crate::constants::is_missing(v));
        }
    }

    #[test]
    fn vertical_integral_is_orientation_invariant() {
        // q = 0.001 kg/kg over a 100 hPa column: path = 0.001 * 10000 / g.
        let ph_up = array![[100000.0, 95000.0, 90000.0]];
        let q = array![[0.001, 0.001]];
        // Pressure decreasing with index is "ascending height".
        let down = vertical_integral(&ph_up, &q, false).unwrap();
        let expected = 0.001 * 10000.0 / G;
        assert_relative_eq!(down[0], expected, max_relative = 1e-12);

        let ph_rev = array![[90000.0, 95000.0, 100000.0]];
        let up = vertical_integral(&ph_rev, &q, true).unwrap();
        assert_relative_eq!(up[0], expected, max_relative = 1e-12);
    }

    #[test]
    fn water_path_from_memory_store() {
        let mut store = MemoryStore::new();
        store.insert(field("ql", array![[0.001, 0.001]]));
        store.set_levels(
            VerticalCoordinateKind::PressureHalf,
            LevelArray::Static(array![100000.0, 95000.0, 90000.0]),
        );
        let lwp = DerivedVariable::LiquidWaterPath.compute(&store).unwrap();
        assert_relative_eq!(
            lwp.series().unwrap()[0],
            0.001 * 10000.0 / G,
            max_relative = 1e-12
        );
        assert_eq!(lwp.units, "kg m-2");
    }

    #[test]
    fn layer_mean_of_constant_profile_is_exact() {
        // Constant c over [0, 10000] m, averaged over [2000, 5000].
        let nlev = 21;
        let heights =
            Array2::from_shape_fn((1, nlev), |(_, j)| j as f64 * 10000.0 / (nlev - 1) as f64);
        let profile = Array2::from_elem((1, nlev), 7.25);
        let window = LayerWindow { zmin: 2000.0, zmax: 5000.0 };
        let avg = layer_mean(&heights, &profile, window, true).unwrap();
        assert_relative_eq!(avg[0], 7.25, max_relative = 1e-12);

        // Same result with the column stored top-down.
        let heights_rev = Array2::from_shape_fn((1, nlev), |(_, j)| {
            (nlev - 1 - j) as f64 * 10000.0 / (nlev - 1) as f64
        });
        let avg_rev = layer_mean(&heights_rev, &profile, window, false).unwrap();
        assert_relative_eq!(avg_rev[0], 7.25, max_relative = 1e-12);
    }

    #[test]
    fn layer_outside_window_has_zero_weight() {
        // Two-layer column: only the lower layer overlaps [0, 600].
        let heights = array![[250.0, 5000.0]];
        let profile = array![[2.0, 1000.0]];
        let window = LayerWindow { zmin: 0.0, zmax: 600.0 };
        let avg = layer_mean(&heights, &profile, window, true).unwrap();
        assert_relative_eq!(avg[0], 2.0, max_relative = 1e-12);
    }

    #[test]
    fn hydrometeor_two_species_sum() {
        let mut store = MemoryStore::new();
        store.insert(field("ql", array![[1.0e-3, 2.0e-3]]));
        store.insert(field("qlc", array![[0.5e-3, 0.5e-3]]));
        let ql = DerivedVariable::LiquidWater.compute(&store).unwrap();
        assert_relative_eq!(ql.profile().unwrap()[[0, 0]], 1.5e-3);
    }

    #[test]
    fn hydrometeor_falls_back_to_single_species() {
        let mut store = MemoryStore::new();
        store.insert(field("ql", array![[1.0e-3, 2.0e-3]]));
        let ql = DerivedVariable::LiquidWater.compute(&store).unwrap();
        assert_relative_eq!(ql.profile().unwrap()[[0, 1]], 2.0e-3);
    }

    #[test]
    fn mismatched_species_shapes_are_rejected() {
        // A corrupt file may carry species on different grids; the sum must
        // fail cleanly instead of panicking inside ndarray.
        let mut store = MemoryStore::new();
        store.insert(field("ql", array![[1.0e-3, 2.0e-3]]));
        store.insert(field("qlc", array![[0.5e-3, 0.5e-3, 0.5e-3]]));
        let err = DerivedVariable::LiquidWater.compute(&store).unwrap_err();
        assert!(matches!(err, AtlasError::Shape(_)));
    }

    #[test]
    fn cloud_fraction_level_mismatch_is_rejected() {
        let mut store = MemoryStore::new();
        store.insert(field("rneb", Array2::from_elem((2, 4), 0.5)));
        store.set_levels(
            VerticalCoordinateKind::HeightFull,
            LevelArray::Static(array![0.0, 500.0, 1000.0]),
        );
        let err = DerivedVariable::CloudBaseHeight.compute(&store).unwrap_err();
        assert!(matches!(err, AtlasError::Shape(_)));
    }

    #[test]
    fn hydrometeor_missing_both_species_fails() {
        let store = MemoryStore::new();
        let err = DerivedVariable::LiquidWater.compute(&store).unwrap_err();
        assert!(matches!(err, AtlasError::MissingDependency { .. }));
    }

    #[test]
    fn precipitating_water_without_graupel() {
        let mut store = MemoryStore::new();
        store.insert(field("qr", array![[1.0e-3]]));
        store.insert(field("qsn", array![[2.0e-3]]));
        let qp = DerivedVariable::PrecipitatingWater.compute(&store).unwrap();
        assert_relative_eq!(qp.profile().unwrap()[[0, 0]], 3.0e-3);
    }

    #[test]
    fn thetal_subtracts_latent_term() {
        let mut store = MemoryStore::new();
        store.insert(field("theta", array![[300.0]]));
        store.insert(field("ql", array![[1.0e-3]]));
        let tl = DerivedVariable::LiquidWaterPotentialTemperature.compute(&store).unwrap();
        assert_relative_eq!(
            tl.profile().unwrap()[[0, 0]],
            300.0 - (LV / CPD) * 1.0e-3,
            max_relative = 1e-12
        );
    }

    #[test]
    fn max_cloud_fraction_is_column_max() {
        let mut store = MemoryStore::new();
        store.insert(field("rneb", array![[0.0, 0.4, 0.1], [0.2, 0.0, 0.0]]));
        let max_cf = DerivedVariable::MaxCloudFraction.compute(&store).unwrap();
        assert_eq!(max_cf.series().unwrap(), array![0.4, 0.2]);
    }

    #[test]
    fn toa_cre_is_clear_minus_all_sky() {
        let mut store = MemoryStore::new();
        store.insert(series_field("rsutcs", array![100.0, 110.0]));
        store.insert(series_field("rsut", array![80.0, 95.0]));
        let cre = DerivedVariable::ToaShortwaveCre.compute(&store).unwrap();
        assert_eq!(cre.series().unwrap(), array![20.0, 15.0]);
    }

    #[test]
    fn unknown_name_has_no_plan() {
        assert!(DerivedVariable::from_name("not_a_variable").is_none());
        assert!(matches!(
            DerivedVariable::from_name("theta_2000_5000"),
            Some(DerivedVariable::ThetaLayerMean(LayerWindow { zmin, zmax }))
                if zmin == 2000.0 && zmax == 5000.0
        ));
    }
}
