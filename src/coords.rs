//! Vertical-coordinate resolution and unit conversion.
//!
//! Datasets disagree on which level arrays they store: some only have
//! full-level (cell-center) heights, some only half-level (interface)
//! pressures, and the arrays may be constant in time or per-time-step.
//! Resolution maps a requested coordinate kind to whatever compatible array
//! the dataset actually has, falling back to the adjacent kind within the
//! same family, then converts it to the requested display unit.

use crate::data::DataStore;
use crate::error::{AtlasError, Result};
use ndarray::{Array1, Array2};
use tracing::debug;

/// The vertical-coordinate conventions a diagnostic can be plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerticalCoordinateKind {
    /// Interface heights (`zhalf`), native unit m.
    HeightHalf,
    /// Cell-center heights (`zfull`), native unit m.
    HeightFull,
    /// Interface pressures (`phalf`), native unit Pa.
    PressureHalf,
    /// Cell-center pressures (`pfull`), native unit Pa.
    PressureFull,
}

impl VerticalCoordinateKind {
    /// Conventional variable name for this kind in MUSC-style files.
    pub fn var_name(self) -> &'static str {
        match self {
            Self::HeightHalf => "zhalf",
            Self::HeightFull => "zfull",
            Self::PressureHalf => "phalf",
            Self::PressureFull => "pfull",
        }
    }

    /// The half/full partner within the same coordinate family. The fallback
    /// never crosses from height to pressure or back.
    pub fn adjacent(self) -> Self {
        match self {
            Self::HeightHalf => Self::HeightFull,
            Self::HeightFull => Self::HeightHalf,
            Self::PressureHalf => Self::PressureFull,
            Self::PressureFull => Self::PressureHalf,
        }
    }

    /// True for the height family.
    pub fn is_height(self) -> bool {
        matches!(self, Self::HeightHalf | Self::HeightFull)
    }
}

impl std::fmt::Display for VerticalCoordinateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.var_name())
    }
}

/// Display unit for a vertical coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LevelUnit {
    /// Meters, native for the height family.
    Meters,
    /// Kilometers.
    #[default]
    Kilometers,
    /// Pascals, native for the pressure family.
    Pascals,
    /// Hectopascals.
    Hectopascals,
}

impl LevelUnit {
    /// Short label, e.g. for axis titles.
    pub fn label(self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Pascals => "Pa",
            Self::Hectopascals => "hPa",
        }
    }

    /// Scale from a kind's native unit into this unit, or `UnsupportedUnit`
    /// when the unit belongs to the other coordinate family.
    pub fn scale_from_native(self, kind: VerticalCoordinateKind) -> Result<f64> {
        match (kind.is_height(), self) {
            (true, Self::Meters) => Ok(1.0),
            (true, Self::Kilometers) => Ok(1e-3),
            (false, Self::Pascals) => Ok(1.0),
            (false, Self::Hectopascals) => Ok(1e-2),
            _ => Err(AtlasError::UnsupportedUnit {
                kind: kind.var_name().to_string(),
                unit: self.label().to_string(),
            }),
        }
    }
}

/// A level array as stored: constant in time or per-time-step.
#[derive(Debug, Clone)]
pub enum LevelArray {
    /// One value per level, shared by all time steps.
    Static(Array1<f64>),
    /// `(time, level)` values.
    TimeVarying(Array2<f64>),
}

impl LevelArray {
    /// Number of levels (trailing dimension).
    pub fn nlev(&self) -> usize {
        match self {
            Self::Static(a) => a.len(),
            Self::TimeVarying(a) => a.shape()[1],
        }
    }

    /// Multiply every value in place.
    pub fn scale(&mut self, factor: f64) {
        match self {
            Self::Static(a) => a.mapv_inplace(|v| v * factor),
            Self::TimeVarying(a) => a.mapv_inplace(|v| v * factor),
        }
    }

    /// Shift every value in place (used for above-surface altitude).
    pub fn shift(&mut self, offset: f64) {
        match self {
            Self::Static(a) => a.mapv_inplace(|v| v + offset),
            Self::TimeVarying(a) => a.mapv_inplace(|v| v + offset),
        }
    }

    /// Minimum finite value across the whole array.
    pub fn min(&self) -> f64 {
        let it: Box<dyn Iterator<Item = &f64>> = match self {
            Self::Static(a) => Box::new(a.iter()),
            Self::TimeVarying(a) => Box::new(a.iter()),
        };
        it.copied().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min)
    }

    /// Replicate a static array over `nt` time steps; pass through a
    /// time-varying one.
    pub fn tile(&self, nt: usize) -> Array2<f64> {
        match self {
            Self::Static(a) => {
                Array2::from_shape_fn((nt, a.len()), |(_, j)| a[j])
            }
            Self::TimeVarying(a) => a.clone(),
        }
    }
}

/// A coordinate resolved against a dataset: the array that will actually be
/// used, the kind it came from, and the unit its values are expressed in.
#[derive(Debug, Clone)]
pub struct ResolvedLevels {
    /// Kind of the array that was found (may be the adjacent fallback).
    pub kind: VerticalCoordinateKind,
    /// Level values, converted to `unit`.
    pub values: LevelArray,
    /// Unit of `values`.
    pub unit: LevelUnit,
}

/// Which level-array lengths a diagnostic can plot a variable against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// One value per data level, required by profile curves.
    Exact,
    /// Data levels, or one more for interface-centered coordinates against
    /// cell-centered data (time-height sections align on grid edges).
    CentersOrEdges,
}

impl LengthRule {
    fn accepts(self, nlev: usize, expected: usize) -> bool {
        match self {
            Self::Exact => nlev == expected,
            Self::CentersOrEdges => nlev == expected || nlev == expected + 1,
        }
    }
}

/// Resolve the vertical coordinate of kind `kind` in `store` for a variable
/// with `expected` levels, converting to `unit`.
///
/// The requested kind is tried first; if it is absent or its length is
/// incompatible under `rule`, the adjacent kind in the same family is tried.
/// An incompatible candidate is rejected rather than silently accepted, so a
/// corrupt coordinate array surfaces as `MissingCoordinate` instead of a
/// nonsense plot axis.
pub fn resolve_levels(
    store: &dyn DataStore,
    kind: VerticalCoordinateKind,
    expected: usize,
    unit: LevelUnit,
    rule: LengthRule,
) -> Result<ResolvedLevels> {
    let scale = unit.scale_from_native(kind)?;

    for candidate in [kind, kind.adjacent()] {
        match store.levels(candidate) {
            Some(values) if rule.accepts(values.nlev(), expected) => {
                if candidate != kind {
                    debug!(
                        requested = kind.var_name(),
                        used = candidate.var_name(),
                        "vertical coordinate fallback"
                    );
                }
                let mut values = values;
                if scale != 1.0 {
                    values.scale(scale);
                }
                return Ok(ResolvedLevels { kind: candidate, values, unit });
            }
            Some(values) => {
                debug!(
                    kind = candidate.var_name(),
                    nlev = values.nlev(),
                    expected,
                    "level array length incompatible"
                );
            }
            None => {}
        }
    }

    Err(AtlasError::MissingCoordinate {
        kind: kind.var_name().to_string(),
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn store_with(kind: VerticalCoordinateKind, values: Array1<f64>) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.set_levels(kind, LevelArray::Static(values));
        store
    }

    #[test]
    fn direct_hit_converts_units() {
        let store = store_with(VerticalCoordinateKind::HeightFull, array![0.0, 1000.0, 2000.0]);
        let resolved = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightFull,
            3,
            LevelUnit::Kilometers,
            LengthRule::Exact,
        )
        .unwrap();
        match resolved.values {
            LevelArray::Static(v) => assert_relative_eq!(v[2], 2.0),
            _ => panic!("expected static levels"),
        }
    }

    #[test]
    fn native_unit_is_identity() {
        let levels = array![0.0, 1000.0, 2000.0];
        let store = store_with(VerticalCoordinateKind::HeightFull, levels.clone());
        let resolved = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightFull,
            3,
            LevelUnit::Meters,
            LengthRule::Exact,
        )
        .unwrap();
        match resolved.values {
            LevelArray::Static(v) => assert_eq!(v, levels),
            _ => panic!("expected static levels"),
        }
    }

    #[test]
    fn unit_conversion_round_trips() {
        let m_to_km = LevelUnit::Kilometers
            .scale_from_native(VerticalCoordinateKind::HeightFull)
            .unwrap();
        assert_relative_eq!(1234.5 * m_to_km * 1000.0, 1234.5, max_relative = 1e-12);

        let pa_to_hpa = LevelUnit::Hectopascals
            .scale_from_native(VerticalCoordinateKind::PressureHalf)
            .unwrap();
        assert_relative_eq!(101325.0 * pa_to_hpa * 100.0, 101325.0, max_relative = 1e-12);
    }

    #[test]
    fn falls_back_to_adjacent_kind() {
        let store = store_with(VerticalCoordinateKind::HeightFull, array![0.0, 500.0]);
        let resolved = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightHalf,
            2,
            LevelUnit::Meters,
            LengthRule::Exact,
        )
        .unwrap();
        assert_eq!(resolved.kind, VerticalCoordinateKind::HeightFull);
    }

    #[test]
    fn fallback_never_crosses_families() {
        let store = store_with(VerticalCoordinateKind::PressureFull, array![100000.0, 90000.0]);
        let err = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightHalf,
            2,
            LevelUnit::Meters,
            LengthRule::Exact,
        )
        .unwrap_err();
        assert!(matches!(err, AtlasError::MissingCoordinate { .. }));
    }

    #[test]
    fn off_by_one_interface_array_is_accepted() {
        let store = store_with(VerticalCoordinateKind::HeightHalf, array![0.0, 500.0, 1000.0]);
        let resolved = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightHalf,
            2,
            LevelUnit::Meters,
            LengthRule::CentersOrEdges,
        )
        .unwrap();
        assert_eq!(resolved.values.nlev(), 3);
    }

    #[test]
    fn grossly_wrong_length_is_rejected() {
        let store = store_with(VerticalCoordinateKind::HeightHalf, array![0.0, 1.0, 2.0, 3.0, 4.0]);
        let err = resolve_levels(
            &store,
            VerticalCoordinateKind::HeightHalf,
            2,
            LevelUnit::Meters,
            LengthRule::CentersOrEdges,
        )
        .unwrap_err();
        assert!(matches!(err, AtlasError::MissingCoordinate { .. }));
    }

    #[test]
    fn cross_family_unit_is_unsupported() {
        let err = LevelUnit::Hectopascals
            .scale_from_native(VerticalCoordinateKind::HeightFull)
            .unwrap_err();
        assert!(matches!(err, AtlasError::UnsupportedUnit { .. }));
    }
}
