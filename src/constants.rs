//! Physical constants and numeric conventions shared by the derivation
//! formulas.

/// Gravitational acceleration (m s-2).
pub const G: f64 = 9.80665;

/// Latent heat of vaporization (J kg-1).
pub const LV: f64 = 2.501e6;

/// Specific heat of dry air at constant pressure (J K-1 kg-1).
pub const CPD: f64 = 1004.709;

/// Missing-value sentinel.
///
/// Marks cells that are structurally undefined (e.g. no cloud found in a
/// column). Exactly representable as f32 so it survives a round trip through
/// single-precision files. Downstream averaging must exclude it, never treat
/// it as zero.
pub const MISSING: f64 = 1.0e20;

/// Cloud fraction above which a level counts as cloudy.
pub const CLOUD_FRACTION_THRESHOLD: f64 = 0.001;

/// Check a value against the missing sentinel.
pub fn is_missing(v: f64) -> bool {
    v >= MISSING
}
