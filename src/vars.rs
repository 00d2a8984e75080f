//! Logical-variable registry.
//!
//! Maps each logical variable name to its display metadata and default scale
//! coefficient. The catalog is owned by the caller and passed into the core
//! by reference; nothing here is global state. Per-dataset overrides live on
//! [`Dataset`](crate::data::Dataset).

use std::collections::HashMap;

/// Display metadata and default scaling for one logical variable.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    /// Descriptive name, e.g. "Liquid water path".
    pub name: String,
    /// Display units after scaling, e.g. "g m-2".
    pub units: String,
    /// Default scale coefficient from stored to display units.
    pub coef: f64,
}

/// Caller-owned registry of logical variables.
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    entries: HashMap<String, VariableInfo>,
}

impl VariableCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a variable.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        units: impl Into<String>,
        coef: f64,
    ) {
        self.entries.insert(
            key.into(),
            VariableInfo { name: name.into(), units: units.into(), coef },
        );
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&VariableInfo> {
        self.entries.get(key)
    }

    /// Descriptive name, falling back to the key itself.
    pub fn long_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map(|i| i.name.as_str()).unwrap_or(key)
    }

    /// Display units, empty when unregistered.
    pub fn units<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map(|i| i.units.as_str()).unwrap_or("")
    }

    /// Default scale coefficient, 1.0 when unregistered.
    pub fn coef(&self, key: &str) -> f64 {
        self.get(key).map(|i| i.coef).unwrap_or(1.0)
    }

    /// The standard MUSC variable registry.
    pub fn standard() -> Self {
        let mut c = Self::new();
        // Profile variables
        c.register("u", "Zonal wind", "m s-1", 1.0);
        c.register("v", "Meridional wind", "m s-1", 1.0);
        c.register("theta", "Potential temperature", "K", 1.0);
        c.register("thetal", "Liquid-water potential temperature", "K", 1.0);
        c.register("temp", "Temperature", "K", 1.0);
        c.register("qv", "Specific humidity", "g kg-1", 1000.0);
        c.register("hur", "Relative humidity", "%", 100.0);
        c.register("rneb", "Cloud fraction", "%", 100.0);
        c.register("ql", "Liquid water content", "mg kg-1", 1.0e6);
        c.register("qi", "Ice water content", "mg kg-1", 1.0e6);
        c.register("qr", "Rain water content", "mg kg-1", 1.0e6);
        c.register("qsn", "Snow water content", "mg kg-1", 1.0e6);
        c.register("qc", "Condensed water content", "mg kg-1", 1.0e6);
        c.register("qp", "Precipitating water content", "mg kg-1", 1.0e6);
        c.register("qt", "Total water content", "g kg-1", 1000.0);
        c.register("tke", "Turbulent kinetic energy", "m2 s-2", 1.0);
        c.register("w_up", "Updraft vertical velocity", "m s-1", 1.0);
        c.register("alpha_up", "Updraft area fraction", "%", 100.0);
        c.register("Mf", "Updraft mass flux", "kg m-2 s-1", 1.0);
        c.register("dTv_up", "Updraft dTv", "K", 1.0);
        c.register("B_up", "Updraft buoyancy", "m s-2", 1.0);
        c.register("eps_u", "Updraft entrainment", "km-1", 1000.0);
        c.register("det_u", "Updraft detrainment", "km-1", 1000.0);
        // Scalar variables
        c.register("shf", "Sensible heat flux", "W m-2", 1.0);
        c.register("lhf", "Latent heat flux", "W m-2", 1.0);
        c.register("ustar", "Surface friction velocity", "m s-1", 1.0);
        c.register("tsurf", "Surface temperature", "K", 1.0);
        c.register("rain", "Surface precipitation", "mm day-1", 86400.0);
        c.register("cc", "Total cloud fraction", "%", 100.0);
        c.register("max_cf", "Maximum cloud fraction", "-", 1.0);
        c.register("zcb", "Cloud base height", "m", 1.0);
        c.register("zct", "Cloud top height", "m", 1.0);
        c.register("prw", "Precipitable water", "kg m-2", 1.0);
        c.register("lwp", "Liquid water path", "g m-2", 1000.0);
        c.register("iwp", "Ice water path", "g m-2", 1000.0);
        c.register("rwp", "Rain water path", "g m-2", 1000.0);
        c.register("swp", "Snow water path", "g m-2", 1000.0);
        c.register("gwp", "Graupel water path", "g m-2", 1000.0);
        // Layer means
        c.register("theta_0_500", "Potential temperature averaged over 0-500m", "K", 1.0);
        c.register("qv_0_500", "Specific humidity averaged over 0-500m", "g kg-1", 1000.0);
        c.register("theta_2000_5000", "Potential temperature averaged over 2000-5000m", "K", 1.0);
        c.register("qv_2000_5000", "Specific humidity averaged over 2000-5000m", "g kg-1", 1000.0);
        // Radiation budgets
        c.register("Qr_int", "Integrated radiative heating", "W m-2", 1.0);
        c.register("TOA_cre_sw", "TOA SW cloud radiative effect", "W m-2", 1.0);
        c.register("TOA_cre_lw", "TOA LW cloud radiative effect", "W m-2", 1.0);
        c.register("Qr_int_cre", "Atmospheric cloud radiative effect", "W m-2", 1.0);
        c
    }
}
