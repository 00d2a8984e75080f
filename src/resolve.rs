//! Per-dataset resolution of logical variables.
//!
//! A logical variable resolves against one dataset to either a direct alias
//! into its stored arrays or a derivation plan. Resolution is all-or-nothing
//! per (dataset, variable): a failed resolution leaves no partial state.

use crate::data::{DataStore, Dataset, Field};
use crate::derived::DerivedVariable;
use crate::error::{AtlasError, Result};
use crate::vars::VariableCatalog;
use tracing::debug;

/// How a logical variable maps onto one dataset.
#[derive(Debug, Clone)]
pub enum VariableBinding {
    /// Stored directly under `alias`; scale by `coef` for display.
    Direct {
        /// Dataset-local variable name.
        alias: String,
        /// Scale coefficient to display units.
        coef: f64,
    },
    /// Not stored; computed by the derivation engine.
    Derived {
        /// The derivation to run.
        plan: DerivedVariable,
        /// Scale coefficient to display units.
        coef: f64,
    },
}

impl VariableBinding {
    /// The scale coefficient of this binding.
    pub fn coef(&self) -> f64 {
        match self {
            Self::Direct { coef, .. } | Self::Derived { coef, .. } => *coef,
        }
    }
}

/// Resolves logical variables against datasets using a caller-owned catalog.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    catalog: &'a VariableCatalog,
}

impl<'a> VariableResolver<'a> {
    /// Create a resolver over `catalog`.
    pub fn new(catalog: &'a VariableCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog backing this resolver.
    pub fn catalog(&self) -> &'a VariableCatalog {
        self.catalog
    }

    /// Determine the binding of `variable` for `dataset`.
    ///
    /// A derivation plan wins when one exists: a stored field of the same
    /// name may be a partial quantity the derivation completes (the
    /// two-species hydrometeor case). Otherwise the dataset-local alias
    /// (override or the logical name itself) is used when the store carries
    /// it. The coefficient comes from the dataset override, falling back to
    /// the catalog default.
    pub fn resolve(
        &self,
        dataset: &Dataset,
        store: &dyn DataStore,
        variable: &str,
    ) -> Result<VariableBinding> {
        let coef = dataset
            .coef(variable)
            .unwrap_or_else(|| self.catalog.coef(variable));

        if let Some(plan) = DerivedVariable::from_name(variable) {
            debug!(dataset = %dataset.id(), variable, ?plan, "resolved to derivation");
            return Ok(VariableBinding::Derived { plan, coef });
        }

        let alias = dataset.alias(variable);
        if store.has(alias) {
            debug!(dataset = %dataset.id(), variable, alias, "resolved to stored variable");
            return Ok(VariableBinding::Direct { alias: alias.to_string(), coef });
        }

        Err(AtlasError::missing_variable(dataset.id(), variable))
    }

    /// Execute a binding into a loaded field. The scale coefficient is not
    /// applied here; the diagnostic runner applies it after temporal
    /// selection.
    ///
    /// A derivation whose inputs are absent falls back to the stored alias
    /// when the dataset carries one (a reference dataset may store `lwp`
    /// directly without any `ql` or `phalf` to integrate).
    pub fn fetch(
        &self,
        dataset: &Dataset,
        store: &dyn DataStore,
        variable: &str,
    ) -> Result<(Field, f64)> {
        let binding = self.resolve(dataset, store, variable)?;
        let field = match &binding {
            VariableBinding::Direct { alias, .. } => store.get(alias)?,
            VariableBinding::Derived { plan, .. } => match plan.compute(store) {
                Ok(field) => field,
                Err(e) if e.is_data_gap() => {
                    let alias = dataset.alias(variable);
                    if store.has(alias) {
                        debug!(dataset = %dataset.id(), variable, alias, error = %e,
                            "derivation inputs absent, using stored variable");
                        store.get(alias)?
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            },
        };
        Ok((field, binding.coef()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;
    use ndarray::array;

    fn store_with_series(name: &str) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(Field {
            name: name.into(),
            long_name: name.into(),
            units: "K".into(),
            data: array![300.0, 301.0].into_dyn(),
            time: array![0.0, 1.0],
            time_units: "hours since 2000-01-01 00:00:0.0".into(),
        });
        store
    }

    #[test]
    fn alias_override_is_used() {
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let mut ds = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        ds.varnames.insert("tsurf".into(), "ts".into());
        let store = store_with_series("ts");

        match resolver.resolve(&ds, &store, "tsurf").unwrap() {
            VariableBinding::Direct { alias, coef } => {
                assert_eq!(alias, "ts");
                assert_eq!(coef, 1.0);
            }
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn dataset_coef_overrides_catalog_default() {
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let mut ds = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        ds.coefs.insert("qv".into(), 1.0);
        let store = store_with_series("qv");

        let binding = resolver.resolve(&ds, &store, "qv").unwrap();
        assert_eq!(binding.coef(), 1.0);

        // Without the override the catalog default applies.
        let ds_plain = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        let binding = resolver.resolve(&ds_plain, &store, "qv").unwrap();
        assert_eq!(binding.coef(), 1000.0);
    }

    fn store_with_profile(name: &str, values: ndarray::Array2<f64>) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(Field {
            name: name.into(),
            long_name: name.into(),
            units: "kg kg-1".into(),
            data: values.into_dyn(),
            time: array![0.0],
            time_units: "hours since 2000-01-01 00:00:0.0".into(),
        });
        store
    }

    #[test]
    fn derivation_takes_precedence_over_stored_variable() {
        // A PCMT dataset stores both species; the stored single species must
        // not shadow the two-species sum.
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let ds = Dataset::new("pcmt", "ARMCU", "REF", "/tmp/x.nc");
        let mut store = store_with_profile("ql", array![[1.0e-3, 2.0e-3]]);
        store.insert(Field {
            name: "qlc".into(),
            long_name: "qlc".into(),
            units: "kg kg-1".into(),
            data: array![[0.5e-3, 0.5e-3]].into_dyn(),
            time: array![0.0],
            time_units: "hours since 2000-01-01 00:00:0.0".into(),
        });

        assert!(matches!(
            resolver.resolve(&ds, &store, "ql").unwrap(),
            VariableBinding::Derived { plan: DerivedVariable::LiquidWater, .. }
        ));
        let (field, _) = resolver.fetch(&ds, &store, "ql").unwrap();
        assert_eq!(field.profile().unwrap()[[0, 0]], 1.5e-3);
    }

    #[test]
    fn fetch_falls_back_to_stored_when_derivation_lacks_inputs() {
        // An LES reference stores lwp directly, with nothing to integrate.
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let ds = Dataset::new("les", "ARMCU", "REF", "/tmp/x.nc");
        let store = store_with_series("lwp");

        let (field, coef) = resolver.fetch(&ds, &store, "lwp").unwrap();
        assert_eq!(field.series().unwrap(), array![300.0, 301.0]);
        assert_eq!(coef, 1000.0);
    }

    #[test]
    fn fetch_propagates_gap_when_neither_derivable_nor_stored() {
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let ds = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        let store = MemoryStore::new();

        let err = resolver.fetch(&ds, &store, "lwp").unwrap_err();
        assert!(err.is_data_gap());
    }

    #[test]
    fn absent_but_derivable_uses_plan() {
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let ds = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        let store = MemoryStore::new();

        assert!(matches!(
            resolver.resolve(&ds, &store, "lwp").unwrap(),
            VariableBinding::Derived { plan: DerivedVariable::LiquidWaterPath, .. }
        ));
    }

    #[test]
    fn unknown_variable_is_missing() {
        let catalog = VariableCatalog::standard();
        let resolver = VariableResolver::new(&catalog);
        let ds = Dataset::new("scm", "ARMCU", "REF", "/tmp/x.nc");
        let store = MemoryStore::new();

        let err = resolver.resolve(&ds, &store, "tke").unwrap_err();
        assert!(matches!(err, AtlasError::MissingVariable { .. }));
    }
}
