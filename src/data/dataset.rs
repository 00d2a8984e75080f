//! Dataset identity and per-dataset naming conventions.

use std::collections::HashMap;
use std::path::PathBuf;

/// A named, versioned source of model or reference output.
///
/// Identity is `name/case/subcase`. The struct only carries identity, the
/// file location and the dataset's local naming conventions; the actual
/// arrays are accessed through a [`DataStore`](super::DataStore) opened per
/// run. Constructed once per atlas and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Dataset name, e.g. "LES_5min" or "arpege".
    pub name: String,
    /// Case, e.g. "ARMCU".
    pub case: String,
    /// Subcase, e.g. "REF".
    pub subcase: String,
    /// Location of the underlying file.
    pub file: PathBuf,
    /// Free-form comment, shown in reports only.
    pub comment: Option<String>,
    /// Logical variable name -> dataset-local alias.
    pub varnames: HashMap<String, String>,
    /// Logical variable name -> scale coefficient overriding the catalog
    /// default.
    pub coefs: HashMap<String, f64>,
    /// Line style for the plotting sink, opaque to the core.
    pub line: Option<String>,
}

impl Dataset {
    /// Create a dataset with no alias or coefficient overrides.
    pub fn new(
        name: impl Into<String>,
        case: impl Into<String>,
        subcase: impl Into<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            case: case.into(),
            subcase: subcase.into(),
            file: file.into(),
            comment: None,
            varnames: HashMap::new(),
            coefs: HashMap::new(),
            line: None,
        }
    }

    /// Dataset identity, `name/case/subcase`.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.name, self.case, self.subcase)
    }

    /// The dataset-local alias for a logical variable.
    pub fn alias<'a>(&'a self, variable: &'a str) -> &'a str {
        self.varnames.get(variable).map(String::as_str).unwrap_or(variable)
    }

    /// The per-dataset scale coefficient override, if declared.
    pub fn coef(&self, variable: &str) -> Option<f64> {
        self.coefs.get(variable).copied()
    }

    /// Whether the underlying file exists on disk.
    pub fn is_valid(&self) -> bool {
        self.file.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_aliases() {
        let mut ds = Dataset::new("LES_5min", "ARMCU", "REF", "/data/ARMCU_LES.nc");
        ds.varnames.insert("rneb".into(), "cloud_fraction".into());
        ds.coefs.insert("qv".into(), 1.0);

        assert_eq!(ds.id(), "LES_5min/ARMCU/REF");
        assert_eq!(ds.alias("rneb"), "cloud_fraction");
        assert_eq!(ds.alias("theta"), "theta");
        assert_eq!(ds.coef("qv"), Some(1.0));
        assert_eq!(ds.coef("theta"), None);
    }
}
