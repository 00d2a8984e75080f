//! Error types for scm-atlas.
//!
//! This module provides a unified error handling approach using `thiserror`.
//!
//! Two classes of failure exist. Data-availability gaps (`MissingVariable`,
//! `MissingDependency`, `MissingCoordinate`, `EmptyTimeWindow`) are recovered
//! per dataset: they are logged to the
//! [`ErrorTracker`](crate::errlog::ErrorTracker) and the
//! dataset is skipped for that diagnostic. Everything else is a
//! configuration error or a bug and aborts the enclosing diagnostic or run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for scm-atlas operations.
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Errors that can occur in scm-atlas.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Requested variable is neither stored nor derivable in a dataset.
    #[error("Variable '{variable}' not found in dataset '{dataset}'")]
    MissingVariable {
        /// Dataset identity.
        dataset: String,
        /// Logical variable name.
        variable: String,
    },

    /// A derivation's required input field is absent.
    #[error("Cannot derive '{variable}': missing input '{dependency}'")]
    MissingDependency {
        /// Variable being derived.
        variable: String,
        /// The absent input field.
        dependency: String,
    },

    /// No compatible vertical-coordinate array found, including after the
    /// half/full fallback.
    #[error("No {kind} coordinate compatible with {expected} levels")]
    MissingCoordinate {
        /// Requested coordinate kind.
        kind: String,
        /// Trailing length of the variable being plotted.
        expected: usize,
    },

    /// A diagnostic's averaging window falls outside a dataset's simulated
    /// span. A short run simply has nothing to contribute there.
    #[error("Time window {window} selects no time steps in this dataset")]
    EmptyTimeWindow {
        /// The requested window, rendered for the error log.
        window: String,
    },

    /// Requested unit has no conversion for the coordinate family.
    #[error("Unit '{unit}' is not supported for {kind} levels")]
    UnsupportedUnit {
        /// Coordinate kind whose family defines the conversion table.
        kind: String,
        /// The unsupported unit.
        unit: String,
    },

    /// A declared-but-not-built diagnostic kind was requested.
    #[error("Diagnostic kind '{0}' is not implemented")]
    UnimplementedDiagnostic(String),

    /// A diagnostic group declared incompatible kinds together.
    #[error("Diagnostic group '{group}' mixes 2D and curve diagnostics")]
    MixedDiagnosticKinds {
        /// Offending group name.
        group: String,
    },

    /// Bias mode requested but the reference dataset did not resolve.
    #[error("Bias reference dataset '{0}' produced no output")]
    MissingReferenceDataset(String),

    /// Invalid atlas or diagnostic configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An array had an unexpected shape; indicates corrupt data or a bug.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Failed to open a file.
    #[error("Failed to open file: {path}")]
    FileOpen {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a NetCDF file.
    #[error("NetCDF error: {0}")]
    NetCdf(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON document (configuration or persisted output index).
    #[error("JSON error: {0}")]
    Index(#[from] serde_json::Error),
}

impl AtlasError {
    /// Create a MissingVariable error.
    pub fn missing_variable(dataset: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::MissingVariable {
            dataset: dataset.into(),
            variable: variable.into(),
        }
    }

    /// Create a MissingDependency error.
    pub fn missing_dependency(variable: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            variable: variable.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// True for failures recovered per (dataset, diagnostic) pair; false for
    /// configuration errors and bugs, which abort the diagnostic.
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable { .. }
                | Self::MissingDependency { .. }
                | Self::MissingCoordinate { .. }
                | Self::EmptyTimeWindow { .. }
        )
    }
}

impl From<netcdf::Error> for AtlasError {
    fn from(err: netcdf::Error) -> Self {
        Self::NetCdf(err.to_string())
    }
}
