//! scm-atlas - A diagnostic atlas engine for single-column model evaluation.
//!
//! scm-atlas compares single-column model (SCM) simulations against
//! large-eddy simulation (LES) references for idealized boundary-layer
//! cases. It reads MUSC-style NetCDF output, resolves each requested
//! variable per dataset (stored directly or derived from other fields),
//! normalizes it per diagnostic kind, and hands the result to a pluggable
//! rendering sink.
//!
//! # Features
//!
//! - Direct and derived variable resolution with per-dataset aliases
//! - Cloud, water-path and radiation-budget derivations
//! - Time series, averaged/initial profiles and time-height sections
//! - Vertical-coordinate fallback between cell centers and interfaces
//! - Per-dataset failure isolation with an end-of-run skip report
//!
//! # Example
//!
//! ```ignore
//! use scm_atlas::config::AtlasConfig;
//! use scm_atlas::data::NetcdfProvider;
//! use scm_atlas::sink::JsonSink;
//! use std::path::Path;
//!
//! let mut atlas = AtlasConfig::from_path(Path::new("config_ARMCU.json"))?.build()?;
//! atlas.run(&NetcdfProvider, &JsonSink, Path::new("atlas_out"), true)?;
//! println!("{}", atlas.summary());
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod coords;
pub mod data;
pub mod derived;
pub mod diag;
pub mod errlog;
pub mod error;
pub mod resolve;
pub mod sink;
pub mod vars;

pub use error::{AtlasError, Result};
