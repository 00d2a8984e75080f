//! Dataset identity, loaded fields and storage access.
//!
//! This module defines how datasets are named and how their arrays reach the
//! diagnostic core, independent of the underlying file format.

mod dataset;
mod field;
mod store;

pub use dataset::Dataset;
pub use field::Field;
pub use store::{DataStore, MemoryProvider, MemoryStore, NetcdfProvider, NetcdfStore, StoreProvider};
