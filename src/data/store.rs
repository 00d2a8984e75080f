//! Dataset storage access.
//!
//! The core never touches a file format directly: it consumes the
//! [`DataStore`] trait, which exposes variables as [`Field`]s and vertical
//! coordinates as [`LevelArray`]s. [`NetcdfStore`] is the production
//! implementation; [`MemoryStore`] backs tests and programmatic callers.

use super::{Dataset, Field};
use crate::coords::{LevelArray, VerticalCoordinateKind};
use crate::error::{AtlasError, Result};
use ndarray::{Array1, ArrayD, Ix1, Ix2, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::AttributeValue;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Read-only access to one dataset's arrays.
pub trait DataStore {
    /// Whether a variable is stored under `name`.
    fn has(&self, name: &str) -> bool;

    /// Load a variable with its time axis and metadata.
    fn get(&self, name: &str) -> Result<Field>;

    /// The level array stored for a coordinate kind, in native units
    /// (m for height, Pa for pressure), or `None` if the dataset does not
    /// carry it.
    fn levels(&self, kind: VerticalCoordinateKind) -> Option<LevelArray>;
}

/// Opens a [`DataStore`] for a dataset. The seam that lets the diagnostic
/// runner work against files in production and in-memory fixtures in tests.
pub trait StoreProvider {
    /// Open the store backing `dataset`.
    fn open(&self, dataset: &Dataset) -> Result<Box<dyn DataStore>>;
}

// ---------------------------------------------------------------------------
// NetCDF-backed store
// ---------------------------------------------------------------------------

/// NetCDF-backed store. The whole file is read eagerly into f64 arrays on
/// open; MUSC single-column files are small.
#[derive(Debug)]
pub struct NetcdfStore {
    variables: HashMap<String, ArrayD<f64>>,
    attributes: HashMap<String, HashMap<String, String>>,
    time: Array1<f64>,
    time_units: String,
}

impl NetcdfStore {
    /// Read a MUSC-style NetCDF file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = netcdf::open(path).map_err(|e| {
            AtlasError::NetCdf(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut variables = HashMap::new();
        let mut attributes = HashMap::new();

        for var in file.variables() {
            let name = var.name();
            let mut attrs = HashMap::new();
            for attr in var.attributes() {
                attrs.insert(attr.name().to_string(), attr_value_to_string(&attr));
            }

            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let mut data = match read_variable_array(&var, &shape) {
                Ok(data) => data,
                Err(e) => {
                    // Character variables and the like are not diagnosable.
                    debug!(variable = %name, error = %e, "skipping unreadable variable");
                    continue;
                }
            };

            // CF packing convention.
            let scale_factor = attrs
                .get("scale_factor")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);
            let add_offset = attrs
                .get("add_offset")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            if scale_factor != 1.0 || add_offset != 0.0 {
                data.mapv_inplace(|v| v * scale_factor + add_offset);
            }

            variables.insert(name.clone(), squeeze(data));
            attributes.insert(name, attrs);
        }

        let time_data = variables
            .get("time")
            .ok_or_else(|| AtlasError::NetCdf(format!("{}: no time coordinate", path.display())))?;
        let time = time_data
            .clone()
            .into_dimensionality::<Ix1>()
            .map_err(|_| AtlasError::shape("time coordinate is not one-dimensional"))?;
        let time_units = attributes
            .get("time")
            .and_then(|a| a.get("units"))
            .cloned()
            .unwrap_or_default();

        Ok(Self { variables, attributes, time, time_units })
    }

    fn attr(&self, var: &str, name: &str) -> Option<&str> {
        self.attributes.get(var).and_then(|a| a.get(name)).map(String::as_str)
    }
}

impl DataStore for NetcdfStore {
    fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn get(&self, name: &str) -> Result<Field> {
        let data = self
            .variables
            .get(name)
            .ok_or_else(|| AtlasError::NetCdf(format!("variable '{}' not stored", name)))?
            .clone();

        if data.ndim() == 0 || data.shape()[0] != self.time.len() {
            return Err(AtlasError::shape(format!(
                "'{}' has shape {:?}, expected leading time dimension of {}",
                name,
                data.shape(),
                self.time.len()
            )));
        }

        Ok(Field {
            name: name.to_string(),
            long_name: self.attr(name, "long_name").unwrap_or(name).to_string(),
            units: self.attr(name, "units").unwrap_or("").to_string(),
            data,
            time: self.time.clone(),
            time_units: self.time_units.clone(),
        })
    }

    fn levels(&self, kind: VerticalCoordinateKind) -> Option<LevelArray> {
        let data = self.variables.get(kind.var_name())?;
        match data.ndim() {
            1 => data
                .clone()
                .into_dimensionality::<Ix1>()
                .ok()
                .map(LevelArray::Static),
            2 => data
                .clone()
                .into_dimensionality::<Ix2>()
                .ok()
                .map(LevelArray::TimeVarying),
            n => {
                debug!(kind = kind.var_name(), ndim = n, "level array has unusable rank");
                None
            }
        }
    }
}

/// Drop degenerate lat/lon axes (MUSC files keep them as singletons). The
/// leading axis is the record dimension and always survives: a file with a
/// single time step is still a `(1, ...)` series, not a snapshot.
fn squeeze(mut data: ArrayD<f64>) -> ArrayD<f64> {
    while data.ndim() > 1 {
        match data.shape()[1..].iter().position(|&len| len == 1) {
            Some(i) => data = data.remove_axis(ndarray::Axis(i + 1)),
            None => break,
        }
    }
    data
}

fn read_variable_array(var: &netcdf::Variable<'_>, shape: &[usize]) -> Result<ArrayD<f64>> {
    let from_vec = |v: Vec<f64>| -> Result<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(shape), v)
            .map_err(|e| AtlasError::NetCdf(format!("Invalid shape/data size: {}", e)))
    };

    macro_rules! widen {
        ($ty:ty) => {{
            let values: Vec<$ty> = var
                .get_values(..)
                .map_err(|e| AtlasError::NetCdf(format!("Failed to read data: {}", e)))?;
            from_vec(values.into_iter().map(|x| x as f64).collect())
        }};
    }

    match var.vartype() {
        NcVariableType::Float(FloatType::F64) => widen!(f64),
        NcVariableType::Float(FloatType::F32) => widen!(f32),
        NcVariableType::Int(IntType::I64) => widen!(i64),
        NcVariableType::Int(IntType::I32) => widen!(i32),
        NcVariableType::Int(IntType::I16) => widen!(i16),
        NcVariableType::Int(IntType::I8) => widen!(i8),
        NcVariableType::Int(IntType::U64) => widen!(u64),
        NcVariableType::Int(IntType::U32) => widen!(u32),
        NcVariableType::Int(IntType::U16) => widen!(u16),
        NcVariableType::Int(IntType::U8) => widen!(u8),
        other => Err(AtlasError::NetCdf(format!(
            "Unsupported variable type: {:?}",
            other
        ))),
    }
}

fn attr_value_to_string(attr: &netcdf::Attribute<'_>) -> String {
    match attr.value() {
        Ok(AttributeValue::Uchar(v)) => format!("{}", v),
        Ok(AttributeValue::Schar(v)) => format!("{}", v),
        Ok(AttributeValue::Ushort(v)) => format!("{}", v),
        Ok(AttributeValue::Short(v)) => format!("{}", v),
        Ok(AttributeValue::Uint(v)) => format!("{}", v),
        Ok(AttributeValue::Int(v)) => format!("{}", v),
        Ok(AttributeValue::Ulonglong(v)) => format!("{}", v),
        Ok(AttributeValue::Longlong(v)) => format!("{}", v),
        Ok(AttributeValue::Float(v)) => format!("{}", v),
        Ok(AttributeValue::Double(v)) => format!("{}", v),
        Ok(AttributeValue::Str(v)) => v,
        Ok(other) => format!("{:?}", other),
        Err(_) => format!("{:?}", attr),
    }
}

/// Opens [`NetcdfStore`]s from each dataset's file path.
#[derive(Debug, Default)]
pub struct NetcdfProvider;

impl StoreProvider for NetcdfProvider {
    fn open(&self, dataset: &Dataset) -> Result<Box<dyn DataStore>> {
        Ok(Box::new(NetcdfStore::open(&dataset.file)?))
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory store for synthetic data and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    fields: HashMap<String, Field>,
    levels: HashMap<VerticalCoordinateKind, LevelArray>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field under its own name.
    pub fn insert(&mut self, field: Field) {
        self.fields.insert(field.name.clone(), field);
    }

    /// Declare a level array for a coordinate kind (native units).
    pub fn set_levels(&mut self, kind: VerticalCoordinateKind, levels: LevelArray) {
        self.levels.insert(kind, levels);
    }
}

impl DataStore for MemoryStore {
    fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn get(&self, name: &str) -> Result<Field> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| AtlasError::NetCdf(format!("variable '{}' not stored", name)))
    }

    fn levels(&self, kind: VerticalCoordinateKind) -> Option<LevelArray> {
        self.levels.get(&kind).cloned()
    }
}

/// Serves pre-built [`MemoryStore`]s keyed by dataset name.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    stores: HashMap<String, MemoryStore>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the store for a dataset name.
    pub fn register(&mut self, dataset_name: impl Into<String>, store: MemoryStore) {
        self.stores.insert(dataset_name.into(), store);
    }
}

impl StoreProvider for MemoryProvider {
    fn open(&self, dataset: &Dataset) -> Result<Box<dyn DataStore>> {
        self.stores
            .get(&dataset.name)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn DataStore>)
            .ok_or_else(|| {
                AtlasError::NetCdf(format!("no store registered for '{}'", dataset.name))
            })
    }
}
