//! In-memory representation of a loaded variable.

use crate::error::{AtlasError, Result};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

/// A variable loaded from a dataset, widened to f64, with its time axis and
/// descriptive metadata.
///
/// Shape conventions: `(time,)` for scalar series, `(time, level)` for
/// profiles. The time axis holds the numeric values of the stored time
/// coordinate; calendar decoding is left to the rendering sink.
#[derive(Debug, Clone)]
pub struct Field {
    /// Variable name as requested.
    pub name: String,
    /// Descriptive name, e.g. "Liquid water path".
    pub long_name: String,
    /// Units string as stored, e.g. "kg m-2".
    pub units: String,
    /// The data, `(time,)` or `(time, level)`.
    pub data: ArrayD<f64>,
    /// Numeric time coordinate, one entry per time step.
    pub time: Array1<f64>,
    /// Units of the time coordinate, e.g. "hours since 1997-06-21 11:30:0.0".
    pub time_units: String,
}

impl Field {
    /// Number of time steps.
    pub fn ntime(&self) -> usize {
        self.time.len()
    }

    /// Number of vertical levels, if the field has a level axis.
    pub fn nlev(&self) -> Option<usize> {
        if self.data.ndim() == 2 {
            Some(self.data.shape()[1])
        } else {
            None
        }
    }

    /// View the data as a scalar time series.
    pub fn series(&self) -> Result<Array1<f64>> {
        self.data
            .clone()
            .into_dimensionality::<Ix1>()
            .map_err(|_| {
                AtlasError::shape(format!(
                    "'{}' is not a scalar series (shape {:?})",
                    self.name,
                    self.data.shape()
                ))
            })
    }

    /// View the data as a (time, level) profile section.
    pub fn profile(&self) -> Result<Array2<f64>> {
        self.data
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|_| {
                AtlasError::shape(format!(
                    "'{}' is not a (time, level) field (shape {:?})",
                    self.name,
                    self.data.shape()
                ))
            })
    }

    /// Build a scalar-series field reusing the time axis of `template`.
    pub fn series_like(
        template: &Field,
        name: impl Into<String>,
        long_name: impl Into<String>,
        units: impl Into<String>,
        values: Array1<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            long_name: long_name.into(),
            units: units.into(),
            data: values.into_dyn(),
            time: template.time.clone(),
            time_units: template.time_units.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Field {
        Field {
            name: "theta".into(),
            long_name: "Potential temperature".into(),
            units: "K".into(),
            data: array![[300.0, 301.0], [302.0, 303.0]].into_dyn(),
            time: array![0.0, 1.0],
            time_units: "hours since 1997-06-21 11:30:0.0".into(),
        }
    }

    #[test]
    fn profile_shape_accessors() {
        let f = sample();
        assert_eq!(f.ntime(), 2);
        assert_eq!(f.nlev(), Some(2));
        assert!(f.profile().is_ok());
        assert!(f.series().is_err());
    }

    #[test]
    fn series_like_inherits_time_axis() {
        let f = sample();
        let s = Field::series_like(&f, "lwp", "Liquid water path", "kg m-2", array![1.0, 2.0]);
        assert_eq!(s.time, f.time);
        assert_eq!(s.nlev(), None);
        assert!(s.series().is_ok());
    }
}
