//! In-memory view of a NetCDF file
//!
//! Loads every variable of a classic or 64-bit offset NetCDF file into plain
//! owned values. Character arrays lose their last (string length) dimension
//! and become one text cell per remaining index; numeric cells equal to the
//! variable's `_FillValue` or `missing_value` become [`RawValue::Missing`].

use std::path::Path;

use netcdf3::{DataVector, FileReader};
use tracing::debug;

use super::coerce::RawValue;
use crate::error::{IngestError, Result};

const FILL_ATTRS: [&str; 2] = ["_FillValue", "missing_value"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// One variable, values in row-major order over `dims`
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub values: Vec<RawValue>,
}

/// Dimensions and variables in file declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dims: Vec<Dimension>,
    pub vars: Vec<Variable>,
}

impl Dataset {
    /// Read a NetCDF file from disk; blocking
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = FileReader::open(path)
            .map_err(|e| IngestError::Parse(format!("{}: {:?}", path.display(), e)))?;

        let (dims, var_specs) = {
            let ds = reader.data_set();
            let dims: Vec<Dimension> = ds
                .get_dims()
                .iter()
                .map(|d| Dimension {
                    name: d.name(),
                    len: d.size(),
                })
                .collect();

            let var_specs: Vec<VarSpec> = ds
                .get_vars()
                .into_iter()
                .map(|var| VarSpec {
                    name: var.name().to_string(),
                    dims: var.dim_names(),
                    fill: FILL_ATTRS
                        .iter()
                        .filter_map(|attr| var.get_attr(attr))
                        .flat_map(attr_as_f64)
                        .collect(),
                })
                .collect();
            (dims, var_specs)
        };

        let mut vars = Vec::with_capacity(var_specs.len());
        for spec in var_specs {
            let data = reader
                .read_var(&spec.name)
                .map_err(|e| IngestError::Parse(format!("variable {}: {:?}", spec.name, e)))?;
            vars.push(spec.into_variable(data, &dims)?);
        }

        debug!(
            path = %path.display(),
            dims = dims.len(),
            vars = vars.len(),
            "Loaded NetCDF dataset"
        );
        Ok(Self { dims, vars })
    }

    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    /// Case-insensitive lookup
    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name.eq_ignore_ascii_case(name))
    }
}

struct VarSpec {
    name: String,
    dims: Vec<String>,
    fill: Vec<f64>,
}

impl VarSpec {
    fn into_variable(self, data: DataVector, dims: &[Dimension]) -> Result<Variable> {
        let VarSpec {
            name,
            dims: mut var_dims,
            fill,
        } = self;

        let values = match data {
            // NC_CHAR; NC_BYTE arrives as I8
            DataVector::U8(bytes) => {
                let width = match var_dims.pop() {
                    Some(last) => dims
                        .iter()
                        .find(|d| d.name == last)
                        .map(|d| d.len)
                        .ok_or_else(|| IngestError::Parse(format!("{name}: unknown dimension {last}")))?,
                    None => bytes.len(),
                };
                collapse_chars(&bytes, width)
            },
            DataVector::I8(v) => numeric(v.into_iter().map(f64::from), &fill),
            DataVector::I16(v) => numeric(v.into_iter().map(f64::from), &fill),
            DataVector::I32(v) => numeric(v.into_iter().map(f64::from), &fill),
            DataVector::F32(v) => v
                .into_iter()
                .map(|x| {
                    if is_fill(f64::from(x), &fill) {
                        RawValue::Missing
                    } else {
                        RawValue::Float(widen_f32(x))
                    }
                })
                .collect(),
            DataVector::F64(v) => v
                .into_iter()
                .map(|x| {
                    if is_fill(x, &fill) {
                        RawValue::Missing
                    } else {
                        RawValue::Float(x)
                    }
                })
                .collect(),
        };

        Ok(Variable {
            name,
            dims: var_dims,
            values,
        })
    }
}

/// Integer-typed cells; `f64` holds every NetCDF-3 integer exactly
fn numeric(values: impl Iterator<Item = f64>, fill: &[f64]) -> Vec<RawValue> {
    values
        .map(|x| {
            if is_fill(x, fill) {
                RawValue::Missing
            } else {
                RawValue::Int(x as i64)
            }
        })
        .collect()
}

fn is_fill(x: f64, fill: &[f64]) -> bool {
    fill.iter().any(|f| *f == x)
}

/// Shortest decimal form of the f32, so 0.1f32 reads back as 0.1
fn widen_f32(x: f32) -> f64 {
    if x.is_finite() {
        x.to_string().parse().unwrap_or(f64::from(x))
    } else {
        f64::from(x)
    }
}

fn collapse_chars(bytes: &[u8], width: usize) -> Vec<RawValue> {
    if width == 0 {
        return Vec::new();
    }
    bytes
        .chunks(width)
        .map(|chunk| {
            let end = chunk.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            RawValue::Bytes(chunk[..end].to_vec())
        })
        .collect()
}

fn attr_as_f64(attr: &netcdf3::Attribute) -> Vec<f64> {
    if let Some(v) = attr.get_f64() {
        return v.to_vec();
    }
    if let Some(v) = attr.get_f32() {
        return v.iter().map(|x| f64::from(*x)).collect();
    }
    if let Some(v) = attr.get_i32() {
        return v.iter().map(|x| f64::from(*x)).collect();
    }
    if let Some(v) = attr.get_i16() {
        return v.iter().map(|x| f64::from(*x)).collect();
    }
    if let Some(v) = attr.get_i8() {
        return v.iter().map(|x| f64::from(*x)).collect();
    }
    Vec::new()
}
