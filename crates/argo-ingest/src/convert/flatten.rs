//! Dataset to rows
//!
//! The row index is the cartesian product of every dimension used by some
//! variable, in dataset declaration order with the last dimension varying
//! fastest. Each variable is broadcast over the index dimensions it does not
//! use. Zero-length dimensions are left out of the index; cells of variables
//! spanning one are missing.

use std::collections::HashMap;

use tracing::trace;

use super::coerce::{coerce_checked, RawValue, Value};
use super::dataset::{Dataset, Variable};
use super::schema::{ColumnSchema, ColumnType};

static MISSING: RawValue = RawValue::Missing;

/// Where a column's cells come from
enum Source<'a> {
    /// Not in the dataset, or spans an empty dimension
    Absent,
    /// `(index position, stride)` per variable dimension
    Var {
        var: &'a Variable,
        strides: Vec<(usize, usize)>,
    },
}

/// Row view of a dataset restricted to a schema
pub struct Flattener<'a> {
    schema: &'a ColumnSchema,
    index: Vec<usize>,
    columns: Vec<(ColumnType, Source<'a>)>,
    rows: usize,
}

/// Per-column count of present values that failed coercion
pub type CoercionFailures = HashMap<String, usize>;

impl<'a> Flattener<'a> {
    pub fn new(dataset: &'a Dataset, schema: &'a ColumnSchema) -> Self {
        let used: Vec<&str> = dataset
            .dims
            .iter()
            .filter(|d| d.len > 0)
            .filter(|d| dataset.vars.iter().any(|v| v.dims.contains(&d.name)))
            .map(|d| d.name.as_str())
            .collect();
        let index: Vec<usize> = used
            .iter()
            .filter_map(|name| dataset.dim(name).map(|d| d.len))
            .collect();
        let rows = if index.is_empty() {
            usize::from(!dataset.vars.is_empty())
        } else {
            index.iter().product()
        };

        let columns = schema
            .columns()
            .map(|(name, ty)| {
                let source = match dataset.var(name) {
                    Some(var) => source_for(var, dataset, &used),
                    None => Source::Absent,
                };
                (ty, source)
            })
            .collect();

        Self {
            schema,
            index,
            columns,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn header(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    /// Coerced cells of row `row`, in schema order
    pub fn row(&self, row: usize, failures: &mut CoercionFailures) -> Vec<Value> {
        let coords = self.coords(row);
        self.columns
            .iter()
            .zip(self.schema.names())
            .map(|((ty, source), column)| {
                let raw = match source {
                    Source::Absent => &MISSING,
                    Source::Var { var, strides } => {
                        let offset: usize = strides.iter().map(|(pos, stride)| coords[*pos] * stride).sum();
                        var.values.get(offset).unwrap_or(&MISSING)
                    },
                };
                match coerce_checked(raw, *ty) {
                    Ok(value) => value,
                    Err(e) => {
                        trace!(column, error = %e, "Coercion failed, writing null");
                        *failures.entry(column.to_string()).or_default() += 1;
                        Value::Null
                    },
                }
            })
            .collect()
    }

    fn coords(&self, mut row: usize) -> Vec<usize> {
        let mut coords = vec![0; self.index.len()];
        for (slot, len) in coords.iter_mut().zip(&self.index).rev() {
            *slot = row % len;
            row /= len;
        }
        coords
    }
}

fn source_for<'a>(var: &'a Variable, dataset: &Dataset, used: &[&str]) -> Source<'a> {
    let mut strides = Vec::with_capacity(var.dims.len());
    let mut stride = 1;
    for dim in var.dims.iter().rev() {
        let Some(pos) = used.iter().position(|u| *u == dim.as_str()) else {
            return Source::Absent;
        };
        strides.push((pos, stride));
        stride *= dataset.dim(dim).map_or(0, |d| d.len);
    }
    if var.values.is_empty() {
        return Source::Absent;
    }
    Source::Var { var, strides }
}
