use crate::error::{FeatureError, MismatchKind, Result};
use crate::models::{TableKind, TableSpec};
use log::debug;
use polars::prelude::*;
use std::collections::HashMap;

/// Column names and types of one table, in catalogue order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: TableKind,
    pub columns: Vec<(String, DataType)>,
}

impl TableSchema {
    pub fn dtype(&self, column: &str) -> Option<&DataType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, dtype)| dtype)
    }

    pub fn without(&self, column: &str) -> TableSchema {
        TableSchema {
            table: self.table,
            columns: self
                .columns
                .iter()
                .filter(|(name, _)| name != column)
                .cloned()
                .collect(),
        }
    }
}

/// Schemas captured from the initial snapshot. Every later batch is coerced
/// against these, never re-inferred.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TableKind, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the catalogue columns of `df` with the types they were loaded as.
    pub fn infer(spec: &TableSpec, df: &DataFrame) -> Result<TableSchema> {
        let mut columns = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            let series = df
                .column(column.name.as_str())
                .map_err(|_| FeatureError::missing(spec.kind, &column.name))?;
            columns.push((column.name.clone(), series.dtype().clone()));
        }
        Ok(TableSchema {
            table: spec.kind,
            columns,
        })
    }

    pub fn register(&mut self, schema: TableSchema) {
        debug!(
            "registered schema for {} ({} columns)",
            schema.table,
            schema.columns.len()
        );
        self.schemas.insert(schema.table, schema);
    }

    pub fn get(&self, table: TableKind) -> Option<&TableSchema> {
        self.schemas.get(&table)
    }

    /// Selects the registered columns of `raw` and casts them to the registered
    /// types. Extra columns are ignored.
    pub fn coerce(&self, table: TableKind, raw: &DataFrame) -> Result<DataFrame> {
        match self.schemas.get(&table) {
            Some(schema) => coerce_to(schema, raw),
            None => Err(FeatureError::InvalidConfig(format!(
                "no schema registered for {table}"
            ))),
        }
    }
}

pub fn coerce_to(schema: &TableSchema, raw: &DataFrame) -> Result<DataFrame> {
    // Presence is checked for every column before any cast runs.
    let names: Vec<String> = raw
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some((missing, _)) = schema.columns.iter().find(|(name, _)| !names.contains(name)) {
        return Err(FeatureError::missing(schema.table, missing));
    }

    let mut columns = Vec::with_capacity(schema.columns.len());
    for (name, dtype) in &schema.columns {
        let series = raw.column(name.as_str())?;
        let cast = if series.dtype() == dtype {
            series.clone()
        } else {
            lossless_cast(series, dtype).map_err(|source| FeatureError::SchemaMismatch {
                table: schema.table,
                column: name.clone(),
                kind: MismatchKind::Coercion {
                    expected: dtype.to_string(),
                    found: series.dtype().to_string(),
                    source,
                },
            })?
        };
        columns.push(cast);
    }
    Ok(DataFrame::new(columns)?)
}

/// `strict_cast` that also refuses to truncate: floats must be whole to land
/// in an integer column, and numbers must be 0 or 1 to become flags.
fn lossless_cast(series: &Series, dtype: &DataType) -> PolarsResult<Series> {
    let cast = series.strict_cast(dtype)?;
    let numeric_to_flag = dtype == &DataType::Boolean && series.dtype().is_numeric();
    if !(series.dtype().is_float() && dtype.is_integer()) && !numeric_to_flag {
        return Ok(cast);
    }
    let values = series.cast(&DataType::Float64)?;
    let lossy = values
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| {
            if numeric_to_flag {
                *v != 0.0 && *v != 1.0
            } else {
                v.fract() != 0.0
            }
        })
        .count();
    if lossy > 0 {
        return Err(PolarsError::ComputeError(
            format!("{lossy} values would change when cast to {dtype}").into(),
        ));
    }
    Ok(cast)
}
