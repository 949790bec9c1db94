use crate::models::TableKind;
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, Error)]
pub enum FeatureError {
    /// An incoming frame does not fit the schema registered for its table.
    #[error("schema mismatch in {table}.{column}: {kind}")]
    SchemaMismatch {
        table: TableKind,
        column: String,
        #[source]
        kind: MismatchKind,
    },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MismatchKind {
    #[error("column is missing")]
    Missing,

    #[error("cannot coerce {found} to {expected}: {source}")]
    Coercion {
        expected: String,
        found: String,
        #[source]
        source: PolarsError,
    },
}

impl FeatureError {
    pub(crate) fn missing(table: TableKind, column: &str) -> Self {
        FeatureError::SchemaMismatch {
            table,
            column: column.to_string(),
            kind: MismatchKind::Missing,
        }
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, FeatureError::SchemaMismatch { .. })
    }
}
