//! Loaders: write a consolidated price table into a destination table.
//!
//! A destination is addressed as `project.dataset.table`. Every sink performs
//! one bulk write per run and honours the same three write modes.

pub mod parquet;
pub mod postgres;

pub use self::parquet::ParquetWarehouse;
pub use self::postgres::PostgresWarehouse;

use pricelake_core::PriceTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, WarehouseError> {
        let table_ref = Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        };
        for part in [&table_ref.project, &table_ref.dataset, &table_ref.table] {
            validate_identifier(part)?;
        }
        Ok(table_ref)
    }
}

impl FromStr for TableRef {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        match parts.as_slice() {
            [project, dataset, table] => Self::new(*project, *dataset, *table),
            _ => Err(WarehouseError::InvalidTable(format!(
                "expected project.dataset.table, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`; these names end up inside quoted SQL identifiers
/// and file paths.
fn validate_identifier(part: &str) -> Result<(), WarehouseError> {
    let mut chars = part.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        None => false,
    };
    if !valid {
        return Err(WarehouseError::InvalidTable(format!(
            "invalid identifier '{part}'"
        )));
    }
    Ok(())
}

/// How incoming rows meet the rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Insert new `(ticker, date)` rows; existing keys are kept and the
    /// incoming duplicates skipped.
    #[default]
    Append,
    /// The table ends up holding exactly this run's rows.
    Replace,
    /// Insert new rows and overwrite existing `(ticker, date)` rows.
    Upsert,
}

impl WriteMode {
    pub const ALL: [WriteMode; 3] = [WriteMode::Append, WriteMode::Replace, WriteMode::Upsert];

    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Upsert => "upsert",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown write mode '{s}' (expected append, replace or upsert)"))
    }
}

/// Outcome of one bulk write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub mode: WriteMode,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub content_hash: String,
}

/// Warehouse failures. All of them abort the run.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("schema mismatch on column '{column}': expected {expected}, found {actual}")]
    SchemaMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("destination table {0} does not exist")]
    MissingTable(String),

    #[error("warehouse quota or resource limit exceeded: {0}")]
    QuotaExceeded(String),

    #[error("invalid destination table: {0}")]
    InvalidTable(String),

    #[error("write failed: {0}")]
    Write(String),
}

/// A destination able to take one consolidated table per run.
pub trait Warehouse {
    fn name(&self) -> &str;

    /// Write the whole table in one bulk operation.
    fn write(
        &mut self,
        table: &TableRef,
        data: &PriceTable,
        mode: WriteMode,
    ) -> Result<LoadReport, WarehouseError>;
}
