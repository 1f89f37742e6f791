//! File-backed warehouse: one Parquet file per destination table.
//!
//! Layout: `{root}/{project}/{dataset}/{table}.parquet`
//!
//! The existing file is schema-checked on read, merged in memory according to
//! the write mode, and atomically replaced (write `.tmp`, rename into place).

use super::{LoadReport, TableRef, Warehouse, WarehouseError, WriteMode};
use pricelake_core::frame::{dataframe_to_records, FrameError};
use pricelake_core::schema::SchemaError;
use pricelake_core::{PriceRecord, PriceTable};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ParquetWarehouse {
    root: PathBuf,
    create_if_missing: bool,
}

impl ParquetWarehouse {
    pub fn new(root: impl Into<PathBuf>, create_if_missing: bool) -> Self {
        Self {
            root: root.into(),
            create_if_missing,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{project}/{dataset}/{table}.parquet`
    pub fn table_path(&self, table: &TableRef) -> PathBuf {
        self.root
            .join(&table.project)
            .join(&table.dataset)
            .join(format!("{}.parquet", table.table))
    }

    /// Read the current contents of a table.
    pub fn read(&self, table: &TableRef) -> Result<PriceTable, WarehouseError> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(WarehouseError::MissingTable(table.to_string()));
        }
        read_parquet(&path).map(PriceTable::from_records)
    }

    fn existing_rows(&self, table: &TableRef) -> Result<Vec<PriceRecord>, WarehouseError> {
        let path = self.table_path(table);
        if path.exists() {
            return read_parquet(&path);
        }
        if !self.create_if_missing {
            return Err(WarehouseError::MissingTable(table.to_string()));
        }
        tracing::info!(table = %table, path = %path.display(), "creating table");
        Ok(Vec::new())
    }
}

impl Warehouse for ParquetWarehouse {
    fn name(&self) -> &str {
        "parquet"
    }

    fn write(
        &mut self,
        table: &TableRef,
        data: &PriceTable,
        mode: WriteMode,
    ) -> Result<LoadReport, WarehouseError> {
        let span = tracing::info_span!("parquet_write", table = %table, mode = %mode);
        let _guard = span.enter();

        let existing = self.existing_rows(table)?;
        let incoming = data.records();

        let (merged, rows_written, rows_skipped) = match mode {
            WriteMode::Replace => (incoming.to_vec(), incoming.len(), 0),
            WriteMode::Append => {
                let present: HashSet<_> = existing.iter().map(PriceRecord::key).collect();
                let fresh: Vec<PriceRecord> = incoming
                    .iter()
                    .filter(|r| !present.contains(&r.key()))
                    .cloned()
                    .collect();
                let written = fresh.len();
                let mut rows = existing;
                rows.extend(fresh);
                (rows, written, incoming.len() - written)
            }
            WriteMode::Upsert => {
                // from_records keeps the first occurrence of a key, so incoming rows go first
                let mut rows = incoming.to_vec();
                rows.extend(existing);
                (rows, incoming.len(), 0)
            }
        };

        let merged = PriceTable::from_records(merged);
        let path = self.table_path(table);
        write_atomic(&merged, &path)?;

        tracing::info!(
            rows_written,
            rows_skipped,
            table_rows = merged.len(),
            "parquet table written"
        );

        Ok(LoadReport {
            table: table.to_string(),
            mode,
            rows_written,
            rows_skipped,
            content_hash: data.content_hash(),
        })
    }
}

fn read_parquet(path: &Path) -> Result<Vec<PriceRecord>, WarehouseError> {
    let file = fs::File::open(path)
        .map_err(|e| WarehouseError::Connection(format!("open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| WarehouseError::Write(format!("read {}: {e}", path.display())))?;
    dataframe_to_records(&df).map_err(frame_error)
}

fn write_atomic(table: &PriceTable, path: &Path) -> Result<(), WarehouseError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| WarehouseError::Write(format!("create {}: {e}", dir.display())))?;
    }

    let mut df = table.to_dataframe().map_err(frame_error)?;
    let tmp_path = path.with_extension("parquet.tmp");

    let file = fs::File::create(&tmp_path)
        .map_err(|e| WarehouseError::Write(format!("create {}: {e}", tmp_path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| WarehouseError::Write(format!("write parquet: {e}")))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        WarehouseError::Write(format!("atomic rename failed: {e}"))
    })
}

fn frame_error(e: FrameError) -> WarehouseError {
    match e {
        FrameError::Schema(SchemaError::MissingColumn(column)) => WarehouseError::SchemaMismatch {
            column,
            expected: "present".into(),
            actual: "missing".into(),
        },
        FrameError::Schema(SchemaError::TypeMismatch {
            column,
            expected,
            actual,
        }) => WarehouseError::SchemaMismatch {
            column,
            expected: expected.to_string(),
            actual: actual.to_string(),
        },
        other => WarehouseError::Write(other.to_string()),
    }
}
