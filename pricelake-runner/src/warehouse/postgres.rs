//! Postgres-wire warehouse (Postgres, Redshift-compatible stores).
//!
//! `project` must name the connected database and `dataset` is the schema.
//! The whole table is written inside one transaction, row by row through a
//! prepared statement whose conflict clause encodes the write mode.

use super::{LoadReport, TableRef, Warehouse, WarehouseError, WriteMode};
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use pricelake_core::PriceTable;
use std::collections::{BTreeMap, BTreeSet};

/// Environment variable holding the connection URL unless configured otherwise.
pub const DEFAULT_DATABASE_URL_ENV: &str = "PRICELAKE_DATABASE_URL";

/// Expected `(column, information_schema data_type)` pairs, in table order.
const EXPECTED_COLUMNS: [(&str, &str); 9] = [
    ("ticker", "text"),
    ("date", "date"),
    ("open", "double precision"),
    ("high", "double precision"),
    ("low", "double precision"),
    ("close", "double precision"),
    ("volume", "bigint"),
    ("moving_average", "double precision"),
    ("daily_return", "double precision"),
];

pub struct PostgresWarehouse {
    client: Client,
    create_if_missing: bool,
}

impl PostgresWarehouse {
    pub fn connect(url: &str, create_if_missing: bool) -> Result<Self, WarehouseError> {
        let client = Client::connect(url, NoTls).map_err(classify)?;
        Ok(Self {
            client,
            create_if_missing,
        })
    }

    /// Connect with the URL found in `var` (a `.env` file is honoured).
    pub fn from_env(var: &str, create_if_missing: bool) -> Result<Self, WarehouseError> {
        let url = database_url_from_env(var)?;
        Self::connect(&url, create_if_missing)
    }

    fn ensure_table(&mut self, table: &TableRef) -> Result<(), WarehouseError> {
        let database: String = self
            .client
            .query_one("SELECT current_database()", &[])
            .map_err(classify)?
            .get(0);
        if database != table.project {
            return Err(WarehouseError::InvalidTable(format!(
                "project '{}' does not match the connected database '{database}'",
                table.project
            )));
        }

        let exists = self
            .client
            .query_opt(
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&table.dataset, &table.table],
            )
            .map_err(classify)?
            .is_some();

        if exists {
            return Ok(());
        }
        if !self.create_if_missing {
            return Err(WarehouseError::MissingTable(table.to_string()));
        }

        tracing::info!(table = %table, "creating table");
        self.client
            .batch_execute(&create_table_sql(table))
            .map_err(classify)
    }

    fn verify_columns(&mut self, table: &TableRef) -> Result<(), WarehouseError> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&table.dataset, &table.table],
            )
            .map_err(classify)?;
        let actual: Vec<(String, String)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();
        check_columns(&actual)
    }

    /// Append and upsert resolve conflicts on `(ticker, date)`, so the table
    /// needs a non-partial unique index on exactly those columns.
    fn verify_key(&mut self, table: &TableRef) -> Result<(), WarehouseError> {
        let rows = self
            .client
            .query(
                "SELECT i.indexrelid::regclass::text, a.attname::text \
                 FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = to_regclass($1) AND i.indisunique AND i.indpred IS NULL",
                &[&qualified(table)],
            )
            .map_err(classify)?;
        let index_columns: Vec<(String, String)> =
            rows.iter().map(|r| (r.get(0), r.get(1))).collect();
        check_key(&index_columns)
    }
}

impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &str {
        "postgres"
    }

    fn write(
        &mut self,
        table: &TableRef,
        data: &PriceTable,
        mode: WriteMode,
    ) -> Result<LoadReport, WarehouseError> {
        let span = tracing::info_span!("postgres_write", table = %table, mode = %mode);
        let _guard = span.enter();

        self.ensure_table(table)?;
        self.verify_columns(table)?;
        self.verify_key(table)?;

        let mut tx = self.client.transaction().map_err(classify)?;
        if mode == WriteMode::Replace {
            let deleted = tx
                .execute(format!("DELETE FROM {}", qualified(table)).as_str(), &[])
                .map_err(classify)?;
            tracing::info!(deleted, "previous rows removed");
        }

        let statement = tx.prepare(&insert_sql(table, mode)).map_err(classify)?;
        let mut rows_written = 0usize;

        for record in data.records() {
            let volume = i64::try_from(record.volume).map_err(|_| {
                WarehouseError::Write(format!(
                    "volume {} for {} {} does not fit in BIGINT",
                    record.volume, record.ticker, record.date
                ))
            })?;
            let affected = tx
                .execute(
                    &statement,
                    &[
                        &record.ticker,
                        &record.date,
                        &record.open,
                        &record.high,
                        &record.low,
                        &record.close,
                        &volume,
                        &record.moving_average,
                        &record.daily_return,
                    ],
                )
                .map_err(classify)?;
            rows_written += affected as usize;
        }

        tx.commit().map_err(classify)?;

        let rows_skipped = data.len() - rows_written;
        tracing::info!(rows_written, rows_skipped, "postgres table written");

        Ok(LoadReport {
            table: table.to_string(),
            mode,
            rows_written,
            rows_skipped,
            content_hash: data.content_hash(),
        })
    }
}

/// Read the connection URL from the environment, loading `.env` first.
pub fn database_url_from_env(var: &str) -> Result<String, WarehouseError> {
    // A missing .env file is fine; the variable may come from the real environment.
    let _ = dotenvy::dotenv();
    std::env::var(var).map_err(|_| {
        WarehouseError::Authentication(format!("environment variable {var} is not set"))
    })
}

fn qualified(table: &TableRef) -> String {
    format!("\"{}\".\"{}\"", table.dataset, table.table)
}

fn create_table_sql(table: &TableRef) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS \"{schema}\";
         CREATE TABLE IF NOT EXISTS {qualified} (
             ticker TEXT NOT NULL,
             date DATE NOT NULL,
             open DOUBLE PRECISION NOT NULL,
             high DOUBLE PRECISION NOT NULL,
             low DOUBLE PRECISION NOT NULL,
             close DOUBLE PRECISION NOT NULL,
             volume BIGINT NOT NULL,
             moving_average DOUBLE PRECISION,
             daily_return DOUBLE PRECISION,
             PRIMARY KEY (ticker, date)
         );",
        schema = table.dataset,
        qualified = qualified(table),
    )
}

fn insert_sql(table: &TableRef, mode: WriteMode) -> String {
    let conflict = match mode {
        WriteMode::Append => "ON CONFLICT (ticker, date) DO NOTHING",
        // Replace has emptied the table inside the same transaction
        WriteMode::Replace => "",
        WriteMode::Upsert => {
            "ON CONFLICT (ticker, date) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume,
                moving_average = EXCLUDED.moving_average,
                daily_return = EXCLUDED.daily_return"
        }
    };
    format!(
        "INSERT INTO {} (
            ticker, date, open, high, low, close, volume, moving_average, daily_return
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         {conflict}",
        qualified(table)
    )
}

/// Compare the destination's columns with the output schema.
fn check_columns(actual: &[(String, String)]) -> Result<(), WarehouseError> {
    for (column, expected) in EXPECTED_COLUMNS {
        let found = actual.iter().find(|(name, _)| name == column);
        match found {
            None => {
                return Err(WarehouseError::SchemaMismatch {
                    column: column.to_string(),
                    expected: expected.to_string(),
                    actual: "missing".to_string(),
                })
            }
            Some((_, data_type)) if !type_matches(expected, data_type) => {
                return Err(WarehouseError::SchemaMismatch {
                    column: column.to_string(),
                    expected: expected.to_string(),
                    actual: data_type.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// `index_columns` holds `(index, column)` pairs for the table's unique indexes.
fn check_key(index_columns: &[(String, String)]) -> Result<(), WarehouseError> {
    let mut indexes: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (index, column) in index_columns {
        indexes
            .entry(index.as_str())
            .or_default()
            .insert(column.as_str());
    }
    let key: BTreeSet<&str> = ["ticker", "date"].into_iter().collect();
    if indexes.values().any(|columns| *columns == key) {
        Ok(())
    } else {
        Err(WarehouseError::SchemaMismatch {
            column: "(ticker, date)".to_string(),
            expected: "primary key".to_string(),
            actual: "none".to_string(),
        })
    }
}

fn type_matches(expected: &str, actual: &str) -> bool {
    expected == actual || (expected == "text" && actual == "character varying")
}

/// Map a driver error onto the warehouse taxonomy.
fn classify(err: postgres::Error) -> WarehouseError {
    let message = err.to_string();

    let Some(db) = err.as_db_error() else {
        return WarehouseError::Connection(message);
    };
    let code = db.code();
    let detail = db.message().to_string();

    if code == &SqlState::INVALID_PASSWORD
        || code == &SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        || code == &SqlState::INSUFFICIENT_PRIVILEGE
    {
        WarehouseError::Authentication(detail)
    } else if code == &SqlState::UNDEFINED_TABLE || code == &SqlState::INVALID_SCHEMA_NAME {
        WarehouseError::MissingTable(detail)
    } else if code == &SqlState::INVALID_COLUMN_REFERENCE {
        // ON CONFLICT without a matching unique index
        WarehouseError::SchemaMismatch {
            column: "(ticker, date)".to_string(),
            expected: "primary key".to_string(),
            actual: detail,
        }
    } else if code == &SqlState::UNDEFINED_COLUMN || code == &SqlState::DATATYPE_MISMATCH {
        WarehouseError::SchemaMismatch {
            column: db.column().unwrap_or("unknown").to_string(),
            expected: "output schema".to_string(),
            actual: detail,
        }
    } else if code == &SqlState::DISK_FULL
        || code == &SqlState::TOO_MANY_CONNECTIONS
        || code == &SqlState::OUT_OF_MEMORY
        || code == &SqlState::INSUFFICIENT_RESOURCES
        || code == &SqlState::CONFIGURATION_LIMIT_EXCEEDED
        || code == &SqlState::PROGRAM_LIMIT_EXCEEDED
    {
        WarehouseError::QuotaExceeded(detail)
    } else {
        WarehouseError::Write(message)
    }
}
