//! Extract → transform → load orchestration.
//!
//! Stages run strictly in sequence. Provider and transformation errors are
//! recorded per ticker and the run moves on; warehouse errors abort it. An
//! empty consolidated table is "nothing to do" and never touches the warehouse.

use crate::config::{
    ConfigError, DestinationKind, DestinationSection, EtlConfig, ProviderKind, ProviderSection,
    UniverseSection, UniverseSource,
};
use crate::summary::{summarize, TickerSummary};
use crate::warehouse::{
    LoadReport, ParquetWarehouse, PostgresWarehouse, TableRef, Warehouse, WarehouseError,
    WriteMode,
};
use chrono::NaiveDate;
use pricelake_core::data::{
    extract_universe, CircuitBreaker, DataError, DataProvider, ExtractProgress, SyntheticProvider,
    Universe, YahooProvider, YahooSettings,
};
use pricelake_core::transform::{consolidate, transform_series, TransformConfig, TransformError};
use pricelake_core::PriceTable;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to resolve ticker universe: {0}")]
    Universe(#[source] DataError),

    #[error("failed to set up data provider: {0}")]
    Provider(#[source] DataError),

    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("all {total} tickers failed; nothing was loaded")]
    AllTickersFailed { total: usize },
}

/// Stage at which a ticker dropped out of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extract,
    Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub stage: FailureStage,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Written,
    NothingToLoad,
    DryRun,
}

/// Everything a caller needs to report on a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tickers_requested: usize,
    pub tickers_loaded: usize,
    pub rows: usize,
    pub content_hash: String,
    pub failures: Vec<TickerFailure>,
    pub summaries: Vec<TickerSummary>,
    pub load_status: LoadStatus,
    pub load: Option<LoadReport>,
    #[serde(skip)]
    pub table: PriceTable,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Output of the extract and transform stages.
#[derive(Debug)]
pub struct Staged {
    pub total: usize,
    pub table: PriceTable,
    pub failures: Vec<TickerFailure>,
}

/// A warehouse plus where and how to write.
pub struct LoadTarget<'a> {
    pub warehouse: &'a mut dyn Warehouse,
    pub table: TableRef,
    pub mode: WriteMode,
}

/// Run the extract and transform stages over `tickers`.
///
/// Fails with `AllTickersFailed` when a non-empty universe produced no usable ticker.
pub fn extract_and_transform(
    tickers: &[&str],
    provider: &dyn DataProvider,
    transform: &TransformConfig,
    progress: &dyn ExtractProgress,
) -> Result<Staged, RunError> {
    transform.validate()?;

    let extracted = {
        let _span = tracing::info_span!("extract", provider = provider.name()).entered();
        extract_universe(tickers, provider, transform.start, transform.end, progress)
    };

    let mut failures: Vec<TickerFailure> = extracted
        .failures
        .iter()
        .map(|(ticker, e)| TickerFailure {
            ticker: ticker.clone(),
            stage: FailureStage::Extract,
            error: e.to_string(),
        })
        .collect();

    let _span = tracing::info_span!("transform", ma_window = transform.ma_window).entered();
    let mut per_ticker = Vec::with_capacity(extracted.series.len());
    for series in &extracted.series {
        match transform_series(series, transform) {
            Ok(records) => per_ticker.push(records),
            Err(e) => {
                tracing::warn!(ticker = %series.ticker, error = %e, "transform failed");
                failures.push(TickerFailure {
                    ticker: series.ticker.to_string(),
                    stage: FailureStage::Transform,
                    error: e.to_string(),
                });
            }
        }
    }

    if extracted.total > 0 && failures.len() == extracted.total {
        return Err(RunError::AllTickersFailed {
            total: extracted.total,
        });
    }

    let table = consolidate(per_ticker);
    tracing::info!(
        rows = table.len(),
        tickers = table.tickers().len(),
        failed = failures.len(),
        "table consolidated"
    );

    Ok(Staged {
        total: extracted.total,
        table,
        failures,
    })
}

/// Write a staged table; an empty table is skipped.
pub fn load(staged: &Staged, target: LoadTarget<'_>) -> Result<Option<LoadReport>, RunError> {
    if staged.table.is_empty() {
        tracing::info!("table is empty, nothing to load");
        return Ok(None);
    }

    let _span = tracing::info_span!(
        "load",
        warehouse = target.warehouse.name(),
        table = %target.table,
        mode = %target.mode
    )
    .entered();

    let report = target
        .warehouse
        .write(&target.table, &staged.table, target.mode)?;
    tracing::info!(
        rows_written = report.rows_written,
        rows_skipped = report.rows_skipped,
        content_hash = %report.content_hash,
        "load complete"
    );
    Ok(Some(report))
}

/// Extract, transform and (unless `target` is `None`) load in one call.
pub fn run_pipeline(
    tickers: &[&str],
    provider: &dyn DataProvider,
    transform: &TransformConfig,
    target: Option<LoadTarget<'_>>,
    progress: &dyn ExtractProgress,
) -> Result<RunReport, RunError> {
    let staged = extract_and_transform(tickers, provider, transform, progress)?;
    let (load_status, report) = match target {
        _ if staged.table.is_empty() => (LoadStatus::NothingToLoad, None),
        Some(target) => (LoadStatus::Written, load(&staged, target)?),
        None => (LoadStatus::DryRun, None),
    };
    Ok(finish(staged, transform, load_status, report))
}

fn finish(
    staged: Staged,
    transform: &TransformConfig,
    load_status: LoadStatus,
    load: Option<LoadReport>,
) -> RunReport {
    RunReport {
        start: transform.start,
        end: transform.end,
        tickers_requested: staged.total,
        tickers_loaded: staged.table.tickers().len(),
        rows: staged.table.len(),
        content_hash: staged.table.content_hash(),
        summaries: summarize(&staged.table),
        failures: staged.failures,
        load_status,
        load,
        table: staged.table,
    }
}

/// Options the CLI passes next to the config file.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Resolves the default date range.
    pub today: NaiveDate,
}

/// Run the whole job described by `config`.
///
/// The warehouse is opened only once there is something to load.
pub fn run_etl(
    config: &EtlConfig,
    options: RunOptions,
    progress: &dyn ExtractProgress,
) -> Result<RunReport, RunError> {
    config.validate(options.today)?;
    let (start, end) = config.date_range(options.today)?;
    let table_ref = config.table_ref()?;
    let transform = config.transform_config(start, end);

    tracing::info!(%start, %end, table = %table_ref, dry_run = options.dry_run, "run starting");

    let universe = resolve_universe(
        &config.universe,
        Duration::from_secs(config.provider.timeout_secs),
    )
    .map_err(RunError::Universe)?;
    let provider = build_provider(&config.provider).map_err(RunError::Provider)?;

    let tickers = universe.all_tickers();
    tracing::info!(tickers = tickers.len(), sectors = universe.sectors.len(), "universe resolved");

    let staged = extract_and_transform(&tickers, provider.as_ref(), &transform, progress)?;

    let (load_status, report) = if staged.table.is_empty() {
        (LoadStatus::NothingToLoad, None)
    } else if options.dry_run {
        (LoadStatus::DryRun, None)
    } else {
        let mut warehouse = open_warehouse(&config.destination)?;
        let target = LoadTarget {
            warehouse: warehouse.as_mut(),
            table: table_ref,
            mode: config.destination.write_mode,
        };
        (LoadStatus::Written, load(&staged, target)?)
    };

    Ok(finish(staged, &transform, load_status, report))
}

pub fn resolve_universe(
    section: &UniverseSection,
    timeout: Duration,
) -> Result<Universe, DataError> {
    match section.source {
        UniverseSource::Sp500 => Universe::fetch_sp500(&section.sp500_url, timeout),
        UniverseSource::Tickers => Ok(Universe::from_tickers(section.tickers.iter().cloned())),
        UniverseSource::File => {
            let path = section
                .path
                .as_deref()
                .ok_or_else(|| DataError::Universe("no universe file configured".into()))?;
            Universe::from_file(path)
        }
    }
}

pub fn build_provider(section: &ProviderSection) -> Result<Box<dyn DataProvider>, DataError> {
    match section.kind {
        ProviderKind::Yahoo => {
            let settings = YahooSettings {
                timeout: Duration::from_secs(section.timeout_secs),
                max_retries: section.max_retries,
                ..YahooSettings::default()
            };
            let breaker = Arc::new(CircuitBreaker::default_provider());
            Ok(Box::new(YahooProvider::new(breaker, settings)?))
        }
        ProviderKind::Synthetic => Ok(Box::new(SyntheticProvider::new(section.seed))),
    }
}

pub fn open_warehouse(section: &DestinationSection) -> Result<Box<dyn Warehouse>, WarehouseError> {
    match section.kind {
        DestinationKind::Postgres => Ok(Box::new(PostgresWarehouse::from_env(
            &section.database_url_env,
            section.create_if_missing,
        )?)),
        DestinationKind::Parquet => Ok(Box::new(ParquetWarehouse::new(
            &section.root,
            section.create_if_missing,
        ))),
    }
}
