//! pricelake CLI: one-shot load of daily prices into the warehouse.
//!
//! Reads an optional TOML config, applies flag overrides, runs
//! extract → transform → load and prints the run summary.
//!
//! Exit codes: 0 on success (including nothing to load), 1 on any fatal
//! error, 3 with `--strict` when some tickers failed. Clap keeps 2 for
//! usage errors.

mod obs;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use pricelake_core::data::LogProgress;
use pricelake_runner::config::{DestinationKind, ProviderKind, UniverseSource};
use pricelake_runner::{
    run_etl, EtlConfig, LoadStatus, LogFormat, RunOptions, RunReport, WriteMode,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pricelake",
    about = "pricelake: load daily stock prices into a SQL warehouse"
)]
struct Cli {
    /// Path to a TOML config file. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated tickers to load instead of the S&P 500.
    #[arg(long, value_delimiter = ',', conflicts_with = "universe_file")]
    tickers: Vec<String>,

    /// Universe file (.toml sectors, .csv with a Symbol column, or one ticker per line).
    #[arg(long)]
    universe_file: Option<PathBuf>,

    /// Start date (YYYY-MM-DD). Defaults to five years before the end date.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Moving-average window in trading days.
    #[arg(long)]
    window: Option<usize>,

    /// Keep raw OHLC instead of scaling by the adjusted close.
    #[arg(long, default_value_t = false)]
    raw_prices: bool,

    /// Price source.
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Destination table as project.dataset.table.
    #[arg(long)]
    table: Option<String>,

    /// append, replace or upsert.
    #[arg(long)]
    write_mode: Option<WriteMode>,

    /// Write Parquet files under this directory instead of Postgres.
    #[arg(long)]
    parquet_root: Option<PathBuf>,

    /// Extract and transform only; never touch the warehouse.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Exit with status 3 when any ticker failed.
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Log filter, e.g. info or pricelake_core=debug. PRICELAKE_LOG wins over both.
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Print the run report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderArg {
    Yahoo,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl Cli {
    fn load_config(&self) -> Result<EtlConfig> {
        let mut config = match &self.config {
            Some(path) => EtlConfig::from_file(path)?,
            None => EtlConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut EtlConfig) {
        if !self.tickers.is_empty() {
            config.universe.source = UniverseSource::Tickers;
            config.universe.tickers = self.tickers.clone();
        }
        if let Some(path) = &self.universe_file {
            config.universe.source = UniverseSource::File;
            config.universe.path = Some(path.clone());
        }
        if let Some(start) = self.start {
            config.run.start_date = Some(start);
        }
        if let Some(end) = self.end {
            config.run.end_date = Some(end);
        }
        if let Some(window) = self.window {
            config.transform.ma_window = window;
        }
        if self.raw_prices {
            config.transform.adjusted = false;
        }
        if let Some(provider) = self.provider {
            config.provider.kind = match provider {
                ProviderArg::Yahoo => ProviderKind::Yahoo,
                ProviderArg::Synthetic => ProviderKind::Synthetic,
            };
        }
        if let Some(table) = &self.table {
            config.destination.table = table.clone();
        }
        if let Some(mode) = self.write_mode {
            config.destination.write_mode = mode;
        }
        if let Some(root) = &self.parquet_root {
            config.destination.kind = DestinationKind::Parquet;
            config.destination.root = root.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = match format {
                LogFormatArg::Text => LogFormat::Text,
                LogFormatArg::Json => LogFormat::Json,
            };
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.load_config()?;
    obs::init_tracing(&config.logging.level, config.logging.format).map_err(anyhow::Error::msg)?;

    let options = RunOptions {
        dry_run: cli.dry_run,
        today: chrono::Local::now().date_naive(),
    };
    let report = run_etl(&config, options, &LogProgress)?;
    if report.has_failures() {
        tracing::warn!(
            failed = report.failures.len(),
            requested = report.tickers_requested,
            "run finished with ticker failures"
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(ExitCode::from(exit_status(&report, cli.strict)))
}

/// Status for a run that finished but lost tickers under `--strict`.
const PARTIAL_FAILURE_EXIT: u8 = 3;

fn exit_status(report: &RunReport, strict: bool) -> u8 {
    if strict && report.has_failures() {
        PARTIAL_FAILURE_EXIT
    } else {
        0
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Run Summary ===");
    println!("Period:         {} to {}", report.start, report.end);
    println!(
        "Tickers:        {} loaded / {} requested",
        report.tickers_loaded, report.tickers_requested
    );
    println!("Rows:           {}", report.rows);
    println!("Content hash:   {}", report.content_hash);

    match (&report.load_status, &report.load) {
        (LoadStatus::Written, Some(load)) => {
            println!(
                "Load:           {} ({}) {} written, {} skipped",
                load.table, load.mode, load.rows_written, load.rows_skipped
            );
        }
        (LoadStatus::DryRun, _) => println!("Load:           skipped (dry run)"),
        _ => println!("Load:           nothing to load"),
    }

    if !report.summaries.is_empty() {
        println!();
        println!("--- Key Metrics ---");
        println!(
            "{:<8} {:>6} {:<23} {:>10} {:>10} {:>10} {:>8}",
            "Ticker", "Rows", "Range", "Close", "52w High", "52w Low", "Vol"
        );
        println!("{}", "-".repeat(81));
        for s in &report.summaries {
            println!(
                "{:<8} {:>6} {:<23} {:>10.2} {:>10} {:>10} {:>8}",
                s.ticker,
                s.rows,
                format!("{} to {}", s.first_date, s.last_date),
                s.last_close,
                format_price(s.high_52w),
                format_price(s.low_52w),
                format_pct(s.annualized_volatility),
            );
        }
    }

    if report.has_failures() {
        println!();
        println!("--- Failures ({}) ---", report.failures.len());
        for f in &report.failures {
            println!("{:<8} {:?}: {}", f.ticker, f.stage, f.error);
        }
    }
    println!();
}

fn format_price(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn format_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricelake_core::PriceTable;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pricelake").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_defaults() {
        let cli = parse(&[]);
        let config = cli.load_config().unwrap();
        assert_eq!(config, EtlConfig::default());
    }

    #[test]
    fn tickers_flag_switches_universe() {
        let cli = parse(&["--tickers", "AAPL,MSFT,BRK.B"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.universe.source, UniverseSource::Tickers);
        assert_eq!(config.universe.tickers, vec!["AAPL", "MSFT", "BRK.B"]);
    }

    #[test]
    fn tickers_and_universe_file_conflict() {
        let result = Cli::try_parse_from([
            "pricelake",
            "--tickers",
            "AAPL",
            "--universe-file",
            "u.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_apply_to_every_section() {
        let cli = parse(&[
            "--start",
            "2023-01-02",
            "--end",
            "2023-06-30",
            "--window",
            "20",
            "--raw-prices",
            "--provider",
            "synthetic",
            "--table",
            "local.market.prices",
            "--write-mode",
            "UPSERT",
            "--parquet-root",
            "/tmp/lake",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.run.start_date, NaiveDate::from_ymd_opt(2023, 1, 2));
        assert_eq!(config.run.end_date, NaiveDate::from_ymd_opt(2023, 6, 30));
        assert_eq!(config.transform.ma_window, 20);
        assert!(!config.transform.adjusted);
        assert_eq!(config.provider.kind, ProviderKind::Synthetic);
        assert_eq!(config.destination.table, "local.market.prices");
        assert_eq!(config.destination.write_mode, WriteMode::Upsert);
        assert_eq!(config.destination.kind, DestinationKind::Parquet);
        assert_eq!(config.destination.root, PathBuf::from("/tmp/lake"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn bad_write_mode_is_rejected() {
        let result = Cli::try_parse_from(["pricelake", "--write-mode", "merge"]);
        assert!(result.is_err());
    }

    #[test]
    fn bad_date_is_rejected() {
        let result = Cli::try_parse_from(["pricelake", "--start", "2023-13-01"]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricelake.toml");
        std::fs::write(
            &path,
            "[transform]\nma_window = 100\n\n[destination]\nwrite_mode = \"replace\"\n",
        )
        .unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--window", "10"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.transform.ma_window, 10);
        assert_eq!(config.destination.write_mode, WriteMode::Replace);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = parse(&["--config", "/nonexistent/pricelake.toml"]);
        assert!(cli.load_config().is_err());
    }

    fn report(failures: usize) -> RunReport {
        RunReport {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            tickers_requested: failures,
            tickers_loaded: 0,
            rows: 0,
            content_hash: String::new(),
            failures: (0..failures)
                .map(|i| pricelake_runner::TickerFailure {
                    ticker: format!("T{i}"),
                    stage: pricelake_runner::FailureStage::Extract,
                    error: "symbol not found".into(),
                })
                .collect(),
            summaries: Vec::new(),
            load_status: LoadStatus::NothingToLoad,
            load: None,
            table: PriceTable::default(),
        }
    }

    #[test]
    fn strict_partial_failure_is_distinct_from_usage_errors() {
        assert_eq!(exit_status(&report(1), true), 3);
        assert_eq!(exit_status(&report(1), false), 0);
        assert_eq!(exit_status(&report(0), true), 0);
    }

    #[test]
    fn missing_metrics_render_as_dash() {
        assert_eq!(format_price(None), "-");
        assert_eq!(format_price(Some(12.345)), "12.35");
        assert_eq!(format_pct(Some(0.2512)), "25.1%");
    }
}
