//! pricelake runner: configuration, warehouse loaders and run orchestration.
//!
//! This crate builds on `pricelake-core` to provide:
//! - TOML run configuration with defaults and validation
//! - Warehouse sinks (Postgres-wire and Parquet files) with append/replace/upsert
//! - The extract → transform → load pipeline with per-ticker failure isolation
//! - Per-ticker key metrics for the run summary

pub mod config;
pub mod pipeline;
pub mod summary;
pub mod warehouse;

pub use config::{ConfigError, EtlConfig, LogFormat};
pub use pipeline::{
    run_etl, run_pipeline, FailureStage, LoadStatus, LoadTarget, RunError, RunOptions, RunReport,
    TickerFailure,
};
pub use summary::{summarize, TickerSummary};
pub use warehouse::{LoadReport, TableRef, Warehouse, WarehouseError, WriteMode};
