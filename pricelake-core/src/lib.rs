//! pricelake core: domain types, market-data providers, extraction and transformation.
//!
//! This crate holds the first two stages of the daily price load:
//! - Domain types (ticker, raw provider bar, output price record)
//! - Ticker universe resolution (explicit list, file, S&P 500 constituents)
//! - Provider abstraction with Yahoo Finance and synthetic implementations
//! - Per-ticker isolated extraction with progress reporting
//! - Transformation into one sorted, de-duplicated table with derived columns
//! - The polars schema and frame conversion used by the loaders

pub mod data;
pub mod domain;
pub mod frame;
pub mod schema;
pub mod transform;

pub use domain::{PriceRecord, Ticker};
pub use transform::PriceTable;
