//! The seam between the extractor and a market-data source.
//!
//! Implementations: Yahoo chart API and a seeded synthetic series. Tests drive
//! the extractor with scripted fakes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One trading day as the provider reported it. Not yet checked or adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Provider-side failures. Every variant is scoped to one ticker; the
/// extractor records it and moves on to the next symbol.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("provider unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected provider response: {0}")]
    ResponseFormatChanged(String),

    #[error("provider rejected the request: {0}")]
    AuthenticationRequired(String),

    #[error("no data for symbol {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider is blocking requests; circuit breaker open")]
    CircuitBreakerTripped,

    #[error("invalid ticker '{raw}': {reason}")]
    InvalidTicker { raw: String, reason: String },

    #[error("universe error: {0}")]
    Universe(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Bars returned for one provider symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
}

/// Origin tag carried through to the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Yahoo,
    Synthetic,
}

/// A source of daily bars, called once per ticker.
pub trait DataProvider: Send + Sync {
    /// Used in log spans.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a provider symbol over an inclusive date range.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError>;

    /// False while the provider refuses requests; the extractor stops calling it.
    fn is_available(&self) -> bool;
}

/// Progress callback for the per-ticker extraction loop.
pub trait ExtractProgress {
    /// Called when starting to fetch a ticker.
    fn on_start(&self, ticker: &str, index: usize, total: usize);

    /// Called when a ticker fetch completes, successfully or not.
    fn on_complete(
        &self,
        ticker: &str,
        index: usize,
        total: usize,
        result: &Result<usize, DataError>,
    );

    /// Called once after the last ticker.
    fn on_finish(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl ExtractProgress for LogProgress {
    fn on_start(&self, ticker: &str, index: usize, total: usize) {
        tracing::debug!(ticker, index = index + 1, total, "fetching");
    }

    fn on_complete(
        &self,
        ticker: &str,
        index: usize,
        total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(bars) => tracing::info!(ticker, index = index + 1, total, bars, "fetched"),
            Err(e) => tracing::warn!(ticker, index = index + 1, total, error = %e, "fetch failed"),
        }
    }

    fn on_finish(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "extraction complete");
    }
}
