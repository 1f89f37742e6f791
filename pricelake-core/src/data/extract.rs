//! Extraction loop: fetch every ticker of the universe, one at a time.
//!
//! A failing ticker never aborts the batch; its error is recorded and the loop
//! moves on. Once the provider reports itself unavailable (circuit breaker
//! open) every remaining ticker is marked `CircuitBreakerTripped` without a call.

use super::provider::{DataError, DataProvider, DataSource, ExtractProgress, RawBar};
use crate::domain::Ticker;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Raw bars fetched for one ticker.
#[derive(Debug, Clone)]
pub struct TickerSeries {
    pub ticker: Ticker,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
}

/// Outcome of a batch extraction.
#[derive(Debug)]
pub struct ExtractSummary {
    /// Distinct tickers attempted, including invalid ones.
    pub total: usize,
    pub series: Vec<TickerSeries>,
    pub failures: Vec<(String, DataError)>,
}

impl ExtractSummary {
    pub fn succeeded(&self) -> usize {
        self.series.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetch daily bars for every ticker over the inclusive `[start, end]` range.
pub fn extract_universe(
    tickers: &[&str],
    provider: &dyn DataProvider,
    start: NaiveDate,
    end: NaiveDate,
    progress: &dyn ExtractProgress,
) -> ExtractSummary {
    let mut failures: Vec<(String, DataError)> = Vec::new();
    let mut seen = HashSet::new();
    let mut valid: Vec<Ticker> = Vec::new();

    for raw in tickers {
        match Ticker::parse(raw) {
            Ok(ticker) => {
                if seen.insert(ticker.clone()) {
                    valid.push(ticker);
                } else {
                    tracing::debug!(ticker = %ticker, "duplicate ticker skipped");
                }
            }
            Err(e) => {
                tracing::warn!(raw = %raw, error = %e, "invalid ticker");
                failures.push((
                    raw.to_string(),
                    DataError::InvalidTicker {
                        raw: raw.to_string(),
                        reason: e.to_string(),
                    },
                ));
            }
        }
    }

    let total = valid.len() + failures.len();
    let mut series = Vec::with_capacity(valid.len());

    for (i, ticker) in valid.iter().enumerate() {
        if !provider.is_available() {
            tracing::warn!(
                remaining = valid.len() - i,
                provider = provider.name(),
                "provider unavailable, skipping remaining tickers"
            );
            for rest in &valid[i..] {
                failures.push((rest.to_string(), DataError::CircuitBreakerTripped));
            }
            break;
        }

        progress.on_start(ticker.as_str(), i, valid.len());

        let result = provider.fetch(&ticker.provider_symbol(), start, end);
        let reported = result.as_ref().map(|r| r.bars.len()).map_err(Clone::clone);
        progress.on_complete(ticker.as_str(), i, valid.len(), &reported);

        match result {
            Ok(fetched) => series.push(TickerSeries {
                ticker: ticker.clone(),
                bars: fetched.bars,
                source: fetched.source,
            }),
            Err(e) => failures.push((ticker.to_string(), e)),
        }
    }

    progress.on_finish(series.len(), failures.len(), total);

    ExtractSummary {
        total,
        series,
        failures,
    }
}
