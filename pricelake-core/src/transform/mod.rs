//! Transformer: raw per-ticker bars into one consolidated price table.
//!
//! Per ticker: date filter, stable dedup (first wins), optional split/dividend
//! adjustment, sanity filter, then derived columns. Consolidation sorts by
//! `(ticker, date)` and enforces key uniqueness across the whole table.

pub mod derive;

use crate::data::{RawBar, TickerSeries};
use crate::domain::PriceRecord;
use crate::frame::{records_to_dataframe, FrameError};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub use derive::{DailyReturn, Derivation, MovingAverage};

/// Which prices land in the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceAdjustment {
    /// Provider OHLC as quoted.
    Raw,
    /// OHLC scaled by `adj_close / close`.
    #[default]
    Adjusted,
}

#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub ma_window: usize,
    pub adjustment: PriceAdjustment,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TransformConfig {
    pub fn validate(&self) -> Result<(), TransformError> {
        if self.ma_window == 0 {
            return Err(TransformError::InvalidWindow(self.ma_window));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("malformed data for {ticker}: {reason}")]
    Malformed { ticker: String, reason: String },

    #[error("moving-average window must be at least 1, got {0}")]
    InvalidWindow(usize),
}

/// Transform one ticker's raw bars into output records.
///
/// An empty series yields no records. A non-empty series in which every bar
/// is rejected is malformed.
pub fn transform_series(
    series: &TickerSeries,
    config: &TransformConfig,
) -> Result<Vec<PriceRecord>, TransformError> {
    config.validate()?;
    let ticker = series.ticker.as_str();

    if series.bars.is_empty() {
        tracing::debug!(ticker, "empty series");
        return Ok(Vec::new());
    }

    let mut bars: Vec<&RawBar> = series
        .bars
        .iter()
        .filter(|b| b.date >= config.start && b.date <= config.end)
        .collect();

    if bars.is_empty() {
        tracing::debug!(ticker, "no bars inside the date range");
        return Ok(Vec::new());
    }

    // sort_by_key is stable, so the first occurrence of a date survives
    bars.sort_by_key(|b| b.date);
    let before_dedup = bars.len();
    bars.dedup_by_key(|b| b.date);
    let duplicates = before_dedup - bars.len();

    let mut adjustment = config.adjustment;
    if adjustment == PriceAdjustment::Adjusted && !bars.iter().any(|b| has_adj_close(b)) {
        tracing::warn!(ticker, "no adjusted closes in series, keeping raw prices");
        adjustment = PriceAdjustment::Raw;
    }

    let candidates = bars.len();
    let mut records: Vec<PriceRecord> = bars
        .into_iter()
        .map(|bar| to_record(ticker, bar, adjustment))
        .filter(PriceRecord::is_sane)
        .collect();
    let rejected = candidates - records.len();

    if records.is_empty() {
        return Err(TransformError::Malformed {
            ticker: ticker.to_string(),
            reason: format!("all {candidates} bars failed the OHLC sanity check"),
        });
    }

    if duplicates > 0 || rejected > 0 {
        tracing::warn!(ticker, duplicates, rejected, kept = records.len(), "bars dropped");
    }

    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let moving_average = MovingAverage::new(config.ma_window).compute(&closes);
    let daily_return = DailyReturn.compute(&closes);

    for ((record, ma), ret) in records.iter_mut().zip(moving_average).zip(daily_return) {
        record.moving_average = ma;
        record.daily_return = ret;
    }

    Ok(records)
}

/// An adjusted bar without a usable `adj_close` comes out void, so the sanity
/// filter drops it instead of mixing raw and adjusted prices in one series.
fn to_record(ticker: &str, bar: &RawBar, adjustment: PriceAdjustment) -> PriceRecord {
    let factor = match adjustment {
        PriceAdjustment::Raw => 1.0,
        PriceAdjustment::Adjusted if has_adj_close(bar) => bar.adj_close / bar.close,
        PriceAdjustment::Adjusted => f64::NAN,
    };

    PriceRecord {
        ticker: ticker.to_string(),
        date: bar.date,
        open: bar.open * factor,
        high: bar.high * factor,
        low: bar.low * factor,
        close: bar.close * factor,
        volume: bar.volume,
        moving_average: None,
        daily_return: None,
    }
}

fn has_adj_close(bar: &RawBar) -> bool {
    bar.adj_close.is_finite() && bar.adj_close > 0.0 && bar.close.is_finite() && bar.close > 0.0
}

/// The consolidated output table, sorted by `(ticker, date)` with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    records: Vec<PriceRecord>,
}

impl PriceTable {
    /// Sort by `(ticker, date)` and drop later duplicates of a key.
    pub fn from_records(mut records: Vec<PriceRecord>) -> Self {
        records.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));
        let mut seen = HashSet::new();
        records.retain(|r| seen.insert((r.ticker.clone(), r.date)));
        Self { records }
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct tickers, in table order.
    pub fn tickers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for r in &self.records {
            if out.last() != Some(&r.ticker.as_str()) {
                out.push(&r.ticker);
            }
        }
        out
    }

    /// Rows of one ticker, in date order.
    pub fn ticker_rows(&self, ticker: &str) -> &[PriceRecord] {
        let start = self.records.partition_point(|r| r.ticker.as_str() < ticker);
        let end = self.records.partition_point(|r| r.ticker.as_str() <= ticker);
        &self.records[start..end]
    }

    /// BLAKE3 hash over every row, hex encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for r in &self.records {
            hasher.update(r.ticker.as_bytes());
            hasher.update(&[0]);
            hasher.update(r.date.to_string().as_bytes());
            for v in [r.open, r.high, r.low, r.close] {
                hasher.update(&v.to_le_bytes());
            }
            hasher.update(&r.volume.to_le_bytes());
            for v in [r.moving_average, r.daily_return] {
                match v {
                    Some(x) => {
                        hasher.update(&[1]);
                        hasher.update(&x.to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, FrameError> {
        records_to_dataframe(&self.records)
    }
}

/// Concatenate per-ticker record vectors into one table.
pub fn consolidate<I>(per_ticker: I) -> PriceTable
where
    I: IntoIterator<Item = Vec<PriceRecord>>,
{
    PriceTable::from_records(per_ticker.into_iter().flatten().collect())
}
