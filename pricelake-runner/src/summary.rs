//! Per-ticker key metrics printed after a run.

use chrono::NaiveDate;
use pricelake_core::{PriceRecord, PriceTable};
use serde::Serialize;

/// Trading days in a year; the 52-week window and the volatility annualisation factor.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub last_close: f64,
    /// Highest close over the trailing 252 rows; `None` with less history.
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    /// Sample std-dev of daily returns times sqrt(252).
    pub annualized_volatility: Option<f64>,
}

impl TickerSummary {
    /// `None` for an empty slice.
    pub fn from_rows(rows: &[PriceRecord]) -> Option<Self> {
        let first = rows.first()?;
        let last = rows.last()?;

        let (high_52w, low_52w) = if rows.len() >= TRADING_DAYS_PER_YEAR {
            let window = &rows[rows.len() - TRADING_DAYS_PER_YEAR..];
            let high = window.iter().map(|r| r.close).fold(f64::NEG_INFINITY, f64::max);
            let low = window.iter().map(|r| r.close).fold(f64::INFINITY, f64::min);
            (Some(high), Some(low))
        } else {
            (None, None)
        };

        let returns: Vec<f64> = rows.iter().filter_map(|r| r.daily_return).collect();

        Some(Self {
            ticker: first.ticker.clone(),
            rows: rows.len(),
            first_date: first.date,
            last_date: last.date,
            last_close: last.close,
            high_52w,
            low_52w,
            annualized_volatility: sample_std(&returns)
                .map(|sd| sd * (TRADING_DAYS_PER_YEAR as f64).sqrt()),
        })
    }
}

/// One summary per ticker, in table order.
pub fn summarize(table: &PriceTable) -> Vec<TickerSummary> {
    table
        .tickers()
        .into_iter()
        .filter_map(|t| TickerSummary::from_rows(table.ticker_rows(t)))
        .collect()
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(closes: &[f64]) -> Vec<PriceRecord> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceRecord {
                ticker: "AAA".into(),
                date: base + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1,
                moving_average: None,
                daily_return: (i > 0).then(|| close / closes[i - 1] - 1.0),
            })
            .collect()
    }

    #[test]
    fn short_history_leaves_52w_undefined() {
        let s = TickerSummary::from_rows(&rows(&[10.0, 11.0, 12.0])).unwrap();
        assert_eq!(s.rows, 3);
        assert_eq!(s.last_close, 12.0);
        assert!(s.high_52w.is_none());
        assert!(s.low_52w.is_none());
        assert!(s.annualized_volatility.is_some());
    }

    #[test]
    fn high_low_use_trailing_window() {
        let mut closes = vec![1000.0];
        closes.extend((0..TRADING_DAYS_PER_YEAR).map(|i| 50.0 + i as f64));
        let s = TickerSummary::from_rows(&rows(&closes)).unwrap();
        // The 1000.0 close is older than 252 rows
        assert_eq!(s.high_52w, Some(50.0 + 251.0));
        assert_eq!(s.low_52w, Some(50.0));
    }

    #[test]
    fn volatility_matches_hand_computation() {
        // returns: 0.1, -0.1 → mean 0, sample var 0.02
        let s = TickerSummary::from_rows(&rows(&[100.0, 110.0, 99.0])).unwrap();
        let expected = 0.02f64.sqrt() * 252f64.sqrt();
        assert!((s.annualized_volatility.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn single_return_has_no_volatility() {
        let s = TickerSummary::from_rows(&rows(&[100.0, 110.0])).unwrap();
        assert!(s.annualized_volatility.is_none());
    }

    #[test]
    fn empty_rows_have_no_summary() {
        assert!(TickerSummary::from_rows(&[]).is_none());
    }
}
