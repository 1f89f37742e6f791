//! Daily bars from Yahoo's v8 chart endpoint.
//!
//! The endpoint is unofficial. Anything we cannot decode is reported as
//! `ResponseFormatChanged` so a layout change shows up as a per-ticker failure.
//!
//! Status handling: 403 opens the circuit breaker, 404 and 401 end the ticker,
//! 429, 5xx, timeouts and refused connections are retried with doubling delays.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawBar};
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const YAHOO_CHART_BASE: &str = "https://query2.finance.yahoo.com";

/// Seconds to wait on a 429 that carries no `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartSeries>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    meta: Option<SeriesMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: SeriesIndicators,
}

#[derive(Debug, Deserialize)]
struct SeriesMeta {
    /// Exchange offset from UTC in seconds.
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SeriesIndicators {
    quote: Vec<Quotes>,
    adjclose: Option<Vec<AdjustedCloses>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quotes {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjustedCloses {
    adjclose: Vec<Option<f64>>,
}

fn at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

fn format_changed(msg: impl Into<String>) -> DataError {
    DataError::ResponseFormatChanged(msg.into())
}

impl ChartEnvelope {
    /// Decode into bars. A series without timestamps is empty, not an error.
    fn into_bars(self, symbol: &str) -> Result<Vec<RawBar>, DataError> {
        let series = match (self.chart.result, self.chart.error) {
            (Some(results), _) => results
                .into_iter()
                .next()
                .ok_or_else(|| format_changed("result array is empty"))?,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            (None, Some(err)) => {
                return Err(format_changed(format!("{}: {}", err.code, err.description)))
            }
            (None, None) => return Err(format_changed("neither result nor error present")),
        };
        series.into_bars()
    }
}

impl ChartSeries {
    fn into_bars(self) -> Result<Vec<RawBar>, DataError> {
        let Some(timestamps) = self.timestamp else {
            return Ok(Vec::new());
        };
        let offset = self.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
        let quotes = self
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| format_changed("no quote block"))?;
        let adjusted = self
            .indicators
            .adjclose
            .and_then(|blocks| blocks.into_iter().next())
            .map(|block| block.adjclose)
            .unwrap_or_default();

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.into_iter().enumerate() {
            let (open, high, low, close, volume) = (
                at(&quotes.open, i),
                at(&quotes.high, i),
                at(&quotes.low, i),
                at(&quotes.close, i),
                at(&quotes.volume, i),
            );
            // holiday or halted session
            if [open, high, low, close].iter().all(Option::is_none) && volume.is_none() {
                continue;
            }

            // trading date in exchange time
            let date = DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| format_changed(format!("timestamp {ts} out of range")))?;

            bars.push(RawBar {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
                adj_close: at(&adjusted, i).unwrap_or(f64::NAN),
            });
        }
        Ok(bars)
    }
}

/// What one HTTP attempt means for the retry loop.
#[derive(Debug)]
enum Attempt {
    Retry(DataError),
    Blocked,
    Fail(DataError),
}

/// Classify a non-success status. `retry_after` is the parsed header, if any.
fn classify_status(status: StatusCode, symbol: &str, retry_after: Option<u64>) -> Attempt {
    match status {
        StatusCode::FORBIDDEN => Attempt::Blocked,
        StatusCode::NOT_FOUND => Attempt::Fail(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        StatusCode::UNAUTHORIZED => Attempt::Fail(DataError::AuthenticationRequired(
            "chart endpoint answered 401".into(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Attempt::Retry(DataError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        }),
        s if s.is_server_error() => {
            Attempt::Retry(DataError::Other(format!("HTTP {s} for {symbol}")))
        }
        s => Attempt::Fail(DataError::Other(format!("HTTP {s} for {symbol}"))),
    }
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Backoff for the next attempt, stretched to honour a 429's `Retry-After`.
fn retry_delay(base: Duration, attempt: u32, last_error: &DataError) -> Duration {
    let delay = backoff(base, attempt);
    match last_error {
        DataError::RateLimited { retry_after_secs } => {
            delay.max(Duration::from_secs(*retry_after_secs))
        }
        _ => delay,
    }
}

/// HTTP and retry settings for [`YahooProvider`].
#[derive(Debug, Clone)]
pub struct YahooSettings {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            base_url: YAHOO_CHART_BASE.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    settings: YahooSettings,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>, settings: YahooSettings) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            // the endpoint rejects clients without a browser-like agent
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) pricelake")
            .build()
            .map_err(|e| DataError::Other(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            breaker,
            settings,
        })
    }

    /// Chart URL covering `start` 00:00 through `end` 23:59:59 UTC.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_hms_opt(0, 0, 0).map_or(0, |dt| dt.and_utc().timestamp());
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .map_or(period1, |dt| dt.and_utc().timestamp());
        format!(
            "{}/v8/finance/chart/{symbol}?period1={period1}&period2={period2}\
             &interval=1d&includeAdjustedClose=true",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn try_once(&self, url: &str, symbol: &str) -> Result<Vec<RawBar>, Attempt> {
        let resp = self.client.get(url).send().map_err(|e| {
            let err = DataError::NetworkUnreachable(e.to_string());
            if e.is_connect() || e.is_timeout() {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(classify_status(status, symbol, retry_after));
        }

        let envelope: ChartEnvelope = resp
            .json()
            .map_err(|e| Attempt::Fail(format_changed(format!("{symbol}: {e}"))))?;
        envelope.into_bars(symbol).map_err(Attempt::Fail)
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, DataError> {
        let url = self.chart_url(symbol, start, end);
        let mut last_error = DataError::Other(format!("no attempt made for {symbol}"));

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = retry_delay(self.settings.base_delay, attempt, &last_error);
                tracing::debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }
            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            match self.try_once(&url, symbol) {
                Ok(bars) => {
                    self.breaker.record_success();
                    return Ok(bars);
                }
                Err(Attempt::Retry(e)) => {
                    self.breaker.record_failure();
                    tracing::debug!(symbol, attempt, error = %e, "attempt failed");
                    last_error = e;
                }
                Err(Attempt::Blocked) => {
                    self.breaker.trip();
                    return Err(DataError::CircuitBreakerTripped);
                }
                Err(Attempt::Fail(e)) => return Err(e),
            }
        }
        Err(last_error)
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let bars = self.fetch_with_retry(symbol, start, end)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::Yahoo,
        })
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(symbol: &str, json: &str) -> Result<Vec<RawBar>, DataError> {
        let envelope: ChartEnvelope =
            serde_json::from_str(json).expect("fixture should deserialize");
        envelope.into_bars(symbol)
    }

    #[test]
    fn parses_quotes_and_skips_null_rows() {
        // 2024-01-02 / 2024-01-03 / 2024-01-04 14:30 UTC, middle row is a null session
        let json = r#"{
            "chart": {
                "result": [{
                    "meta": {"gmtoffset": -18000},
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {
                        "quote": [{
                            "open":   [187.15, null, 182.15],
                            "high":   [188.44, null, 183.09],
                            "low":    [183.89, null, 180.88],
                            "close":  [185.64, null, 181.91],
                            "volume": [82488700, null, 71983600]
                        }],
                        "adjclose": [{"adjclose": [184.73, null, 181.02]}]
                    }
                }],
                "error": null
            }
        }"#;

        let bars = parse("AAPL", json).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[0].volume, 82_488_700);
        assert_eq!(bars[1].adj_close, 181.02);
    }

    #[test]
    fn partial_nulls_become_nan() {
        let json = r#"{"chart": {"result": [{
            "timestamp": [1704205800],
            "indicators": {"quote": [{
                "open": [null], "high": [188.44], "low": [183.89],
                "close": [185.64], "volume": [100]
            }]}
        }], "error": null}}"#;

        let bars = parse("AAPL", json).unwrap();
        assert_eq!(bars.len(), 1);
        assert!(bars[0].open.is_nan());
        assert!(bars[0].adj_close.is_nan());
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let json = r#"{"chart": {"result": null, "error": {
            "code": "Not Found",
            "description": "No data found, symbol may be delisted"
        }}}"#;

        let err = parse("ZZZZ", json).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { ref symbol } if symbol == "ZZZZ"));
    }

    #[test]
    fn other_errors_are_format_changes() {
        let json = r#"{"chart": {"result": null, "error": {
            "code": "Bad Request", "description": "Invalid input"
        }}}"#;
        assert!(matches!(
            parse("AAPL", json),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn missing_timestamps_is_an_empty_series() {
        let json = r#"{"chart": {"result": [{
            "meta": {"gmtoffset": -18000},
            "indicators": {"quote": [{}]}
        }], "error": null}}"#;

        let bars = parse("AAPL", json).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn chart_url_covers_the_whole_end_day() {
        let provider = YahooProvider::new(
            Arc::new(CircuitBreaker::default_provider()),
            YahooSettings {
                base_url: "http://localhost:9/".into(),
                ..YahooSettings::default()
            },
        )
        .unwrap();
        let url = provider.chart_url(
            "BRK-B",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        assert_eq!(
            url,
            "http://localhost:9/v8/finance/chart/BRK-B?period1=1704153600&period2=1704239999&interval=1d&includeAdjustedClose=true"
        );
    }

    #[test]
    fn open_breaker_short_circuits_fetch() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        breaker.trip();
        let provider = YahooProvider::new(breaker, YahooSettings::default()).unwrap();
        assert!(!provider.is_available());

        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(
            provider.fetch("AAPL", day, day),
            Err(DataError::CircuitBreakerTripped)
        ));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "AAPL", None),
            Attempt::Blocked
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "ZZZZ", None),
            Attempt::Fail(DataError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "AAPL", None),
            Attempt::Fail(DataError::AuthenticationRequired(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "AAPL", Some(5)),
            Attempt::Retry(DataError::RateLimited { retry_after_secs: 5 })
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "AAPL", None),
            Attempt::Retry(DataError::RateLimited { retry_after_secs: 60 })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "AAPL", None),
            Attempt::Retry(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "AAPL", None),
            Attempt::Fail(_)
        ));
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1), Duration::from_millis(500));
        assert_eq!(backoff(base, 2), Duration::from_secs(1));
        assert_eq!(backoff(base, 3), Duration::from_secs(2));
        assert!(backoff(base, 40) > Duration::from_secs(86_400));
    }

    #[test]
    fn rate_limit_waits_at_least_retry_after() {
        let base = Duration::from_millis(500);
        let limited = DataError::RateLimited { retry_after_secs: 7 };
        assert_eq!(retry_delay(base, 1, &limited), Duration::from_secs(7));
        // a longer backoff still wins
        assert_eq!(retry_delay(base, 6, &limited), Duration::from_secs(16));

        let other = DataError::Other("HTTP 502".into());
        assert_eq!(retry_delay(base, 1, &other), Duration::from_millis(500));
    }
}
