//! Extraction feeding the transformer, driven by the synthetic provider.

use chrono::NaiveDate;
use pricelake_core::data::{extract_universe, DataError, LogProgress, SyntheticProvider, Universe};
use pricelake_core::transform::{consolidate, transform_series, PriceAdjustment, TransformConfig};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn universe_to_table() {
    let universe = Universe::from_text("AAPL\nMSFT\nBRK.B\nGONE\nnot a ticker\n");
    let provider = SyntheticProvider::new(11).with_missing(["GONE"]);
    let (start, end) = (d(2024, 1, 1), d(2024, 3, 29));

    let summary = extract_universe(&universe.all_tickers(), &provider, start, end, &LogProgress);
    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded(), 3);
    assert!(summary
        .failures
        .iter()
        .any(|(t, e)| t == "GONE" && matches!(e, DataError::SymbolNotFound { .. })));
    assert!(summary
        .failures
        .iter()
        .any(|(_, e)| matches!(e, DataError::InvalidTicker { .. })));

    let config = TransformConfig {
        ma_window: 20,
        adjustment: PriceAdjustment::Adjusted,
        start,
        end,
    };
    let per_ticker: Vec<_> = summary
        .series
        .iter()
        .map(|s| transform_series(s, &config).unwrap())
        .collect();
    let table = consolidate(per_ticker);

    assert_eq!(table.tickers(), vec!["AAPL", "BRK.B", "MSFT"]);
    for ticker in table.tickers() {
        let rows = table.ticker_rows(ticker);
        // Jan 1 .. Mar 29 2024 holds 65 weekdays
        assert_eq!(rows.len(), 65);
        assert!(rows[..19].iter().all(|r| r.moving_average.is_none()));
        assert!(rows[19..].iter().all(|r| r.moving_average.is_some()));
    }

    let df = table.to_dataframe().unwrap();
    assert_eq!(df.height(), table.len());
}
