//! Property tests for warehouse write modes.
//!
//! Uses proptest against the Parquet warehouse to verify, for arbitrary
//! pairs of loads:
//! 1. Append never duplicates a key and never changes an existing row
//! 2. Upsert leaves the incoming row for every key it touched
//! 3. Replace leaves exactly the incoming table
//! 4. Repeating the same load is idempotent in every mode

use chrono::NaiveDate;
use pricelake_core::{PriceRecord, PriceTable};
use pricelake_runner::warehouse::ParquetWarehouse;
use pricelake_runner::{TableRef, Warehouse, WriteMode};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

const TICKERS: [&str; 3] = ["AAA", "BBB", "CCC"];

fn table_ref() -> TableRef {
    "local.market.daily_prices".parse().unwrap()
}

fn record(ticker: usize, day: i64, close: f64) -> PriceRecord {
    PriceRecord {
        ticker: TICKERS[ticker].to_string(),
        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day),
        open: close,
        high: close + 1.0,
        low: close - 0.5,
        close,
        volume: 500,
        moving_average: None,
        daily_return: None,
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_table() -> impl Strategy<Value = PriceTable> {
    prop::collection::vec((0..TICKERS.len(), 0..15i64, 1.0..200.0_f64), 0..30).prop_map(|rows| {
        PriceTable::from_records(
            rows.into_iter()
                .map(|(t, day, close)| record(t, day, close))
                .collect(),
        )
    })
}

fn by_key(table: &PriceTable) -> HashMap<(String, NaiveDate), PriceRecord> {
    table
        .records()
        .iter()
        .map(|r| ((r.ticker.clone(), r.date), r.clone()))
        .collect()
}

fn load_twice(
    first: &PriceTable,
    second: &PriceTable,
    mode: WriteMode,
) -> (ParquetWarehouse, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut warehouse = ParquetWarehouse::new(dir.path(), true);
    warehouse.write(&table_ref(), first, WriteMode::Replace).unwrap();
    warehouse.write(&table_ref(), second, mode).unwrap();
    (warehouse, dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn append_keeps_existing_rows(first in arb_table(), second in arb_table()) {
        let (warehouse, _dir) = load_twice(&first, &second, WriteMode::Append);
        let stored = warehouse.read(&table_ref()).unwrap();
        let stored_keys = by_key(&stored);

        let keys: HashSet<_> = stored.records().iter().map(|r| r.key()).collect();
        prop_assert_eq!(keys.len(), stored.len());

        for (key, row) in by_key(&first) {
            prop_assert_eq!(stored_keys.get(&key), Some(&row));
        }
        for key in by_key(&second).keys() {
            prop_assert!(stored_keys.contains_key(key));
        }
    }

    #[test]
    fn upsert_prefers_incoming_rows(first in arb_table(), second in arb_table()) {
        let (warehouse, _dir) = load_twice(&first, &second, WriteMode::Upsert);
        let stored_keys = by_key(&warehouse.read(&table_ref()).unwrap());

        for (key, row) in by_key(&second) {
            prop_assert_eq!(stored_keys.get(&key), Some(&row));
        }
        for key in by_key(&first).keys() {
            prop_assert!(stored_keys.contains_key(key));
        }
    }

    #[test]
    fn replace_keeps_only_incoming(first in arb_table(), second in arb_table()) {
        let (warehouse, _dir) = load_twice(&first, &second, WriteMode::Replace);
        let stored = warehouse.read(&table_ref()).unwrap();
        prop_assert_eq!(stored, second);
    }

    #[test]
    fn repeated_load_is_idempotent(table in arb_table()) {
        for mode in WriteMode::ALL {
            let (warehouse, _dir) = load_twice(&table, &table, mode);
            let stored = warehouse.read(&table_ref()).unwrap();
            prop_assert_eq!(stored, table.clone());
        }
    }
}
