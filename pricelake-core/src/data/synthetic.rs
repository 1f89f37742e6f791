//! Offline provider generating deterministic random-walk bars.
//!
//! Each symbol gets its own RNG stream derived from `(seed, symbol, start)` via
//! BLAKE3, so the same request always yields the same bars regardless of the
//! order in which symbols are fetched.

use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawBar};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    missing: BTreeSet<String>,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            missing: BTreeSet::new(),
        }
    }

    /// Symbols that answer `SymbolNotFound`, as a delisted ticker would.
    pub fn with_missing<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing.extend(symbols.into_iter().map(Into::into));
        self
    }

    fn rng_for(&self, symbol: &str, start: NaiveDate) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(start.to_string().as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(hasher.finalize().as_bytes());
        StdRng::from_seed(seed)
    }

    /// Weekday bars over the inclusive range.
    fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawBar> {
        let mut rng = self.rng_for(symbol, start);
        let mut close: f64 = rng.gen_range(20.0..500.0);
        let mut bars = Vec::new();

        for date in start.iter_days().take_while(|d| *d <= end) {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }

            let open = close * (1.0 + rng.gen_range(-0.01..0.01));
            close = (close * (1.0 + rng.gen_range(-0.03..0.03))).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.015));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.015));
            let volume = rng.gen_range(100_000..10_000_000u64);

            bars.push(RawBar {
                date,
                open,
                high,
                low,
                close,
                volume,
                adj_close: close,
            });
        }

        bars
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        if self.missing.contains(symbol) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars: self.generate(symbol, start, end),
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
