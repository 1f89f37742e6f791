//! Extraction: ticker universe, market-data providers and the per-ticker fetch loop.

pub mod circuit_breaker;
pub mod extract;
pub mod provider;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use extract::{extract_universe, ExtractSummary, TickerSeries};
pub use provider::{
    DataError, DataProvider, DataSource, ExtractProgress, FetchResult, LogProgress, RawBar,
};
pub use synthetic::SyntheticProvider;
pub use universe::{Universe, DEFAULT_SP500_URL};
pub use yahoo::{YahooProvider, YahooSettings};
