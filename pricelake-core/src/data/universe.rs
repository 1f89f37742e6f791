//! Universe configuration: sector-organized ticker lists.
//!
//! A universe can be given explicitly, read from a file (TOML sector map,
//! constituents CSV, or plain text), or fetched as the S&P 500 constituents CSV.

use super::provider::DataError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Public S&P 500 constituents list (Symbol, Security, GICS Sector, ...).
pub const DEFAULT_SP500_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

const UNCLASSIFIED: &str = "Unclassified";

/// The complete universe: sector name to member tickers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// A single unclassified sector holding the given tickers.
    pub fn from_tickers<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<String> = tickers.into_iter().map(Into::into).collect();
        let mut sectors = BTreeMap::new();
        if !list.is_empty() {
            sectors.insert(UNCLASSIFIED.to_string(), list);
        }
        Self { sectors }
    }

    /// Load a universe file, picking the parser from the extension.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::Universe(format!("read universe file {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&content),
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::from_csv_reader(content.as_bytes()),
            _ => Ok(Self::from_text(&content)),
        }
    }

    /// Parse a `[sectors]` TOML table.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Universe(format!("parse universe TOML: {e}")))
    }

    /// One ticker per line; blank lines and `#` comments are ignored.
    pub fn from_text(content: &str) -> Self {
        Self::from_tickers(
            content
                .lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty())
                .map(String::from),
        )
    }

    /// Parse a constituents CSV with a `Symbol` column and optional `GICS Sector`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| DataError::Universe(format!("read CSV header: {e}")))?
            .clone();
        let symbol_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("symbol"))
            .ok_or_else(|| DataError::Universe("CSV has no 'Symbol' column".into()))?;
        let sector_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("gics sector") || h.eq_ignore_ascii_case("sector"));

        let mut sectors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rdr.records() {
            let row = row.map_err(|e| DataError::Universe(format!("read CSV row: {e}")))?;
            let Some(symbol) = row.get(symbol_idx).filter(|s| !s.is_empty()) else {
                continue;
            };
            let sector = sector_idx
                .and_then(|i| row.get(i))
                .filter(|s| !s.is_empty())
                .unwrap_or(UNCLASSIFIED);
            sectors
                .entry(sector.to_string())
                .or_default()
                .push(symbol.to_string());
        }

        Ok(Self { sectors })
    }

    /// Download the constituents CSV. Any failure is fatal for the run.
    pub fn fetch_sp500(url: &str, timeout: Duration) -> Result<Self, DataError> {
        tracing::info!(url, "fetching S&P 500 constituents");

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Universe(format!("build HTTP client: {e}")))?;
        let resp = client
            .get(url)
            .send()
            .map_err(|e| DataError::Universe(format!("fetch {url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(DataError::Universe(format!(
                "fetch {url}: HTTP {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .map_err(|e| DataError::Universe(format!("read {url}: {e}")))?;
        let universe = Self::from_csv_reader(body.as_ref())?;

        if universe.ticker_count() == 0 {
            return Err(DataError::Universe(format!("{url} listed no tickers")));
        }
        tracing::info!(
            tickers = universe.ticker_count(),
            sectors = universe.sectors.len(),
            "constituents loaded"
        );
        Ok(universe)
    }

    /// All tickers in sector order, de-duplicated case-insensitively (first wins).
    pub fn all_tickers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.as_str()))
            .filter(|t| seen.insert(t.to_ascii_uppercase()))
            .collect()
    }

    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(|s| s.as_str()).collect()
    }

    /// Number of distinct tickers.
    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticker_count() == 0
    }
}
