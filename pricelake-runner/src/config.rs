//! Run configuration loaded from TOML.
//!
//! Every section is optional; missing keys take the defaults below. The CLI
//! applies its flags on top of the parsed file and then calls `validate`.

use crate::warehouse::postgres::DEFAULT_DATABASE_URL_ENV;
use crate::warehouse::{TableRef, WriteMode};
use chrono::{Months, NaiveDate};
use pricelake_core::data::DEFAULT_SP500_URL;
use pricelake_core::transform::{PriceAdjustment, TransformConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Look-back used when no start date is configured.
pub const DEFAULT_HISTORY_YEARS: u32 = 5;
pub const DEFAULT_MA_WINDOW: usize = 50;
pub const DEFAULT_TABLE: &str = "analytics.market.daily_prices";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtlConfig {
    pub run: RunSection,
    pub universe: UniverseSection,
    pub provider: ProviderSection,
    pub transform: TransformSection,
    pub destination: DestinationSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    /// Inclusive; defaults to `end_date` minus five years.
    pub start_date: Option<NaiveDate>,
    /// Inclusive; defaults to today.
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniverseSource {
    #[default]
    Sp500,
    Tickers,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniverseSection {
    pub source: UniverseSource,
    pub tickers: Vec<String>,
    pub path: Option<PathBuf>,
    pub sp500_url: String,
}

impl Default for UniverseSection {
    fn default() -> Self {
        Self {
            source: UniverseSource::Sp500,
            tickers: Vec::new(),
            path: None,
            sp500_url: DEFAULT_SP500_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Seed for the synthetic provider.
    pub seed: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Yahoo,
            max_retries: 3,
            timeout_secs: 30,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSection {
    pub ma_window: usize,
    /// Scale OHLC by the provider's adjusted-close ratio.
    pub adjusted: bool,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            ma_window: DEFAULT_MA_WINDOW,
            adjusted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    #[default]
    Postgres,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationSection {
    pub kind: DestinationKind,
    /// `project.dataset.table`
    pub table: String,
    pub write_mode: WriteMode,
    /// Name of the environment variable holding the connection URL.
    pub database_url_env: String,
    pub create_if_missing: bool,
    /// Root directory for the parquet destination.
    pub root: PathBuf,
}

impl Default for DestinationSection {
    fn default() -> Self {
        Self {
            kind: DestinationKind::Postgres,
            table: DEFAULT_TABLE.to_string(),
            write_mode: WriteMode::Append,
            database_url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
            create_if_missing: true,
            root: PathBuf::from("warehouse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `pricelake_core=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl EtlConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Inclusive `[start, end]`, with defaults resolved against `today`.
    pub fn date_range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ConfigError> {
        let end = self.run.end_date.unwrap_or(today);
        let start = match self.run.start_date {
            Some(start) => start,
            None => end
                .checked_sub_months(Months::new(12 * DEFAULT_HISTORY_YEARS))
                .ok_or_else(|| ConfigError::Invalid(format!("cannot go back from {end}")))?,
        };
        if start > end {
            return Err(ConfigError::Invalid(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        Ok((start, end))
    }

    pub fn table_ref(&self) -> Result<TableRef, ConfigError> {
        self.destination
            .table
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("destination.table: {e}")))
    }

    pub fn transform_config(&self, start: NaiveDate, end: NaiveDate) -> TransformConfig {
        TransformConfig {
            ma_window: self.transform.ma_window,
            adjustment: if self.transform.adjusted {
                PriceAdjustment::Adjusted
            } else {
                PriceAdjustment::Raw
            },
            start,
            end,
        }
    }

    /// Check cross-field constraints; `today` resolves the default dates.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ConfigError> {
        self.date_range(today)?;
        self.table_ref()?;

        if self.transform.ma_window == 0 {
            return Err(ConfigError::Invalid(
                "transform.ma_window must be at least 1".into(),
            ));
        }
        match self.universe.source {
            UniverseSource::Tickers if self.universe.tickers.is_empty() => {
                tracing::warn!("universe.source = \"tickers\" with an empty list; nothing to load");
            }
            UniverseSource::File if self.universe.path.is_none() => {
                return Err(ConfigError::Invalid(
                    "universe.source = \"file\" requires universe.path".into(),
                ));
            }
            _ => {}
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.timeout_secs must be positive".into(),
            ));
        }
        if self.destination.kind == DestinationKind::Postgres
            && self.destination.database_url_env.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "destination.database_url_env must name an environment variable".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".into()));
        }
        Ok(())
    }
}
