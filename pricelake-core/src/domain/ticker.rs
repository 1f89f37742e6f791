//! Ticker symbol newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_TICKER_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickerError {
    #[error("empty ticker")]
    Empty,

    #[error("ticker '{0}' is longer than {MAX_TICKER_LEN} characters")]
    TooLong(String),

    #[error("ticker '{0}' must be letters joined by single '.' or '-' separators")]
    InvalidCharacters(String),
}

/// Canonical exchange symbol, e.g. `AAPL` or `BRK.B`.
///
/// Input is trimmed and upper-cased. The canonical form uses `.` as the share
/// class separator; [`Ticker::provider_symbol`] gives the Yahoo form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(TickerError::Empty);
        }
        if normalized.len() > MAX_TICKER_LEN {
            return Err(TickerError::TooLong(normalized));
        }

        let bytes = normalized.as_bytes();
        let is_sep = |b: &u8| *b == b'.' || *b == b'-';
        let edges_ok =
            bytes[0].is_ascii_alphabetic() && bytes[bytes.len() - 1].is_ascii_alphabetic();
        let body_ok = bytes.iter().all(|b| b.is_ascii_alphabetic() || is_sep(b));
        let no_double_sep = !bytes.windows(2).any(|w| is_sep(&w[0]) && is_sep(&w[1]));
        if !edges_ok || !body_ok || !no_double_sep {
            return Err(TickerError::InvalidCharacters(normalized));
        }

        // Share-class separators are stored canonically as '.'
        Ok(Self(normalized.replace('-', ".")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol as the Yahoo chart API expects it (`BRK.B` → `BRK-B`).
    pub fn provider_symbol(&self) -> String {
        self.0.replace('.', "-")
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}
