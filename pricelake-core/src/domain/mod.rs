//! Domain types for the daily price load.

pub mod price;
pub mod ticker;

pub use price::PriceRecord;
pub use ticker::{Ticker, TickerError};
