//! Conversion between price records and polars DataFrames.

use crate::domain::PriceRecord;
use crate::schema::{PriceSchema, SchemaError};
use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("polars: {0}")]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("null {column} at row {row}")]
    UnexpectedNull { column: &'static str, row: usize },

    #[error("volume {volume} at row {row} does not fit in BIGINT")]
    VolumeOverflow { volume: u64, row: usize },

    #[error("negative volume {volume} at row {row}")]
    NegativeVolume { volume: i64, row: usize },
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Build a DataFrame in `PriceSchema` layout.
pub fn records_to_dataframe(records: &[PriceRecord]) -> Result<DataFrame, FrameError> {
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = records.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = records.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = records.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let volumes = records
        .iter()
        .enumerate()
        .map(|(row, r)| {
            i64::try_from(r.volume).map_err(|_| FrameError::VolumeOverflow {
                volume: r.volume,
                row,
            })
        })
        .collect::<Result<Vec<i64>, _>>()?;
    let moving_averages: Vec<Option<f64>> = records.iter().map(|r| r.moving_average).collect();
    let daily_returns: Vec<Option<f64>> = records.iter().map(|r| r.daily_return).collect();

    let df = DataFrame::new(vec![
        Column::new("ticker".into(), tickers),
        Column::new("date".into(), dates).cast(&DataType::Date)?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("moving_average".into(), moving_averages),
        Column::new("daily_return".into(), daily_returns),
    ])?;

    Ok(df)
}

/// Read records back from a DataFrame, validating the schema first.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<PriceRecord>, FrameError> {
    PriceSchema::validate(df)?;

    let ticker_ca = df.column("ticker")?.str()?;
    let date_ca = df.column("date")?.date()?;
    let open_ca = df.column("open")?.f64()?;
    let high_ca = df.column("high")?.f64()?;
    let low_ca = df.column("low")?.f64()?;
    let close_ca = df.column("close")?.f64()?;
    let vol_ca = df.column("volume")?.i64()?;
    let ma_ca = df.column("moving_average")?.f64()?;
    let ret_ca = df.column("daily_return")?.f64()?;

    let required_f64 = |ca: &Float64Chunked, column: &'static str, row: usize| {
        ca.get(row)
            .ok_or(FrameError::UnexpectedNull { column, row })
    };

    let n = df.height();
    let mut records = Vec::with_capacity(n);

    for row in 0..n {
        let ticker = ticker_ca.get(row).ok_or(FrameError::UnexpectedNull {
            column: "ticker",
            row,
        })?;
        let days = date_ca.get(row).ok_or(FrameError::UnexpectedNull {
            column: "date",
            row,
        })?;
        let volume = vol_ca.get(row).ok_or(FrameError::UnexpectedNull {
            column: "volume",
            row,
        })?;
        let volume =
            u64::try_from(volume).map_err(|_| FrameError::NegativeVolume { volume, row })?;

        records.push(PriceRecord {
            ticker: ticker.to_string(),
            date: epoch() + chrono::Duration::days(i64::from(days)),
            open: required_f64(open_ca, "open", row)?,
            high: required_f64(high_ca, "high", row)?,
            low: required_f64(low_ca, "low", row)?,
            close: required_f64(close_ca, "close", row)?,
            volume,
            moving_average: ma_ca.get(row),
            daily_return: ret_ca.get(row),
        });
    }

    Ok(records)
}
