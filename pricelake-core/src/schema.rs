//! Canonical column layout of the output table.

use polars::prelude::*;

/// Column names, in table order.
pub const COLUMNS: [&str; 9] = [
    "ticker",
    "date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "moving_average",
    "daily_return",
];

/// Columns that may hold nulls ("undefined").
pub const NULLABLE_COLUMNS: [&str; 2] = ["moving_average", "daily_return"];

/// Expected schema for the price table.
pub struct PriceSchema;

impl PriceSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("ticker".into(), DataType::String),
            Field::new("date".into(), DataType::Date),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::Int64),
            Field::new("moving_average".into(), DataType::Float64),
            Field::new("daily_return".into(), DataType::Float64),
        ])
    }

    /// Validate DataFrame against schema. Extra columns are tolerated.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_frame() -> DataFrame {
        let date = Series::new("date".into(), &[19724i32])
            .cast(&DataType::Date)
            .unwrap();

        DataFrame::new(vec![
            Column::Series(Series::new("ticker".into(), &["SPY"]).into()),
            Column::Series(date.into()),
            Column::Series(Series::new("open".into(), &[400.0]).into()),
            Column::Series(Series::new("high".into(), &[405.0]).into()),
            Column::Series(Series::new("low".into(), &[399.0]).into()),
            Column::Series(Series::new("close".into(), &[403.0]).into()),
            Column::Series(Series::new("volume".into(), &[1_000_000i64]).into()),
            Column::Series(Series::new("moving_average".into(), &[None::<f64>]).into()),
            Column::Series(Series::new("daily_return".into(), &[Some(0.01f64)]).into()),
        ])
        .unwrap()
    }

    #[test]
    fn schema_lists_every_column() {
        let schema = PriceSchema::schema();
        assert_eq!(schema.len(), COLUMNS.len());
        for name in COLUMNS {
            assert!(schema.contains(name), "missing {name}");
        }
    }

    #[test]
    fn validate_accepts_valid_dataframe() {
        assert!(PriceSchema::validate(&valid_frame()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_column() {
        let df = valid_frame().drop("daily_return").unwrap();
        assert!(matches!(
            PriceSchema::validate(&df),
            Err(SchemaError::MissingColumn(ref c)) if c == "daily_return"
        ));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let mut df = valid_frame();
        df.with_column(Series::new("volume".into(), &[1_000_000.0f64]))
            .unwrap();
        assert!(matches!(
            PriceSchema::validate(&df),
            Err(SchemaError::TypeMismatch { ref column, .. }) if column == "volume"
        ));
    }
}
