//! Derived columns computed over one ticker's close series.
//!
//! Every derivation sees a single ticker's closes, sorted by date, so values
//! never leak across ticker boundaries. `None` marks rows without enough history.

/// A column derived from a close-price series.
pub trait Derivation: Send + Sync {
    /// Output column name (e.g., "moving_average").
    fn name(&self) -> &str;

    /// Number of leading rows that are always undefined.
    fn lookback(&self) -> usize;

    /// Compute the column; the result has the same length as `closes`.
    fn compute(&self, closes: &[f64]) -> Vec<Option<f64>>;
}

/// Trailing mean of `window` closes.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
}

impl MovingAverage {
    /// `window` is clamped to at least one row.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Derivation for MovingAverage {
    fn name(&self) -> &str {
        "moving_average"
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut result = vec![None; closes.len()];
        // Summed per window rather than rolled, so no drift accumulates over long series
        for (i, window) in closes.windows(self.window).enumerate() {
            let sum: f64 = window.iter().sum();
            result[i + self.lookback()] = Some(sum / self.window as f64);
        }
        result
    }
}

/// `close_t / close_{t-1} - 1`, as a fraction.
#[derive(Debug, Clone, Default)]
pub struct DailyReturn;

impl Derivation for DailyReturn {
    fn name(&self) -> &str {
        "daily_return"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut result = Vec::with_capacity(closes.len());
        if closes.is_empty() {
            return result;
        }
        result.push(None);
        result.extend(closes.windows(2).map(|pair| {
            let (prev, curr) = (pair[0], pair[1]);
            (prev != 0.0).then(|| curr / prev - 1.0)
        }));
        result
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
