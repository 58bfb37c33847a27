//! Rolling price history and pairwise return correlation.
//!
//! Each symbol keeps a fixed-capacity ring buffer of price samples; the
//! 100-sample cap is an invariant of the buffer itself. Once every symbol
//! has enough history, the manager recomputes the full Pearson matrix from
//! period-over-period returns.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Maximum price samples retained per symbol.
pub const MAX_SAMPLES: usize = 100;

/// Minimum samples per symbol before correlations are considered meaningful.
pub const MIN_SAMPLES: usize = 30;

// =============================================================================
// Price history ring buffer
// =============================================================================

/// Bounded rolling window of price samples for one symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    samples: VecDeque<Decimal>,
}

impl PriceHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    /// Append a sample, evicting the oldest once at capacity.
    pub fn push(&mut self, price: Decimal) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(price);
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Period-over-period returns (`Δprice / price`) as f64.
    ///
    /// Statistics use f64; bookkeeping stays decimal.
    pub fn returns(&self) -> Vec<f64> {
        self.samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(prev, next)| {
                let prev = prev.to_f64().unwrap_or(0.0);
                let next = next.to_f64().unwrap_or(0.0);
                if prev == 0.0 {
                    0.0
                } else {
                    (next - prev) / prev
                }
            })
            .collect()
    }
}

// =============================================================================
// Correlation matrix
// =============================================================================

/// Symmetric pairwise Pearson correlation of symbol returns.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    symbols: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Compute the full matrix from per-symbol return series.
    ///
    /// Series are aligned on their most recent `n` entries, where `n` is the
    /// shortest series length.
    pub fn compute(series: &[(String, Vec<f64>)]) -> Self {
        let n = series.iter().map(|(_, r)| r.len()).min().unwrap_or(0);
        let count = series.len();
        let mut values = vec![vec![0.0; count]; count];

        for i in 0..count {
            values[i][i] = 1.0;
            for j in (i + 1)..count {
                let xs = &series[i].1[series[i].1.len() - n..];
                let ys = &series[j].1[series[j].1.len() - n..];
                let corr = pearson(xs, ys);
                values[i][j] = corr;
                values[j][i] = corr;
            }
        }

        Self {
            symbols: series.iter().map(|(s, _)| s.clone()).collect(),
            values,
        }
    }

    /// Correlation between two symbols, if both are in the matrix.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }

    /// Symbols covered by this matrix.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

/// Pearson correlation coefficient of two equal-length series.
///
/// Returns 0.0 for degenerate inputs (fewer than two points or zero variance).
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }

    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for k in 0..n {
        let dx = xs[k] - mean_x;
        let dy = ys[k] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

// =============================================================================
// Tests
// =============================================================================
