//! Numeric accumulators shared by the aggregation and trend code.
//!
//! All arithmetic runs in `f64`; rounding is a presentation step applied by
//! callers to final results only.

use crate::models::GlucoseRange;

// ── Rounding ──────────────────────────────────────────────────────────────────

/// Round `value` to `decimals` places, resolving exact ties to the even digit.
///
/// Rounds the exact binary value: `0.125` is a true tie and becomes `0.12`,
/// while the mean of `301.86` and `301.87` sits just above `301.865` and
/// becomes `301.87`. Scaling by `10^decimals` first would round twice.
pub fn round_half_even(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    // Float formatting expands the exact value and breaks ties to even.
    format!("{:.*}", decimals as usize, value)
        .parse()
        .unwrap_or(value)
}

// ── ValueAccumulator ──────────────────────────────────────────────────────────

/// Running count / sum / extrema over a stream of readings.
#[derive(Debug, Clone, Default)]
pub struct ValueAccumulator {
    count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ValueAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Unrounded arithmetic mean, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }
}

impl FromIterator<f64> for ValueAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        for v in iter {
            acc.add(v);
        }
        acc
    }
}

// ── RangeCounts ───────────────────────────────────────────────────────────────

/// Exhaustive partition of readings against a [`GlucoseRange`].
///
/// `highs + lows + in_range` always equals the number of values added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeCounts {
    pub highs: usize,
    pub lows: usize,
    pub in_range: usize,
}

impl RangeCounts {
    pub fn add(&mut self, value: f64, range: &GlucoseRange) {
        if value > range.upper {
            self.highs += 1;
        } else if value < range.lower {
            self.lows += 1;
        } else {
            self.in_range += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.highs + self.lows + self.in_range
    }

    /// Percentage of values inside the range, unrounded. `None` when empty.
    pub fn in_range_pct(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.in_range as f64 / total as f64 * 100.0)
        }
    }
}

// ── Slope ─────────────────────────────────────────────────────────────────────

/// Mean of consecutive first differences of `values`.
///
/// Equivalent to `(last - first) / (n - 1)` but accumulated step by step.
/// Returns `0.0` for fewer than two values.
pub fn mean_step_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum: f64 = values.windows(2).map(|w| w[1] - w[0]).sum();
    sum / (values.len() - 1) as f64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
