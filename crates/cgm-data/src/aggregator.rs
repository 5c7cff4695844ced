//! Windowed descriptive statistics and time-in-range.
//!
//! The window itself is applied by the store; [`summarize`] trusts that every
//! record it is given already lies inside `window` and only echoes the bounds
//! into the summary.

use cgm_core::calculations::{round_half_even, RangeCounts, ValueAccumulator};
use cgm_core::models::{GlucoseRange, GlucoseRecord, InsightSummary, TimeWindow};

/// Decimal places kept in presented averages and percentages.
pub const PRESENTATION_DECIMALS: u32 = 2;

/// Compute an [`InsightSummary`] over an already-filtered record set.
///
/// * `avg_glucose` is the mean rounded half-to-even to 2 decimals.
/// * `min_glucose` / `max_glucose` are exact.
/// * Highs are strictly above `range.upper`, lows strictly below
///   `range.lower`; everything else is in range.
/// * With no records, every statistic is `None` and both counts are zero.
pub fn summarize(
    user_id: &str,
    records: &[GlucoseRecord],
    window: TimeWindow,
    range: GlucoseRange,
) -> InsightSummary {
    if records.is_empty() {
        return InsightSummary::empty(user_id, window);
    }

    let mut stats = ValueAccumulator::new();
    let mut counts = RangeCounts::default();
    for record in records {
        stats.add(record.value);
        counts.add(record.value, &range);
    }

    InsightSummary {
        user_id: user_id.to_string(),
        start: window.start,
        end: window.end,
        avg_glucose: stats.mean().map(|m| round_half_even(m, PRESENTATION_DECIMALS)),
        min_glucose: stats.min(),
        max_glucose: stats.max(),
        time_in_range_pct: counts
            .in_range_pct()
            .map(|p| round_half_even(p, PRESENTATION_DECIMALS)),
        total_points: stats.count(),
        highs_count: counts.highs,
        lows_count: counts.lows,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
