//! Short-horizon trend risk classification.
//!
//! [`classify`] looks at the most recent `lookback` readings, averages their
//! step-wise slope and maps slope plus latest value onto a [`RiskAssessment`].
//! Predictors are selected by [`PredictionMethod`]; the `ml` method is a
//! placeholder until a trained model exists.

use cgm_core::calculations::mean_step_slope;
use cgm_core::models::{GlucoseRecord, PredictionMethod, RiskAssessment, RiskLevel};

/// Slope (per reading) beyond which a fall or rise is "rapid".
pub const RAPID_SLOPE: f64 = 2.0;
/// Slope (per reading) beyond which a fall or rise is a trend.
pub const TREND_SLOPE: f64 = 1.0;
/// A rapid fall is high risk only when the latest value is below this.
pub const FALL_ALERT_LEVEL: f64 = 90.0;
/// A rapid rise is high risk only when the latest value is above this.
pub const RISE_ALERT_LEVEL: f64 = 180.0;

/// Anything that turns a reading history into a risk assessment.
pub trait RiskPredictor: Send + Sync {
    /// `records` must be ascending by timestamp.
    fn predict(&self, records: &[GlucoseRecord], lookback: usize) -> RiskAssessment;

    /// Predictor name for logging.
    fn name(&self) -> &'static str;
}

/// Slope-threshold rules over the latest readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPredictor;

impl RiskPredictor for RuleBasedPredictor {
    fn predict(&self, records: &[GlucoseRecord], lookback: usize) -> RiskAssessment {
        classify(records, lookback)
    }

    fn name(&self) -> &'static str {
        "rule"
    }
}

/// Stand-in for trained-model inference. Always answers low risk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderModel;

impl RiskPredictor for PlaceholderModel {
    fn predict(&self, _records: &[GlucoseRecord], _lookback: usize) -> RiskAssessment {
        RiskAssessment::new(RiskLevel::Low, 0.2, "ML model not yet trained.")
    }

    fn name(&self) -> &'static str {
        "ml"
    }
}

/// Predictor implementing `method`.
pub fn predictor_for(method: PredictionMethod) -> &'static dyn RiskPredictor {
    match method {
        PredictionMethod::Rule => &RuleBasedPredictor,
        PredictionMethod::Ml => &PlaceholderModel,
    }
}

/// Classify risk from the last `lookback` readings.
///
/// Fewer than `lookback` readings yields the conservative
/// `low / 0.05 / "Insufficient data."` answer. Rules are checked in order and
/// the first match wins:
///
/// 1. slope < -2 and latest < 90  → high, 0.9
/// 2. slope < -1                  → medium, 0.45
/// 3. slope > 2 and latest > 180  → high, 0.85
/// 4. slope > 1                   → medium, 0.4
/// 5. otherwise                   → low, 0.1
///
/// A `lookback` of zero is treated as one.
pub fn classify(records: &[GlucoseRecord], lookback: usize) -> RiskAssessment {
    let lookback = lookback.max(1);
    if records.len() < lookback {
        return RiskAssessment::new(RiskLevel::Low, 0.05, "Insufficient data.");
    }

    let values: Vec<f64> = records[records.len() - lookback..]
        .iter()
        .map(|r| r.value)
        .collect();
    let avg_slope = mean_step_slope(&values);
    let latest = values[values.len() - 1];

    assess(avg_slope, latest)
}

/// Map an average slope and latest value onto a risk category.
pub fn assess(avg_slope: f64, latest: f64) -> RiskAssessment {
    if avg_slope < -RAPID_SLOPE && latest < FALL_ALERT_LEVEL {
        return RiskAssessment::new(
            RiskLevel::High,
            0.9,
            "Rapid fall detected. Consider fast carbs & retest in 15 min.",
        );
    }
    if avg_slope < -TREND_SLOPE {
        return RiskAssessment::new(RiskLevel::Medium, 0.45, "Downward trend. Monitor closely.");
    }
    if avg_slope > RAPID_SLOPE && latest > RISE_ALERT_LEVEL {
        return RiskAssessment::new(
            RiskLevel::High,
            0.85,
            "Rapid rise detected. Consider action per care plan.",
        );
    }
    if avg_slope > TREND_SLOPE {
        return RiskAssessment::new(RiskLevel::Medium, 0.4, "Rising glucose. Observe.");
    }
    RiskAssessment::new(RiskLevel::Low, 0.1, "Stable readings.")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
