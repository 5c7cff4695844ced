use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CgmError;

/// Lower edge of the standard clinical normoglycemic range, mg/dL.
pub const DEFAULT_LOWER_BOUND: f64 = 70.0;

/// Upper edge of the standard clinical normoglycemic range, mg/dL.
pub const DEFAULT_UPPER_BOUND: f64 = 180.0;

/// A single normalized reading, not yet attributed to a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucosePoint {
    /// Instant the reading was taken (UTC).
    pub timestamp: DateTime<Utc>,
    /// Glucose concentration; always finite and positive.
    pub value: f64,
}

/// A stored reading owned by one user. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseRecord {
    /// Opaque owner identifier.
    pub user_id: String,
    /// Instant the reading was taken (UTC).
    pub timestamp: DateTime<Utc>,
    /// Glucose concentration.
    #[serde(alias = "glucose_value")]
    pub value: f64,
}

impl GlucoseRecord {
    /// Attach `user_id` to a normalized point.
    pub fn from_point(user_id: impl Into<String>, point: &GlucosePoint) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: point.timestamp,
            value: point.value,
        }
    }
}

/// The ordered output of one upload after normalization.
///
/// Records are ascending by timestamp; duplicate timestamps are preserved in
/// their original relative order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedBatch {
    /// Surviving readings, ascending by timestamp.
    pub records: Vec<GlucosePoint>,
    /// Number of data rows read from the upload.
    pub rows_read: usize,
    /// Rows dropped because the timestamp or value could not be coerced.
    pub dropped_rows: usize,
    /// Valid rows removed by the start/end bounds.
    pub out_of_bounds: usize,
}

impl NormalizedBatch {
    /// Number of surviving readings.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when no reading survived normalization.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// An optionally bounded, inclusive time range.
///
/// Both bounds absent means unbounded. Each present bound is inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// The window with neither bound set.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `true` when `ts` satisfies every bound that is present.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Clinician-specified target interval used for time-in-range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseRange {
    pub lower: f64,
    pub upper: f64,
}

impl GlucoseRange {
    /// Build a range, rejecting inverted or non-finite bounds.
    pub fn new(lower: f64, upper: f64) -> Result<Self, CgmError> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(CgmError::InvalidRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

impl Default for GlucoseRange {
    fn default() -> Self {
        Self {
            lower: DEFAULT_LOWER_BOUND,
            upper: DEFAULT_UPPER_BOUND,
        }
    }
}

/// Windowed statistics for one user. Recomputed on every query.
///
/// Every `Option` field is `None` exactly when `total_points == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSummary {
    pub user_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Mean value, rounded half-to-even to 2 decimals.
    pub avg_glucose: Option<f64>,
    pub min_glucose: Option<f64>,
    pub max_glucose: Option<f64>,
    /// Share of readings inside the range, percent, 2 decimals.
    pub time_in_range_pct: Option<f64>,
    pub total_points: usize,
    pub highs_count: usize,
    pub lows_count: usize,
}

impl InsightSummary {
    /// The summary reported when no reading falls inside the window.
    pub fn empty(user_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            user_id: user_id.into(),
            start: window.start,
            end: window.end,
            avg_glucose: None,
            min_glucose: None,
            max_glucose: None,
            time_in_range_pct: None,
            total_points: 0,
            highs_count: 0,
            lows_count: 0,
        }
    }
}

/// Discrete risk category produced by a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Short-horizon risk classification with a score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk: RiskLevel,
    pub score: f64,
    pub advice: String,
}

impl RiskAssessment {
    pub fn new(risk: RiskLevel, score: f64, advice: impl Into<String>) -> Self {
        Self {
            risk,
            score,
            advice: advice.into(),
        }
    }
}

/// How a recommendation is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMethod {
    /// Slope-based rules over the most recent readings.
    Rule,
    /// Trained-model inference (placeholder).
    Ml,
}

impl FromStr for PredictionMethod {
    type Err = CgmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(PredictionMethod::Rule),
            "ml" => Ok(PredictionMethod::Ml),
            other => Err(CgmError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMethod::Rule => f.write_str("rule"),
            PredictionMethod::Ml => f.write_str("ml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    // ── TimeWindow ────────────────────────────────────────────────────────────

    #[test]
    fn test_window_unbounded_contains_everything() {
        let w = TimeWindow::unbounded();
        assert!(w.is_unbounded());
        assert!(w.contains(ts(0, 0)));
        assert!(w.contains(ts(23, 59)));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let w = TimeWindow::new(Some(ts(9, 0)), Some(ts(10, 0)));
        assert!(w.contains(ts(9, 0)));
        assert!(w.contains(ts(10, 0)));
        assert!(!w.contains(ts(8, 59)));
        assert!(!w.contains(ts(10, 1)));
    }

    #[test]
    fn test_window_half_open() {
        let from = TimeWindow::new(Some(ts(9, 0)), None);
        assert!(from.contains(ts(23, 0)));
        assert!(!from.contains(ts(8, 0)));

        let until = TimeWindow::new(None, Some(ts(9, 0)));
        assert!(until.contains(ts(1, 0)));
        assert!(!until.contains(ts(9, 1)));
    }

    // ── GlucoseRange ──────────────────────────────────────────────────────────

    #[test]
    fn test_range_default_is_clinical() {
        let r = GlucoseRange::default();
        assert_eq!(r.lower, 70.0);
        assert_eq!(r.upper, 180.0);
    }

    #[test]
    fn test_range_rejects_inverted_and_nan() {
        assert!(matches!(
            GlucoseRange::new(180.0, 70.0),
            Err(CgmError::InvalidRange { .. })
        ));
        assert!(GlucoseRange::new(f64::NAN, 180.0).is_err());
        assert!(GlucoseRange::new(100.0, 100.0).is_ok());
    }

    #[test]
    fn test_range_contains_is_inclusive() {
        let r = GlucoseRange::default();
        assert!(r.contains(70.0));
        assert!(r.contains(180.0));
        assert!(!r.contains(69.99));
        assert!(!r.contains(180.01));
    }

    // ── PredictionMethod ──────────────────────────────────────────────────────

    #[test]
    fn test_method_parse() {
        assert_eq!("rule".parse::<PredictionMethod>().unwrap(), PredictionMethod::Rule);
        assert_eq!("ml".parse::<PredictionMethod>().unwrap(), PredictionMethod::Ml);
    }

    #[test]
    fn test_method_parse_unknown() {
        let err = "xyz".parse::<PredictionMethod>().unwrap_err();
        assert!(matches!(err, CgmError::UnknownMethod(ref m) if m == "xyz"));
        // Method names are case-sensitive.
        assert!("Rule".parse::<PredictionMethod>().is_err());
    }

    // ── Serialization ─────────────────────────────────────────────────────────

    #[test]
    fn test_risk_level_serializes_lowercase() {
        let a = RiskAssessment::new(RiskLevel::Medium, 0.4, "Rising glucose. Observe.");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["risk"], "medium");
        assert_eq!(json["score"], 0.4);
    }

    #[test]
    fn test_record_accepts_legacy_field_name() {
        let json = r#"{"user_id":"u1","timestamp":"2024-03-01T09:00:00Z","glucose_value":95.0}"#;
        let rec: GlucoseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.value, 95.0);
        assert_eq!(rec.timestamp, ts(9, 0));
    }

    #[test]
    fn test_empty_summary_has_no_statistics() {
        let s = InsightSummary::empty("u1", TimeWindow::unbounded());
        assert_eq!(s.total_points, 0);
        assert!(s.avg_glucose.is_none());
        assert!(s.min_glucose.is_none());
        assert!(s.max_glucose.is_none());
        assert!(s.time_in_range_pct.is_none());
        assert_eq!(s.highs_count, 0);
        assert_eq!(s.lows_count, 0);
    }
}
