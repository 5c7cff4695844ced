//! CSV upload normalization.
//!
//! Turns a raw export of arbitrary shape into a [`NormalizedBatch`]: resolve
//! the timestamp and glucose columns, coerce each row, drop what does not
//! coerce, sort ascending by time and apply the optional bounds.

use cgm_core::error::{CgmError, Result};
use cgm_core::models::{GlucosePoint, NormalizedBatch, TimeWindow};
use cgm_core::time_utils::TimezoneHandler;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::columns::{resolve_columns, ColumnMapping};

/// Stateless CSV normalizer configured with the zone used for naive times.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordNormalizer {
    tz: TimezoneHandler,
}

impl RecordNormalizer {
    pub fn new(tz: TimezoneHandler) -> Self {
        Self { tz }
    }

    /// Normalize `raw` into an ordered batch.
    ///
    /// Undecodable bytes are replaced rather than rejected. Rows whose
    /// timestamp or value cannot be coerced are dropped and counted. Fails
    /// with [`CgmError::MalformedInput`] only when the payload is not
    /// delimited text at all: no header row, or a data row wider than the
    /// header.
    pub fn normalize(&self, raw: &[u8], bounds: TimeWindow) -> Result<NormalizedBatch> {
        let decoded = String::from_utf8_lossy(raw);
        let text: &str = decoded.as_ref();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CgmError::MalformedInput(format!("unreadable header row: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(CgmError::MalformedInput("no columns to parse".to_string()));
        }

        let mapping = resolve_columns(&headers);

        let mut batch = NormalizedBatch::default();
        let mut points: Vec<GlucosePoint> = Vec::new();

        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| CgmError::MalformedInput(e.to_string()))?;
            if record.len() > headers.len() {
                return Err(CgmError::MalformedInput(format!(
                    "row {} has {} fields, header has {}",
                    line + 2,
                    record.len(),
                    headers.len()
                )));
            }
            batch.rows_read += 1;

            match self.coerce_row(&record, &mapping) {
                Some(point) => points.push(point),
                None => batch.dropped_rows += 1,
            }
        }

        // Stable: equal timestamps keep upload order.
        points.sort_by_key(|p| p.timestamp);

        let before = points.len();
        points.retain(|p| bounds.contains(p.timestamp));
        batch.out_of_bounds = before - points.len();
        batch.records = points;

        debug!(
            rows = batch.rows_read,
            kept = batch.records.len(),
            dropped = batch.dropped_rows,
            out_of_bounds = batch.out_of_bounds,
            "normalized upload"
        );

        Ok(batch)
    }

    /// Parse an ingest bound string with the same rules as row timestamps.
    pub fn parse_bound(&self, raw: &str) -> Result<DateTime<Utc>> {
        self.tz
            .parse_timestamp(raw)
            .ok_or_else(|| CgmError::InvalidBound(raw.to_string()))
    }

    fn coerce_row(
        &self,
        record: &csv::StringRecord,
        mapping: &ColumnMapping,
    ) -> Option<GlucosePoint> {
        let timestamp = self.tz.parse_timestamp(record.get(mapping.timestamp?)?)?;
        let value = coerce_value(record.get(mapping.value?)?)?;
        Some(GlucosePoint { timestamp, value })
    }
}

/// Coerce a glucose cell; only finite, strictly positive numbers survive.
pub fn coerce_value(cell: &str) -> Option<f64> {
    let value: f64 = cell.trim().parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Normalize with UTC as the zone for naive timestamps.
pub fn normalize(
    raw: &[u8],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<NormalizedBatch> {
    RecordNormalizer::default().normalize(raw, TimeWindow::new(start, end))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
