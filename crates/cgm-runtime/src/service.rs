//! Service facade invoked by the outer (CLI / HTTP) layer.
//!
//! [`GlucoseService`] owns an injected store handle and a normalizer, and
//! exposes the four effective operations: ingest, points, summary and
//! recommend. CPU-bound normalization runs on the blocking pool; every
//! operation can be bounded by an optional deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cgm_core::error::{CgmError, Result};
use cgm_core::models::{
    GlucoseRange, GlucoseRecord, InsightSummary, NormalizedBatch, PredictionMethod,
    RiskAssessment, TimeWindow,
};
use cgm_core::settings::{DEFAULT_LOOKBACK, DEFAULT_POINTS_LIMIT};
use cgm_data::aggregator::summarize;
use cgm_data::normalizer::RecordNormalizer;
use cgm_data::store::GlucoseStore;
use cgm_data::trend::predictor_for;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Minimum number of records fetched for a recommendation.
pub const RECOMMEND_MIN_FETCH: usize = 500;

/// Default upper bound on records aggregated by one summary request.
pub const SUMMARY_FETCH_LIMIT: usize = 1_000_000;

// ── Result types ──────────────────────────────────────────────────────────────

/// Outcome of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records appended to the store.
    pub inserted_count: usize,
    /// Data rows read from the upload.
    pub rows_read: usize,
    /// Rows dropped for an unparseable timestamp or value.
    pub dropped_rows: usize,
    /// Valid rows outside the requested bounds.
    pub out_of_bounds: usize,
}

/// A page of stored readings, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointsPage {
    pub points_count: usize,
    pub points: Vec<GlucoseRecord>,
}

// ── GlucoseService ────────────────────────────────────────────────────────────

pub struct GlucoseService<S: GlucoseStore> {
    store: Arc<S>,
    normalizer: RecordNormalizer,
    deadline: Option<Duration>,
    summary_limit: usize,
}

impl<S: GlucoseStore> Clone for GlucoseService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            normalizer: self.normalizer,
            deadline: self.deadline,
            summary_limit: self.summary_limit,
        }
    }
}

impl<S: GlucoseStore> GlucoseService<S> {
    pub fn new(store: Arc<S>, normalizer: RecordNormalizer) -> Self {
        Self {
            store,
            normalizer,
            deadline: None,
            summary_limit: SUMMARY_FETCH_LIMIT,
        }
    }

    /// Bound every operation by `deadline`; expiry yields [`CgmError::Timeout`].
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Cap on records a summary aggregates; zero is clamped to one.
    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Normalize an upload and append it for `user_id`.
    ///
    /// `start` / `end` are ISO-8601 strings; an unparseable bound fails with
    /// [`CgmError::InvalidBound`] before any parsing work starts.
    pub async fn ingest(
        &self,
        user_id: &str,
        payload: Vec<u8>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<IngestReport> {
        let bounds = TimeWindow::new(
            start.map(|s| self.normalizer.parse_bound(s)).transpose()?,
            end.map(|s| self.normalizer.parse_bound(s)).transpose()?,
        );

        self.bounded(async {
            let batch = self.normalize_off_thread(payload, bounds).await?;
            let expected = batch.records.len();
            let inserted = self.store.append(user_id, &batch.records).await?;
            if inserted != expected {
                return Err(CgmError::PartialWrite {
                    expected,
                    actual: inserted,
                });
            }

            info!(
                user_id,
                inserted,
                dropped = batch.dropped_rows,
                backend = self.store.backend_name(),
                "ingested upload"
            );
            Ok(IngestReport {
                inserted_count: inserted,
                rows_read: batch.rows_read,
                dropped_rows: batch.dropped_rows,
                out_of_bounds: batch.out_of_bounds,
            })
        })
        .await
    }

    /// Stored readings in `window`, oldest first, at most `limit`.
    pub async fn points(
        &self,
        user_id: &str,
        window: TimeWindow,
        limit: Option<usize>,
    ) -> Result<PointsPage> {
        let limit = limit.unwrap_or(DEFAULT_POINTS_LIMIT);
        self.bounded(async {
            let points = self.store.query(user_id, &window, limit).await?;
            Ok(PointsPage {
                points_count: points.len(),
                points,
            })
        })
        .await
    }

    /// Windowed statistics; `range` defaults to 70–180.
    ///
    /// At most `summary_limit` records (oldest first) are aggregated. A
    /// window holding more is summarized over that prefix and logged at
    /// warn level.
    pub async fn summary(
        &self,
        user_id: &str,
        window: TimeWindow,
        range: Option<GlucoseRange>,
    ) -> Result<InsightSummary> {
        let range = range.unwrap_or_default();
        // Re-validate: callers may build the struct directly.
        let range = GlucoseRange::new(range.lower, range.upper)?;

        self.bounded(async {
            let records = self
                .store
                .query(user_id, &window, self.summary_limit)
                .await?;
            if records.len() >= self.summary_limit {
                warn!(
                    user_id,
                    limit = self.summary_limit,
                    "summary hit the record cap; later readings were not aggregated"
                );
            }
            let summary = summarize(user_id, &records, window, range);
            debug!(user_id, total_points = summary.total_points, "computed summary");
            Ok(summary)
        })
        .await
    }

    /// Risk recommendation by method name (`"rule"` or `"ml"`).
    ///
    /// Fails with [`CgmError::UnknownMethod`] for other names and with
    /// [`CgmError::NoData`] when the user has no stored readings. History is
    /// fetched oldest-first with `limit = max(500, lookback * 10)`.
    pub async fn recommend(
        &self,
        user_id: &str,
        method: &str,
        lookback: Option<usize>,
    ) -> Result<RiskAssessment> {
        let method: PredictionMethod = method.parse()?;
        let lookback = lookback.unwrap_or(DEFAULT_LOOKBACK);
        if lookback == 0 {
            return Err(CgmError::InvalidLookback(lookback));
        }
        let limit = RECOMMEND_MIN_FETCH.max(lookback.saturating_mul(10));

        self.bounded(async {
            let records = self
                .store
                .query(user_id, &TimeWindow::unbounded(), limit)
                .await?;
            if records.is_empty() {
                return Err(CgmError::NoData(user_id.to_string()));
            }

            let predictor = predictor_for(method);
            let assessment = predictor.predict(&records, lookback);
            debug!(
                user_id,
                method = predictor.name(),
                records = records.len(),
                risk = %assessment.risk,
                "computed recommendation"
            );
            Ok(assessment)
        })
        .await
    }

    async fn normalize_off_thread(
        &self,
        payload: Vec<u8>,
        bounds: TimeWindow,
    ) -> Result<NormalizedBatch> {
        let normalizer = self.normalizer;
        tokio::task::spawn_blocking(move || normalizer.normalize(&payload, bounds))
            .await
            .map_err(|e| CgmError::Task(format!("normalizer join error: {e}")))?
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| CgmError::Timeout(limit))?,
            None => fut.await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
