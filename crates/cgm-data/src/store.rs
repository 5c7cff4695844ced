//! Append-only, per-user time-series storage.
//!
//! [`GlucoseStore`] is the seam between the analysis code and whatever
//! persistence engine backs it. Handles are passed explicitly; there is no
//! global client.

use std::collections::HashMap;

use async_trait::async_trait;
use cgm_core::error::{CgmError, Result};
use cgm_core::models::{GlucosePoint, GlucoseRecord, TimeWindow};
use tokio::sync::RwLock;
use tracing::debug;

/// Ordered-record store queried by user id and time range.
#[async_trait]
pub trait GlucoseStore: Send + Sync {
    /// Append `points` for `user_id` and return how many were stored.
    ///
    /// Implementations must not drop records silently: either every point
    /// is stored or the call fails.
    async fn append(&self, user_id: &str, points: &[GlucosePoint]) -> Result<usize>;

    /// Records for `user_id` inside `window`, ascending by timestamp.
    ///
    /// When more than `limit` records qualify, the **oldest** `limit` are
    /// returned.
    async fn query(
        &self,
        user_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<GlucoseRecord>>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Filter, stable-sort ascending and truncate earliest-first.
///
/// Shared by every backend so truncation semantics cannot drift.
pub fn select_window<I>(records: I, window: &TimeWindow, limit: usize) -> Vec<GlucoseRecord>
where
    I: IntoIterator<Item = GlucoseRecord>,
{
    let mut selected: Vec<GlucoseRecord> = records
        .into_iter()
        .filter(|r| window.contains(r.timestamp))
        .collect();
    selected.sort_by_key(|r| r.timestamp);
    selected.truncate(limit);
    selected
}

pub(crate) fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(CgmError::InvalidLimit(limit));
    }
    Ok(())
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// In-process store keyed by user id. Used by tests and short-lived runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<GlucoseRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held for `user_id`.
    pub async fn count(&self, user_id: &str) -> usize {
        self.records
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl GlucoseStore for MemoryStore {
    async fn append(&self, user_id: &str, points: &[GlucosePoint]) -> Result<usize> {
        if user_id.is_empty() {
            return Err(CgmError::InvalidUserId(user_id.to_string()));
        }
        if points.is_empty() {
            return Ok(0);
        }
        let mut guard = self.records.write().await;
        let entry = guard.entry(user_id.to_string()).or_default();
        entry.extend(points.iter().map(|p| GlucoseRecord::from_point(user_id, p)));
        debug!(user_id, appended = points.len(), total = entry.len(), "memory store append");
        Ok(points.len())
    }

    async fn query(
        &self,
        user_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<GlucoseRecord>> {
        check_limit(limit)?;
        let guard = self.records.read().await;
        let Some(records) = guard.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(select_window(records.iter().cloned(), window, limit))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn point(h: u32, m: u32, value: f64) -> GlucosePoint {
        GlucosePoint {
            timestamp: ts(h, m),
            value,
        }
    }

    #[tokio::test]
    async fn test_append_returns_count() {
        let store = MemoryStore::new();
        let n = store
            .append("u1", &[point(9, 0, 95.0), point(9, 5, 98.0)])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.count("u1").await, 2);
    }

    #[tokio::test]
    async fn test_append_empty_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.append("u1", &[]).await.unwrap(), 0);
        assert_eq!(store.count("u1").await, 0);
    }

    #[tokio::test]
    async fn test_append_rejects_empty_user() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.append("", &[point(9, 0, 95.0)]).await,
            Err(CgmError::InvalidUserId(_))
        ));
    }

    #[tokio::test]
    async fn test_query_orders_by_timestamp_across_uploads() {
        let store = MemoryStore::new();
        store.append("u1", &[point(9, 10, 3.0)]).await.unwrap();
        store
            .append("u1", &[point(9, 0, 1.0), point(9, 5, 2.0)])
            .await
            .unwrap();

        let out = store
            .query("u1", &TimeWindow::unbounded(), 100)
            .await
            .unwrap();
        let values: Vec<f64> = out.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(out.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_query_truncates_oldest_first() {
        let store = MemoryStore::new();
        let points: Vec<GlucosePoint> = (0..10).map(|i| point(9, i, 100.0 + i as f64)).collect();
        store.append("u1", &points).await.unwrap();

        let out = store.query("u1", &TimeWindow::unbounded(), 3).await.unwrap();
        let values: Vec<f64> = out.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![100.0, 101.0, 102.0]);
    }

    #[tokio::test]
    async fn test_query_applies_window_inclusively() {
        let store = MemoryStore::new();
        store
            .append(
                "u1",
                &[point(8, 0, 1.0), point(9, 0, 2.0), point(10, 0, 3.0), point(11, 0, 4.0)],
            )
            .await
            .unwrap();

        let window = TimeWindow::new(Some(ts(9, 0)), Some(ts(10, 0)));
        let out = store.query("u1", &window, 100).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value, 2.0);
        assert_eq!(out[1].value, 3.0);
    }

    #[tokio::test]
    async fn test_query_isolates_users() {
        let store = MemoryStore::new();
        store.append("u1", &[point(9, 0, 1.0)]).await.unwrap();
        store.append("u2", &[point(9, 0, 2.0)]).await.unwrap();

        let out = store.query("u2", &TimeWindow::unbounded(), 10).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 2.0);
        assert!(store
            .query("nobody", &TimeWindow::unbounded(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_zero_limit() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.query("u1", &TimeWindow::unbounded(), 0).await,
            Err(CgmError::InvalidLimit(0))
        ));
    }

    #[test]
    fn test_select_window_keeps_duplicate_timestamps_in_order() {
        let records = vec![
            GlucoseRecord::from_point("u1", &point(9, 5, 1.0)),
            GlucoseRecord::from_point("u1", &point(9, 0, 2.0)),
            GlucoseRecord::from_point("u1", &point(9, 5, 3.0)),
        ];
        let out = select_window(records, &TimeWindow::unbounded(), 10);
        let values: Vec<f64> = out.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 1.0, 3.0]);
    }
}
