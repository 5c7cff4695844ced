//! File-backed [`GlucoseStore`]: one JSON-lines file per user.
//!
//! Layout: `<root>/<user_id>.jsonl`, one [`GlucoseRecord`] object per line,
//! in append order. Reads reconstruct time order, so concurrent appends for
//! the same user need no coordination beyond the OS append guarantee.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cgm_core::error::{CgmError, Result};
use cgm_core::models::{GlucosePoint, GlucoseRecord, TimeWindow};
use tracing::{debug, warn};

use crate::store::{check_limit, select_window, GlucoseStore};

pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `user_id`'s records.
    pub fn user_path(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.root.join(format!("{user_id}.jsonl")))
    }
}

/// User ids become file names: ASCII alphanumerics, `-`, `_` and `.`,
/// non-empty, not starting with a dot.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    let valid = !user_id.is_empty()
        && !user_id.starts_with('.')
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CgmError::InvalidUserId(user_id.to_string()))
    }
}

fn write_records(path: &Path, user_id: &str, points: &[GlucosePoint]) -> Result<usize> {
    let mut buf = Vec::with_capacity(points.len() * 80);
    for p in points {
        serde_json::to_writer(&mut buf, &GlucoseRecord::from_point(user_id, p))?;
        buf.push(b'\n');
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CgmError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(points.len())
}

/// Read every parseable record from `path`; a missing file is empty.
fn read_records(path: &Path) -> Result<Vec<GlucoseRecord>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CgmError::FileRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0u64;

    for line_result in reader.lines() {
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to read line in {}: {}", path.display(), e);
                skipped += 1;
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<GlucoseRecord>(trimmed) {
            Ok(r) => records.push(r),
            Err(e) => {
                debug!("Failed to parse JSON line in {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }

    debug!(
        "File {}: {} records, {} skipped",
        path.display(),
        records.len(),
        skipped
    );
    Ok(records)
}

fn join_error(e: tokio::task::JoinError) -> CgmError {
    CgmError::Task(e.to_string())
}

#[async_trait]
impl GlucoseStore for JsonlStore {
    async fn append(&self, user_id: &str, points: &[GlucosePoint]) -> Result<usize> {
        let path = self.user_path(user_id)?;
        if points.is_empty() {
            return Ok(0);
        }
        let user = user_id.to_string();
        let owned = points.to_vec();
        tokio::task::spawn_blocking(move || write_records(&path, &user, &owned))
            .await
            .map_err(join_error)?
    }

    async fn query(
        &self,
        user_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<GlucoseRecord>> {
        check_limit(limit)?;
        let path = self.user_path(user_id)?;
        let records = tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .map_err(join_error)??;
        // Lines written under a different owner never leak into the result.
        let owned = records.into_iter().filter(|r| r.user_id == user_id);
        Ok(select_window(owned, window, limit))
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn point(h: u32, m: u32, value: f64) -> GlucosePoint {
        GlucosePoint {
            timestamp: ts(h, m),
            value,
        }
    }

    // ── validate_user_id ──────────────────────────────────────────────────────

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("patient-42").is_ok());
        assert!(validate_user_id("a.b_c").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("../etc/passwd").is_err());
        assert!(validate_user_id(".hidden").is_err());
        assert!(validate_user_id("a/b").is_err());
        assert!(validate_user_id("naïve").is_err());
    }

    // ── append / query ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_open_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("store");
        let store = JsonlStore::open(&root).unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_append_then_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();

        let n = store
            .append("u1", &[point(9, 5, 98.0), point(9, 0, 95.0)])
            .await
            .unwrap();
        assert_eq!(n, 2);

        let out = store
            .query("u1", &TimeWindow::unbounded(), 100)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, ts(9, 0));
        assert_eq!(out[0].value, 95.0);
        assert_eq!(out[1].value, 98.0);
    }

    #[tokio::test]
    async fn test_append_is_additive() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.append("u1", &[point(9, 0, 1.0)]).await.unwrap();
        store.append("u1", &[point(9, 0, 1.0)]).await.unwrap();

        let out = store.query("u1", &TimeWindow::unbounded(), 10).await.unwrap();
        // Duplicates are legal and preserved.
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_query_missing_user_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let out = store
            .query("ghost", &TimeWindow::unbounded(), 10)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_query_window_and_limit() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let points: Vec<GlucosePoint> = (0..6).map(|i| point(10, i * 5, 100.0 + i as f64)).collect();
        store.append("u1", &points).await.unwrap();

        let window = TimeWindow::new(Some(ts(10, 5)), None);
        let out = store.query("u1", &window, 2).await.unwrap();
        let values: Vec<f64> = out.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![101.0, 102.0]);
    }

    #[tokio::test]
    async fn test_query_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.append("u1", &[point(9, 0, 95.0)]).await.unwrap();

        let path = store.user_path("u1").unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not valid json").unwrap();
        writeln!(file).unwrap();

        store.append("u1", &[point(9, 5, 98.0)]).await.unwrap();

        let out = store.query("u1", &TimeWindow::unbounded(), 10).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_append_open_failure_is_write_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        // A directory squatting on the user's file name cannot be appended to.
        std::fs::create_dir(store.user_path("u1").unwrap()).unwrap();

        let err = store.append("u1", &[point(9, 0, 95.0)]).await.unwrap_err();
        assert!(matches!(err, CgmError::FileWrite { .. }));
        assert!(err.to_string().starts_with("Failed to write file"));
    }

    #[tokio::test]
    async fn test_invalid_user_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.append("../x", &[point(9, 0, 1.0)]).await,
            Err(CgmError::InvalidUserId(_))
        ));
        assert!(matches!(
            store.query("", &TimeWindow::unbounded(), 1).await,
            Err(CgmError::InvalidUserId(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.query("u1", &TimeWindow::unbounded(), 0).await,
            Err(CgmError::InvalidLimit(0))
        ));
    }
}
