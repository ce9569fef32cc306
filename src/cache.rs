//! File-backed cache for per-item enrichment results.
//!
//! One JSON record per (item, operation, date) key. Reads treat anything
//! unreadable as a miss; writes go through a temp file + rename and failures
//! are logged but never surfaced to the pipeline.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::hex_digest;

/// Cached operations. Rendered into the cache key, so renaming a variant
/// invalidates its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Classify,
    Score,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Classify => "classify",
            CacheOp::Score => "score",
        }
    }
}

pub struct NewsCache {
    dir: PathBuf,
}

impl NewsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let _ = fs::create_dir_all(&dir); // best-effort
        Self { dir }
    }

    /// Look up a cached result. Missing, unreadable and undeserializable
    /// records are all misses.
    pub fn get<T: DeserializeOwned>(
        &self,
        item_id: &str,
        op: CacheOp,
        date: NaiveDate,
    ) -> Option<T> {
        let path = self.entry_path(item_id, op, date);
        let buf = fs::read_to_string(path).ok()?;
        serde_json::from_str(&buf).ok()
    }

    /// Store a result. Never fails the caller; a write error is a warning.
    pub fn put<T: Serialize>(&self, item_id: &str, op: CacheOp, date: NaiveDate, value: &T) {
        let path = self.entry_path(item_id, op, date);
        if let Err(e) = write_atomic(&path, value) {
            tracing::warn!(error = ?e, path = %path.display(), "cache write failed");
        }
    }

    /// Delete records older than `days_to_keep` days (by mtime). Returns the
    /// number removed. Run once at pipeline start.
    pub fn clear_old_entries(&self, days_to_keep: u32) -> usize {
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(days_to_keep) * 86_400);
        let removed = self.sweep_before(cutoff);
        if removed > 0 {
            tracing::info!(removed, days_to_keep, "evicted stale cache entries");
        }
        removed
    }

    fn sweep_before(&self, cutoff: SystemTime) -> usize {
        let mut removed = 0usize;
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for e in entries.flatten() {
                let path = e.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }
                let is_stale = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if is_stale && fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }

    fn entry_path(&self, item_id: &str, op: CacheOp, date: NaiveDate) -> PathBuf {
        let seed = format!("{}:{}:{}", item_id, op.as_str(), date.format("%Y-%m-%d"));
        self.dir.join(format!("{}.json", hex_digest(&seed, 32)))
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}
