//! Historical record storage
//!
//! The pipeline treats persistence as an abstract append-only time series:
//! `append` upserts by `(case_id, metric, commit_ref)` so retries are
//! idempotent, and `window` returns the most recent records for a
//! case+metric. Two reference implementations ship here: an in-memory store
//! for tests and embedding, and a JSON-file store for single-host use. A
//! production wide-column backing implements the same trait externally.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::HistoricalRecord;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failure at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract append-only time-series store for benchmark history
///
/// Implementations must make `append` idempotent: appending a record whose
/// `(case_id, metric, commit_ref)` key already exists overwrites the stored
/// record instead of duplicating it. No deletion or compaction is required;
/// retention is an external concern.
pub trait HistoryStore: Send + Sync {
    /// Insert or overwrite the record for its logical key
    fn append(&self, record: HistoricalRecord) -> Result<(), StoreError>;

    /// The most recent records for a case+metric strictly before `before`,
    /// newest first; may return fewer than `limit` (cold start) or none
    fn window(
        &self,
        case_id: &str,
        metric: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError>;
}

fn upsert(records: &mut Vec<HistoricalRecord>, record: HistoricalRecord) {
    records.retain(|existing| existing.key() != record.key());
    records.push(record);
}

fn query_window(
    records: &[HistoricalRecord],
    case_id: &str,
    metric: &str,
    before: DateTime<Utc>,
    limit: usize,
) -> Vec<HistoricalRecord> {
    let mut matching: Vec<HistoricalRecord> = records
        .iter()
        .filter(|r| r.case_id == case_id && r.metric == metric && r.timestamp < before)
        .cloned()
        .collect();
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matching.truncate(limit);
    matching
}

/// In-memory reference implementation
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoricalRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored logical records
    pub fn len(&self) -> usize {
        self.records.lock().expect("history lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, record: HistoricalRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("history lock");
        upsert(&mut records, record);
        Ok(())
    }

    fn window(
        &self,
        case_id: &str,
        metric: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        let records = self.records.lock().expect("history lock");
        Ok(query_window(&records, case_id, metric, before, limit))
    }
}

/// JSON-file-backed store for single-host history
///
/// The whole history is rewritten on each append; adequate for the record
/// volumes a per-project benchmark history accumulates.
#[derive(Debug)]
pub struct JsonHistory {
    path: PathBuf,
    records: Mutex<Vec<HistoricalRecord>>,
}

impl JsonHistory {
    /// Open a history file, creating an empty store if the file is absent
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let records = if path.exists() {
            let data = fs::read(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if data.is_empty() {
                Vec::new()
            } else {
                serde_json::from_slice(&data)?
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &[HistoricalRecord]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        fs::write(&self.path, data).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl HistoryStore for JsonHistory {
    fn append(&self, record: HistoricalRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("history lock");
        upsert(&mut records, record);
        records.sort_by(|a, b| {
            (&a.case_id, &a.metric, a.timestamp).cmp(&(&b.case_id, &b.metric, b.timestamp))
        });
        self.persist(&records)
    }

    fn window(
        &self,
        case_id: &str,
        metric: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        let records = self.records.lock().expect("history lock");
        Ok(query_window(&records, case_id, metric, before, limit))
    }
}

/// Bounded-retry schedule for store operations, expressed as data
///
/// The schedule is exponential with jitter: attempt n sleeps
/// `base_delay_ms * multiplier^(n-1) + U(0, jitter_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2.0,
            jitter_ms: 25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            multiplier: 1.0,
            jitter_ms: 0,
        }
    }

    /// Backoff before retry `attempt` (1-based; attempt 1 is the first retry)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff =
            self.base_delay_ms as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(backoff as u64 + jitter)
    }
}

/// Run a store operation under the retry policy
///
/// Retries on any `StoreError` up to `max_attempts` total attempts; the last
/// error is returned on exhaustion.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(what, attempt, error = %e, ?delay, "store operation failed, retrying");
                std::thread::sleep(delay);
            }
            Err(e) => {
                tracing::error!(what, attempt, error = %e, "store operation exhausted retries");
                return Err(e);
            }
        }
    }
}
