//! Measurement records flowing through the pipeline
//!
//! Three shapes, in order of refinement: `RawSample` (one measured value from
//! one benchmark invocation), `AggregatedResult` (robust point estimate over
//! repeated samples), and `HistoricalRecord` (the persisted form, append-only
//! per `(case_id, metric, commit_ref)`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single raw measurement emitted by one benchmark invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Benchmark case that produced the sample
    pub case_id: String,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Metric name (e.g., "compile_time_ms", "peak_rss_kb")
    pub metric: String,
    /// Measured value
    pub value: f64,
    /// Unit of the value (e.g., "ms", "bytes")
    pub unit: String,
}

/// Robust reduction of repeated samples for one case+metric
///
/// Center is the median, spread the median absolute deviation. Immutable once
/// produced; `sample_count` records how many samples survived outlier
/// screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub case_id: String,
    pub metric: String,
    pub commit_ref: String,
    pub timestamp: DateTime<Utc>,
    pub center: f64,
    pub spread: f64,
    pub sample_count: usize,
}

impl AggregatedResult {
    /// Persisted form of this result
    pub fn to_record(&self) -> HistoricalRecord {
        HistoricalRecord {
            case_id: self.case_id.clone(),
            metric: self.metric.clone(),
            commit_ref: self.commit_ref.clone(),
            timestamp: self.timestamp,
            center: self.center,
            spread: self.spread,
            sample_count: self.sample_count,
        }
    }
}

/// The persisted form of an `AggregatedResult`
///
/// At most one logical record exists per `(case_id, metric, commit_ref)`;
/// appending the same key again overwrites (idempotent retry). Records are
/// never mutated or deleted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub case_id: String,
    pub metric: String,
    pub commit_ref: String,
    pub timestamp: DateTime<Utc>,
    pub center: f64,
    pub spread: f64,
    pub sample_count: usize,
}

impl HistoricalRecord {
    /// Logical identity used for idempotent appends
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.case_id, &self.metric, &self.commit_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> HistoricalRecord {
        HistoricalRecord {
            case_id: "parser_large".to_string(),
            metric: "compile_time_ms".to_string(),
            commit_ref: "abc123".to_string(),
            timestamp: Utc::now(),
            center: 100.0,
            spread: 2.0,
            sample_count: 5,
        }
    }

    #[test]
    fn test_record_key_identity() {
        let record = sample_record();
        assert_eq!(record.key(), ("parser_large", "compile_time_ms", "abc123"));
    }

    #[test]
    fn test_aggregated_to_record_preserves_fields() {
        let aggregated = AggregatedResult {
            case_id: "parser_large".to_string(),
            metric: "compile_time_ms".to_string(),
            commit_ref: "abc123".to_string(),
            timestamp: Utc::now(),
            center: 101.5,
            spread: 1.25,
            sample_count: 7,
        };

        let record = aggregated.to_record();
        assert_eq!(record.case_id, aggregated.case_id);
        assert_eq!(record.metric, aggregated.metric);
        assert_eq!(record.commit_ref, aggregated.commit_ref);
        assert_eq!(record.center, 101.5);
        assert_eq!(record.spread, 1.25);
        assert_eq!(record.sample_count, 7);
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: HistoricalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
