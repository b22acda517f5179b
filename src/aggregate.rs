//! Sample aggregation: repeated raw samples into robust point estimates
//!
//! Repetitions of a benchmark case absorb system jitter; the aggregator
//! reduces each case+metric's samples to a median center and MAD spread.
//! Before the reduction it can screen out individual repetitions whose
//! modified z-score marks them as outliers (a page-cache miss, a scheduler
//! hiccup), so one wild repetition does not widen the spread for the
//! analyzer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{mad, median, modified_zscores};
use crate::record::{AggregatedResult, RawSample};

/// Raised when aggregation is attempted over an empty sample sequence
///
/// The orchestrator maps this to a per-case Inconclusive verdict rather than
/// aborting the run.
#[derive(Debug, Clone, Error)]
#[error("no samples to aggregate for case `{case_id}`")]
pub struct InsufficientDataError {
    pub case_id: String,
}

/// Configuration for sample reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Screen out repetitions whose modified z-score exceeds the threshold
    pub screen_outliers: bool,

    /// Modified z-score magnitude past which a repetition is discarded
    ///
    /// 1.4826 * 10: ten sigma-equivalents under the MAD consistency scale.
    pub outlier_threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            screen_outliers: true,
            outlier_threshold: 1.4826 * 10.0,
        }
    }
}

/// Reduces repeated raw samples into `AggregatedResult`s
#[derive(Debug, Clone, Default)]
pub struct SampleAggregator {
    config: AggregationConfig,
}

impl SampleAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Aggregate one case's samples, grouped per metric
    ///
    /// Returns one result per metric present in the samples, ordered by
    /// metric name. Deterministic: the same multiset of samples yields the
    /// same results regardless of input order. The result timestamp is the
    /// latest sample timestamp, so re-aggregation of stored samples is
    /// reproducible.
    pub fn aggregate_case(
        &self,
        case_id: &str,
        commit_ref: &str,
        samples: &[RawSample],
    ) -> Result<Vec<AggregatedResult>, InsufficientDataError> {
        if samples.is_empty() {
            return Err(InsufficientDataError {
                case_id: case_id.to_string(),
            });
        }

        let mut by_metric: BTreeMap<&str, Vec<&RawSample>> = BTreeMap::new();
        for sample in samples {
            by_metric.entry(&sample.metric).or_default().push(sample);
        }

        let mut results = Vec::with_capacity(by_metric.len());
        for (metric, group) in by_metric {
            let mut values: Vec<f32> = group.iter().map(|s| s.value as f32).collect();
            // Sorting first makes the outlier screen and the estimators see a
            // canonical ordering for any input permutation
            values.sort_by(f32::total_cmp);

            let retained = if self.config.screen_outliers && values.len() >= 3 {
                self.screen(case_id, metric, &values)
            } else {
                values
            };

            let (center, spread) = match (median(&retained), mad(&retained)) {
                (Ok(center), Ok(spread)) => (center, spread),
                (center, spread) => {
                    tracing::warn!(case_id, metric, ?center, ?spread, "metric reduction failed");
                    continue;
                }
            };

            let timestamp = group
                .iter()
                .map(|s| s.timestamp)
                .max()
                .unwrap_or_else(chrono::Utc::now);

            results.push(AggregatedResult {
                case_id: case_id.to_string(),
                metric: metric.to_string(),
                commit_ref: commit_ref.to_string(),
                timestamp,
                center: f64::from(center),
                spread: f64::from(spread),
                sample_count: retained.len(),
            });
        }

        if results.is_empty() {
            return Err(InsufficientDataError {
                case_id: case_id.to_string(),
            });
        }

        Ok(results)
    }

    /// Drop values whose modified z-score magnitude exceeds the threshold
    ///
    /// Never drops below two survivors; a sample set that disagrees with
    /// itself that badly is reduced as-is rather than judged from one point.
    fn screen(&self, case_id: &str, metric: &str, values: &[f32]) -> Vec<f32> {
        let scores = match modified_zscores(values) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!(case_id, metric, error = %e, "outlier screen failed");
                return values.to_vec();
            }
        };

        let threshold = self.config.outlier_threshold as f32;
        let retained: Vec<f32> = values
            .iter()
            .zip(&scores)
            .filter(|(_, score)| score.abs() <= threshold)
            .map(|(value, _)| *value)
            .collect();

        if retained.len() < 2 {
            return values.to_vec();
        }

        let dropped = values.len() - retained.len();
        if dropped > 0 {
            tracing::debug!(case_id, metric, dropped, "screened outlier repetitions");
        }
        retained
    }
}
