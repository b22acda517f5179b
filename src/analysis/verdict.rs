// Verdict classification against a historical baseline window
//
// The classifier applies a double gate: relative drift past a magnitude
// threshold AND drift past a significance threshold measured in pooled
// baseline spreads. A perfectly stable baseline (zero pooled spread) is the
// exception: any drift from it is classified by sign alone, since the
// epsilon-floored z-score is unbounded there.

use serde::{Deserialize, Serialize};

use crate::analysis::policy::{AnalysisPolicy, MetricDirection};
use crate::analysis::statistics::median;
use crate::record::{AggregatedResult, HistoricalRecord};

/// Outcome of comparing one case+metric against its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Pass,
    Regression,
    Improvement,
    Inconclusive,
}

/// The per-case, per-metric result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub case_id: String,
    pub metric: String,
    pub classification: Classification,
    /// Relative drift, normalized so positive always means "worse"
    pub delta_ratio: f64,
    /// Confidence in [0, 1]; zero for Inconclusive verdicts
    pub confidence: f64,
}

impl Verdict {
    /// An Inconclusive verdict for a case+metric that produced no usable
    /// measurement or baseline
    pub fn inconclusive(case_id: &str, metric: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            metric: metric.to_string(),
            classification: Classification::Inconclusive,
            delta_ratio: 0.0,
            confidence: 0.0,
        }
    }
}

/// Classify a new aggregated result against its baseline window
///
/// The window holds the most recent historical records for the same
/// case+metric, excluding the result under test. Fewer than
/// `min_baseline_size` records is a cold start: the verdict is Inconclusive
/// with zero confidence and never blocks.
pub fn classify(
    current: &AggregatedResult,
    baseline: &[HistoricalRecord],
    policy: &AnalysisPolicy,
) -> Verdict {
    if baseline.len() < policy.min_baseline_size {
        tracing::debug!(
            case_id = %current.case_id,
            metric = %current.metric,
            baseline_len = baseline.len(),
            "cold start: baseline below minimum size"
        );
        return Verdict::inconclusive(&current.case_id, &current.metric);
    }

    let centers: Vec<f32> = baseline.iter().map(|r| r.center as f32).collect();
    let spreads: Vec<f32> = baseline.iter().map(|r| r.spread as f32).collect();

    let (baseline_center, baseline_spread) = match (median(&centers), median(&spreads)) {
        (Ok(center), Ok(spread)) => (f64::from(center), f64::from(spread)),
        (center, spread) => {
            tracing::warn!(
                case_id = %current.case_id,
                metric = %current.metric,
                ?center,
                ?spread,
                "failed to pool baseline window"
            );
            return Verdict::inconclusive(&current.case_id, &current.metric);
        }
    };

    let drift = current.center - baseline_center;
    let raw_ratio = drift / baseline_center.abs().max(f64::EPSILON);

    // Normalize so positive always means "worse" for this metric
    let delta_ratio = match policy.direction_of(&current.metric) {
        MetricDirection::LowerIsBetter => raw_ratio,
        MetricDirection::HigherIsBetter => -raw_ratio,
    };

    let z = drift.abs() / baseline_spread.max(f64::EPSILON);

    let classification = if baseline_spread == 0.0 && drift != 0.0 {
        // Stability implies sensitivity: any drift from a perfectly stable
        // history is real, whatever its magnitude
        if delta_ratio > 0.0 {
            Classification::Regression
        } else {
            Classification::Improvement
        }
    } else if delta_ratio >= policy.regression_threshold_ratio && z >= policy.z_score_min {
        Classification::Regression
    } else if delta_ratio <= -policy.improvement_threshold_ratio && z >= policy.z_score_min {
        Classification::Improvement
    } else {
        Classification::Pass
    };

    let confidence = (z / (2.0 * policy.z_score_min)).clamp(0.0, 1.0);

    tracing::debug!(
        case_id = %current.case_id,
        metric = %current.metric,
        ?classification,
        delta_ratio,
        z,
        confidence,
        "classified against baseline"
    );

    Verdict {
        case_id: current.case_id.clone(),
        metric: current.metric.clone(),
        classification,
        delta_ratio,
        confidence,
    }
}
