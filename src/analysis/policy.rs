// Configuration for baseline comparison and verdict classification
//
// Every threshold the analyzer applies lives here rather than at call sites;
// the defaults are a starting point, not extracted truths, and projects are
// expected to tune them through the TOML config.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Directionality of a metric: whether a larger value is better or worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    /// Latency-like metrics: smaller is better (the default)
    LowerIsBetter,
    /// Throughput-like metrics: larger is better
    HigherIsBetter,
}

/// Configuration for regression classification
///
/// Classification applies a double gate: the relative drift must exceed a
/// magnitude threshold AND the drift must be statistically significant
/// against the baseline spread. Either gate alone misfires - noisy
/// benchmarks drift a lot within normal variance, and stable benchmarks show
/// significant-but-negligible drifts.
///
/// # Example
/// ```
/// use benchwarden::analysis::AnalysisPolicy;
///
/// let policy = AnalysisPolicy::default();
/// assert_eq!(policy.min_baseline_size, 5);
/// assert_eq!(policy.regression_threshold_ratio, 0.05);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPolicy {
    /// Minimum number of historical records before a verdict is attempted
    ///
    /// Below this the verdict is Inconclusive with zero confidence: a cold
    /// start never blocks a merge.
    pub min_baseline_size: usize,

    /// How many historical records to fetch for the baseline window
    pub baseline_window: usize,

    /// Relative slowdown that counts as a regression (0.05 = 5% worse)
    pub regression_threshold_ratio: f64,

    /// Relative speedup that counts as an improvement (0.05 = 5% better)
    pub improvement_threshold_ratio: f64,

    /// Minimum z-score (drift over pooled baseline spread) for significance
    pub z_score_min: f64,

    /// Metric names where larger values are better (e.g., throughput);
    /// everything else is treated as lower-is-better
    pub higher_is_better: BTreeSet<String>,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            min_baseline_size: 5,
            baseline_window: 10,
            regression_threshold_ratio: 0.05,
            improvement_threshold_ratio: 0.05,
            z_score_min: 2.0,
            higher_is_better: BTreeSet::new(),
        }
    }
}

impl AnalysisPolicy {
    /// Create a strict policy (fewer false positives, more false negatives)
    pub fn strict() -> Self {
        Self {
            min_baseline_size: 10,
            baseline_window: 20,
            regression_threshold_ratio: 0.10,
            improvement_threshold_ratio: 0.10,
            z_score_min: 3.0,
            higher_is_better: BTreeSet::new(),
        }
    }

    /// Create a permissive policy (more false positives, fewer false negatives)
    pub fn permissive() -> Self {
        Self {
            min_baseline_size: 3,
            baseline_window: 5,
            regression_threshold_ratio: 0.02,
            improvement_threshold_ratio: 0.02,
            z_score_min: 1.5,
            higher_is_better: BTreeSet::new(),
        }
    }

    /// Directionality of a metric name under this policy
    pub fn direction_of(&self, metric: &str) -> MetricDirection {
        if self.higher_is_better.contains(metric) {
            MetricDirection::HigherIsBetter
        } else {
            MetricDirection::LowerIsBetter
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_baseline_size == 0 {
            return Err("min_baseline_size must be >= 1".to_string());
        }

        if self.baseline_window < self.min_baseline_size {
            return Err(format!(
                "baseline_window {} must be >= min_baseline_size {}",
                self.baseline_window, self.min_baseline_size
            ));
        }

        if self.regression_threshold_ratio <= 0.0 {
            return Err(format!(
                "regression_threshold_ratio must be positive, got {}",
                self.regression_threshold_ratio
            ));
        }

        if self.improvement_threshold_ratio <= 0.0 {
            return Err(format!(
                "improvement_threshold_ratio must be positive, got {}",
                self.improvement_threshold_ratio
            ));
        }

        if self.z_score_min <= 0.0 {
            return Err(format!(
                "z_score_min must be positive, got {}",
                self.z_score_min
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = AnalysisPolicy::default();
        assert_eq!(policy.min_baseline_size, 5);
        assert_eq!(policy.baseline_window, 10);
        assert_eq!(policy.regression_threshold_ratio, 0.05);
        assert_eq!(policy.improvement_threshold_ratio, 0.05);
        assert_eq!(policy.z_score_min, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_strict_policy() {
        let policy = AnalysisPolicy::strict();
        assert_eq!(policy.min_baseline_size, 10);
        assert_eq!(policy.z_score_min, 3.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_permissive_policy() {
        let policy = AnalysisPolicy::permissive();
        assert_eq!(policy.min_baseline_size, 3);
        assert_eq!(policy.z_score_min, 1.5);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_direction_defaults_to_lower_is_better() {
        let policy = AnalysisPolicy::default();
        assert_eq!(
            policy.direction_of("compile_time_ms"),
            MetricDirection::LowerIsBetter
        );
    }

    #[test]
    fn test_direction_override() {
        let mut policy = AnalysisPolicy::default();
        policy.higher_is_better.insert("throughput".to_string());
        assert_eq!(
            policy.direction_of("throughput"),
            MetricDirection::HigherIsBetter
        );
    }

    #[test]
    fn test_invalid_zero_baseline_size() {
        let policy = AnalysisPolicy {
            min_baseline_size: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_invalid_window_smaller_than_min() {
        let policy = AnalysisPolicy {
            min_baseline_size: 8,
            baseline_window: 5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_invalid_negative_threshold() {
        let policy = AnalysisPolicy {
            regression_threshold_ratio: -0.05,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml = r#"
            min_baseline_size = 7
            baseline_window = 12
            z_score_min = 2.5
            higher_is_better = ["throughput_ops"]
        "#;
        let policy: AnalysisPolicy = toml::from_str(toml).unwrap();
        assert_eq!(policy.min_baseline_size, 7);
        assert_eq!(policy.baseline_window, 12);
        assert_eq!(policy.z_score_min, 2.5);
        // Unspecified fields fall back to defaults
        assert_eq!(policy.regression_threshold_ratio, 0.05);
        assert_eq!(
            policy.direction_of("throughput_ops"),
            MetricDirection::HigherIsBetter
        );
    }
}
