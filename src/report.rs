//! Run reports for verdict consumers
//!
//! The report is the structured payload a status-check poster or bot
//! consumes; this crate does not format human-facing output beyond a thin
//! text table for the CLI. Verdicts are ordered by case id then metric so
//! reports are deterministic regardless of worker completion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Classification, Verdict};

/// Aggregate outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    Regression,
}

/// The full result of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub commit_ref: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verdicts: Vec<Verdict>,
    pub overall_status: OverallStatus,
}

impl RunReport {
    /// Assemble a report, ordering verdicts and deriving the overall status
    pub fn new(
        commit_ref: &str,
        started_at: DateTime<Utc>,
        mut verdicts: Vec<Verdict>,
    ) -> Self {
        verdicts.sort_by(|a, b| (&a.case_id, &a.metric).cmp(&(&b.case_id, &b.metric)));
        let overall_status = if verdicts
            .iter()
            .any(|v| v.classification == Classification::Regression)
        {
            OverallStatus::Regression
        } else {
            OverallStatus::Pass
        };

        Self {
            commit_ref: commit_ref.to_string(),
            started_at,
            finished_at: Utc::now(),
            verdicts,
            overall_status,
        }
    }

    /// Structured payload for external consumers
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Thin text table for terminal use
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "run {} -> {:?}\n",
            self.commit_ref, self.overall_status
        ));
        out.push_str(&format!(
            "{:<24} {:<18} {:<14} {:>9} {:>11}\n",
            "case", "metric", "verdict", "delta", "confidence"
        ));
        for v in &self.verdicts {
            out.push_str(&format!(
                "{:<24} {:<18} {:<14} {:>8.2}% {:>11.2}\n",
                v.case_id,
                v.metric,
                format!("{:?}", v.classification),
                v.delta_ratio * 100.0,
                v.confidence
            ));
        }
        out
    }
}

/// Minimal status emitted instead of a report for FAILED or cancelled runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub commit_ref: String,
    pub reason: String,
}

impl RunFailure {
    pub fn new(commit_ref: &str, reason: impl Into<String>) -> Self {
        Self {
            commit_ref: commit_ref.to_string(),
            reason: reason.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(case_id: &str, metric: &str, classification: Classification) -> Verdict {
        Verdict {
            case_id: case_id.to_string(),
            metric: metric.to_string(),
            classification,
            delta_ratio: 0.01,
            confidence: 0.5,
        }
    }

    #[test]
    fn test_verdicts_sorted_by_case_then_metric() {
        let report = RunReport::new(
            "abc",
            Utc::now(),
            vec![
                verdict("zeta", "compile_time_ms", Classification::Pass),
                verdict("alpha", "peak_rss_kb", Classification::Pass),
                verdict("alpha", "compile_time_ms", Classification::Pass),
            ],
        );

        let order: Vec<(&str, &str)> = report
            .verdicts
            .iter()
            .map(|v| (v.case_id.as_str(), v.metric.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alpha", "compile_time_ms"),
                ("alpha", "peak_rss_kb"),
                ("zeta", "compile_time_ms"),
            ]
        );
    }

    #[test]
    fn test_overall_regression_if_any_verdict_regressed() {
        let report = RunReport::new(
            "abc",
            Utc::now(),
            vec![
                verdict("a", "m", Classification::Pass),
                verdict("b", "m", Classification::Regression),
                verdict("c", "m", Classification::Improvement),
            ],
        );
        assert_eq!(report.overall_status, OverallStatus::Regression);
    }

    #[test]
    fn test_overall_pass_with_inconclusive_and_improvement() {
        let report = RunReport::new(
            "abc",
            Utc::now(),
            vec![
                verdict("a", "m", Classification::Inconclusive),
                verdict("b", "m", Classification::Improvement),
                verdict("c", "m", Classification::Pass),
            ],
        );
        assert_eq!(report.overall_status, OverallStatus::Pass);
    }

    #[test]
    fn test_json_payload_shape() {
        let report = RunReport::new(
            "abc",
            Utc::now(),
            vec![verdict("a", "compile_time_ms", Classification::Regression)],
        );
        let json = report.to_json().unwrap();
        assert!(json.contains("\"overall_status\": \"REGRESSION\""));
        assert!(json.contains("\"commit_ref\": \"abc\""));
        assert!(json.contains("\"classification\": \"REGRESSION\""));
    }

    #[test]
    fn test_text_rendering_lists_every_verdict() {
        let report = RunReport::new(
            "abc",
            Utc::now(),
            vec![
                verdict("a", "m", Classification::Pass),
                verdict("b", "m", Classification::Regression),
            ],
        );
        let text = report.render_text();
        assert!(text.contains("Regression"));
        assert!(text.lines().count() >= 4);
    }
}
