//! Verification results and the final deviation report.
//!
//! The report is the product of a run: one [`VerificationResult`] per
//! planned step plus aggregate counts and an overall status. Reports carry
//! no wall-clock data, so verifying the same inputs twice produces the same
//! bytes.

use crate::evidence::StepEvidence;
use crate::plan::TestStep;
use crate::triage::VerifyRoute;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step demonstrably happened as planned.
    Observed,
    /// The evidence contradicts the planned outcome.
    Deviation,
    /// The evidence does not support a confident verdict either way.
    Uncertain,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Observed => "observed",
            StepStatus::Deviation => "deviation",
            StepStatus::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of verifying one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub step: TestStep,
    pub status: StepStatus,
    pub confidence: f64,
    /// Where in the recording the verdict is anchored, when evidence exists.
    pub video_timestamp: Option<f64>,
    /// Narrative support for the verdict.
    pub evidence: String,
    /// Which path produced the verdict.
    pub route: VerifyRoute,
}

/// Full report for one verified test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationReport {
    pub test_name: String,
    pub total_steps: u32,
    pub observed_steps: u32,
    pub deviated_steps: u32,
    pub uncertain_steps: u32,
    /// Fraction of steps observed, in `[0, 1]`. 0.0 when there are no steps.
    pub pass_rate: f64,
    /// "PASSED", "FAILED" or "UNCERTAIN".
    pub overall_status: String,
    pub summary: String,
    /// Per-step results, ordered by step number.
    pub results: Vec<VerificationResult>,
}

impl DeviationReport {
    /// Assembles the report from per-step results. Results are re-ordered by
    /// step number; any deviation fails the run, any unresolved uncertainty
    /// without a deviation leaves it uncertain.
    pub fn from_results(test_name: &str, mut results: Vec<VerificationResult>) -> Self {
        results.sort_by_key(|r| r.step.step_number);

        let total_steps = results.len() as u32;
        let observed_steps = count(&results, StepStatus::Observed);
        let deviated_steps = count(&results, StepStatus::Deviation);
        let uncertain_steps = count(&results, StepStatus::Uncertain);
        let pass_rate = if total_steps == 0 {
            0.0
        } else {
            observed_steps as f64 / total_steps as f64
        };

        let (overall_status, summary) = if deviated_steps > 0 {
            (
                "FAILED".to_string(),
                format!(
                    "{} step(s) showed deviations from planned execution.",
                    deviated_steps
                ),
            )
        } else if uncertain_steps > 0 {
            (
                "UNCERTAIN".to_string(),
                format!(
                    "{} step(s) could not be verified with high confidence.",
                    uncertain_steps
                ),
            )
        } else {
            (
                "PASSED".to_string(),
                "All test steps were successfully verified with high confidence.".to_string(),
            )
        };

        DeviationReport {
            test_name: test_name.to_string(),
            total_steps,
            observed_steps,
            deviated_steps,
            uncertain_steps,
            pass_rate,
            overall_status,
            summary,
            results,
        }
    }
}

fn count(results: &[VerificationResult], status: StepStatus) -> u32 {
    results.iter().filter(|r| r.status == status).count() as u32
}

/// Convenience for building a result straight from gathered evidence, used
/// by the code-based path and by fallbacks.
pub fn result_from_evidence(
    step: &TestStep,
    evidence: &StepEvidence,
    status: StepStatus,
    confidence: f64,
    narrative: String,
    route: VerifyRoute,
) -> VerificationResult {
    VerificationResult {
        step: step.clone(),
        status,
        confidence,
        video_timestamp: evidence.timestamp,
        evidence: narrative,
        route,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(step_number: u32, status: StepStatus) -> VerificationResult {
        VerificationResult {
            step: TestStep {
                step_number,
                description: format!("step {}", step_number),
                action: format!("do {}", step_number),
                expected_outcome: None,
            },
            status,
            confidence: 0.8,
            video_timestamp: Some(step_number as f64),
            evidence: "evidence".to_string(),
            route: VerifyRoute::CodeBased,
        }
    }

    #[test]
    fn test_report_counts_and_pass_rate() {
        let report = DeviationReport::from_results(
            "checkout",
            vec![
                result(1, StepStatus::Observed),
                result(2, StepStatus::Uncertain),
                result(3, StepStatus::Observed),
            ],
        );
        assert_eq!(report.total_steps, 3);
        assert_eq!(report.observed_steps, 2);
        assert_eq!(report.uncertain_steps, 1);
        assert_eq!(report.deviated_steps, 0);
        assert!((report.pass_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_any_deviation_fails_the_run() {
        let report = DeviationReport::from_results(
            "login",
            vec![
                result(1, StepStatus::Observed),
                result(2, StepStatus::Deviation),
                result(3, StepStatus::Uncertain),
            ],
        );
        assert_eq!(report.overall_status, "FAILED");
        assert!(report.summary.contains("1 step(s) showed deviations"));
    }

    #[test]
    fn test_uncertainty_without_deviation_is_uncertain() {
        let report = DeviationReport::from_results(
            "login",
            vec![result(1, StepStatus::Observed), result(2, StepStatus::Uncertain)],
        );
        assert_eq!(report.overall_status, "UNCERTAIN");
        assert!(report.summary.contains("could not be verified"));
    }

    #[test]
    fn test_all_observed_passes() {
        let report =
            DeviationReport::from_results("login", vec![result(1, StepStatus::Observed)]);
        assert_eq!(report.overall_status, "PASSED");
        assert_eq!(report.pass_rate, 1.0);
    }

    #[test]
    fn test_results_reordered_by_step_number() {
        let report = DeviationReport::from_results(
            "login",
            vec![
                result(3, StepStatus::Observed),
                result(1, StepStatus::Observed),
                result(2, StepStatus::Observed),
            ],
        );
        let order: Vec<u32> = report.results.iter().map(|r| r.step.step_number).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_results_produce_zero_pass_rate() {
        let report = DeviationReport::from_results("empty", Vec::new());
        assert_eq!(report.total_steps, 0);
        assert_eq!(report.pass_rate, 0.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StepStatus::Deviation).unwrap();
        assert_eq!(json, "\"deviation\"");
        let back: StepStatus = serde_json::from_str("\"observed\"").unwrap();
        assert_eq!(back, StepStatus::Observed);
    }

    #[test]
    fn test_route_serializes_compactly() {
        assert_eq!(
            serde_json::to_string(&VerifyRoute::CodeBased).unwrap(),
            "\"code\""
        );
        assert_eq!(
            serde_json::to_string(&VerifyRoute::LlmSemantic).unwrap(),
            "\"semantic\""
        );
    }
}
