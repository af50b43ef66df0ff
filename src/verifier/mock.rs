//! Scriptable in-process verifier.
//!
//! Serves two roles: the test double for everything above the verifier
//! seam, and the real verifier for offline runs, where every semantic step
//! stays uncertain and the report flags it for human review.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::report::StepStatus;

use super::types::{SemanticVerifier, StepAssessment, VerifierError, VerifierResult, VerifyRequest};

#[derive(Debug, Default, Clone, Copy)]
struct CallCounts {
    single: usize,
    batch: usize,
}

/// Semantic verifier with scripted answers keyed by step number.
pub struct MockVerifier {
    scripted: HashMap<u32, StepAssessment>,
    default_assessment: StepAssessment,
    failure: Option<String>,
    delay: Option<Duration>,
    truncate: Option<usize>,
    calls: Mutex<CallCounts>,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            default_assessment: StepAssessment {
                status: StepStatus::Uncertain,
                confidence: 0.5,
                reasoning: "no scripted assessment for this step".to_string(),
                contradiction: None,
            },
            failure: None,
            delay: None,
            truncate: None,
            calls: Mutex::new(CallCounts::default()),
        }
    }

    /// Verifier for offline runs: every answer is uncertain.
    pub fn offline() -> Self {
        let mut mock = Self::new();
        mock.default_assessment.reasoning =
            "semantic verification skipped (offline mode)".to_string();
        mock
    }

    /// Scripts the answer for one step number.
    pub fn with_assessment(mut self, step_number: u32, assessment: StepAssessment) -> Self {
        self.scripted.insert(step_number, assessment);
        self
    }

    /// Replaces the answer for unscripted steps.
    pub fn with_default(mut self, assessment: StepAssessment) -> Self {
        self.default_assessment = assessment;
        self
    }

    /// Makes every call fail with [`VerifierError::ConnectionFailed`].
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleeps before answering, for exercising deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Caps batch responses at `len` entries regardless of request size.
    pub fn with_batch_truncation(mut self, len: usize) -> Self {
        self.truncate = Some(len);
        self
    }

    /// Single-step calls served so far.
    pub fn single_calls(&self) -> usize {
        self.calls.lock().map(|c| c.single).unwrap_or(0)
    }

    /// Batch calls served so far.
    pub fn batch_calls(&self) -> usize {
        self.calls.lock().map(|c| c.batch).unwrap_or(0)
    }

    fn answer(&self, request: &VerifyRequest) -> StepAssessment {
        self.scripted
            .get(&request.step.step_number)
            .cloned()
            .unwrap_or_else(|| self.default_assessment.clone())
    }

    fn simulate_call(&self) -> VerifierResult<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Some(message) = &self.failure {
            return Err(VerifierError::ConnectionFailed(message.clone()));
        }
        Ok(())
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticVerifier for MockVerifier {
    fn verify_step(&self, request: &VerifyRequest) -> VerifierResult<StepAssessment> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.single += 1;
        }
        self.simulate_call()?;
        Ok(self.answer(request))
    }

    fn verify_batch(&self, requests: &[VerifyRequest]) -> VerifierResult<Vec<StepAssessment>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.batch += 1;
        }
        self.simulate_call()?;
        let len = self.truncate.unwrap_or(requests.len()).min(requests.len());
        Ok(requests[..len].iter().map(|r| self.answer(r)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::StepEvidence;
    use crate::plan::TestStep;

    fn request(step_number: u32) -> VerifyRequest {
        VerifyRequest {
            step: TestStep {
                step_number,
                description: format!("step {}", step_number),
                action: "click".to_string(),
                expected_outcome: None,
            },
            evidence: StepEvidence::not_found("nothing".to_string()),
            prior: Vec::new(),
            narrative: None,
        }
    }

    #[test]
    fn test_scripted_answer_wins_over_default() {
        let mock = MockVerifier::new().with_assessment(
            2,
            StepAssessment {
                status: StepStatus::Observed,
                confidence: 0.9,
                reasoning: "scripted".to_string(),
                contradiction: None,
            },
        );

        let scripted = mock.verify_step(&request(2)).unwrap();
        assert_eq!(scripted.status, StepStatus::Observed);
        assert_eq!(scripted.reasoning, "scripted");

        let unscripted = mock.verify_step(&request(3)).unwrap();
        assert_eq!(unscripted.status, StepStatus::Uncertain);
        assert_eq!(unscripted.confidence, 0.5);
    }

    #[test]
    fn test_offline_reasoning_mentions_offline() {
        let mock = MockVerifier::offline();
        let assessment = mock.verify_step(&request(1)).unwrap();
        assert!(assessment.reasoning.contains("offline"));
    }

    #[test]
    fn test_failing_mock_errors() {
        let mock = MockVerifier::new().failing("endpoint down");
        let err = mock.verify_step(&request(1)).unwrap_err();
        assert!(matches!(err, VerifierError::ConnectionFailed(_)));
    }

    #[test]
    fn test_call_counts() {
        let mock = MockVerifier::new();
        mock.verify_step(&request(1)).unwrap();
        mock.verify_step(&request(2)).unwrap();
        mock.verify_batch(&[request(3), request(4)]).unwrap();
        assert_eq!(mock.single_calls(), 2);
        assert_eq!(mock.batch_calls(), 1);
    }

    #[test]
    fn test_batch_truncation() {
        let mock = MockVerifier::new().with_batch_truncation(1);
        let batch = mock
            .verify_batch(&[request(1), request(2), request(3)])
            .unwrap();
        assert_eq!(batch.len(), 1);
    }
}
