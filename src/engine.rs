//! Verification engine.
//!
//! Consumes triaged steps and produces one [`VerificationResult`] per step.
//! Code-routed steps settle locally from their evidence. Semantic-routed
//! steps go to the configured [`SemanticVerifier`]: one batch call once
//! enough of them pile up, otherwise independent concurrent calls joined
//! against a per-call deadline. A verifier failure never aborts a run; the
//! affected steps downgrade to uncertain with the failure recorded.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::evidence::StepEvidence;
use crate::orchestrator::CancelToken;
use crate::plan::TestStep;
use crate::report::{self, StepStatus, VerificationResult};
use crate::triage::{VerifyRoute, contains_negative_indicator};
use crate::verifier::{
    PriorOutcome, SemanticVerifier, StepAssessment, VerifierResult, VerifyRequest,
};

/// Prior step outcomes included in each semantic request for context.
const MAX_PRIOR_CONTEXT: usize = 5;

/// A step with its gathered evidence and triage routing.
#[derive(Debug, Clone)]
pub struct RoutedStep {
    pub step: TestStep,
    pub evidence: StepEvidence,
    pub route: VerifyRoute,
}

/// Turns routed steps into verdicts.
pub struct VerificationEngine {
    settings: EngineSettings,
    verifier: Arc<dyn SemanticVerifier>,
}

impl VerificationEngine {
    pub fn new(settings: EngineSettings, verifier: Arc<dyn SemanticVerifier>) -> Self {
        Self { settings, verifier }
    }

    /// Verifies every routed step and returns results ordered by step number.
    ///
    /// Code verdicts always settle, even under cancellation; they are local
    /// and cheap. Cancellation only skips or abandons semantic calls.
    pub fn verify(
        &self,
        routed: Vec<RoutedStep>,
        narrative: Option<&str>,
        cancel: &CancelToken,
    ) -> Vec<VerificationResult> {
        let (code_steps, semantic_steps): (Vec<RoutedStep>, Vec<RoutedStep>) = routed
            .into_iter()
            .partition(|r| r.route == VerifyRoute::CodeBased);

        let mut results: Vec<VerificationResult> = code_steps
            .iter()
            .map(|r| self.code_verdict(&r.step, &r.evidence))
            .collect();

        if !semantic_steps.is_empty() {
            if cancel.is_cancelled() {
                results.extend(
                    semantic_steps
                        .iter()
                        .map(|r| self.fallback_verdict(&r.step, &r.evidence, "run cancelled")),
                );
            } else {
                let prior = prior_context(&results);
                let requests: Vec<VerifyRequest> = semantic_steps
                    .iter()
                    .map(|r| VerifyRequest {
                        step: r.step.clone(),
                        evidence: r.evidence.clone(),
                        prior: prior.clone(),
                        narrative: narrative.map(str::to_string),
                    })
                    .collect();

                let semantic_results = if requests.len() >= self.settings.batch_threshold {
                    self.verify_semantic_batch(&semantic_steps, requests)
                } else {
                    self.verify_semantic_concurrent(&semantic_steps, requests, cancel)
                };
                results.extend(semantic_results);
            }
        }

        results.sort_by_key(|r| r.step.step_number);
        results
    }

    /// Settles a step from its evidence alone.
    fn code_verdict(&self, step: &TestStep, evidence: &StepEvidence) -> VerificationResult {
        let negative = contains_negative_indicator(&evidence.description)
            || contains_negative_indicator(&evidence.reasoning);

        let (status, narrative) = if evidence.found && negative {
            (
                StepStatus::Deviation,
                format!(
                    "Matched evidence describes a failure state. {}",
                    evidence.reasoning
                ),
            )
        } else if evidence.found && evidence.confidence >= self.settings.observed_threshold {
            (StepStatus::Observed, evidence.reasoning.clone())
        } else if evidence.found {
            (
                StepStatus::Uncertain,
                format!(
                    "Evidence inconclusive at confidence {:.2}. {}",
                    evidence.confidence, evidence.reasoning
                ),
            )
        } else {
            (StepStatus::Uncertain, evidence.reasoning.clone())
        };

        debug!(step = step.step_number, status = %status, "code-based verdict");
        report::result_from_evidence(
            step,
            evidence,
            status,
            evidence.confidence,
            narrative,
            VerifyRoute::CodeBased,
        )
    }

    /// Maps a verifier assessment onto a final result.
    fn semantic_verdict(
        &self,
        step: &TestStep,
        evidence: &StepEvidence,
        assessment: StepAssessment,
    ) -> VerificationResult {
        let confidence = assessment.confidence.clamp(0.0, 1.0);
        // A reported contradiction overrides whatever status came with it
        let (status, narrative) = match assessment.contradiction {
            Some(details) => (
                StepStatus::Deviation,
                format!(
                    "CONTRADICTION DETECTED: {}\n\n{}",
                    details, assessment.reasoning
                ),
            ),
            None => (assessment.status, assessment.reasoning),
        };

        debug!(step = step.step_number, status = %status, "semantic verdict");
        report::result_from_evidence(
            step,
            evidence,
            status,
            confidence,
            narrative,
            VerifyRoute::LlmSemantic,
        )
    }

    /// Verdict for a semantic step whose verifier call never produced an
    /// assessment.
    fn fallback_verdict(
        &self,
        step: &TestStep,
        evidence: &StepEvidence,
        reason: &str,
    ) -> VerificationResult {
        warn!(step = step.step_number, reason = %reason, "semantic verification downgraded");
        report::result_from_evidence(
            step,
            evidence,
            StepStatus::Uncertain,
            0.5,
            format!(
                "Semantic verification failed: {}; recorded as uncertain.",
                reason
            ),
            VerifyRoute::LlmSemantic,
        )
    }

    fn verify_semantic_batch(
        &self,
        steps: &[RoutedStep],
        requests: Vec<VerifyRequest>,
    ) -> Vec<VerificationResult> {
        info!(steps = steps.len(), "dispatching batch verification call");
        match self.verifier.verify_batch(&requests) {
            Ok(assessments) => steps
                .iter()
                .enumerate()
                .map(|(i, routed)| match assessments.get(i) {
                    Some(assessment) => {
                        self.semantic_verdict(&routed.step, &routed.evidence, assessment.clone())
                    }
                    None => self.fallback_verdict(
                        &routed.step,
                        &routed.evidence,
                        "missing entry in batch response",
                    ),
                })
                .collect(),
            Err(e) => steps
                .iter()
                .map(|routed| self.fallback_verdict(&routed.step, &routed.evidence, &e.to_string()))
                .collect(),
        }
    }

    fn verify_semantic_concurrent(
        &self,
        steps: &[RoutedStep],
        requests: Vec<VerifyRequest>,
        cancel: &CancelToken,
    ) -> Vec<VerificationResult> {
        info!(
            steps = steps.len(),
            "dispatching concurrent verification calls"
        );
        let (tx, rx) = mpsc::channel();
        for (index, request) in requests.into_iter().enumerate() {
            let tx = tx.clone();
            let verifier = Arc::clone(&self.verifier);
            thread::spawn(move || {
                let outcome = verifier.verify_step(&request);
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);

        // One shared deadline covers the whole fan-out; calls that miss it
        // keep running on their detached threads and their answers are
        // dropped.
        let deadline = Instant::now() + Duration::from_secs(self.settings.call_timeout);
        let mut slots: Vec<Option<VerifierResult<StepAssessment>>> =
            (0..steps.len()).map(|_| None).collect();
        let mut filled = 0;
        let mut abandon_reason = "no response before deadline";

        while filled < slots.len() {
            if cancel.is_cancelled() {
                abandon_reason = "run cancelled";
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = (deadline - now).min(Duration::from_millis(100));
            match rx.recv_timeout(wait) {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                        filled += 1;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        steps
            .iter()
            .zip(slots)
            .map(|(routed, slot)| match slot {
                Some(Ok(assessment)) => {
                    self.semantic_verdict(&routed.step, &routed.evidence, assessment)
                }
                Some(Err(e)) => {
                    self.fallback_verdict(&routed.step, &routed.evidence, &e.to_string())
                }
                None => self.fallback_verdict(&routed.step, &routed.evidence, abandon_reason),
            })
            .collect()
    }
}

/// The most recent code-settled outcomes, in step order, for verifier context.
fn prior_context(results: &[VerificationResult]) -> Vec<PriorOutcome> {
    let mut ordered: Vec<&VerificationResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.step.step_number);
    ordered
        .iter()
        .rev()
        .take(MAX_PRIOR_CONTEXT)
        .rev()
        .map(|r| PriorOutcome {
            step_number: r.step.step_number,
            status: r.status,
            description: r.step.description.clone(),
        })
        .collect()
}
