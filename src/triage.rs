//! Triage: deciding how each step gets verified.
//!
//! Every step is routed down exactly one of two paths. The cheap path
//! derives a verdict from the gathered evidence alone; the expensive path
//! sends the step to the semantic verifier. The decision is a fixed rule
//! table evaluated top to bottom, first match wins, so the same step and
//! evidence always route the same way.

use crate::config::EngineSettings;
use crate::evidence::StepEvidence;
use crate::plan::TestStep;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Step text that marks the step as an assertion rather than an action.
pub const ASSERTION_MARKERS: &[&str] = &[
    "assert",
    "verify",
    "validate",
    "confirm that",
    "ensure that",
    "should be",
    "must be",
    "expect",
];

/// Evidence text that suggests the expected outcome did not happen.
pub const NEGATIVE_INDICATORS: &[&str] = &[
    "not visible",
    "not available",
    "not present",
    "not found",
    "not displayed",
    "is missing",
    "does not appear",
    "does not exist",
    "cannot see",
    "cannot find",
    "no longer",
    "fails",
    "failed",
    "failure",
    "error",
    "exception",
    "unavailable",
    "absent",
];

/// Actions whose visual outcome is easy to misread from keywords alone.
pub const INTERACTION_KEYWORDS: &[&str] = &[
    "filter", "select", "apply", "click", "choose", "check", "toggle",
];

/// Which verification path a step takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyRoute {
    /// Verdict computed locally from the evidence.
    #[serde(rename = "code")]
    CodeBased,
    /// Verdict delegated to the semantic verifier.
    #[serde(rename = "semantic")]
    LlmSemantic,
}

impl fmt::Display for VerifyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyRoute::CodeBased => write!(f, "code"),
            VerifyRoute::LlmSemantic => write!(f, "semantic"),
        }
    }
}

/// Deterministic router from (step, evidence) to a verification path.
pub struct TriageClassifier {
    high_confidence: f64,
    borderline_low: f64,
}

impl TriageClassifier {
    pub fn new(high_confidence: f64, borderline_low: f64) -> Self {
        TriageClassifier {
            high_confidence,
            borderline_low,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        TriageClassifier::new(settings.triage_high, settings.borderline_low)
    }

    /// Routes one step. Rules, in order:
    ///
    /// 1. confidence at or above the high bar, no assertion language, no
    ///    negative indicator: code path.
    /// 2. assertion language in the step: semantic.
    /// 3. negative indicator in the evidence: semantic.
    /// 4. confidence strictly between the borderline bars: semantic.
    /// 5. interaction keyword in the action: semantic.
    /// 6. everything else: code path.
    pub fn classify(&self, step: &TestStep, evidence: &StepEvidence) -> VerifyRoute {
        let assertion = is_assertion_step(step);
        let negative = contains_negative_indicator(&evidence.description)
            || contains_negative_indicator(&evidence.reasoning);

        if evidence.confidence >= self.high_confidence && !assertion && !negative {
            debug!(
                "step {}: high-confidence evidence, code path",
                step.step_number
            );
            return VerifyRoute::CodeBased;
        }
        if assertion {
            debug!("step {}: assertion language, semantic path", step.step_number);
            return VerifyRoute::LlmSemantic;
        }
        if negative {
            debug!(
                "step {}: negative indicator in evidence, semantic path",
                step.step_number
            );
            return VerifyRoute::LlmSemantic;
        }
        if evidence.confidence > self.borderline_low && evidence.confidence < self.high_confidence
        {
            debug!(
                "step {}: borderline confidence {:.2}, semantic path",
                step.step_number, evidence.confidence
            );
            return VerifyRoute::LlmSemantic;
        }
        if is_interaction_action(&step.action) {
            debug!(
                "step {}: interaction-heavy action, semantic path",
                step.step_number
            );
            return VerifyRoute::LlmSemantic;
        }
        debug!("step {}: default code path", step.step_number);
        VerifyRoute::CodeBased
    }
}

impl Default for TriageClassifier {
    fn default() -> Self {
        TriageClassifier::new(
            crate::config::DEFAULT_TRIAGE_HIGH,
            crate::config::DEFAULT_BORDERLINE_LOW,
        )
    }
}

/// True when the step's description or action carries assertion language.
pub fn is_assertion_step(step: &TestStep) -> bool {
    let description = step.description.to_lowercase();
    let action = step.action.to_lowercase();
    ASSERTION_MARKERS
        .iter()
        .any(|marker| description.contains(marker) || action.contains(marker))
}

/// True when the text contains any negative indicator, case-insensitive.
pub fn contains_negative_indicator(text: &str) -> bool {
    let text = text.to_lowercase();
    NEGATIVE_INDICATORS
        .iter()
        .any(|indicator| text.contains(indicator))
}

/// True when the action mentions an interaction keyword.
pub fn is_interaction_action(action: &str) -> bool {
    let action = action.to_lowercase();
    INTERACTION_KEYWORDS.iter().any(|kw| action.contains(kw))
}
