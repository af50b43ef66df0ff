//! Shared verifier types: requests, assessments, errors, backend selection.

use crate::config::VerifierSettings;
use crate::evidence::StepEvidence;
use crate::plan::TestStep;
use crate::report::StepStatus;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::cli::CliVerifier;
use super::endpoint::EndpointVerifier;
use super::mock::MockVerifier;

/// Everything a verifier gets to judge one step.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub step: TestStep,
    pub evidence: StepEvidence,
    /// Already-decided steps, oldest first, for context.
    pub prior: Vec<PriorOutcome>,
    /// Narrative of the whole recording, when the timeline has one.
    pub narrative: Option<String>,
}

/// Compact summary of an earlier step's verdict.
#[derive(Debug, Clone)]
pub struct PriorOutcome {
    pub step_number: u32,
    pub status: StepStatus,
    pub description: String,
}

/// A verifier's judgement of one step, before the engine's sanity checks.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAssessment {
    pub status: StepStatus,
    pub confidence: f64,
    pub reasoning: String,
    /// Quoted contradicting observation, when the verifier flagged one.
    pub contradiction: Option<String>,
}

/// Errors from verifier backends.
#[derive(Debug)]
pub enum VerifierError {
    /// The backing process could not be started.
    Spawn(String),
    /// The backend was reached but the exchange failed.
    ConnectionFailed(String),
    /// An open response stream went quiet for too long.
    ActivityTimeout(Duration),
    /// The whole call exceeded its deadline.
    Timeout(Duration),
    /// The backend answered with something unusable.
    InvalidResponse(String),
    Io(std::io::Error),
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierError::Spawn(msg) => write!(f, "verifier spawn failed: {}", msg),
            VerifierError::ConnectionFailed(msg) => {
                write!(f, "verifier connection failed: {}", msg)
            }
            VerifierError::ActivityTimeout(d) => {
                write!(f, "verifier stream stalled for {}s", d.as_secs())
            }
            VerifierError::Timeout(d) => write!(f, "verifier call exceeded {}s", d.as_secs()),
            VerifierError::InvalidResponse(msg) => {
                write!(f, "invalid verifier response: {}", msg)
            }
            VerifierError::Io(e) => write!(f, "verifier I/O error: {}", e),
        }
    }
}

impl std::error::Error for VerifierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VerifierError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VerifierError {
    fn from(e: std::io::Error) -> Self {
        VerifierError::Io(e)
    }
}

pub type VerifierResult<T> = Result<T, VerifierError>;

/// Judges steps against gathered evidence.
///
/// Implementations are opaque to the engine: they may be slow, flaky or
/// wrong, and callers own all fallback policy. Both methods must be safe to
/// call from multiple threads.
pub trait SemanticVerifier: Send + Sync {
    fn verify_step(&self, request: &VerifyRequest) -> VerifierResult<StepAssessment>;

    /// Judges several steps in one call. Assessments are positional, in
    /// request order; a short response is the caller's problem to pad.
    fn verify_batch(&self, requests: &[VerifyRequest]) -> VerifierResult<Vec<StepAssessment>>;
}

/// Supported verifier backends. The set is closed on purpose: every backend
/// is exercised by the same engine and degrades the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierKind {
    /// OpenAI-compatible chat endpoint, hosted or local.
    Endpoint,
    /// Local command invoked per call.
    Cli,
    /// Scripted assessments; also backs offline runs.
    Mock,
}

/// Builds a verifier for the requested backend.
pub fn make_verifier(kind: VerifierKind, settings: &VerifierSettings) -> Arc<dyn SemanticVerifier> {
    match kind {
        VerifierKind::Endpoint => Arc::new(EndpointVerifier::new(settings.clone())),
        VerifierKind::Cli => Arc::new(CliVerifier::new(
            settings.cli_command.clone(),
            Duration::from_secs(settings.activity_timeout),
        )),
        VerifierKind::Mock => Arc::new(MockVerifier::offline()),
    }
}
