//! Semantic verifiers: external judges for steps the code path cannot settle.
//!
//! The [`SemanticVerifier`] trait hides where the judgement comes from. Three
//! backends ship here:
//! - [`EndpointVerifier`]: an OpenAI-compatible chat-completions endpoint,
//!   driven through curl with streaming and a non-streaming fallback
//! - [`CliVerifier`]: a local command invoked per call
//! - [`MockVerifier`]: scripted assessments for tests and offline runs
//!
//! Verifiers are treated as opaque and possibly unreliable. They never fail
//! a run: every error here is downgraded by the engine to an uncertain
//! verdict for the affected step.

pub mod cli;
pub mod endpoint;
pub mod mock;
mod parse;
mod prompt;
mod types;

pub use cli::CliVerifier;
pub use endpoint::{EndpointVerifier, check_health};
pub use mock::MockVerifier;
pub use types::{
    PriorOutcome, SemanticVerifier, StepAssessment, VerifierError, VerifierKind, VerifierResult,
    VerifyRequest, make_verifier,
};
