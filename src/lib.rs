//! Replay Verify - video-evidence verification for automated UI tests.
//!
//! This crate provides:
//! - Timeline modeling of what a vision provider saw in a recording
//! - Evidence gathering that matches planned steps against the timeline
//! - Triage routing between code-based and LLM-semantic verification
//! - A verification engine with batch and concurrent semantic dispatch
//! - Run orchestration with progress reporting and cancellation
//!
//! # Example
//!
//! ```rust,no_run
//! use replay_verify::config::Config;
//! use replay_verify::orchestrator::Orchestrator;
//! use replay_verify::plan::load_planning_log;
//! use replay_verify::providers::{DirFrameProvider, NullOcr, TimelineFile};
//! use replay_verify::verifier::{VerifierKind, make_verifier};
//!
//! let config = Config::from_env();
//! let verifier = make_verifier(VerifierKind::Endpoint, &config.verifier);
//! let steps = load_planning_log("planning.json").unwrap();
//! let orchestrator = Orchestrator::new(
//!     config,
//!     Box::new(DirFrameProvider::new("frames/")),
//!     Box::new(NullOcr),
//!     Box::new(TimelineFile::new("timeline.json")),
//!     verifier,
//! );
//! let outcome = orchestrator.run(&steps, "checkout-flow").unwrap();
//! println!("{}", outcome.report.overall_status);
//! ```

pub mod config;
pub mod engine;
pub mod evidence;
pub mod orchestrator;
pub mod plan;
pub mod providers;
pub mod report;
pub mod session;
pub mod timeline;
pub mod triage;
pub mod verifier;

// Re-export plan types
pub use plan::{TestRecord, TestStep, load_planning_log, load_test_record};

// Re-export timeline types
pub use timeline::{TimelineEvent, VideoTimeline};

// Re-export evidence and triage
pub use evidence::{EvidenceGatherer, StepEvidence, extract_keywords};
pub use triage::{TriageClassifier, VerifyRoute};

// Re-export engine and report types
pub use engine::{RoutedStep, VerificationEngine};
pub use report::{DeviationReport, StepStatus, VerificationResult};

// Re-export orchestration
pub use orchestrator::{
    CancelToken, Orchestrator, Phase, PhaseMetrics, RunError, RunOutcome, RunProgress, RunResult,
};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};

// Re-export verifier seam
pub use verifier::{
    SemanticVerifier, StepAssessment, VerifierError, VerifierKind, VerifyRequest, check_health,
    make_verifier,
};
