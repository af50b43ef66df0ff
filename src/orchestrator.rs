//! Run orchestration.
//!
//! Drives one verification run through its phases: validate the plan, list
//! frames, pick key frames, OCR them, produce the timeline, verify every
//! step, assemble the report. Frame and OCR failures degrade the run (the
//! timeline provider simply gets less context); a failed vision analysis is
//! fatal because nothing downstream can work without a timeline.
//!
//! Progress is emitted through an optional callback and the run can be
//! cancelled from another thread via [`CancelToken`]. Per-phase wall time is
//! collected as [`PhaseMetrics`] and returned next to the report, never
//! inside it, so reports stay byte-stable across reruns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{RoutedStep, VerificationEngine};
use crate::evidence::EvidenceGatherer;
use crate::plan::{self, TestStep};
use crate::providers::{
    FrameProvider, FrameRef, OcrProvider, ProviderError, VisionProvider, select_key_frames,
};
use crate::report::DeviationReport;
use crate::timeline::VideoTimeline;
use crate::triage::{TriageClassifier, VerifyRoute};
use crate::verifier::SemanticVerifier;

/// Result type for orchestrator operations
pub type RunResult<T> = Result<T, RunError>;

/// Errors that abort a run
#[derive(Debug)]
pub enum RunError {
    /// Run inputs are unusable (no steps, malformed plan)
    Input(String),
    /// A collaborator failure that leaves the run without a timeline
    Provider(ProviderError),
    /// The run was cancelled
    Cancelled,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Input(msg) => write!(f, "Invalid input: {}", msg),
            RunError::Provider(e) => write!(f, "Provider failed: {}", e),
            RunError::Cancelled => write!(f, "Run cancelled"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for RunError {
    fn from(e: ProviderError) -> Self {
        RunError::Provider(e)
    }
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    FrameExtraction,
    KeyFrameSelection,
    Ocr,
    VisionAnalysis,
    Verification,
    Report,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::FrameExtraction => "frame_extraction",
            Phase::KeyFrameSelection => "key_frame_selection",
            Phase::Ocr => "ocr",
            Phase::VisionAnalysis => "vision_analysis",
            Phase::Verification => "verification",
            Phase::Report => "report",
        }
    }

    /// Overall run progress when this phase begins, in `[0, 1]`.
    pub fn entry_progress(&self) -> f64 {
        match self {
            Phase::Planning => 0.05,
            Phase::FrameExtraction => 0.15,
            Phase::KeyFrameSelection => 0.20,
            Phase::Ocr => 0.30,
            Phase::VisionAnalysis => 0.30,
            Phase::Verification => 0.60,
            Phase::Report => 0.95,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress update during a run.
#[derive(Debug, Clone)]
pub enum RunProgress {
    /// A phase began.
    Phase { phase: Phase, progress: f64 },
    /// A step's verdict settled during the verification phase.
    Step {
        step_number: u32,
        total_steps: usize,
        progress: f64,
    },
    /// The run finished and the report is ready.
    Complete,
    /// The run aborted.
    Error(String),
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Wall time spent in one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub phase: String,
    pub elapsed_ms: u64,
    /// Verifier calls dispatched during the phase.
    pub verifier_calls: usize,
}

impl PhaseMetrics {
    fn record(phase: Phase, started: Instant, verifier_calls: usize) -> Self {
        Self {
            phase: phase.label().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            verifier_calls,
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: DeviationReport,
    pub timeline: VideoTimeline,
    pub metrics: Vec<PhaseMetrics>,
}

/// Drives one verification run end to end.
pub struct Orchestrator {
    config: Config,
    frames: Box<dyn FrameProvider>,
    ocr: Box<dyn OcrProvider>,
    vision: Box<dyn VisionProvider>,
    engine: VerificationEngine,
    progress: Option<Box<dyn Fn(RunProgress) + Send + Sync>>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        frames: Box<dyn FrameProvider>,
        ocr: Box<dyn OcrProvider>,
        vision: Box<dyn VisionProvider>,
        verifier: Arc<dyn SemanticVerifier>,
    ) -> Self {
        let engine = VerificationEngine::new(config.engine.clone(), verifier);
        Self {
            config,
            frames,
            ocr,
            vision,
            engine,
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    /// Registers a progress callback.
    pub fn with_progress(
        mut self,
        callback: impl Fn(RunProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Token other threads can use to cancel this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the full pipeline for one recorded test.
    pub fn run(&self, steps: &[TestStep], test_name: &str) -> RunResult<RunOutcome> {
        let outcome = self.run_phases(steps, test_name);
        match &outcome {
            Ok(_) => self.emit(RunProgress::Complete),
            Err(e) => self.emit(RunProgress::Error(e.to_string())),
        }
        outcome
    }

    fn run_phases(&self, steps: &[TestStep], test_name: &str) -> RunResult<RunOutcome> {
        let mut metrics = Vec::new();

        self.enter_phase(Phase::Planning)?;
        let phase_start = Instant::now();
        plan::validate_steps(steps).map_err(|e| RunError::Input(e.to_string()))?;
        info!(steps = steps.len(), test_name = %test_name, "plan validated");
        metrics.push(PhaseMetrics::record(Phase::Planning, phase_start, 0));

        self.enter_phase(Phase::FrameExtraction)?;
        let phase_start = Instant::now();
        let frames = match self.frames.list_frames() {
            Ok(frames) => frames,
            Err(e) => {
                // Degraded but survivable: the vision provider sees no frames
                warn!(error = %e, "frame provider failed, continuing without frames");
                Vec::new()
            }
        };
        info!(frames = frames.len(), "frames listed");
        metrics.push(PhaseMetrics::record(Phase::FrameExtraction, phase_start, 0));

        self.enter_phase(Phase::KeyFrameSelection)?;
        let phase_start = Instant::now();
        let key_frames = select_key_frames(&frames, self.config.engine.max_key_frames);
        debug!(
            selected = key_frames.len(),
            available = frames.len(),
            "key frames selected"
        );
        metrics.push(PhaseMetrics::record(
            Phase::KeyFrameSelection,
            phase_start,
            0,
        ));

        self.enter_phase(Phase::Ocr)?;
        let phase_start = Instant::now();
        let ocr_text = self.ocr_key_frames(&key_frames);
        debug!(frames_with_text = ocr_text.len(), "OCR collected");
        metrics.push(PhaseMetrics::record(Phase::Ocr, phase_start, 0));

        self.enter_phase(Phase::VisionAnalysis)?;
        let phase_start = Instant::now();
        let timeline = self.vision.analyze(&key_frames, &ocr_text, steps)?;
        info!(
            events = timeline.events.len(),
            duration = timeline.total_duration,
            "timeline produced"
        );
        metrics.push(PhaseMetrics::record(Phase::VisionAnalysis, phase_start, 0));

        self.enter_phase(Phase::Verification)?;
        let phase_start = Instant::now();
        let gatherer = EvidenceGatherer::new(&timeline);
        let classifier = TriageClassifier::from_settings(&self.config.engine);
        let routed: Vec<RoutedStep> = steps
            .iter()
            .zip(gatherer.gather(steps))
            .map(|(step, evidence)| {
                let route = classifier.classify(step, &evidence);
                RoutedStep {
                    step: step.clone(),
                    evidence,
                    route,
                }
            })
            .collect();
        let semantic_count = routed
            .iter()
            .filter(|r| r.route == VerifyRoute::LlmSemantic)
            .count();
        let verifier_calls = if semantic_count == 0 {
            0
        } else if semantic_count >= self.config.engine.batch_threshold {
            1
        } else {
            semantic_count
        };

        let narrative = if timeline.narrative.is_empty() {
            None
        } else {
            Some(timeline.narrative.as_str())
        };
        let results = self.engine.verify(routed, narrative, &self.cancel);
        let total = results.len();
        for (i, result) in results.iter().enumerate() {
            debug!(step = result.step.step_number, status = %result.status, "step settled");
            self.emit(RunProgress::Step {
                step_number: result.step.step_number,
                total_steps: total,
                progress: 0.60 + 0.35 * (i + 1) as f64 / total as f64,
            });
        }
        self.ensure_active()?;
        metrics.push(PhaseMetrics::record(
            Phase::Verification,
            phase_start,
            verifier_calls,
        ));

        self.enter_phase(Phase::Report)?;
        let phase_start = Instant::now();
        let report = DeviationReport::from_results(test_name, results);
        info!(
            status = %report.overall_status,
            pass_rate = report.pass_rate,
            "report assembled"
        );
        metrics.push(PhaseMetrics::record(Phase::Report, phase_start, 0));

        Ok(RunOutcome {
            report,
            timeline,
            metrics,
        })
    }

    /// OCR text per key frame, filtered by the configured confidence floor.
    /// Per-frame failures log and drop that frame's text.
    fn ocr_key_frames(&self, key_frames: &[FrameRef]) -> BTreeMap<u32, Vec<String>> {
        let mut ocr_text = BTreeMap::new();
        for frame in key_frames {
            match self.ocr.extract_text(frame) {
                Ok(fragments) => {
                    let texts: Vec<String> = fragments
                        .into_iter()
                        .filter(|f| f.confidence >= self.config.engine.min_ocr_confidence)
                        .map(|f| f.text)
                        .collect();
                    if !texts.is_empty() {
                        ocr_text.insert(frame.frame_number, texts);
                    }
                }
                Err(e) => {
                    warn!(frame = frame.frame_number, error = %e, "OCR failed for frame");
                }
            }
        }
        ocr_text
    }

    fn enter_phase(&self, phase: Phase) -> RunResult<()> {
        self.ensure_active()?;
        info!("=== {} ===", phase.label());
        self.emit(RunProgress::Phase {
            phase,
            progress: phase.entry_progress(),
        });
        Ok(())
    }

    fn ensure_active(&self) -> RunResult<()> {
        if self.cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, progress: RunProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}
