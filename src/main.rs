use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use replay_verify::config::{Config, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use replay_verify::evidence::EvidenceGatherer;
use replay_verify::orchestrator::{Orchestrator, RunProgress};
use replay_verify::plan::{load_planning_log, load_test_record};
use replay_verify::providers::{
    DirFrameProvider, FileOcr, FrameProvider, NullOcr, OcrProvider, StaticFrames, TimelineFile,
    VisionProvider,
};
use replay_verify::report::StepStatus;
use replay_verify::session::{Session, list_sessions};
use replay_verify::timeline::VideoTimeline;
use replay_verify::triage::TriageClassifier;
use replay_verify::verifier::{VerifierKind, check_health, make_verifier};

/// Replay Verify - video-evidence verification for automated UI tests
#[derive(Parser, Debug)]
#[command(
    name = "replay-verify",
    about = "Verify recorded UI test runs against their plans using video evidence",
    after_help = "ENVIRONMENT VARIABLES:\n\
        REPLAY_VERIFY_ENDPOINT         Semantic verifier endpoint URL\n\
        REPLAY_VERIFY_MODEL            Verifier model name\n\
        REPLAY_VERIFY_CLI_COMMAND      Command line for a CLI-backed verifier\n\
        REPLAY_VERIFY_SESSION_DIR      Base directory for run sessions\n\
        REPLAY_VERIFY_BATCH_THRESHOLD  Semantic step count that triggers batching"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a recorded test run against its plan
    Run {
        /// Planning log with the steps to verify
        #[arg(short, long)]
        steps: PathBuf,

        /// Timeline document produced by the vision provider
        #[arg(short, long)]
        timeline: PathBuf,

        /// Directory of extracted frames (frame_NNNN_SS.SSSs.*)
        #[arg(short, long)]
        frames: Option<PathBuf>,

        /// Precomputed OCR map (JSON object, frame number -> fragments)
        #[arg(long)]
        ocr: Option<PathBuf>,

        /// Test record with the test's name and outcome metadata
        #[arg(long)]
        test_record: Option<PathBuf>,

        /// Test name for the report (default: record name or steps file name)
        #[arg(long)]
        test_name: Option<String>,

        /// Semantic verifier endpoint URL
        #[arg(long, env = "REPLAY_VERIFY_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Verifier model name
        #[arg(long, env = "REPLAY_VERIFY_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Use a CLI command as the semantic verifier instead of the endpoint
        #[arg(long, env = "REPLAY_VERIFY_CLI_COMMAND")]
        cli: Option<String>,

        /// Skip semantic verification; unresolved steps stay uncertain
        #[arg(long)]
        offline: bool,

        /// Output directory for run artifacts (default: auto-generated session dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep artifacts after completion (default: cleanup unless --output is specified)
        #[arg(long, short = 'k')]
        keep: bool,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show each step's verification route without calling any verifier
    Triage {
        /// Planning log with the steps to triage
        #[arg(short, long)]
        steps: PathBuf,

        /// Timeline document produced by the vision provider
        #[arg(short, long)]
        timeline: PathBuf,

        /// Output the routing as JSON
        #[arg(long)]
        json: bool,
    },

    /// List kept run sessions
    Sessions,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("replay_verify=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Run {
            steps,
            timeline,
            frames,
            ocr,
            test_record,
            test_name,
            endpoint,
            model,
            cli,
            offline,
            output,
            keep,
            json,
        }) => {
            let mut config = Config::from_env();
            config.verifier.endpoint = endpoint;
            config.verifier.model = model;
            if let Some(ref cli) = cli {
                config.verifier.cli_command =
                    cli.split_whitespace().map(str::to_string).collect();
            }

            // Resolve the test name: record beats flag beats file name
            let record = match &test_record {
                Some(path) => Some(load_test_record(path)?),
                None => None,
            };
            let resolved_name = record
                .as_ref()
                .map(|r| r.test_name.clone())
                .or(test_name)
                .unwrap_or_else(|| {
                    steps
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "recorded-test".to_string())
                });

            let plan = load_planning_log(&steps)?;

            // Pick the verifier: offline beats CLI beats endpoint
            let kind = if offline {
                VerifierKind::Mock
            } else if !config.verifier.cli_command.is_empty() {
                VerifierKind::Cli
            } else {
                VerifierKind::Endpoint
            };

            // Check endpoint health up front (an unreachable endpoint still
            // produces a report - semantic steps just come back uncertain)
            if kind == VerifierKind::Endpoint {
                match check_health(&config.verifier.endpoint, 5) {
                    Ok(true) => {
                        if !json {
                            eprintln!("Verifier endpoint responding, starting verification...");
                        }
                    }
                    Ok(false) | Err(_) => {
                        eprintln!(
                            "Warning: verifier endpoint not responding at {}",
                            config.verifier.endpoint
                        );
                        eprintln!("Semantic steps will be recorded as uncertain if calls fail.");
                    }
                }
            }
            let verifier = make_verifier(kind, &config.verifier);

            let frame_provider: Box<dyn FrameProvider> = match &frames {
                Some(dir) => Box::new(DirFrameProvider::new(dir)),
                None => Box::new(StaticFrames::empty()),
            };
            let ocr_provider: Box<dyn OcrProvider> = match &ocr {
                Some(path) => Box::new(FileOcr::from_file(path)?),
                None => Box::new(NullOcr),
            };
            let vision: Box<dyn VisionProvider> = Box::new(TimelineFile::new(&timeline));

            // Create session - if output specified, use that dir and keep by default
            let session = if let Some(ref dir) = output {
                Session::in_dir(dir)
            } else {
                Session::with_name(&config.session.base_dir, &resolved_name).keep(keep)
            };
            session.init()?;

            let mut orchestrator =
                Orchestrator::new(config, frame_provider, ocr_provider, vision, verifier);
            if !json {
                orchestrator = orchestrator.with_progress(|progress| {
                    if let RunProgress::Phase { phase, progress } = progress {
                        eprintln!("[{:>3.0}%] {}", progress * 100.0, phase.label());
                    }
                });
            }

            let outcome = orchestrator.run(&plan, &resolved_name)?;

            // Persist run artifacts into the session
            std::fs::write(
                session.report_path(),
                serde_json::to_string_pretty(&outcome.report)?,
            )?;
            std::fs::write(
                session.metrics_path(),
                serde_json::to_string_pretty(&outcome.metrics)?,
            )?;
            std::fs::write(
                session.timeline_path(),
                serde_json::to_string_pretty(&outcome.timeline)?,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            } else {
                let report = &outcome.report;
                println!(
                    "{}: {} ({}/{} steps observed, pass rate {:.0}%)",
                    report.test_name,
                    report.overall_status,
                    report.observed_steps,
                    report.total_steps,
                    report.pass_rate * 100.0
                );
                println!("  {}", report.summary);
                for result in &report.results {
                    let timestamp = result
                        .video_timestamp
                        .map(|t| format!(" @ {:.1}s", t))
                        .unwrap_or_default();
                    println!(
                        "  Step {} [{}]{}: {}",
                        result.step.step_number, result.status, timestamp, result.step.description
                    );
                    if result.status != StepStatus::Observed {
                        // Print first 200 chars of the supporting narrative
                        let preview: String = result.evidence.chars().take(200).collect();
                        println!("    Evidence: {}", preview);
                    }
                }
                println!("\nSession: {}", session.dir.display());
            }

            // Keep session alive if needed (prevent Drop cleanup)
            if keep || output.is_some() {
                std::mem::forget(session);
            }
        }

        Some(Commands::Triage {
            steps,
            timeline,
            json,
        }) => {
            let plan = load_planning_log(&steps)?;
            let content = std::fs::read_to_string(&timeline)?;
            let timeline = VideoTimeline::from_json(&content)?;

            let config = Config::from_env();
            let gatherer = EvidenceGatherer::new(&timeline);
            let classifier = TriageClassifier::from_settings(&config.engine);
            let evidence = gatherer.gather(&plan);

            if json {
                let rows: Vec<serde_json::Value> = plan
                    .iter()
                    .zip(&evidence)
                    .map(|(step, evidence)| {
                        serde_json::json!({
                            "step_number": step.step_number,
                            "description": step.description,
                            "route": classifier.classify(step, evidence),
                            "found": evidence.found,
                            "confidence": evidence.confidence,
                            "timestamp": evidence.timestamp,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Triage for {} step(s):", plan.len());
                for (step, evidence) in plan.iter().zip(&evidence) {
                    let route = classifier.classify(step, evidence);
                    let timestamp = evidence
                        .timestamp
                        .map(|t| format!(" @ {:.1}s", t))
                        .unwrap_or_default();
                    println!(
                        "  Step {} -> {} (confidence {:.2}{}): {}",
                        step.step_number, route, evidence.confidence, timestamp, step.description
                    );
                }
            }
        }

        Some(Commands::Sessions) => {
            let config = Config::from_env();
            let sessions = list_sessions(&config.session.base_dir)?;
            if sessions.is_empty() {
                println!("No sessions under {}", config.session.base_dir);
            } else {
                println!("Sessions under {}:", config.session.base_dir);
                for session in sessions {
                    println!("  {}", session.display());
                }
            }
        }

        None => {
            println!("Replay Verify - video-evidence verification for automated UI tests");
            println!();
            println!("Usage: replay-verify <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run       Verify a recorded test run against its plan");
            println!("  triage    Show each step's verification route (dry run)");
            println!("  sessions  List kept run sessions");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}
