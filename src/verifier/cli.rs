//! CLI-backed semantic verifier.
//!
//! Runs a local command (an agent CLI, a wrapper script) once per call with
//! the prompt appended as the final argument, and parses whatever the command
//! prints to stdout. Useful where no HTTP endpoint is available.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::parse;
use super::prompt;
use super::types::{SemanticVerifier, StepAssessment, VerifierError, VerifierResult, VerifyRequest};

/// Semantic verifier that shells out to a configured command.
pub struct CliVerifier {
    command: Vec<String>,
    timeout: Duration,
}

impl CliVerifier {
    /// `command` is the program followed by its fixed arguments; the prompt
    /// is appended as one extra argument on every call.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn run(&self, prompt: &str) -> VerifierResult<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| VerifierError::Spawn("no CLI verifier command configured".to_string()))?;

        debug!(program = %program, "invoking CLI verifier");

        let mut child = Command::new(program)
            .args(args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VerifierError::Spawn(e.to_string()))?;

        // Poll for exit against the deadline; a command that hangs past it
        // is killed, never abandoned.
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VerifierError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VerifierError::Io(e));
                }
            }
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(VerifierError::ConnectionFailed(format!(
                "verifier command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            return Err(VerifierError::InvalidResponse(
                "empty output from verifier command".to_string(),
            ));
        }

        Ok(text)
    }
}

impl SemanticVerifier for CliVerifier {
    fn verify_step(&self, request: &VerifyRequest) -> VerifierResult<StepAssessment> {
        let response = self.run(&prompt::build_step_prompt(request))?;
        parse::parse_assessment(&response)
    }

    fn verify_batch(&self, requests: &[VerifyRequest]) -> VerifierResult<Vec<StepAssessment>> {
        let response = self.run(&prompt::build_batch_prompt(requests))?;
        parse::parse_batch(&response, requests.len())
    }
}
