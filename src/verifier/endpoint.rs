//! Endpoint-backed semantic verifier.
//!
//! Speaks the OpenAI-compatible chat-completions protocol through a `curl`
//! subprocess with streaming enabled. Streaming means no total timeout:
//! a call stays alive as long as tokens keep arriving, and an activity
//! timeout aborts it only when the stream stalls. Servers that reply with
//! a plain (non-streamed) body get one non-streaming retry.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::VerifierSettings;

use super::parse;
use super::prompt;
use super::types::{SemanticVerifier, StepAssessment, VerifierError, VerifierResult, VerifyRequest};

/// Semantic verifier that calls an OpenAI-compatible chat-completions endpoint.
pub struct EndpointVerifier {
    settings: VerifierSettings,
}

impl EndpointVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    /// Build the chat-completions request body.
    fn chat_request(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "max_tokens": self.settings.max_tokens,
            "temperature": 0.1,
            "stream": stream
        })
    }

    /// Send a prompt, preferring the streaming path.
    ///
    /// An empty streamed body usually means the server ignored `stream: true`,
    /// so that one case falls back to a non-streaming request.
    fn send(&self, prompt: &str) -> VerifierResult<String> {
        match self.send_streaming(prompt)? {
            content if content.is_empty() => {
                debug!("empty streaming response, retrying without streaming");
                self.send_non_streaming(prompt)
            }
            content => Ok(content),
        }
    }

    fn send_streaming(&self, prompt: &str) -> VerifierResult<String> {
        let request = self.chat_request(prompt, true);
        let request_json = serde_json::to_string(&request)
            .map_err(|e| VerifierError::InvalidResponse(e.to_string()))?;

        let mut child = Command::new("curl")
            .args([
                "-s",
                "-N", // Disable buffering for streaming
                "-X", "POST",
                &self.settings.endpoint,
                "-H", "Content-Type: application/json",
                "-d", &request_json,
                "--connect-timeout", &self.settings.connect_timeout.to_string(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VerifierError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VerifierError::Io(std::io::Error::other("failed to capture stdout")))?;

        let (tx, rx) = mpsc::channel();
        let activity_timeout = Duration::from_secs(self.settings.activity_timeout);

        // Reader thread feeds lines into the channel; the receiving loop owns
        // the clock and decides when the stream has gone quiet for too long.
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        let mut full_content = String::new();
        let mut last_activity = Instant::now();

        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(line)) => {
                    last_activity = Instant::now();

                    // Parse SSE data
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            break;
                        }

                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                            if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                                full_content.push_str(content);
                            }
                            // Thinking models stream through reasoning_content
                            if let Some(content) =
                                json["choices"][0]["delta"]["reasoning_content"].as_str()
                            {
                                full_content.push_str(content);
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VerifierError::Io(e));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if last_activity.elapsed() > activity_timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(VerifierError::ActivityTimeout(activity_timeout));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }

        let status = child.wait()?;

        if !status.success() && full_content.is_empty() {
            return Err(VerifierError::ConnectionFailed(
                "curl process failed".to_string(),
            ));
        }

        Ok(full_content)
    }

    fn send_non_streaming(&self, prompt: &str) -> VerifierResult<String> {
        let request = self.chat_request(prompt, false);
        let request_json = serde_json::to_string(&request)
            .map_err(|e| VerifierError::InvalidResponse(e.to_string()))?;

        // No per-chunk activity signal here, so cap the whole call instead
        let output = Command::new("curl")
            .args([
                "-s",
                "-X", "POST",
                &self.settings.endpoint,
                "-H", "Content-Type: application/json",
                "-d", &request_json,
                "--connect-timeout", &self.settings.connect_timeout.to_string(),
                "--max-time", &(self.settings.activity_timeout * 2).to_string(),
            ])
            .output()?;

        if !output.status.success() {
            return Err(VerifierError::ConnectionFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let response: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| VerifierError::InvalidResponse(e.to_string()))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");
        let content = if content.is_empty() {
            response["choices"][0]["message"]["reasoning_content"]
                .as_str()
                .unwrap_or("")
        } else {
            content
        };

        if content.is_empty() {
            return Err(VerifierError::InvalidResponse(
                "empty completion from endpoint".to_string(),
            ));
        }

        Ok(content.to_string())
    }
}

impl SemanticVerifier for EndpointVerifier {
    fn verify_step(&self, request: &VerifyRequest) -> VerifierResult<StepAssessment> {
        debug!(
            step = request.step.step_number,
            "sending single-step verification request"
        );
        let response = self.send(&prompt::build_step_prompt(request))?;
        parse::parse_assessment(&response)
    }

    fn verify_batch(&self, requests: &[VerifyRequest]) -> VerifierResult<Vec<StepAssessment>> {
        debug!(steps = requests.len(), "sending batch verification request");
        let response = self.send(&prompt::build_batch_prompt(requests))?;
        parse::parse_batch(&response, requests.len())
    }
}

/// Check whether a verifier endpoint accepts connections.
///
/// This only verifies the server answers at all - semantic calls can take
/// minutes, so it never waits for a completion. Any HTTP status, even an
/// error one, counts as reachable; `000` means the connection itself failed.
pub fn check_health(endpoint: &str, timeout_secs: u64) -> VerifierResult<bool> {
    let scheme = if endpoint.starts_with("https://") {
        "https"
    } else {
        "http"
    };
    let url = endpoint
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I", // HEAD request - just check the server responds
            &format!("{}://{}", scheme, host_port),
        ])
        .output()?;

    let status = String::from_utf8_lossy(&output.stdout);
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}
