//! Configuration for verification runs.
//!
//! All settings resolve from environment variables with sensible defaults.
//! The resulting [`Config`] is passed explicitly to the orchestrator;
//! nothing here is process-global, so tests and embedders build their own.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `REPLAY_VERIFY_ENDPOINT` | Chat-completions endpoint for the semantic verifier | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `REPLAY_VERIFY_MODEL` | Model name sent to the endpoint | `qwen3` |
//! | `REPLAY_VERIFY_MAX_TOKENS` | Response token budget | `800` |
//! | `REPLAY_VERIFY_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `REPLAY_VERIFY_TIMEOUT` | Stream inactivity timeout in seconds | `60` |
//! | `REPLAY_VERIFY_CALL_TIMEOUT` | Per-call deadline for concurrent semantic calls (seconds) | `120` |
//! | `REPLAY_VERIFY_CLI_COMMAND` | Command line for the CLI-backed verifier | (empty) |
//! | `REPLAY_VERIFY_BATCH_THRESHOLD` | Semantic step count at which batching kicks in | `5` |
//! | `REPLAY_VERIFY_MAX_KEY_FRAMES` | Key frames selected for OCR | `15` |
//! | `REPLAY_VERIFY_MIN_OCR_CONFIDENCE` | Minimum OCR fragment confidence | `0.3` |
//! | `REPLAY_VERIFY_SESSION_DIR` | Base directory for run sessions | `/tmp/replay-verify` |
//!
//! # Example
//!
//! ```bash
//! # Point the verifier at a local llama.cpp server
//! export REPLAY_VERIFY_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export REPLAY_VERIFY_MODEL="llama3"
//! ```

use std::env;

// ============================================================================
// Default Values
// ============================================================================

/// Default semantic verifier endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default verifier model name
pub const DEFAULT_MODEL: &str = "qwen3";

/// Default max tokens for verifier responses
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default stream activity timeout (seconds)
pub const DEFAULT_ACTIVITY_TIMEOUT: u64 = 60;

/// Default per-call deadline for concurrent semantic calls (seconds)
pub const DEFAULT_CALL_TIMEOUT: u64 = 120;

/// Evidence confidence at or above which the code path reports observed
pub const DEFAULT_OBSERVED_THRESHOLD: f64 = 0.7;

/// Evidence confidence at or above which triage may skip the verifier
pub const DEFAULT_TRIAGE_HIGH: f64 = 0.9;

/// Lower bar of the borderline band that always goes to the verifier
pub const DEFAULT_BORDERLINE_LOW: f64 = 0.5;

/// Semantic step count at which one batch call replaces per-step calls
pub const DEFAULT_BATCH_THRESHOLD: usize = 5;

/// Default number of key frames selected for OCR
pub const DEFAULT_MAX_KEY_FRAMES: usize = 15;

/// Default minimum OCR fragment confidence
pub const DEFAULT_MIN_OCR_CONFIDENCE: f64 = 0.3;

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/replay-verify";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the verifier endpoint
pub const ENV_ENDPOINT: &str = "REPLAY_VERIFY_ENDPOINT";

/// Environment variable for the verifier model
pub const ENV_MODEL: &str = "REPLAY_VERIFY_MODEL";

/// Environment variable for verifier max tokens
pub const ENV_MAX_TOKENS: &str = "REPLAY_VERIFY_MAX_TOKENS";

/// Environment variable for the connection timeout
pub const ENV_CONNECT_TIMEOUT: &str = "REPLAY_VERIFY_CONNECT_TIMEOUT";

/// Environment variable for the stream activity timeout
pub const ENV_ACTIVITY_TIMEOUT: &str = "REPLAY_VERIFY_TIMEOUT";

/// Environment variable for the per-call deadline
pub const ENV_CALL_TIMEOUT: &str = "REPLAY_VERIFY_CALL_TIMEOUT";

/// Environment variable for the CLI verifier command
pub const ENV_CLI_COMMAND: &str = "REPLAY_VERIFY_CLI_COMMAND";

/// Environment variable for the batch threshold
pub const ENV_BATCH_THRESHOLD: &str = "REPLAY_VERIFY_BATCH_THRESHOLD";

/// Environment variable for the key frame cap
pub const ENV_MAX_KEY_FRAMES: &str = "REPLAY_VERIFY_MAX_KEY_FRAMES";

/// Environment variable for the minimum OCR confidence
pub const ENV_MIN_OCR_CONFIDENCE: &str = "REPLAY_VERIFY_MIN_OCR_CONFIDENCE";

/// Environment variable for the session directory
pub const ENV_SESSION_DIR: &str = "REPLAY_VERIFY_SESSION_DIR";

/// Complete configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Semantic verifier configuration
    pub verifier: VerifierSettings,
    /// Triage, engine and pipeline configuration
    pub engine: EngineSettings,
    /// Session configuration
    pub session: SessionSettings,
}

/// Semantic-verifier-related settings
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Chat-completions endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Activity timeout during streaming (seconds)
    pub activity_timeout: u64,
    /// Command line (program plus arguments) for the CLI-backed verifier
    pub cli_command: Vec<String>,
}

/// Triage and verification engine settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Code-path observed threshold
    pub observed_threshold: f64,
    /// Triage high-confidence bar
    pub triage_high: f64,
    /// Lower bar of the borderline band
    pub borderline_low: f64,
    /// Semantic step count at which batching kicks in
    pub batch_threshold: usize,
    /// Seconds each concurrent semantic call gets before its step downgrades
    pub call_timeout: u64,
    /// Key frames selected for OCR
    pub max_key_frames: usize,
    /// Minimum OCR fragment confidence
    pub min_ocr_confidence: f64,
}

/// Session-related settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Base directory for session storage
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            verifier: VerifierSettings::from_env(),
            engine: EngineSettings::from_env(),
            session: SessionSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            verifier: VerifierSettings::defaults(),
            engine: EngineSettings::defaults(),
            session: SessionSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VerifierSettings {
    /// Create verifier settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_ENDPOINT).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            model: env::var(ENV_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: env::var(ENV_MAX_TOKENS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            connect_timeout: env::var(ENV_CONNECT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            activity_timeout: env::var(ENV_ACTIVITY_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ACTIVITY_TIMEOUT),
            cli_command: env::var(ENV_CLI_COMMAND)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// Create verifier settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
            cli_command: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Create engine settings from environment variables
    pub fn from_env() -> Self {
        Self {
            batch_threshold: env::var(ENV_BATCH_THRESHOLD)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_THRESHOLD),
            call_timeout: env::var(ENV_CALL_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
            max_key_frames: env::var(ENV_MAX_KEY_FRAMES)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_KEY_FRAMES),
            min_ocr_confidence: env::var(ENV_MIN_OCR_CONFIDENCE)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MIN_OCR_CONFIDENCE),
            ..Self::defaults()
        }
    }

    /// Create engine settings with defaults
    pub fn defaults() -> Self {
        Self {
            observed_threshold: DEFAULT_OBSERVED_THRESHOLD,
            triage_high: DEFAULT_TRIAGE_HIGH,
            borderline_low: DEFAULT_BORDERLINE_LOW,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_key_frames: DEFAULT_MAX_KEY_FRAMES,
            min_ocr_confidence: DEFAULT_MIN_OCR_CONFIDENCE,
        }
    }
}

impl SessionSettings {
    /// Create session settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_SESSION_DIR).unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create session settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}
