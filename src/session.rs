//! Session management for run artifacts.
//!
//! Each verification run gets its own directory under a configurable base
//! location, holding the report, metrics and timeline documents. Sessions
//! clean up after themselves unless explicitly kept.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// A run session with organized file management
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after the session ends
    pub keep: bool,
}

impl Session {
    /// Create a new session with a unique ID under `base`
    pub fn new(base: &str) -> Self {
        let id = generate_session_id();
        let dir = PathBuf::from(base).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session named after the test under `base`
    pub fn with_name(base: &str, name: &str) -> Self {
        let timestamp = generate_timestamp_suffix();
        let id = format!("{}_{}", sanitize_name(name), timestamp);
        let dir = PathBuf::from(base).join(&id);

        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Create a session in a specific directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);

        Self {
            id,
            dir,
            keep: true, // User-specified directories are kept by default
        }
    }

    /// Set whether to keep files after the session ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Initialize the session directory
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write session metadata
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    /// Path for the deviation report artifact
    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }

    /// Path for the per-phase metrics artifact
    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join("metrics.json")
    }

    /// Path for the analyzed timeline artifact
    pub fn timeline_path(&self) -> PathBuf {
        self.dir.join("timeline.json")
    }

    /// Clean up the session directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("run_{}_{}", timestamp, pid)
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Clean up sessions under `base` older than the specified duration
pub fn cleanup_old_sessions(base: &str, max_age: std::time::Duration) -> std::io::Result<usize> {
    let base = PathBuf::from(base);
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > max_age && fs::remove_dir_all(&path).is_ok() {
                            cleaned += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(cleaned)
}

/// List all existing sessions under `base`
pub fn list_sessions(base: &str) -> std::io::Result<Vec<PathBuf>> {
    let base = PathBuf::from(base);
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}
