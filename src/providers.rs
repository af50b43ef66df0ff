//! Provider seams for video frames, OCR text and vision analysis.
//!
//! The pipeline never talks to capture tooling, OCR engines or vision models
//! directly; it goes through these traits. The shipped implementations cover
//! the file-based workflow (a directory of extracted frames, a precomputed
//! OCR map, a provider-produced timeline document) and the in-memory statics
//! that tests script against.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plan::TestStep;
use crate::timeline::VideoTimeline;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors from frame, OCR or vision collaborators
#[derive(Debug)]
pub enum ProviderError {
    /// IO error reading provider inputs
    Io(std::io::Error),
    /// Provider produced output the pipeline cannot use
    Parse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Io(e) => write!(f, "IO error: {}", e),
            ProviderError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Io(e) => Some(e),
            ProviderError::Parse(_) => None,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e)
    }
}

/// One extracted video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRef {
    pub frame_number: u32,
    /// Seconds from the start of the recording.
    pub timestamp: f64,
    /// Opaque handle the providers understand, typically a file path.
    pub frame_id: String,
}

/// One piece of text read off a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFragment {
    pub text: String,
    pub confidence: f64,
}

/// Source of extracted frames for a recording.
pub trait FrameProvider: Send + Sync {
    /// Lists frames ordered by frame number.
    fn list_frames(&self) -> ProviderResult<Vec<FrameRef>>;
}

/// Text recognition over a single frame.
pub trait OcrProvider: Send + Sync {
    fn extract_text(&self, frame: &FrameRef) -> ProviderResult<Vec<OcrFragment>>;
}

/// Vision analysis that turns frames plus context into a timeline.
///
/// One call covers the whole recording; the provider sees the key frames,
/// any OCR text keyed by frame number, and the planned steps for context.
pub trait VisionProvider: Send + Sync {
    fn analyze(
        &self,
        frames: &[FrameRef],
        ocr_text: &BTreeMap<u32, Vec<String>>,
        steps: &[TestStep],
    ) -> ProviderResult<VideoTimeline>;
}

// ============================================================================
// Frame providers
// ============================================================================

/// Frames extracted to a directory, one image per frame, named
/// `frame_NNNN_SS.SSSs.EXT` (frame number, then timestamp in seconds).
pub struct DirFrameProvider {
    dir: PathBuf,
}

impl DirFrameProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FrameProvider for DirFrameProvider {
    fn list_frames(&self) -> ProviderResult<Vec<FrameRef>> {
        let mut frames = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            // Files that don't follow the naming scheme are not frames
            let (frame_number, timestamp) = match parse_frame_name(stem) {
                Some(parsed) => parsed,
                None => continue,
            };
            frames.push(FrameRef {
                frame_number,
                timestamp,
                frame_id: path.to_string_lossy().into_owned(),
            });
        }
        frames.sort_by_key(|f| f.frame_number);
        Ok(frames)
    }
}

/// Parses a frame file stem like `frame_0012_3.450s`.
fn parse_frame_name(stem: &str) -> Option<(u32, f64)> {
    let mut parts = stem.splitn(3, '_');
    if parts.next()? != "frame" {
        return None;
    }
    let frame_number: u32 = parts.next()?.parse().ok()?;
    let timestamp: f64 = parts.next()?.strip_suffix('s')?.parse().ok()?;
    Some((frame_number, timestamp))
}

/// Fixed in-memory frame list.
pub struct StaticFrames {
    frames: Vec<FrameRef>,
}

impl StaticFrames {
    pub fn new(frames: Vec<FrameRef>) -> Self {
        Self { frames }
    }

    pub fn empty() -> Self {
        Self { frames: Vec::new() }
    }
}

impl FrameProvider for StaticFrames {
    fn list_frames(&self) -> ProviderResult<Vec<FrameRef>> {
        Ok(self.frames.clone())
    }
}

// ============================================================================
// OCR providers
// ============================================================================

/// OCR that reads nothing. The pipeline degrades gracefully without text.
pub struct NullOcr;

impl OcrProvider for NullOcr {
    fn extract_text(&self, _frame: &FrameRef) -> ProviderResult<Vec<OcrFragment>> {
        Ok(Vec::new())
    }
}

/// Precomputed OCR results loaded from a JSON document mapping frame numbers
/// to fragments: `{"3": [{"text": "Submit", "confidence": 0.92}]}`.
#[derive(Debug)]
pub struct FileOcr {
    by_frame: HashMap<u32, Vec<OcrFragment>>,
}

impl FileOcr {
    pub fn from_file(path: &Path) -> ProviderResult<Self> {
        let content = fs::read_to_string(path)?;
        let raw: HashMap<String, Vec<OcrFragment>> = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Parse(format!("invalid OCR map: {}", e)))?;
        let mut by_frame = HashMap::new();
        for (key, fragments) in raw {
            let frame_number: u32 = key.parse().map_err(|_| {
                ProviderError::Parse(format!("non-numeric OCR frame key: {}", key))
            })?;
            by_frame.insert(frame_number, fragments);
        }
        Ok(Self { by_frame })
    }
}

impl OcrProvider for FileOcr {
    fn extract_text(&self, frame: &FrameRef) -> ProviderResult<Vec<OcrFragment>> {
        Ok(self
            .by_frame
            .get(&frame.frame_number)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Vision providers
// ============================================================================

/// Vision analysis read from a provider-produced timeline JSON document.
pub struct TimelineFile {
    path: PathBuf,
}

impl TimelineFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VisionProvider for TimelineFile {
    fn analyze(
        &self,
        _frames: &[FrameRef],
        _ocr_text: &BTreeMap<u32, Vec<String>>,
        _steps: &[TestStep],
    ) -> ProviderResult<VideoTimeline> {
        let content = fs::read_to_string(&self.path)?;
        VideoTimeline::from_json(&content)
            .map_err(|e| ProviderError::Parse(format!("invalid timeline document: {}", e)))
    }
}

/// Fixed in-memory timeline.
pub struct StaticTimeline {
    timeline: VideoTimeline,
}

impl StaticTimeline {
    pub fn new(timeline: VideoTimeline) -> Self {
        Self { timeline }
    }
}

impl VisionProvider for StaticTimeline {
    fn analyze(
        &self,
        _frames: &[FrameRef],
        _ocr_text: &BTreeMap<u32, Vec<String>>,
        _steps: &[TestStep],
    ) -> ProviderResult<VideoTimeline> {
        Ok(self.timeline.clone())
    }
}

/// Picks at most `max` frames spread across the recording: always the first
/// and last, with the rest at even spacing. Order is preserved.
pub fn select_key_frames(frames: &[FrameRef], max: usize) -> Vec<FrameRef> {
    if frames.len() <= max {
        return frames.to_vec();
    }
    if max == 0 {
        return Vec::new();
    }
    if max == 1 {
        return vec![frames[0].clone()];
    }

    let mut indices: Vec<usize> = vec![0];
    for i in 1..max - 1 {
        let idx = i * frames.len() / (max - 1);
        if !indices.contains(&idx) {
            indices.push(idx);
        }
    }
    let last = frames.len() - 1;
    if !indices.contains(&last) {
        indices.push(last);
    }

    indices.into_iter().map(|i| frames[i].clone()).collect()
}
