//! Video-derived evidence timeline.
//!
//! A [`VideoTimeline`] is the structured record of what actually happened on
//! screen during a test run: a list of [`TimelineEvent`]s ordered by
//! timestamp, plus a free-text narrative and key observations. Timelines are
//! produced by a vision provider (or loaded from a previously exported JSON
//! document) and are read-only for the rest of the pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single observed moment in the recording.
///
/// `confidence` is the vision provider's own certainty about the observation
/// and defaults to 1.0 when the source document omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Seconds from the start of the recording.
    pub timestamp: f64,
    /// Frame the observation was made on.
    #[serde(default)]
    pub frame_number: u32,
    /// Free-form category: "click", "type", "ui_change", "navigation",
    /// "assertion", ...
    #[serde(default)]
    pub event_type: String,
    /// What was observed.
    pub description: String,
    /// UI elements visible at this moment.
    #[serde(default)]
    pub ui_elements: Vec<String>,
    /// Text fragments readable on screen.
    #[serde(default)]
    pub text_visible: Vec<String>,
    #[serde(default = "default_event_confidence")]
    pub confidence: f64,
}

fn default_event_confidence() -> f64 {
    1.0
}

impl TimelineEvent {
    /// All searchable text of this event, lowercased: description, UI
    /// elements and visible text joined into one haystack.
    pub fn haystack(&self) -> String {
        let mut text = self.description.to_lowercase();
        for element in &self.ui_elements {
            text.push(' ');
            text.push_str(&element.to_lowercase());
        }
        for fragment in &self.text_visible {
            text.push(' ');
            text.push_str(&fragment.to_lowercase());
        }
        text
    }

    /// Case-insensitive substring match against the event's haystack.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        self.haystack().contains(&keyword.to_lowercase())
    }
}

/// Complete evidence timeline for one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTimeline {
    #[serde(default)]
    pub total_duration: f64,
    #[serde(default)]
    pub total_frames_analyzed: u32,
    /// Events ordered ascending by timestamp. Constructors establish the
    /// ordering; queries rely on it.
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
    /// Prose account of the whole recording.
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub key_observations: Vec<String>,
}

impl VideoTimeline {
    pub fn new(
        total_duration: f64,
        total_frames_analyzed: u32,
        mut events: Vec<TimelineEvent>,
        narrative: String,
        key_observations: Vec<String>,
    ) -> Self {
        sort_events(&mut events);
        VideoTimeline {
            total_duration,
            total_frames_analyzed,
            events,
            narrative,
            key_observations,
        }
    }

    /// Parses a timeline JSON document and restores the timestamp ordering.
    /// Missing optional fields take their defaults, so sparse provider
    /// output still loads.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let mut timeline: VideoTimeline = serde_json::from_str(content)?;
        sort_events(&mut timeline.events);
        Ok(timeline)
    }

    /// Events at or after `min_timestamp` matching at least one keyword,
    /// in ascending timestamp order. An empty keyword list matches nothing.
    pub fn find_events_matching(
        &self,
        keywords: &[String],
        min_timestamp: f64,
    ) -> Vec<TimelineEvent> {
        self.events
            .iter()
            .filter(|event| event.timestamp >= min_timestamp)
            .filter(|event| keywords.iter().any(|kw| event.matches_keyword(kw)))
            .cloned()
            .collect()
    }

    /// Events in the inclusive window `[start, end]`, ascending.
    pub fn events_between(&self, start: f64, end: f64) -> Vec<TimelineEvent> {
        self.events
            .iter()
            .filter(|event| event.timestamp >= start && event.timestamp <= end)
            .cloned()
            .collect()
    }
}

fn sort_events(events: &mut [TimelineEvent]) {
    events.sort_by(|a, b| {
        a.timestamp
            .partial_cmp(&b.timestamp)
            .unwrap_or(Ordering::Equal)
    });
}
