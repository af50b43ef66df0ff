//! Evidence gathering: locating each planned step in the timeline.
//!
//! [`EvidenceGatherer`] walks the steps in plan order and keeps a temporal
//! cursor so evidence can only be found at or after the previous step's
//! strongest match. Matching is keyword-driven: keywords extracted from the
//! step text are searched across event descriptions, UI elements and visible
//! text, candidates are scored, and the strongest match becomes the step's
//! [`StepEvidence`].

use crate::plan::TestStep;
use crate::timeline::{TimelineEvent, VideoTimeline};
use crate::triage::contains_negative_indicator;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "into", "onto", "over",
    "for", "of", "with", "is", "are", "was", "were", "be", "been", "that", "this", "it", "as",
    "by", "from", "should", "will",
];

const MAX_KEYWORDS: usize = 15;
const MAX_STORED_EVENTS: usize = 5;
const MAX_SUMMARY_EVENTS: usize = 3;

/// What the timeline shows for one planned step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvidence {
    /// Whether any event matched the step's keywords after the cursor.
    pub found: bool,
    /// Derived confidence in `[0, 1]`; 0.0 when nothing was found.
    pub confidence: f64,
    /// Timestamp of the strongest match.
    pub timestamp: Option<f64>,
    pub frame_number: Option<u32>,
    /// Candidate events, strongest first.
    #[serde(default)]
    pub matching_events: Vec<TimelineEvent>,
    /// Description of the strongest match.
    pub description: String,
    /// How the evidence was derived, including a short event summary.
    pub reasoning: String,
}

impl StepEvidence {
    pub fn not_found(reasoning: String) -> Self {
        StepEvidence {
            found: false,
            confidence: 0.0,
            timestamp: None,
            frame_number: None,
            matching_events: Vec::new(),
            description: "No matching events found in timeline".to_string(),
            reasoning,
        }
    }
}

/// Gathers per-step evidence from a timeline, in plan order.
pub struct EvidenceGatherer<'a> {
    timeline: &'a VideoTimeline,
}

impl<'a> EvidenceGatherer<'a> {
    pub fn new(timeline: &'a VideoTimeline) -> Self {
        EvidenceGatherer { timeline }
    }

    /// Evidence for every step. The cursor starts at 0.0 and advances to the
    /// strongest match's timestamp whenever a step is found, so evidence
    /// timestamps never move backwards. Steps with no match leave the cursor
    /// where it was.
    pub fn gather(&self, steps: &[TestStep]) -> Vec<StepEvidence> {
        let mut cursor = 0.0_f64;
        let mut evidence = Vec::with_capacity(steps.len());
        for step in steps {
            let item = self.step_evidence(step, cursor);
            if let (true, Some(ts)) = (item.found, item.timestamp) {
                cursor = ts;
                info!(
                    "step {}: evidence at {:.1}s (confidence {:.2})",
                    step.step_number, ts, item.confidence
                );
            } else {
                warn!(
                    "step {}: no matching events after {:.1}s",
                    step.step_number, cursor
                );
            }
            evidence.push(item);
        }
        evidence
    }

    /// Evidence for a single step, considering only events at or after
    /// `min_timestamp`.
    pub fn step_evidence(&self, step: &TestStep, min_timestamp: f64) -> StepEvidence {
        let keywords = extract_keywords(&step.description, &step.action);
        debug!(
            "step {}: searching with keywords {:?} from {:.1}s",
            step.step_number, keywords, min_timestamp
        );

        let matches = self.timeline.find_events_matching(&keywords, min_timestamp);
        if matches.is_empty() {
            return StepEvidence::not_found(format!(
                "Searched for keywords: {} after timestamp {:.1}s - no matches",
                keywords.join(", "),
                min_timestamp
            ));
        }

        // Prefer events matching at least two keywords; single-keyword
        // matches are only kept when nothing stronger exists.
        let strong: Vec<TimelineEvent> = matches
            .iter()
            .filter(|event| matched_keywords(event, &keywords).len() >= 2)
            .cloned()
            .collect();
        let candidates = if strong.is_empty() { matches } else { strong };

        let mut scored: Vec<(f64, TimelineEvent)> = candidates
            .into_iter()
            .map(|event| (score_event(&event, &keywords), event))
            .collect();
        // Strongest first; equal scores resolve to the earlier timestamp.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.timestamp.partial_cmp(&b.1.timestamp).unwrap_or(Ordering::Equal))
        });

        let best = scored[0].1.clone();
        let best_matched = matched_keywords(&best, &keywords);
        let ratio = best_matched.len() as f64 / keywords.len().max(1) as f64;

        let mut confidence = best.confidence;
        if ratio >= 0.7 {
            confidence += 0.15;
        } else if ratio >= 0.5 {
            confidence += 0.10;
        } else if ratio >= 0.3 {
            confidence += 0.05;
        }
        if min_timestamp > 0.0 {
            confidence += 0.05;
        }
        // A lone weak match is a poor basis for a verdict.
        if scored.len() == 1 && ratio < 0.4 {
            confidence = (confidence - 0.2).max(0.5);
        }

        let summary = scored
            .iter()
            .take(MAX_SUMMARY_EVENTS)
            .enumerate()
            .map(|(i, (_, event))| {
                let matched = matched_keywords(event, &keywords);
                format!(
                    "[{}] {:.1}s: {}... (matched: {})",
                    i + 1,
                    event.timestamp,
                    truncate(&event.description, 100),
                    matched.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join(" | ");
        let mut reasoning = format!(
            "Found {} matching events. Best match at {:.1}s with {}/{} keyword matches. Evidence: {}",
            scored.len(),
            best.timestamp,
            best_matched.len(),
            keywords.len(),
            summary
        );

        // Candidates that both confirm and deny the step cannot support a
        // confident verdict on their own.
        let negatives: Vec<&TimelineEvent> = scored
            .iter()
            .map(|(_, event)| event)
            .filter(|event| contains_negative_indicator(&event.description))
            .collect();
        if !negatives.is_empty() && negatives.len() < scored.len() {
            confidence = confidence.min(0.4);
            let conflict = negatives[0];
            reasoning.push_str(&format!(
                " Conflicting evidence at {:.1}s: {}",
                conflict.timestamp,
                truncate(&conflict.description, 100)
            ));
            debug!(
                "step {}: conflicting candidates, confidence capped at 0.4",
                step.step_number
            );
        }

        let confidence = confidence.clamp(0.0, 1.0);
        let matching_events: Vec<TimelineEvent> = scored
            .into_iter()
            .take(MAX_STORED_EVENTS)
            .map(|(_, event)| event)
            .collect();

        StepEvidence {
            found: true,
            confidence,
            timestamp: Some(best.timestamp),
            frame_number: Some(best.frame_number),
            matching_events,
            description: best.description,
            reasoning,
        }
    }
}

/// Search keywords for a step: quoted phrases from the step text first, then
/// individual words with stop words removed. Case-folded, de-duplicated,
/// capped at 15.
pub fn extract_keywords(description: &str, action: &str) -> Vec<String> {
    let text = format!("{} {}", description, action).to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    for (i, chunk) in text.split('"').enumerate() {
        if i % 2 == 1 && chunk.chars().count() > 2 && !keywords.iter().any(|k| k == chunk) {
            keywords.push(chunk.to_string());
        }
    }
    for word in text.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.chars().count() > 2
            && !STOP_WORDS.contains(&word)
            && !keywords.iter().any(|k| k == word)
        {
            keywords.push(word.to_string());
        }
    }
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

fn matched_keywords<'k>(event: &TimelineEvent, keywords: &'k [String]) -> Vec<&'k str> {
    let haystack = event.haystack();
    keywords
        .iter()
        .filter(|kw| haystack.contains(kw.as_str()))
        .map(|kw| kw.as_str())
        .collect()
}

fn score_event(event: &TimelineEvent, keywords: &[String]) -> f64 {
    let haystack = event.haystack();
    let matched = keywords
        .iter()
        .filter(|kw| haystack.contains(kw.as_str()))
        .count();
    let mut score = matched as f64 / keywords.len().max(1) as f64;

    let description = event.description.to_lowercase();
    for kw in keywords {
        if kw.chars().count() > 3 && description.contains(kw.as_str()) {
            score += 0.2;
        }
    }
    score += match event.event_type.as_str() {
        "click" | "type" => 0.1,
        "ui_change" => 0.05,
        "assertion" => 0.15,
        _ => 0.0,
    };
    (score + event.confidence) / 2.0
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::VideoTimeline;

    fn step(number: u32, description: &str, action: &str) -> TestStep {
        TestStep {
            step_number: number,
            description: description.to_string(),
            action: action.to_string(),
            expected_outcome: None,
        }
    }

    fn event(timestamp: f64, description: &str, confidence: f64) -> TimelineEvent {
        TimelineEvent {
            timestamp,
            frame_number: timestamp as u32,
            event_type: String::new(),
            description: description.to_string(),
            ui_elements: Vec::new(),
            text_visible: Vec::new(),
            confidence,
        }
    }

    fn timeline(events: Vec<TimelineEvent>) -> VideoTimeline {
        VideoTimeline::new(60.0, 120, events, String::new(), Vec::new())
    }

    #[test]
    fn test_cursor_only_moves_forward() {
        let timeline = timeline(vec![
            event(5.0, "login form submitted successfully", 0.9),
            event(10.0, "dashboard page loaded", 0.9),
            event(15.0, "login banner shown again", 0.9),
        ]);
        let steps = vec![
            step(1, "submit the login form", "click login submit"),
            step(2, "see the dashboard", "wait for dashboard page"),
            step(3, "observe login banner", "check login banner"),
        ];
        let evidence = EvidenceGatherer::new(&timeline).gather(&steps);

        assert_eq!(evidence[0].timestamp, Some(5.0));
        assert_eq!(evidence[1].timestamp, Some(10.0));
        // The earlier login event at 5.0 is behind the cursor by now.
        assert_eq!(evidence[2].timestamp, Some(15.0));

        let mut last = 0.0;
        for item in &evidence {
            let ts = item.timestamp.unwrap();
            assert!(ts >= last);
            last = ts;
        }
    }

    #[test]
    fn test_cursor_unchanged_when_step_not_found() {
        let timeline = timeline(vec![
            event(5.0, "settings panel opened", 0.9),
            event(12.0, "profile page displayed", 0.9),
        ]);
        let steps = vec![
            step(1, "open settings panel", "click settings"),
            step(2, "frobnicate the widget", "frobnicate widget"),
            step(3, "open profile page", "click profile"),
        ];
        let evidence = EvidenceGatherer::new(&timeline).gather(&steps);

        assert!(!evidence[1].found);
        assert_eq!(evidence[1].confidence, 0.0);
        // Step 3 still searches from step 1's timestamp, not from zero.
        assert_eq!(evidence[2].timestamp, Some(12.0));
    }

    #[test]
    fn test_strong_keyword_match_bonus() {
        let timeline = timeline(vec![event(
            8.0,
            "settings panel opened after gear click",
            0.8,
        )]);
        let steps = vec![step(1, "open settings panel", "click the gear")];
        let evidence = EvidenceGatherer::new(&timeline).gather(&steps);

        // All keywords (open, settings, panel, click, gear) match: +0.15.
        assert!((evidence[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_bonus_after_cursor_advances() {
        let tl = timeline(vec![event(9.0, "settings panel opened after gear click", 0.7)]);
        let gatherer = EvidenceGatherer::new(&tl);
        let s = step(1, "open settings panel", "click the gear");

        let from_zero = gatherer.step_evidence(&s, 0.0);
        let mid_run = gatherer.step_evidence(&s, 4.0);
        assert!((from_zero.confidence - 0.85).abs() < 1e-9);
        assert!((mid_run.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_single_weak_match_is_penalized() {
        let tl = timeline(vec![event(3.0, "filter controls visible", 0.9)]);
        let gatherer = EvidenceGatherer::new(&tl);
        // Keywords: filter, products, brand, apply; only "filter" matches.
        let s = step(1, "filter products by brand", "apply brand filter");

        let evidence = gatherer.step_evidence(&s, 0.0);
        assert!(evidence.found);
        assert!((evidence.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_weak_match_penalty_has_floor() {
        let tl = timeline(vec![event(3.0, "filter controls visible", 0.55)]);
        let gatherer = EvidenceGatherer::new(&tl);
        let s = step(1, "filter products by brand", "apply brand filter");

        let evidence = gatherer.step_evidence(&s, 0.0);
        assert!((evidence.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_conflicting_candidates_cap_confidence() {
        let tl = timeline(vec![
            event(4.0, "brand filter applied to products", 0.95),
            event(6.0, "brand filter failed with error", 0.95),
        ]);
        let steps = vec![step(1, "apply the brand filter", "apply brand filter to products")];
        let evidence = EvidenceGatherer::new(&tl).gather(&steps);

        assert!(evidence[0].found);
        assert!(evidence[0].confidence <= 0.4);
        assert!(evidence[0].reasoning.contains("Conflicting evidence"));
    }

    #[test]
    fn test_ties_resolve_to_earlier_event() {
        let tl = timeline(vec![
            event(20.0, "cart icon clicked", 0.9),
            event(8.0, "cart icon clicked", 0.9),
        ]);
        let steps = vec![step(1, "open the cart", "click cart icon")];
        let evidence = EvidenceGatherer::new(&tl).gather(&steps);
        assert_eq!(evidence[0].timestamp, Some(8.0));
    }

    #[test]
    fn test_not_found_reports_search_window() {
        let tl = timeline(vec![event(2.0, "irrelevant", 0.9)]);
        let gatherer = EvidenceGatherer::new(&tl);
        let evidence = gatherer.step_evidence(&step(1, "open checkout", "click checkout"), 7.5);

        assert!(!evidence.found);
        assert_eq!(evidence.description, "No matching events found in timeline");
        assert!(evidence.reasoning.contains("after timestamp 7.5s"));
        assert!(evidence.reasoning.contains("no matches"));
    }

    #[test]
    fn test_reasoning_summarizes_best_match() {
        let tl = timeline(vec![event(8.0, "settings panel opened after gear click", 0.8)]);
        let evidence = EvidenceGatherer::new(&tl)
            .gather(&[step(1, "open settings panel", "click the gear")]);
        assert!(evidence[0].reasoning.contains("Best match at 8.0s"));
        assert!(evidence[0].reasoning.contains("matched:"));
    }

    #[test]
    fn test_extract_keywords_quoted_phrases_first() {
        let keywords = extract_keywords(
            "Type \"wireless mouse\" into the search field",
            "type search query",
        );
        assert_eq!(
            keywords,
            vec![
                "wireless mouse",
                "type",
                "wireless",
                "mouse",
                "search",
                "field",
                "query"
            ]
        );
    }

    #[test]
    fn test_extract_keywords_drops_stop_words_and_short_words() {
        let keywords = extract_keywords("Go to the cart and pay", "");
        assert_eq!(keywords, vec!["cart", "pay"]);

        let keywords = extract_keywords("Drag the card onto the board", "hover over the column");
        assert_eq!(keywords, vec!["drag", "card", "board", "hover", "column"]);
    }

    #[test]
    fn test_extract_keywords_caps_at_fifteen() {
        let description = "alpha bravo charlie delta echo foxtrot golf hotel india juliett \
                           kilo lima mike november oscar papa quebec";
        let keywords = extract_keywords(description, "");
        assert_eq!(keywords.len(), 15);
    }
}
