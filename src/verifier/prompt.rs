//! Prompt construction for the endpoint and CLI verifiers.
//!
//! The engine never sees these strings; clients build them from the
//! [`VerifyRequest`](super::VerifyRequest) they were handed.

use crate::evidence::truncate;
use super::types::VerifyRequest;

const NARRATIVE_EXCERPT_CHARS: usize = 500;
const EVENT_CHARS: usize = 120;
const PRIOR_CHARS: usize = 60;
const MAX_PROMPT_EVENTS: usize = 3;

const PREAMBLE: &str = "You are a meticulous QA engineer reviewing evidence recovered from a \
screen recording of an automated UI test.\n\
Keyword overlap alone is not proof that a step happened. Prefer \"uncertain\" over a false \
positive, and report a \"deviation\" when the evidence describes the opposite of the expected \
outcome.\n";

const RESPONSE_FORMAT: &str = "\nRespond with ONLY a JSON object:\n\
{\"status\": \"observed\" | \"deviation\" | \"uncertain\", \"confidence\": 0.0-1.0, \
\"reasoning\": \"one or two sentences\", \"contradiction_detected\": true | false, \
\"contradiction_details\": \"what contradicts the step\" | null}\n";

const BATCH_RESPONSE_FORMAT: &str = "\nRespond with ONLY a JSON array holding one object per \
step, in the same order as listed:\n\
[{\"step_number\": 1, \"status\": \"observed\" | \"deviation\" | \"uncertain\", \
\"confidence\": 0.0-1.0, \"reasoning\": \"...\", \"contradiction_detected\": false, \
\"contradiction_details\": null}, ...]\n";

pub(crate) fn build_step_prompt(request: &VerifyRequest) -> String {
    let mut prompt = String::from(PREAMBLE);

    push_step_block(&mut prompt, request);

    if !request.prior.is_empty() {
        prompt.push_str("\nPREVIOUS STEP RESULTS:\n");
        for prior in &request.prior {
            prompt.push_str(&format!(
                "- Step {}: {} - {}\n",
                prior.step_number,
                prior.status,
                truncate(&prior.description, PRIOR_CHARS)
            ));
        }
    }
    push_narrative(&mut prompt, request.narrative.as_deref());
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

pub(crate) fn build_batch_prompt(requests: &[VerifyRequest]) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("Judge each step below independently.\n");

    if let Some(first) = requests.first() {
        push_narrative(&mut prompt, first.narrative.as_deref());
        if !first.prior.is_empty() {
            prompt.push_str("\nPREVIOUS STEP RESULTS:\n");
            for prior in &first.prior {
                prompt.push_str(&format!(
                    "- Step {}: {} - {}\n",
                    prior.step_number,
                    prior.status,
                    truncate(&prior.description, PRIOR_CHARS)
                ));
            }
        }
    }

    prompt.push_str("\nSTEPS TO VERIFY:\n");
    for request in requests {
        push_step_block(&mut prompt, request);
    }
    prompt.push_str(BATCH_RESPONSE_FORMAT);
    prompt
}

fn push_step_block(prompt: &mut String, request: &VerifyRequest) {
    let step = &request.step;
    let evidence = &request.evidence;
    prompt.push_str(&format!(
        "\nStep {}:\n\
         - Description: {}\n\
         - Action Taken: {}\n\
         - Expected Outcome: {}\n\
         - Evidence Found: {}\n\
         - Match Confidence: {:.2}\n\
         - Video Timestamp: {}\n\
         - Best Match: {}\n\
         - Evidence Reasoning: {}\n",
        step.step_number,
        step.description,
        step.action,
        step.expected_outcome.as_deref().unwrap_or("not recorded"),
        evidence.found,
        evidence.confidence,
        match evidence.timestamp {
            Some(ts) => format!("{:.1}s", ts),
            None => "none".to_string(),
        },
        evidence.description,
        evidence.reasoning,
    ));
    if !evidence.matching_events.is_empty() {
        prompt.push_str("- Matching Events:\n");
        for event in evidence.matching_events.iter().take(MAX_PROMPT_EVENTS) {
            let event_type = if event.event_type.is_empty() {
                "event"
            } else {
                &event.event_type
            };
            prompt.push_str(&format!(
                "    [{:.1}s] {}: {}\n",
                event.timestamp,
                event_type,
                truncate(&event.description, EVENT_CHARS)
            ));
        }
    }
}

fn push_narrative(prompt: &mut String, narrative: Option<&str>) {
    if let Some(narrative) = narrative.filter(|n| !n.is_empty()) {
        prompt.push_str(&format!(
            "\nVIDEO NARRATIVE (excerpt):\n{}\n",
            truncate(narrative, NARRATIVE_EXCERPT_CHARS)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::StepEvidence;
    use crate::plan::TestStep;
    use crate::report::StepStatus;
    use crate::verifier::PriorOutcome;

    fn request(step_number: u32) -> VerifyRequest {
        VerifyRequest {
            step: TestStep {
                step_number,
                description: format!("open panel {}", step_number),
                action: format!("click panel {}", step_number),
                expected_outcome: Some("panel visible".to_string()),
            },
            evidence: StepEvidence {
                found: true,
                confidence: 0.62,
                timestamp: Some(4.5),
                frame_number: Some(9),
                matching_events: Vec::new(),
                description: "panel opened".to_string(),
                reasoning: "Found 1 matching events.".to_string(),
            },
            prior: vec![PriorOutcome {
                step_number: 1,
                status: StepStatus::Observed,
                description: "logged in".to_string(),
            }],
            narrative: Some("The user logs in and browses panels.".to_string()),
        }
    }

    #[test]
    fn test_step_prompt_carries_step_and_evidence() {
        let prompt = build_step_prompt(&request(2));
        assert!(prompt.contains("open panel 2"));
        assert!(prompt.contains("click panel 2"));
        assert!(prompt.contains("Match Confidence: 0.62"));
        assert!(prompt.contains("Video Timestamp: 4.5s"));
        assert!(prompt.contains("Step 1: observed - logged in"));
        assert!(prompt.contains("Respond with ONLY a JSON object"));
    }

    #[test]
    fn test_step_prompt_truncates_narrative() {
        let mut req = request(1);
        req.narrative = Some("n".repeat(2000));
        let prompt = build_step_prompt(&req);
        assert!(!prompt.contains(&"n".repeat(501)));
        assert!(prompt.contains(&"n".repeat(500)));
    }

    #[test]
    fn test_batch_prompt_lists_every_step_once() {
        let prompt = build_batch_prompt(&[request(1), request(2), request(3)]);
        for n in 1..=3 {
            assert!(prompt.contains(&format!("open panel {}", n)));
        }
        assert!(prompt.contains("JSON array"));
        // Shared context appears once, not per step.
        assert_eq!(prompt.matches("VIDEO NARRATIVE").count(), 1);
    }
}
