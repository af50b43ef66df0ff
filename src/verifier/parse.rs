//! Parsing of verifier responses into [`StepAssessment`]s.
//!
//! Model output is messy: markdown fences, leading prose, chatty epilogues.
//! Parsing slices out the outermost JSON value and reads fields defensively;
//! an unknown status becomes uncertain rather than an error, while a body
//! with no JSON at all is an [`VerifierError::InvalidResponse`].

use crate::report::StepStatus;
use serde_json::Value;

use super::types::{StepAssessment, VerifierError, VerifierResult};

/// Parses a single-step response.
pub(crate) fn parse_assessment(text: &str) -> VerifierResult<StepAssessment> {
    let json = extract_json(text).ok_or_else(|| {
        VerifierError::InvalidResponse("no JSON value in verifier output".to_string())
    })?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| VerifierError::InvalidResponse(format!("unparseable JSON: {}", e)))?;
    Ok(assessment_from_value(&value))
}

/// Parses a batch response. Assessments come back positionally; entries past
/// `expected` are dropped, and a short array yields a short vector.
pub(crate) fn parse_batch(text: &str, expected: usize) -> VerifierResult<Vec<StepAssessment>> {
    let json = extract_json(text).ok_or_else(|| {
        VerifierError::InvalidResponse("no JSON value in verifier output".to_string())
    })?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| VerifierError::InvalidResponse(format!("unparseable JSON: {}", e)))?;
    let entries = value.as_array().ok_or_else(|| {
        VerifierError::InvalidResponse("batch response is not a JSON array".to_string())
    })?;
    Ok(entries
        .iter()
        .take(expected)
        .map(assessment_from_value)
        .collect())
}

fn assessment_from_value(value: &Value) -> StepAssessment {
    let status = parse_status(value.get("status").and_then(Value::as_str).unwrap_or(""));
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5);
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let contradiction = if value
        .get("contradiction_detected")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        value
            .get("contradiction_details")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
            .map(str::to_string)
    } else {
        None
    };
    StepAssessment {
        status,
        confidence,
        reasoning,
        contradiction,
    }
}

/// Maps a status string to a verdict; anything unrecognized is uncertain.
pub(crate) fn parse_status(raw: &str) -> StepStatus {
    match raw.trim().to_lowercase().as_str() {
        "observed" => StepStatus::Observed,
        "deviation" => StepStatus::Deviation,
        _ => StepStatus::Uncertain,
    }
}

/// Slices the outermost JSON value out of model output: strips one markdown
/// fence if present, then cuts from the first opening bracket to the last
/// matching closing bracket.
fn extract_json(text: &str) -> Option<&str> {
    let mut text = text.trim();
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        text = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }
    let object = text.find('{');
    let array = text.find('[');
    let (open, close) = match (object, array) {
        (Some(o), Some(a)) if a < o => ('[', ']'),
        (Some(_), _) => ('{', '}'),
        (None, Some(_)) => ('[', ']'),
        (None, None) => return None,
    };
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_assessment() {
        let assessment = parse_assessment(
            r#"{"status": "observed", "confidence": 0.85, "reasoning": "the panel opened",
                "contradiction_detected": false, "contradiction_details": null}"#,
        )
        .unwrap();
        assert_eq!(assessment.status, StepStatus::Observed);
        assert_eq!(assessment.confidence, 0.85);
        assert_eq!(assessment.reasoning, "the panel opened");
        assert_eq!(assessment.contradiction, None);
    }

    #[test]
    fn test_parse_fenced_assessment() {
        let text = "Here is my judgement:\n```json\n{\"status\": \"deviation\", \"confidence\": 0.9, \"reasoning\": \"wrong page\"}\n```\nLet me know if you need more.";
        let assessment = parse_assessment(text).unwrap();
        assert_eq!(assessment.status, StepStatus::Deviation);
        assert_eq!(assessment.reasoning, "wrong page");
    }

    #[test]
    fn test_parse_assessment_with_leading_prose() {
        let text = "I looked at the evidence carefully. {\"status\": \"uncertain\", \"confidence\": 0.4, \"reasoning\": \"ambiguous\"}";
        let assessment = parse_assessment(text).unwrap();
        assert_eq!(assessment.status, StepStatus::Uncertain);
    }

    #[test]
    fn test_unknown_status_maps_to_uncertain() {
        let assessment =
            parse_assessment(r#"{"status": "confirmed!", "confidence": 0.9, "reasoning": "x"}"#)
                .unwrap();
        assert_eq!(assessment.status, StepStatus::Uncertain);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let assessment = parse_assessment(r#"{"status": "observed"}"#).unwrap();
        assert_eq!(assessment.confidence, 0.5);
        assert_eq!(assessment.reasoning, "");
    }

    #[test]
    fn test_contradiction_requires_details() {
        let with_details = parse_assessment(
            r#"{"status": "observed", "contradiction_detected": true,
                "contradiction_details": "an error dialog is on screen"}"#,
        )
        .unwrap();
        assert_eq!(
            with_details.contradiction.as_deref(),
            Some("an error dialog is on screen")
        );

        let without = parse_assessment(
            r#"{"status": "observed", "contradiction_detected": true,
                "contradiction_details": null}"#,
        )
        .unwrap();
        assert_eq!(without.contradiction, None);

        let not_flagged = parse_assessment(
            r#"{"status": "observed", "contradiction_detected": false,
                "contradiction_details": "stale text"}"#,
        )
        .unwrap();
        assert_eq!(not_flagged.contradiction, None);
    }

    #[test]
    fn test_no_json_is_invalid_response() {
        let err = parse_assessment("I cannot answer that.").unwrap_err();
        assert!(matches!(err, VerifierError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_batch_positional() {
        let text = r#"[
            {"step_number": 2, "status": "observed", "confidence": 0.8, "reasoning": "a"},
            {"step_number": 3, "status": "deviation", "confidence": 0.7, "reasoning": "b"}
        ]"#;
        let batch = parse_batch(text, 2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].status, StepStatus::Observed);
        assert_eq!(batch[1].status, StepStatus::Deviation);
    }

    #[test]
    fn test_parse_batch_short_response() {
        let text = r#"[{"status": "observed", "confidence": 0.8, "reasoning": "a"}]"#;
        let batch = parse_batch(text, 3).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_parse_batch_excess_entries_dropped() {
        let text = r#"[
            {"status": "observed", "reasoning": "a"},
            {"status": "observed", "reasoning": "b"},
            {"status": "observed", "reasoning": "c"}
        ]"#;
        let batch = parse_batch(text, 2).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_parse_batch_rejects_object() {
        let err = parse_batch(r#"{"status": "observed"}"#, 1).unwrap_err();
        assert!(matches!(err, VerifierError::InvalidResponse(_)));
    }

    #[test]
    fn test_extract_json_prefers_array_when_first() {
        let text = r#"[{"a": 1}] and also {"b": 2} as prose"#;
        assert_eq!(extract_json(text), Some(r#"[{"a": 1}]"#));
    }
}
