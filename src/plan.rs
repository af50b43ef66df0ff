//! Planned test steps and how they get into the pipeline.
//!
//! Steps arrive from a planning log: the message transcript a planner agent
//! produced while driving the UI test. Each assistant message that declares a
//! `next_step` becomes one [`TestStep`]; the user message that follows it, if
//! any, is kept as the expected outcome. A small JSON test record
//! ([`TestRecord`]) can accompany the log with the test's name and outcome
//! metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One planned step of the test under verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    /// 1-based position in the plan, strictly increasing within a run.
    pub step_number: u32,
    /// Human-readable intent ("Open the settings page").
    pub description: String,
    /// Concrete action the runner was asked to perform.
    pub action: String,
    /// Outcome the planner expected, when it recorded one.
    pub expected_outcome: Option<String>,
}

/// Metadata about the test run, typically exported by the test harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub test_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

/// Errors while reading or validating plan inputs. These are the only
/// failures that abort a run outright: without a plan there is nothing to
/// verify.
#[derive(Debug)]
pub enum PlanError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Malformed(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Io(e) => write!(f, "failed to read plan input: {}", e),
            PlanError::Json(e) => write!(f, "plan input is not valid JSON: {}", e),
            PlanError::Malformed(msg) => write!(f, "malformed plan input: {}", msg),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Io(e) => Some(e),
            PlanError::Json(e) => Some(e),
            PlanError::Malformed(_) => None,
        }
    }
}

impl From<std::io::Error> for PlanError {
    fn from(e: std::io::Error) -> Self {
        PlanError::Io(e)
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(e: serde_json::Error) -> Self {
        PlanError::Json(e)
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Parses a planning log transcript into ordered test steps.
///
/// The log is a JSON object whose `planner_agent` key holds the message
/// list. Assistant messages carry a structured `content` object; the step
/// description prefers `next_step_summary` and falls back to the raw
/// `next_step` text, which is always kept as the action. A user message
/// directly after the assistant message records the observed/expected
/// outcome at planning time.
pub fn parse_planning_log(content: &str) -> PlanResult<Vec<TestStep>> {
    let data: Value = serde_json::from_str(content)?;
    let messages = data
        .get("planner_agent")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::Malformed("missing planner_agent message list".to_string()))?;

    let mut steps = Vec::new();
    let mut step_number: u32 = 1;
    for (index, message) in messages.iter().enumerate() {
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let Some(body) = message.get("content") else {
            continue;
        };
        let next_step = body.get("next_step").and_then(Value::as_str).unwrap_or("");
        if next_step.is_empty() {
            continue;
        }
        let summary = body
            .get("next_step_summary")
            .and_then(Value::as_str)
            .unwrap_or("");
        let expected_outcome = messages
            .get(index + 1)
            .filter(|next| next.get("role").and_then(Value::as_str) == Some("user"))
            .and_then(|next| next.get("content").and_then(Value::as_str))
            .map(str::to_string);

        steps.push(TestStep {
            step_number,
            description: if summary.is_empty() {
                next_step.to_string()
            } else {
                summary.to_string()
            },
            action: next_step.to_string(),
            expected_outcome,
        });
        step_number += 1;
    }

    debug!("parsed {} step(s) from planning log", steps.len());
    Ok(steps)
}

/// Reads and parses a planning log file.
pub fn load_planning_log(path: impl AsRef<Path>) -> PlanResult<Vec<TestStep>> {
    let content = std::fs::read_to_string(path)?;
    parse_planning_log(&content)
}

/// Parses a test record JSON document.
pub fn parse_test_record(content: &str) -> PlanResult<TestRecord> {
    Ok(serde_json::from_str(content)?)
}

/// Reads and parses a test record file.
pub fn load_test_record(path: impl AsRef<Path>) -> PlanResult<TestRecord> {
    let content = std::fs::read_to_string(path)?;
    parse_test_record(&content)
}

/// Checks the invariants a run relies on: at least one step, and step
/// numbers strictly increasing.
pub fn validate_steps(steps: &[TestStep]) -> PlanResult<()> {
    if steps.is_empty() {
        return Err(PlanError::Malformed(
            "planning log contains no steps".to_string(),
        ));
    }
    for pair in steps.windows(2) {
        if pair[1].step_number <= pair[0].step_number {
            return Err(PlanError::Malformed(format!(
                "step numbers must be strictly increasing: {} followed by {}",
                pair[0].step_number, pair[1].step_number
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLANNING_LOG: &str = r#"{
        "planner_agent": [
            {"role": "system", "content": "You plan UI tests."},
            {"role": "assistant", "content": {
                "next_step": "Click the search icon in the top bar",
                "next_step_summary": "Open search"
            }},
            {"role": "user", "content": "Search bar is focused"},
            {"role": "assistant", "content": {
                "next_step": "Type 'wireless mouse' into the search bar"
            }},
            {"role": "assistant", "content": {"finished": true}}
        ]
    }"#;

    #[test]
    fn test_parse_planning_log_extracts_steps_in_order() {
        let steps = parse_planning_log(PLANNING_LOG).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, 1);
        assert_eq!(steps[0].description, "Open search");
        assert_eq!(steps[0].action, "Click the search icon in the top bar");
        assert_eq!(
            steps[0].expected_outcome.as_deref(),
            Some("Search bar is focused")
        );
        assert_eq!(steps[1].step_number, 2);
        assert_eq!(
            steps[1].description,
            "Type 'wireless mouse' into the search bar"
        );
        assert_eq!(steps[1].expected_outcome, None);
    }

    #[test]
    fn test_parse_planning_log_without_planner_messages() {
        let err = parse_planning_log(r#"{"other_agent": []}"#).unwrap_err();
        assert!(matches!(err, PlanError::Malformed(_)));
    }

    #[test]
    fn test_parse_planning_log_rejects_invalid_json() {
        let err = parse_planning_log("not json").unwrap_err();
        assert!(matches!(err, PlanError::Json(_)));
    }

    #[test]
    fn test_parse_test_record() {
        let record = parse_test_record(
            r#"{"test_name": "checkout_flow", "status": "FAILED", "duration": 42.5}"#,
        )
        .unwrap();
        assert_eq!(record.test_name, "checkout_flow");
        assert_eq!(record.status, "FAILED");
        assert_eq!(record.duration, Some(42.5));
        assert_eq!(record.failure_message, None);
    }

    #[test]
    fn test_validate_steps_rejects_empty_plan() {
        assert!(validate_steps(&[]).is_err());
    }

    #[test]
    fn test_validate_steps_rejects_out_of_order_numbers() {
        let steps = vec![
            TestStep {
                step_number: 2,
                description: "b".to_string(),
                action: "b".to_string(),
                expected_outcome: None,
            },
            TestStep {
                step_number: 1,
                description: "a".to_string(),
                action: "a".to_string(),
                expected_outcome: None,
            },
        ];
        let err = validate_steps(&steps).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_validate_steps_accepts_gaps() {
        let steps = vec![
            TestStep {
                step_number: 1,
                description: "a".to_string(),
                action: "a".to_string(),
                expected_outcome: None,
            },
            TestStep {
                step_number: 5,
                description: "b".to_string(),
                action: "b".to_string(),
                expected_outcome: None,
            },
        ];
        assert!(validate_steps(&steps).is_ok());
    }
}
