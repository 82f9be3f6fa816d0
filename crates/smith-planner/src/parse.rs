//! Candidate cleaning and parsing.
//!
//! Models wrap JSON in markdown fences and commentary; `clean_json_output`
//! strips the noise and isolates the first object. Parsing distinguishes an
//! explicit planner refusal from a plan candidate.

use smith_core::error::PlannerError;
use smith_core::types::Dag;

/// A parsed planner candidate.
#[derive(Debug, Clone)]
pub enum Candidate {
    /// The model declared the request unfulfillable.
    Refusal(String),
    /// A plan to validate.
    Plan(Dag),
}

/// Strips markdown fences and isolates the first `{…}` object.
pub fn clean_json_output(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() >= 3 {
            // Drop the opening and closing fence lines.
            let inner = &lines[1..lines.len() - 1];
            return isolate_object(inner.join("\n").trim());
        }
    }
    isolate_object(text)
}

fn isolate_object(text: &str) -> String {
    let Some(first) = text.find('{') else {
        return text.to_string();
    };
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    text[first..end].to_string()
}

/// Parses a cleaned candidate into a refusal or a plan.
pub fn parse_candidate(cleaned: &str) -> Result<Candidate, PlannerError> {
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| PlannerError::Parse {
            message: e.to_string(),
            last_candidate: cleaned.to_string(),
        })?;

    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let reason = value
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("planner reported an error")
            .to_string();
        return Ok(Candidate::Refusal(reason));
    }

    let dag: Dag = serde_json::from_value(value).map_err(|e| PlannerError::Parse {
        message: e.to_string(),
        last_candidate: cleaned.to_string(),
    })?;
    Ok(Candidate::Plan(dag))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{"status":"success","nodes":[{"id":0,"tool":"echo","function":"run_echo","inputs":{"message":"hi"}}],"final_output_node":0}"#;

    #[test]
    fn test_clean_plain_json() {
        assert_eq!(clean_json_output(PLAN), PLAN);
    }

    #[test]
    fn test_clean_fenced_json() {
        let fenced = format!("```json\n{PLAN}\n```");
        assert_eq!(clean_json_output(&fenced), PLAN);
    }

    #[test]
    fn test_clean_with_commentary() {
        let noisy = format!("Here is the plan you asked for:\n{PLAN}\nHope that helps!");
        assert_eq!(clean_json_output(&noisy), PLAN);
    }

    #[test]
    fn test_parse_plan() {
        let candidate = parse_candidate(PLAN).expect("parse");
        match candidate {
            Candidate::Plan(dag) => {
                assert_eq!(dag.nodes.len(), 1);
                assert_eq!(dag.final_output_node, 0);
            }
            Candidate::Refusal(_) => panic!("expected a plan"),
        }
    }

    #[test]
    fn test_parse_refusal() {
        let candidate = parse_candidate(r#"{"status":"error","error":"no tool for images"}"#)
            .expect("parse");
        match candidate {
            Candidate::Refusal(reason) => assert_eq!(reason, "no tool for images"),
            Candidate::Plan(_) => panic!("expected a refusal"),
        }
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let err = parse_candidate("{nodes: oops").unwrap_err();
        assert!(matches!(err, PlannerError::Parse { .. }));
    }
}
