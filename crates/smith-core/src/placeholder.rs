//! Textual references to upstream node outputs.
//!
//! A synthesis prompt may reference a dependency's committed output with
//! `{{steps.N}}` or `{{steps.N.path.to.field}}`. The reference form is the
//! textual spelling of a graph edge; any other `{{…}}` sequence is a
//! template placeholder and is rejected at validation time.
//!
//! Paths are dotted with optional bracket indices (`result[0].title` and
//! `result.0.title` are equivalent).

use crate::types::{NodeId, Value};

/// A parsed `{{steps.N.path}}` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRef {
    /// Referenced node id.
    pub node_id: NodeId,
    /// Path into the node's output; empty means the whole output.
    pub path: String,
}

/// One `{{…}}` occurrence found in a text input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// A recognized step reference.
    Step(StepRef),
    /// Any other `{{…}}` sequence (invalid in a validated plan).
    Unknown(String),
}

/// Scans `text` for `{{…}}` occurrences.
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated braces still count as a stray placeholder.
            found.push(Placeholder::Unknown(after.trim().to_string()));
            break;
        };
        let inner = after[..end].trim();
        match parse_step_ref(inner) {
            Some(step) => found.push(Placeholder::Step(step)),
            None => found.push(Placeholder::Unknown(inner.to_string())),
        }
        rest = &after[end + 2..];
    }
    found
}

/// Parses `steps.N` / `steps.N.path` (case-insensitive prefix).
fn parse_step_ref(inner: &str) -> Option<StepRef> {
    let lowered = inner.to_ascii_lowercase();
    let tail = lowered.strip_prefix("steps.")?;
    let id_len = tail.chars().take_while(|c| c.is_ascii_digit()).count();
    if id_len == 0 {
        return None;
    }
    let node_id: NodeId = tail[..id_len].parse().ok()?;
    let path = match tail.as_bytes().get(id_len) {
        None => String::new(),
        Some(b'.') => inner[("steps.".len() + id_len + 1)..].to_string(),
        Some(_) => return None,
    };
    Some(StepRef { node_id, path })
}

/// Replaces every recognized step reference in `text` using `resolve`.
///
/// Unresolvable references (and null outputs) render as the empty string;
/// structured values render as compact JSON.
pub fn substitute<F>(text: &str, mut resolve: F) -> String
where
    F: FnMut(&StepRef) -> Value,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let inner = after[..end].trim();
        match parse_step_ref(inner) {
            Some(step) => out.push_str(&resolve(&step).render()),
            // Leave unrecognized sequences untouched.
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Resolves a dotted / indexed path against a value.
///
/// Returns `Value::Null` when any segment is missing. A single-key
/// `result`/`results` wrapper object is unwrapped first, matching the
/// common tool output container shape.
pub fn deep_get(value: &Value, path: &str) -> Value {
    let mut current = unwrap_result_container(value);
    if path.is_empty() {
        return current.clone();
    }

    let normalized = path.replace('[', ".").replace(']', "");
    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// Unwraps `{"status": ..., "result": X}` style containers to `X`.
fn unwrap_result_container(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        if map.len() <= 4 {
            if let Some(inner) = map.get("result").or_else(|| map.get("results")) {
                return inner;
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_find_step_refs() {
        let found = find_placeholders("use {{steps.0}} and {{ STEPS.2.result.title }}");
        assert_eq!(
            found,
            vec![
                Placeholder::Step(StepRef {
                    node_id: 0,
                    path: String::new()
                }),
                Placeholder::Step(StepRef {
                    node_id: 2,
                    path: "result.title".to_string()
                }),
            ]
        );
    }

    #[test]
    fn test_find_unknown_placeholder() {
        let found = find_placeholders("value is {{answer}}");
        assert_eq!(found, vec![Placeholder::Unknown("answer".to_string())]);
    }

    #[test]
    fn test_unterminated_braces_flagged() {
        let found = find_placeholders("broken {{steps.1");
        assert!(matches!(found[0], Placeholder::Unknown(_)));
    }

    #[test]
    fn test_substitute() {
        let out = substitute("a={{steps.0}}, b={{steps.1.x}}", |step| {
            if step.node_id == 0 {
                Value::from("zero")
            } else {
                Value::Null
            }
        });
        assert_eq!(out, "a=zero, b=");
    }

    #[test]
    fn test_substitute_leaves_unknown() {
        let out = substitute("keep {{verbatim}}", |_| Value::from("x"));
        assert_eq!(out, "keep {{verbatim}}");
    }

    #[test]
    fn test_deep_get_paths() {
        let mut inner = HashMap::new();
        inner.insert(
            "items".to_string(),
            Value::from(vec![Value::from("first"), Value::from("second")]),
        );
        let mut outer = HashMap::new();
        outer.insert("status".to_string(), Value::from("success"));
        outer.insert("result".to_string(), Value::Object(inner));
        let value = Value::Object(outer);

        // The result container unwraps transparently.
        assert_eq!(deep_get(&value, "items.1"), Value::from("second"));
        assert_eq!(deep_get(&value, "items[0]"), Value::from("first"));
        assert_eq!(deep_get(&value, "items.9"), Value::Null);
        assert_eq!(deep_get(&value, "missing"), Value::Null);
    }

    #[test]
    fn test_deep_get_empty_path_returns_whole() {
        let value = Value::from(7i64);
        assert_eq!(deep_get(&value, ""), Value::from(7i64));
    }
}
