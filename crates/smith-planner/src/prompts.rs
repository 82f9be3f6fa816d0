//! Prompt templates for plan generation and repair.
//!
//! The planner is a compiler front-end: the system prompt instructs the
//! model to emit nothing but the JSON execution graph, constrained to the
//! registry embedded verbatim in the prompt.

use smith_tools::ToolRegistry;

pub(crate) const PLANNER_SYSTEM_PROMPT: &str = r#"
You are a COMPILER that transforms a user request into a JSON execution graph.
You do NOT write text. You do NOT answer the request. You ONLY produce the JSON graph.

──────────────────── CRITICAL: NO HALLUCINATIONS ────────────────────
You must ONLY use tools listed in the TOOL REGISTRY below.
If a tool is not listed, it DOES NOT EXIST. Do not invent tools.
Do not invent parameters. Use EXACT parameter names.

If you cannot solve the request with available tools, return:
{ "status": "error", "error": "Cannot fulfill request with available tools." }

──────────────────── GRAPH RULES ────────────────────
Each node in "nodes" represents ONE tool execution.
{
  "id": <int, MUST START AT 0 AND INCREMENT BY 1>,
  "tool": "<string, MUST MATCH REGISTRY EXACTLY>",
  "function": "<string, MUST MATCH REGISTRY EXACTLY>",
  "inputs": { <key>: <value> },
  "depends_on": [ <int_ids_of_previous_steps> ],
  "retry": 2,
  "timeout": 45,
  "on_fail": "halt",
  "metadata": { "purpose": "<string, why this step exists>" }
}

──────────────────── MULTI-TOOL RULES ────────────────────
1. IDS MUST be 0-based indices (0, 1, 2...).
2. Identify dependencies explicitly. If step 1 needs step 0's output, step 1 MUST have "depends_on": [0].
3. Dependency values flow through graph edges automatically. Do NOT write
   template placeholders in inputs; the ONLY exception is {{steps.N.path}}
   inside a synthesis prompt, where N must be a declared dependency.
4. The FINAL node must be the one producing the user's answer.

──────────────────── OUTPUT FORMAT ────────────────────
{
  "status": "success",
  "nodes": [ ... ],
  "final_output_node": <int_id>
}

TOOL REGISTRY:
{{TOOL_REGISTRY}}

USER REQUEST:
{{USER_REQUEST}}
"#;

pub(crate) const REPAIR_PROMPT_TEMPLATE: &str = r#"
PLANNER ERROR: YOUR PREVIOUS PLAN WAS INVALID.

You violated the strict tool registry or syntax rules.
You must regenerate the plan correcting the specific error below.

ERROR:
{{ERROR_MSG}}

INVALID PLAN:
{{LAST_OUTPUT}}

TOOL REGISTRY (ONLY USE THESE):
{{TOOL_REGISTRY}}

USER REQUEST:
{{USER_REQUEST}}

Return ONLY the corrected JSON. No apologies.
"#;

pub(crate) const SYNTAX_REPAIR_PROMPT: &str = r#"
You are a strict JSON syntax fixer.

You will be given text that is INTENDED to be a single JSON object describing a
plan, but it contains syntax errors.

YOUR JOB:
- Fix ONLY the JSON SYNTAX.
- Do NOT change content more than necessary.
- Return ONLY a single valid JSON object.

<<<BROKEN_JSON_START>>>
{{BROKEN_JSON}}
<<<BROKEN_JSON_END>>>

JSON parser error:
"{{PARSE_ERROR}}"

Return corrected JSON:
"#;

/// Renders the registry view embedded in planner prompts: name,
/// description, function handle, parameter schema, and safety/resource
/// flags for every tool.
pub fn render_registry(registry: &ToolRegistry) -> String {
    let view: Vec<serde_json::Value> = registry
        .list_all()
        .iter()
        .map(|desc| {
            serde_json::json!({
                "name": desc.name,
                "description": desc.description,
                "function": desc.function,
                "parameters": desc.parameters,
                "dangerous": desc.dangerous,
                "domain": desc.domain,
                "output_type": desc.output_type,
                "resources": desc.resources,
            })
        })
        .collect();
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| "[]".to_string())
}

/// Assembles the first-attempt prompt.
pub fn planner_prompt(registry_json: &str, utterance: &str) -> String {
    PLANNER_SYSTEM_PROMPT
        .replace("{{TOOL_REGISTRY}}", registry_json)
        .replace("{{USER_REQUEST}}", utterance)
}

/// Assembles a repair prompt carrying the invalid candidate and its error.
pub fn repair_prompt(
    registry_json: &str,
    utterance: &str,
    last_output: &str,
    error: &str,
) -> String {
    REPAIR_PROMPT_TEMPLATE
        .replace("{{TOOL_REGISTRY}}", registry_json)
        .replace("{{LAST_OUTPUT}}", last_output)
        .replace("{{ERROR_MSG}}", error)
        .replace("{{USER_REQUEST}}", utterance)
}

/// Assembles the syntax-only repair prompt.
pub fn syntax_repair_prompt(broken_json: &str, parse_error: &str) -> String {
    SYNTAX_REPAIR_PROMPT
        .replace("{{BROKEN_JSON}}", broken_json)
        .replace("{{PARSE_ERROR}}", parse_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smith_tools::ToolDescriptor;

    #[test]
    fn test_registry_rendering() {
        let registry = ToolRegistry::from_descriptors(vec![ToolDescriptor::new(
            "echo", "run_echo",
        )
        .with_param("message", "string", true)])
        .expect("registry");

        let rendered = render_registry(&registry);
        assert!(rendered.contains("\"name\": \"echo\""));
        assert!(rendered.contains("\"function\": \"run_echo\""));
        assert!(rendered.contains("message"));
    }

    #[test]
    fn test_prompt_substitution() {
        let prompt = planner_prompt("[REGISTRY]", "find cats");
        assert!(prompt.contains("[REGISTRY]"));
        assert!(prompt.contains("find cats"));
        assert!(!prompt.contains("{{TOOL_REGISTRY}}"));
        assert!(!prompt.contains("{{USER_REQUEST}}"));
    }

    #[test]
    fn test_repair_prompt_carries_error() {
        let prompt = repair_prompt("[R]", "q", "{bad}", "duplicate node id 1");
        assert!(prompt.contains("duplicate node id 1"));
        assert!(prompt.contains("{bad}"));
    }
}
