//! Structural validation of a candidate plan: the hard gate between the
//! stochastic planner and the deterministic runtime.
//!
//! A plan that passes this gate is safe to execute: every tool exists,
//! every input conforms to its schema, the dependency relation is acyclic
//! by construction (each dependency id is strictly below its dependent),
//! and the final output node exists.

use std::collections::HashSet;

use smith_core::placeholder::{find_placeholders, Placeholder};
use smith_core::types::{Dag, DagNode, Value};
use smith_tools::{validate_inputs, ToolDescriptor, ToolRegistry};

/// Marks tools whose output is model-written prose rather than fetched or
/// computed data. Step references and the narrative rules apply to these.
pub fn is_synthesis(descriptor: &ToolDescriptor) -> bool {
    descriptor.domain == "reasoning" || descriptor.output_type == "synthesis"
}

/// Keyword heuristic: does the utterance ask for a written narrative?
pub fn expects_narrative(utterance: &str) -> bool {
    const NARRATIVE_HINTS: &[&str] = &[
        "report", "write", "summar", "essay", "article", "narrative", "explain", "compare",
        "analyze", "analyse",
    ];
    let lowered = utterance.to_lowercase();
    NARRATIVE_HINTS.iter().any(|kw| lowered.contains(kw))
}

/// Validates a candidate plan against the registry.
///
/// Returns the offending rule as a human-readable reason; the planner
/// feeds it back to the model verbatim in the repair prompt.
pub fn validate_dag(
    dag: &Dag,
    registry: &ToolRegistry,
    narrative_expected: bool,
) -> Result<(), String> {
    if dag.nodes.is_empty() {
        return Err("Missing or empty 'nodes' list.".to_string());
    }

    // Ids must be unique and densely numbered from 0.
    let mut id_set = HashSet::with_capacity(dag.nodes.len());
    for node in &dag.nodes {
        if !id_set.insert(node.id) {
            return Err(format!("Duplicate node id {}.", node.id));
        }
    }
    for expected in 0..dag.nodes.len() as u64 {
        if !id_set.contains(&expected) {
            return Err(format!(
                "Node ids must be dense 0..{}; id {} is missing.",
                dag.nodes.len() - 1,
                expected
            ));
        }
    }

    for node in &dag.nodes {
        validate_node(node, registry, &id_set)?;
    }

    if !id_set.contains(&dag.final_output_node) {
        return Err("Invalid or missing 'final_output_node' id.".to_string());
    }

    validate_synthesis_rules(dag, registry, narrative_expected)?;

    Ok(())
}

fn validate_node(
    node: &DagNode,
    registry: &ToolRegistry,
    id_set: &HashSet<u64>,
) -> Result<(), String> {
    let nid = node.id;

    if node.tool.is_empty() || node.function.is_empty() {
        return Err(format!("Node {nid}: missing 'tool' or 'function'."));
    }

    let Some(descriptor) = registry.lookup(&node.tool) else {
        return Err(format!("Node {nid}: tool '{}' not in registry.", node.tool));
    };

    if node.function != descriptor.function {
        return Err(format!(
            "Node {nid}: invalid function '{}' for tool '{}' (expected '{}').",
            node.function, node.tool, descriptor.function
        ));
    }

    validate_inputs(descriptor, &node.inputs).map_err(|e| format!("Node {nid}: {e}."))?;
    validate_placeholders(node, descriptor)?;

    for &dep in &node.depends_on {
        if !id_set.contains(&dep) {
            return Err(format!(
                "Node {nid}: depends_on references unknown id {dep}."
            ));
        }
        if dep >= nid {
            return Err(format!(
                "Node {nid}: depends_on id {dep} must be < {nid} to avoid cycles."
            ));
        }
    }

    if let Some(timeout) = node.timeout {
        if timeout <= 0.0 {
            return Err(format!("Node {nid}: 'timeout' must be positive."));
        }
    }

    Ok(())
}

/// Placeholders are forbidden everywhere except recognized step references
/// inside a synthesis tool's `prompt`, and a reference may only name a
/// declared dependency.
fn validate_placeholders(node: &DagNode, descriptor: &ToolDescriptor) -> Result<(), String> {
    let synthesis = is_synthesis(descriptor);
    for (key, value) in &node.inputs {
        for text in string_leaves(value) {
            for placeholder in find_placeholders(text) {
                match placeholder {
                    Placeholder::Unknown(inner) => {
                        return Err(format!(
                            "Node {}: input '{key}' contains template placeholder '{{{{{inner}}}}}'; \
                             dependency values must flow via graph edges.",
                            node.id
                        ));
                    }
                    Placeholder::Step(step) => {
                        if !(synthesis && key == "prompt") {
                            return Err(format!(
                                "Node {}: step reference in input '{key}' is only allowed in a \
                                 synthesis prompt.",
                                node.id
                            ));
                        }
                        if !node.depends_on.contains(&step.node_id) {
                            return Err(format!(
                                "Node {}: prompt references step {} which is not in depends_on.",
                                node.id, step.node_id
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn string_leaves(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().flat_map(string_leaves).collect(),
        Value::Object(map) => map.values().flat_map(string_leaves).collect(),
        _ => Vec::new(),
    }
}

/// Narrative composition rules: when the request demands a written answer,
/// the final node must be a synthesis node; multiple synthesis nodes must
/// form a linear dependency chain so prose composes in order.
fn validate_synthesis_rules(
    dag: &Dag,
    registry: &ToolRegistry,
    narrative_expected: bool,
) -> Result<(), String> {
    let mut synthesis_ids: Vec<u64> = dag
        .nodes
        .iter()
        .filter(|n| registry.lookup(&n.tool).is_some_and(is_synthesis))
        .map(|n| n.id)
        .collect();
    synthesis_ids.sort_unstable();

    if narrative_expected {
        let final_is_synthesis = dag
            .node(dag.final_output_node)
            .and_then(|n| registry.lookup(&n.tool))
            .is_some_and(is_synthesis);
        if !final_is_synthesis {
            return Err(format!(
                "final_output_node {} must be a synthesis node for a narrative request.",
                dag.final_output_node
            ));
        }
    }

    for pair in synthesis_ids.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let depends = dag
            .node(next)
            .map(|n| n.depends_on.contains(&prev))
            .unwrap_or(false);
        if !depends {
            return Err(format!(
                "Synthesis node {next} must depend on synthesis node {prev} to compose a linear \
                 narrative."
            ));
        }
    }

    Ok(())
}
