//! Tool registry: descriptor catalog plus callable bindings.
//!
//! The registry is the sole source of truth the planner embeds in its
//! prompt and the sole authority the orchestrator uses to resolve a node's
//! callable. It is built once at startup from a descriptor file and never
//! mutated afterwards; callable bindings are attached by `function` handle
//! before execution begins.

use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use smith_core::error::RuntimeError;

use crate::descriptor::ToolDescriptor;
use crate::tool::Tool;

/// In-memory catalog of tool descriptors with callable bindings.
///
/// Cloning or filtering (`without`) shares the binding table, so a
/// sub-agent's narrowed registry still resolves the same callables.
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
    bindings: Arc<DashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Builds a registry from descriptors, rejecting duplicate names.
    pub fn from_descriptors(descriptors: Vec<ToolDescriptor>) -> Result<Self, RuntimeError> {
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for (idx, desc) in descriptors.iter().enumerate() {
            if by_name.insert(desc.name.clone(), idx).is_some() {
                return Err(RuntimeError::State(format!(
                    "duplicate tool name '{}' in registry",
                    desc.name
                )));
            }
        }
        tracing::info!(tools = descriptors.len(), "Tool registry loaded");
        Ok(ToolRegistry {
            descriptors,
            by_name,
            bindings: Arc::new(DashMap::new()),
        })
    }

    /// Parses the registry file format: a map keyed by tool name.
    ///
    /// Each entry must carry a `name` matching its key (entries without a
    /// conflicting name inherit the key).
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| RuntimeError::State(format!("registry parse error: {e}")))?;

        let mut descriptors = Vec::with_capacity(raw.len());
        for (key, entry) in raw {
            let mut desc: ToolDescriptor = serde_json::from_value(entry).map_err(|e| {
                RuntimeError::State(format!("registry entry '{key}' is invalid: {e}"))
            })?;
            if desc.name.is_empty() {
                desc.name = key.clone();
            } else if desc.name != key {
                return Err(RuntimeError::State(format!(
                    "registry key '{key}' does not match entry name '{}'",
                    desc.name
                )));
            }
            descriptors.push(desc);
        }
        // Stable ordering for prompt rendering.
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Self::from_descriptors(descriptors)
    }

    /// Loads the registry file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RuntimeError::State(format!(
                "cannot read registry file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&text)
    }

    /// Binds a callable to a `function` handle.
    pub fn bind(&self, function_id: impl Into<String>, tool: Arc<dyn Tool>) {
        self.bindings.insert(function_id.into(), tool);
    }

    /// Looks up a descriptor by tool name.
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&idx| &self.descriptors[idx])
    }

    /// All descriptors, in name order.
    pub fn list_all(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// True when the tool name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True when the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Resolves a descriptor's callable.
    pub fn resolve(&self, descriptor: &ToolDescriptor) -> Result<Arc<dyn Tool>, RuntimeError> {
        self.bindings
            .get(&descriptor.function)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::UnresolvedFunction {
                function_id: descriptor.function.clone(),
            })
    }

    /// Checks that every descriptor's `function` handle has a binding.
    ///
    /// Run once at startup so unresolvable handles fail before any plan
    /// executes rather than mid-run.
    pub fn verify_bindings(&self) -> Result<(), RuntimeError> {
        for desc in &self.descriptors {
            if !self.bindings.contains_key(&desc.function) {
                return Err(RuntimeError::UnresolvedFunction {
                    function_id: desc.function.clone(),
                });
            }
        }
        Ok(())
    }

    /// A filtered view excluding the named tools, sharing bindings.
    ///
    /// Sub-agents run against `without(&["sub_agent"])` to prevent
    /// unbounded recursion.
    pub fn without(&self, excluded: &[&str]) -> ToolRegistry {
        let descriptors: Vec<ToolDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| !excluded.contains(&d.name.as_str()))
            .cloned()
            .collect();
        let by_name = descriptors
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.name.clone(), idx))
            .collect();
        ToolRegistry {
            descriptors,
            by_name,
            bindings: Arc::clone(&self.bindings),
        }
    }
}
