//! Tool descriptor model.
//!
//! Descriptors are the registry's unit of truth: name, callable handle,
//! parameter schema, and safety/resource flags. They are loaded once from a
//! static file at startup and immutable thereafter. Unknown fields are
//! preserved through a flattened map so older binaries can carry newer
//! registry files without data loss.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use smith_core::types::Value;

/// Declared type of one tool parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// JSON-schema-style type name: `string`, `integer`, `number`,
    /// `boolean`, `array`, or `object`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable description, shown to the planner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default value applied when the argument is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Parameter schema for one tool (`type: "object"` with named properties).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Always `"object"` in practice; kept for wire fidelity.
    #[serde(rename = "type", default = "default_object_kind")]
    pub kind: String,
    /// Named parameters.
    #[serde(default)]
    pub properties: HashMap<String, PropertySpec>,
    /// Names that must be present in a node's inputs.
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_object_kind() -> String {
    "object".to_string()
}

/// One entry of the tool registry file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Globally unique tool name. Registry-file entries may omit it and
    /// inherit their map key.
    #[serde(default)]
    pub name: String,
    /// What the tool does, shown to the planner.
    #[serde(default)]
    pub description: String,
    /// Opaque handle resolved to a callable at execution time.
    pub function: String,
    /// Tools flagged dangerous are gated on external approval.
    #[serde(default)]
    pub dangerous: bool,
    /// Authority domain (`data`, `reasoning`, `computation`, `system`).
    #[serde(default)]
    pub domain: String,
    /// Shape of the tool's output, for planner guidance.
    #[serde(default)]
    pub output_type: String,
    /// Input parameter schema.
    #[serde(default)]
    pub parameters: ParameterSchema,
    /// Named resources the tool must hold exclusively while running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Per-tool default deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<f64>,
    /// Minimum interval between invocations, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rate_interval: Option<f64>,
    /// Free-text operator notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Forward-compatibility: unrecognized fields survive a round trip.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ToolDescriptor {
    /// Creates a minimal descriptor for programmatic registration.
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        ToolDescriptor {
            name: name.into(),
            description: String::new(),
            function: function.into(),
            dangerous: false,
            domain: String::new(),
            output_type: String::new(),
            parameters: ParameterSchema::default(),
            resources: Vec::new(),
            default_timeout: None,
            default_rate_interval: None,
            notes: None,
            extra: HashMap::new(),
        }
    }

    /// Adds a parameter to the schema.
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.parameters.properties.insert(
            name.clone(),
            PropertySpec {
                kind: kind.into(),
                description: String::new(),
                default: None,
            },
        );
        if required {
            self.parameters.required.push(name);
        }
        self
    }

    /// Flags the tool dangerous.
    pub fn with_dangerous(mut self, dangerous: bool) -> Self {
        self.dangerous = dangerous;
        self
    }

    /// Declares exclusive resources.
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the per-tool rate interval in seconds.
    pub fn with_rate_interval(mut self, seconds: f64) -> Self {
        self.default_rate_interval = Some(seconds);
        self
    }

    /// Sets the per-tool default deadline in seconds.
    pub fn with_default_timeout(mut self, seconds: f64) -> Self {
        self.default_timeout = Some(seconds);
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
