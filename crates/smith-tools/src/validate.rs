//! Input validation against a tool's parameter schema.
//!
//! Used twice per node: by the planner's hard gate over literal inputs, and
//! by the invoker at dispatch time over resolved inputs. `Null` is accepted
//! for any declared type because dependencies that failed under the
//! `continue` policy publish null slots.

use std::collections::HashMap;
use thiserror::Error;

use smith_core::types::Value;

use crate::descriptor::ToolDescriptor;

/// A schema violation in a node's inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Input key not declared by the tool's schema.
    #[error("invalid input '{key}' for tool '{tool}'")]
    UnknownKey {
        /// The undeclared key.
        key: String,
        /// Tool being validated.
        tool: String,
    },

    /// A required key is absent.
    #[error("missing required input '{key}' for tool '{tool}'")]
    MissingRequired {
        /// The absent key.
        key: String,
        /// Tool being validated.
        tool: String,
    },

    /// A value does not conform to the declared type.
    #[error("input '{key}' for tool '{tool}' must be {expected}, got {got}")]
    TypeMismatch {
        /// The offending key.
        key: String,
        /// Tool being validated.
        tool: String,
        /// Declared type name.
        expected: String,
        /// Actual value kind.
        got: String,
    },
}

/// Validates `inputs` against the descriptor's parameter schema.
pub fn validate_inputs(
    descriptor: &ToolDescriptor,
    inputs: &HashMap<String, Value>,
) -> Result<(), InputError> {
    let schema = &descriptor.parameters;

    for key in inputs.keys() {
        if !schema.properties.contains_key(key) {
            return Err(InputError::UnknownKey {
                key: key.clone(),
                tool: descriptor.name.clone(),
            });
        }
    }

    for required in &schema.required {
        if !inputs.contains_key(required) {
            return Err(InputError::MissingRequired {
                key: required.clone(),
                tool: descriptor.name.clone(),
            });
        }
    }

    for (key, value) in inputs {
        let spec = &schema.properties[key];
        if !conforms(value, &spec.kind) {
            return Err(InputError::TypeMismatch {
                key: key.clone(),
                tool: descriptor.name.clone(),
                expected: spec.kind.clone(),
                got: kind_of(value).to_string(),
            });
        }
    }

    Ok(())
}

/// Checks a value against a declared type name, with integer/number
/// coercion in both directions (a whole float is an acceptable integer).
fn conforms(value: &Value, declared: &str) -> bool {
    if value.is_null() {
        return true;
    }
    match declared {
        "string" => value.as_str().is_some(),
        "boolean" => value.as_bool().is_some(),
        "integer" => value.as_i64().is_some(),
        "number" => value.as_number().is_some(),
        "array" => value.as_array().is_some(),
        "object" => value.as_object().is_some(),
        // Unknown declared types accept anything.
        _ => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_integer() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
