//! Built-in tools used by the CLI demo registry and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use smith_core::types::Value;

use crate::descriptor::ToolDescriptor;
use crate::tool::{Tool, ToolError};

/// Echoes its `message` argument back.
pub struct EchoTool;

impl EchoTool {
    /// Descriptor matching this tool's schema.
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("echo", "run_echo")
            .with_description("Echo a message back unchanged")
            .with_param("message", "string", true)
    }
}

#[async_trait]
impl Tool for EchoTool {
    async fn call(&self, args: HashMap<String, Value>) -> Result<Value, ToolError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::permanent("missing 'message' argument"))?;
        Ok(Value::from(format!("Echo: {message}")))
    }
}

/// Sleeps for `seconds`, then returns `message` (or `"done"`).
///
/// Exists to exercise timeouts and concurrency without external I/O.
pub struct SleepTool;

impl SleepTool {
    /// Descriptor matching this tool's schema.
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("sleep", "run_sleep")
            .with_description("Sleep for a number of seconds, then return a message")
            .with_param("seconds", "number", true)
            .with_param("message", "string", false)
    }
}

#[async_trait]
impl Tool for SleepTool {
    async fn call(&self, args: HashMap<String, Value>) -> Result<Value, ToolError> {
        let seconds = args
            .get("seconds")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::permanent("missing 'seconds' argument"))?;
        if seconds < 0.0 {
            return Err(ToolError::permanent("'seconds' must be >= 0"));
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("done");
        Ok(Value::from(message))
    }
}
