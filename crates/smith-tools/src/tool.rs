//! The callable contract behind every registry descriptor.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use smith_core::types::Value;

/// Failure of a tool call.
///
/// `retryable` distinguishes transient failures (network hiccups, upstream
/// 5xx) that the invoker may retry from permanent ones (bad arguments,
/// unsupported operation) that it must surface immediately.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ToolError {
    /// Human-readable failure description.
    pub message: String,
    /// Whether the invoker may retry this attempt.
    pub retryable: bool,
}

impl ToolError {
    /// A transient failure the invoker may retry.
    pub fn retryable(message: impl Into<String>) -> Self {
        ToolError {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent failure that must not be retried.
    pub fn permanent(message: impl Into<String>) -> Self {
        ToolError {
            message: message.into(),
            retryable: false,
        }
    }
}

/// A named, stateless callable.
///
/// Implementations must return an owned [`Value`] (or an error) within the
/// deadline the invoker enforces around the call; outputs are captured
/// structurally for the trace, never as live handles.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Executes the tool with validated arguments.
    async fn call(&self, args: HashMap<String, Value>) -> Result<Value, ToolError>;
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;

/// Adapter that turns an async closure into a [`Tool`].
///
/// The workhorse of test fixtures and programmatic bindings.
pub struct FnTool {
    inner: Arc<dyn Fn(HashMap<String, Value>) -> ToolFuture + Send + Sync>,
}

impl FnTool {
    /// Wraps a function returning a boxed future.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(HashMap<String, Value>) -> ToolFuture + Send + Sync + 'static,
    {
        FnTool { inner: Arc::new(f) }
    }

    /// Wraps a plain synchronous function.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(HashMap<String, Value>) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        FnTool {
            inner: Arc::new(move |args| {
                let out = f(args);
                Box::pin(async move { out })
            }),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    async fn call(&self, args: HashMap<String, Value>) -> Result<Value, ToolError> {
        (self.inner)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_tool_sync() {
        let tool = FnTool::from_sync(|args| {
            let name = args
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("nobody")
                .to_string();
            Ok(Value::from(format!("hi {name}")))
        });

        let mut args = HashMap::new();
        args.insert("name".to_string(), Value::from("smith"));
        let out = tool.call(args).await.expect("call");
        assert_eq!(out.as_str(), Some("hi smith"));
    }

    #[tokio::test]
    async fn test_fn_tool_async() {
        let tool = FnTool::new(|_args| Box::pin(async { Ok(Value::from(1i64)) }));
        let out = tool.call(HashMap::new()).await.expect("call");
        assert_eq!(out.as_i64(), Some(1));
    }

    #[test]
    fn test_error_classes() {
        assert!(ToolError::retryable("503").retryable);
        assert!(!ToolError::permanent("bad args").retryable);
    }
}
