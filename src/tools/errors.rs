//! Tool error types.

use serde_json::json;
use thiserror::Error;

/// Errors that can occur while registering or dispatching tools.
///
/// Only `DuplicateName` is fatal, and only at startup. The rest are per-call
/// and are fed back to the model as a tool-result payload.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments were not valid JSON or did not match the tool's schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    ArgsInvalid { tool: String, reason: String },

    /// The model asked for a tool that is not registered.
    #[error("unknown tool: '{name}'")]
    NotFound { name: String },

    /// The tool ran and reported (or panicked with) a failure.
    #[error("tool '{tool}' failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    /// The tool did not finish within the per-call bound.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    /// Two tools registered under one name.
    #[error("tool '{name}' is registered more than once")]
    DuplicateName { name: String },
}

impl ToolError {
    /// Stable machine-readable kind, used in payloads and wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ArgsInvalid { .. } => "tool_args_invalid",
            ToolError::NotFound { .. } => "tool_not_found",
            ToolError::ExecutionFailed { .. } => "tool_execution_failed",
            ToolError::Timeout { .. } => "tool_timeout",
            ToolError::DuplicateName { .. } => "tool_duplicate_name",
        }
    }

    /// The tool-result payload reported to the model for this failure.
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}
