//! Tool registry: a fixed table of tools built once at startup.
//!
//! Provides:
//! - The advertisement payload sent to the model every round
//! - Uniform dispatch by name, with typed argument decoding
//! - Containment: timeouts, errors and panics become structured results

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::ToolError;
use crate::inference::types::ToolDefinition;

/// Default wall-clock bound for one tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Tool trait ──────────────────────────────────────────────────────────────

/// A callable tool with a typed argument struct.
///
/// `Args` is decoded from the model's JSON before `call` runs, so a tool
/// body never sees unknown or missing fields. Declare `Args` with
/// `#[serde(deny_unknown_fields)]` to reject extras.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of `Args`, advertised to the model verbatim.
    fn parameters(&self) -> Value;

    async fn call(&self, args: Self::Args) -> Result<Value, ToolError>;
}

/// Object-safe view of a [`Tool`], taking untyped JSON arguments.
#[async_trait]
trait DynTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: T::Args =
            serde_json::from_value(arguments).map_err(|e| ToolError::ArgsInvalid {
                tool: self.name().to_string(),
                reason: e.to_string(),
            })?;
        self.call(args).await
    }
}

// ─── ToolCallResult ──────────────────────────────────────────────────────────

/// Result of dispatching one tool call. Never a propagated failure.
#[derive(Debug)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub outcome: Result<Value, ToolError>,
    pub elapsed_ms: u64,
}

impl ToolCallResult {
    /// The JSON reported back to the model (and to the client).
    pub fn payload(&self) -> Value {
        match &self.outcome {
            Ok(value) => value.clone(),
            Err(e) => e.to_payload(),
        }
    }
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Process-wide tool table. Read-only once requests are being served.
pub struct ToolRegistry {
    /// Registration order is advertisement order.
    tools: Vec<Box<dyn DynTool>>,
    by_name: HashMap<String, usize>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry with the default call timeout.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn set_call_timeout(&mut self, timeout_ms: u64) {
        self.call_timeout = Duration::from_millis(timeout_ms);
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Register a tool. A duplicate name is a configuration error.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), ToolError> {
        let name = tool.name();
        if self.by_name.contains_key(name) {
            return Err(ToolError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.by_name.insert(name.to_string(), self.tools.len());
        self.tools.push(Box::new(tool));
        Ok(())
    }


    /// Return all registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<(&str, usize)> = self
            .by_name
            .iter()
            .map(|(name, idx)| (name.as_str(), *idx))
            .collect();
        names.sort_by_key(|(_, idx)| *idx);
        names.into_iter().map(|(name, _)| name).collect()
    }

    /// Definitions for every tool, in the provider's `tools` format.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up and invoke a tool.
    ///
    /// Unknown names, argument decoding failures, tool errors, panics and
    /// timeouts all come back as `Err` inside the [`ToolCallResult`].
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolCallResult {
        let start = Instant::now();

        let Some(&idx) = self.by_name.get(name) else {
            return ToolCallResult {
                tool_name: name.to_string(),
                outcome: Err(ToolError::NotFound {
                    name: name.to_string(),
                }),
                elapsed_ms: 0,
            };
        };
        let tool = &self.tools[idx];

        let guarded = AssertUnwindSafe(tool.invoke(arguments)).catch_unwind();
        let outcome = match tokio::time::timeout(self.call_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ToolError::ExecutionFailed {
                tool: name.to_string(),
                reason: format!("tool panicked: {}", panic_message(&*panic)),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => tracing::info!(tool = %name, elapsed_ms, "tool call succeeded"),
            Err(e) => tracing::warn!(tool = %name, elapsed_ms, error = %e, "tool call failed"),
        }

        ToolCallResult {
            tool_name: name.to_string(),
            outcome,
            elapsed_ms,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct EchoArgs {
        text: String,
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        type Args = EchoArgs;

        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echo the input"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn call(&self, args: EchoArgs) -> Result<Value, ToolError> {
            Ok(json!({ "echo": args.text }))
        }
    }

    #[derive(Deserialize)]
    struct NoArgs {}

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        type Args = NoArgs;

        fn name(&self) -> &'static str {
            "sleepy"
        }
        fn description(&self) -> &'static str {
            "Never finishes in time"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn call(&self, _args: NoArgs) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    struct Explodes;

    #[async_trait]
    impl Tool for Explodes {
        type Args = NoArgs;

        fn name(&self) -> &'static str {
            "explodes"
        }
        fn description(&self) -> &'static str {
            "Panics"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn call(&self, _args: NoArgs) -> Result<Value, ToolError> {
            panic!("boom");
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        reg.register(Sleepy).unwrap();
        reg.register(Explodes).unwrap();
        reg.set_call_timeout(50);
        reg
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        let err = reg.register(Echo).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName { ref name } if name == "echo"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_definitions_in_registration_order() {
        let reg = registry();
        let names: Vec<String> = reg
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["echo", "sleepy", "explodes"]);
        assert_eq!(reg.tool_names(), vec!["echo", "sleepy", "explodes"]);
        assert_eq!(reg.definitions()[0].r#type, "function");
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let result = registry().dispatch("echo", json!({"text": "hi"})).await;
        assert!(result.outcome.is_ok());
        assert_eq!(result.payload(), json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_is_payload() {
        let result = registry().dispatch("launch_rocket", json!({})).await;
        assert!(matches!(result.outcome, Err(ToolError::NotFound { .. })));
        assert_eq!(result.payload()["error"]["kind"], "tool_not_found");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_field() {
        let result = registry()
            .dispatch("echo", json!({"text": "hi", "volume": 11}))
            .await;
        assert!(matches!(result.outcome, Err(ToolError::ArgsInvalid { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_missing_field() {
        let result = registry().dispatch("echo", json!({})).await;
        assert!(matches!(result.outcome, Err(ToolError::ArgsInvalid { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let result = registry().dispatch("sleepy", json!({})).await;
        assert!(matches!(
            result.outcome,
            Err(ToolError::Timeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_panic_contained() {
        let result = registry().dispatch("explodes", json!({})).await;
        match result.outcome {
            Err(ToolError::ExecutionFailed { reason, .. }) => assert!(reason.contains("boom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
