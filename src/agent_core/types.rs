//! Shared types for the agent core.
//!
//! Client-side message shapes, the orchestrator's per-turn state, and the
//! events the orchestrator hands to the protocol encoder.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::inference::types::{ChatMessage, CompletionFinish, Role, Usage};
use crate::tools::ToolError;

// ─── Client Messages ────────────────────────────────────────────────────────

/// One message of the chat history as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// Legacy shape: prior tool calls attached to the message.
    #[serde(default, rename = "toolInvocations")]
    pub tool_invocations: Vec<ToolInvocation>,
}

/// Message content: a plain string or an ordered list of parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

/// A content part of a client message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        #[serde(default)]
        result: Value,
    },
    /// Part kinds the completion service has no use for (files, step markers).
    #[serde(other)]
    Unsupported,
}

/// A prior tool call in the legacy `toolInvocations` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Option<Value>,
}

// ─── Stream Events ──────────────────────────────────────────────────────────

/// Why a step or a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    /// The configured round cap was reached while the model still wanted tools.
    RoundLimit,
    Error,
    Other,
}

impl From<&CompletionFinish> for FinishReason {
    fn from(reason: &CompletionFinish) -> Self {
        match reason {
            CompletionFinish::Stop => Self::Stop,
            CompletionFinish::ToolCalls => Self::ToolCalls,
            CompletionFinish::Length => Self::Length,
            CompletionFinish::ContentFilter => Self::ContentFilter,
            CompletionFinish::Other(_) => Self::Other,
        }
    }
}

/// Error taxonomy visible on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ToolArgsInvalid,
    ToolNotFound,
    ToolExecutionFailed,
    UpstreamFailure,
}

impl ErrorKind {
    /// Only upstream failures end the turn; tool errors go back to the model.
    pub fn is_turn_fatal(self) -> bool {
        matches!(self, ErrorKind::UpstreamFailure)
    }
}

impl From<&ToolError> for ErrorKind {
    fn from(e: &ToolError) -> Self {
        match e {
            ToolError::ArgsInvalid { .. } => ErrorKind::ToolArgsInvalid,
            ToolError::NotFound { .. } => ErrorKind::ToolNotFound,
            ToolError::ExecutionFailed { .. }
            | ToolError::Timeout { .. }
            | ToolError::DuplicateName { .. } => ErrorKind::ToolExecutionFailed,
        }
    }
}

/// Event emitted by the orchestrator, consumed by the protocol encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallStarted { id: String, name: String },
    ToolCallArgsDelta { id: String, fragment: String },
    /// The call's arguments are complete and parsed.
    ToolCallReady { id: String, name: String, args: Value },
    ToolResult { id: String, name: String, result: Value },
    /// End of one completion round.
    StepFinish { reason: FinishReason, usage: Usage },
    /// End of the turn. Always the last event, on every path but cancellation.
    Finish { reason: FinishReason, usage: Usage },
    Error { kind: ErrorKind, message: String },
}

// ─── Orchestrator State ─────────────────────────────────────────────────────

/// Argument accumulator for one streamed tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingToolCall {
    pub name: String,
    pub arguments_buffer: String,
    pub closed: bool,
}

impl PendingToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments_buffer: String::new(),
            closed: false,
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Parse the concatenated fragments.
    ///
    /// Fails while the call is still open. An empty buffer is `{}`: models
    /// send no argument text for parameterless tools.
    pub fn parse_arguments(&self) -> Result<Value, ToolError> {
        if !self.closed {
            return Err(ToolError::ArgsInvalid {
                tool: self.name.clone(),
                reason: "arguments are still streaming".to_string(),
            });
        }
        if self.arguments_buffer.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments_buffer).map_err(|e| ToolError::ArgsInvalid {
            tool: self.name.clone(),
            reason: format!("arguments are not valid JSON: {e}"),
        })
    }
}

/// Live state of one chat turn. Owned by a single orchestrator task.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorTurn {
    pub messages: Vec<ChatMessage>,
    pub pending_calls: HashMap<String, PendingToolCall>,
    /// Call ids in the order they were opened this round.
    pub call_order: Vec<String>,
    pub round: u32,
}

impl OrchestratorTurn {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Start the next round with no pending calls.
    pub fn begin_round(&mut self) -> u32 {
        self.pending_calls.clear();
        self.call_order.clear();
        self.round += 1;
        self.round
    }

    /// Open a call. Returns false if the id is already in use this round.
    pub fn open_call(&mut self, id: &str, name: &str) -> bool {
        if self.pending_calls.contains_key(id) {
            return false;
        }
        self.pending_calls
            .insert(id.to_string(), PendingToolCall::new(name));
        self.call_order.push(id.to_string());
        true
    }

    /// Append a fragment to an open call. Returns false for unknown or closed ids.
    pub fn append_arguments(&mut self, id: &str, fragment: &str) -> bool {
        match self.pending_calls.get_mut(id) {
            Some(call) if !call.closed => {
                call.arguments_buffer.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    pub fn close_call(&mut self, id: &str) -> Option<&PendingToolCall> {
        let call = self.pending_calls.get_mut(id)?;
        call.close();
        Some(call)
    }

    /// Close anything still open and hand back this round's calls in open order.
    pub fn take_calls(&mut self) -> Vec<(String, PendingToolCall)> {
        let mut calls = Vec::with_capacity(self.call_order.len());
        for id in self.call_order.drain(..) {
            if let Some(mut call) = self.pending_calls.remove(&id) {
                call.close();
                calls.push((id, call));
            }
        }
        calls
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
