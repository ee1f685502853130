//! Message adapter: client chat history to the provider's flat message list.
//!
//! Responsibilities:
//! - Flatten string content, typed parts and legacy `toolInvocations`
//! - Group consecutive tool calls into one assistant message
//! - Place every tool result directly after the call it answers
//! - Reject results that answer no earlier unanswered call

use serde_json::Value;

use crate::inference::types::{ChatMessage, Role, ToolCallResponse};

use super::errors::AgentError;
use super::types::{ClientMessage, MessageContent, Part};

/// Convert the client's history into provider messages, preserving order.
///
/// Calls left unanswered are kept as-is; the orchestrator only ever
/// appends after them.
pub fn adapt(client_messages: &[ClientMessage]) -> Result<Vec<ChatMessage>, AgentError> {
    let mut adapter = Adapter::default();
    for message in client_messages {
        adapter.push_message(message)?;
    }
    adapter.close_group();
    tracing::debug!(
        client_messages = client_messages.len(),
        model_messages = adapter.out.len(),
        unanswered_calls = adapter.unanswered.len(),
        "history adapted"
    );
    Ok(adapter.out)
}

#[derive(Default)]
struct Adapter {
    out: Vec<ChatMessage>,
    /// Call ids seen in the output that no tool message answers yet.
    unanswered: Vec<String>,
    text: Vec<String>,
    calls: Vec<ToolCallResponse>,
    /// Text that preceded the current call group.
    calls_content: Option<String>,
    /// Ids of the latest call group still waiting for their results.
    group: Vec<String>,
    /// Assistant text seen while `group` is open; emitted once it closes.
    held: Vec<String>,
}

impl Adapter {
    fn push_message(&mut self, message: &ClientMessage) -> Result<(), AgentError> {
        for part in expand_parts(message) {
            match part {
                Part::Text { text } => {
                    if message.role == Role::Assistant && !self.group.is_empty() {
                        self.held.push(text);
                        continue;
                    }
                    self.flush_calls();
                    self.close_group();
                    self.text.push(text);
                }
                Part::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                } => {
                    if self.calls.is_empty() {
                        self.close_group();
                        self.start_call_group(message.role);
                    }
                    self.group.push(tool_call_id.clone());
                    self.unanswered.push(tool_call_id.clone());
                    self.calls.push(ToolCallResponse::function(
                        tool_call_id,
                        tool_name,
                        arguments_text(&args),
                    ));
                }
                Part::ToolResult {
                    tool_call_id,
                    result,
                } => {
                    self.flush_calls();
                    self.flush_text(message.role);
                    self.answer(&tool_call_id)?;
                    self.out
                        .push(ChatMessage::tool_result(tool_call_id.clone(), result_text(&result)));
                    if let Some(pos) = self.group.iter().position(|id| *id == tool_call_id) {
                        self.group.remove(pos);
                        if self.group.is_empty() {
                            self.release_held();
                        }
                    }
                }
                Part::Unsupported => {}
            }
        }
        self.flush_calls();
        self.flush_text(message.role);
        Ok(())
    }

    /// Text right before an assistant's calls becomes that message's content.
    fn start_call_group(&mut self, role: Role) {
        if role == Role::Assistant && !self.text.is_empty() {
            self.calls_content = Some(self.text.join("\n"));
            self.text.clear();
        } else {
            self.flush_text(role);
        }
    }

    fn flush_calls(&mut self) {
        if self.calls.is_empty() {
            return;
        }
        let calls = std::mem::take(&mut self.calls);
        self.out.push(ChatMessage::assistant_tool_calls(
            self.calls_content.take(),
            calls,
        ));
    }

    fn flush_text(&mut self, role: Role) {
        if self.text.is_empty() {
            return;
        }
        let content = self.text.join("\n");
        self.text.clear();
        self.out.push(ChatMessage::text(role, content));
    }

    /// Stop waiting on the current group; held text goes out as-is.
    fn close_group(&mut self) {
        self.group.clear();
        self.release_held();
    }

    fn release_held(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let content = self.held.join("\n");
        self.held.clear();
        self.out.push(ChatMessage::text(Role::Assistant, content));
    }

    fn answer(&mut self, call_id: &str) -> Result<(), AgentError> {
        match self.unanswered.iter().position(|id| id == call_id) {
            Some(pos) => {
                self.unanswered.remove(pos);
                Ok(())
            }
            None => Err(AgentError::MalformedHistory {
                reason: format!("tool result '{call_id}' has no matching earlier tool call"),
            }),
        }
    }
}

/// Content parts followed by the parts implied by `toolInvocations`.
fn expand_parts(message: &ClientMessage) -> Vec<Part> {
    let mut parts = match &message.content {
        Some(MessageContent::Text(text)) => vec![Part::Text { text: text.clone() }],
        Some(MessageContent::Parts(parts)) => parts.clone(),
        None => Vec::new(),
    };
    if message.tool_invocations.is_empty() {
        return parts;
    }

    // An empty string next to invocations is a placeholder, not a message.
    if matches!(parts.as_slice(), [Part::Text { text }] if text.is_empty()) {
        parts.clear();
    }
    for inv in &message.tool_invocations {
        parts.push(Part::ToolCall {
            tool_call_id: inv.tool_call_id.clone(),
            tool_name: inv.tool_name.clone(),
            args: inv.args.clone(),
        });
    }
    for inv in &message.tool_invocations {
        if let Some(result) = &inv.result {
            parts.push(Part::ToolResult {
                tool_call_id: inv.tool_call_id.clone(),
                result: result.clone(),
            });
        }
    }
    parts
}

fn arguments_text(args: &Value) -> String {
    match args {
        Value::Null => "{}".to_string(),
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn result_text(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
