//! Stream orchestrator: the tool-calling loop behind one chat turn.
//!
//! Each round streams a completion over the turn's messages with every
//! registered tool advertised, forwards text and tool-call deltas as
//! [`StreamEvent`]s, then dispatches the round's tool calls one at a time
//! in the order they were opened. Results are appended to the history and
//! the next round starts, until the model stops asking for tools or the
//! round cap is hit.
//!
//! The orchestrator is the only writer of its [`OrchestratorTurn`]. It talks
//! to the consumer through a bounded channel; when the consumer goes away,
//! the in-flight completion stream or tool call is dropped at once.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::OrchestratorConfig;
use crate::inference::types::{ChatMessage, ProviderEvent, Role, ToolCallResponse, Usage};
use crate::inference::{CompletionProvider, InferenceError};
use crate::tools::{ToolCallResult, ToolRegistry};

use super::types::{ErrorKind, FinishReason, OrchestratorTurn, PendingToolCall, StreamEvent};

// ─── Outcome ────────────────────────────────────────────────────────────────

/// How a turn ended, for the caller's logs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A `Finish` event was delivered.
    Finished {
        reason: FinishReason,
        rounds: u32,
        usage: Usage,
    },
    /// The consumer disconnected; nothing more was sent.
    Cancelled { round: u32 },
}

/// The event consumer is gone.
struct Cancelled;

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Drives chat turns against one provider and one tool registry.
///
/// Cheap to clone; shared read-only across requests.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<ToolRegistry>,
    max_rounds: u32,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<ToolRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            max_rounds: config.max_rounds.max(1),
        }
    }

    /// Run one turn to completion, sending every event to `events`.
    ///
    /// On every path except cancellation the last event sent is `Finish`.
    pub async fn run(
        &self,
        mut turn: OrchestratorTurn,
        model: &str,
        events: mpsc::Sender<StreamEvent>,
    ) -> TurnOutcome {
        match self.drive(&mut turn, model, &events).await {
            Ok(outcome) => outcome,
            Err(Cancelled) => {
                tracing::info!(round = turn.round, "client disconnected, turn abandoned");
                TurnOutcome::Cancelled { round: turn.round }
            }
        }
    }

    async fn drive(
        &self,
        turn: &mut OrchestratorTurn,
        model: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<TurnOutcome, Cancelled> {
        let tools = self.registry.definitions();
        let mut total_usage = Usage::default();

        loop {
            let round = turn.begin_round();
            tracing::info!(
                round,
                model = %model,
                message_count = turn.messages.len(),
                "round started"
            );

            // ── Requesting ──
            let request = self
                .provider
                .stream_completion(model, &turn.messages, &tools);
            let opened = tokio::select! {
                _ = events.closed() => return Err(Cancelled),
                opened = request => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => return self.fail_upstream(events, e, round, total_usage).await,
            };

            // ── Streaming ──
            let mut text = String::new();
            let mut finish = None;
            let mut round_usage = Usage::default();
            loop {
                let next = tokio::select! {
                    _ = events.closed() => return Err(Cancelled),
                    next = stream.next() => next,
                };
                let event = match next {
                    None => break,
                    Some(Ok(event)) => event,
                    Some(Err(e)) => return self.fail_upstream(events, e, round, total_usage).await,
                };
                match event {
                    ProviderEvent::Text(delta) => {
                        text.push_str(&delta);
                        emit(events, StreamEvent::TextDelta(delta)).await?;
                    }
                    ProviderEvent::ToolCallStart { id, name } => {
                        if turn.open_call(&id, &name) {
                            emit(events, StreamEvent::ToolCallStarted { id, name }).await?;
                        } else {
                            tracing::warn!(round, call_id = %id, "duplicate tool call id ignored");
                        }
                    }
                    ProviderEvent::ToolCallArgs { id, fragment } => {
                        if turn.append_arguments(&id, &fragment) {
                            emit(events, StreamEvent::ToolCallArgsDelta { id, fragment }).await?;
                        }
                    }
                    ProviderEvent::ToolCallEnd { id } => {
                        let Some(call) = turn.close_call(&id) else {
                            continue;
                        };
                        match call.parse_arguments() {
                            Ok(args) => {
                                let name = call.name.clone();
                                emit(events, StreamEvent::ToolCallReady { id, name, args }).await?;
                            }
                            Err(e) => {
                                tracing::warn!(round, call_id = %id, error = %e, "tool call arguments invalid");
                            }
                        }
                    }
                    ProviderEvent::Finish { reason, usage } => {
                        finish = Some(reason);
                        round_usage = usage;
                    }
                }
            }
            // Release the upstream connection before running tools.
            drop(stream);

            total_usage += round_usage;
            let calls = turn.take_calls();
            let reason = match (&finish, calls.is_empty()) {
                (_, false) => FinishReason::ToolCalls,
                (Some(reason), true) => FinishReason::from(reason),
                (None, true) => FinishReason::Stop,
            };
            tracing::info!(
                round,
                provider_finish = ?finish,
                tool_calls = calls.len(),
                prompt_tokens = round_usage.prompt_tokens,
                completion_tokens = round_usage.completion_tokens,
                "round finished"
            );
            emit(
                events,
                StreamEvent::StepFinish {
                    reason,
                    usage: round_usage,
                },
            )
            .await?;

            if calls.is_empty() {
                if !text.is_empty() {
                    turn.messages.push(ChatMessage::text(Role::Assistant, text));
                }
                return finish_turn(events, reason, round, total_usage).await;
            }

            // ── Dispatching ──
            turn.messages.push(assistant_message(text, &calls));
            for (id, call) in calls {
                let result = self.dispatch(&call, events).await?;
                if let Err(e) = &result.outcome {
                    emit(
                        events,
                        StreamEvent::Error {
                            kind: ErrorKind::from(e),
                            message: e.to_string(),
                        },
                    )
                    .await?;
                }
                let payload = result.payload();
                turn.messages
                    .push(ChatMessage::tool_result(id.as_str(), payload.to_string()));
                emit(
                    events,
                    StreamEvent::ToolResult {
                        id,
                        name: call.name,
                        result: payload,
                    },
                )
                .await?;
            }

            if round >= self.max_rounds {
                tracing::warn!(
                    round,
                    max_rounds = self.max_rounds,
                    "round limit reached, ending turn"
                );
                return finish_turn(events, FinishReason::RoundLimit, round, total_usage).await;
            }
        }
    }

    /// Run one closed call, or report why it could not run.
    async fn dispatch(
        &self,
        call: &PendingToolCall,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<ToolCallResult, Cancelled> {
        let args = match call.parse_arguments() {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolCallResult {
                    tool_name: call.name.clone(),
                    outcome: Err(e),
                    elapsed_ms: 0,
                })
            }
        };
        tokio::select! {
            _ = events.closed() => Err(Cancelled),
            result = self.registry.dispatch(&call.name, args) => Ok(result),
        }
    }

    async fn fail_upstream(
        &self,
        events: &mpsc::Sender<StreamEvent>,
        error: InferenceError,
        round: u32,
        usage: Usage,
    ) -> Result<TurnOutcome, Cancelled> {
        tracing::error!(round, error = %error, "completion service failed");
        emit(
            events,
            StreamEvent::Error {
                kind: ErrorKind::UpstreamFailure,
                message: error.to_string(),
            },
        )
        .await?;
        finish_turn(events, FinishReason::Error, round, usage).await
    }
}

async fn emit(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), Cancelled> {
    events.send(event).await.map_err(|_| Cancelled)
}

async fn finish_turn(
    events: &mpsc::Sender<StreamEvent>,
    reason: FinishReason,
    rounds: u32,
    usage: Usage,
) -> Result<TurnOutcome, Cancelled> {
    emit(events, StreamEvent::Finish { reason, usage }).await?;
    tracing::info!(
        rounds,
        finish = ?reason,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "turn finished"
    );
    Ok(TurnOutcome::Finished {
        reason,
        rounds,
        usage,
    })
}

/// The assistant message recording a round's text and tool calls.
///
/// Arguments that do not parse are replaced by `{}` so the history stays
/// acceptable to the provider; the error payload explains the failure.
fn assistant_message(text: String, calls: &[(String, PendingToolCall)]) -> ChatMessage {
    let tool_calls = calls
        .iter()
        .map(|(id, call)| {
            let arguments = match call.parse_arguments() {
                Ok(Value::Object(map)) if map.is_empty() => "{}".to_string(),
                Ok(_) => call.arguments_buffer.clone(),
                Err(_) => "{}".to_string(),
            };
            ToolCallResponse::function(id.as_str(), call.name.as_str(), arguments)
        })
        .collect();
    let content = (!text.is_empty()).then_some(text);
    ChatMessage::assistant_tool_calls(content, tool_calls)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
