//! Agent Core: the chat turn between client history and streamed answer.
//!
//! Submodules:
//! - `conversation`: Message adapter, client history to provider messages
//! - `orchestrator`: Streaming tool-calling loop (rounds, dispatch, cancellation)
//! - `types`: Client message shapes, stream events, per-turn state
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod types;

// Re-exports for convenience
pub use conversation::adapt;
pub use errors::AgentError;
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use types::{
    ClientMessage, ErrorKind, FinishReason, MessageContent, OrchestratorTurn, Part,
    PendingToolCall, StreamEvent, ToolInvocation,
};
