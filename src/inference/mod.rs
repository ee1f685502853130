//! Inference Client: OpenAI-compatible chat-completion boundary.
//!
//! This module handles all communication with the completion service:
//! - Streaming chat completions with tool advertisement
//! - SSE stream parsing into text and tool-call events
//! - The `CompletionProvider` seam used by the orchestrator
//!
//! The client speaks the OpenAI Chat Completions API, so OpenRouter, OpenAI
//! and any compatible gateway are interchangeable via config.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionProvider, InferenceClient, ProviderStream};
pub use errors::InferenceError;
pub use types::{
    ChatMessage, CompletionFinish, ProviderEvent, Role, ToolCallResponse, ToolDefinition, Usage,
};
