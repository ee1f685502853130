//! Agent Core error types.

use thiserror::Error;

/// Errors that reject a chat turn before any streaming starts.
///
/// Everything that goes wrong once the stream is open is reported in-band
/// as a stream event instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool result in the history answers no earlier unanswered call.
    #[error("malformed history: {reason}")]
    MalformedHistory { reason: String },
}

impl AgentError {
    /// Stable machine-readable kind for error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::MalformedHistory { .. } => "malformed_history",
        }
    }
}
