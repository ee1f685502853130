//! Event-to-bytes encoding for the `data` and `text` wire formats.
//!
//! Data protocol line tags:
//!
//! | tag | event              | payload                                         |
//! |-----|--------------------|-------------------------------------------------|
//! | `0` | text delta         | JSON string                                     |
//! | `b` | tool call started  | `{toolCallId, toolName}`                        |
//! | `c` | tool call args     | `{toolCallId, argsTextDelta}`                   |
//! | `9` | tool call ready    | `{toolCallId, toolName, args}`                  |
//! | `a` | tool result        | `{toolCallId, result}`                          |
//! | `e` | step finish        | `{finishReason, usage, isContinued}`            |
//! | `3` | error              | JSON string                                     |
//! | `d` | finish             | `{finishReason, usage}`                         |

use bytes::Bytes;
use serde_json::{json, Value};

use crate::agent_core::types::{FinishReason, StreamEvent};
use crate::inference::types::Usage;

use super::StreamProtocol;

/// Per-stream encoder. Counts the frames it has produced.
#[derive(Debug)]
pub struct ProtocolEncoder {
    protocol: StreamProtocol,
    sequence: u64,
}

impl ProtocolEncoder {
    pub fn new(protocol: StreamProtocol) -> Self {
        Self {
            protocol,
            sequence: 0,
        }
    }

    pub fn protocol(&self) -> StreamProtocol {
        self.protocol
    }

    /// Number of frames produced so far.
    pub fn frames_written(&self) -> u64 {
        self.sequence
    }

    /// Render one event, or `None` if this protocol does not show it.
    pub fn encode(&mut self, event: &StreamEvent) -> Option<Bytes> {
        let frame = match self.protocol {
            StreamProtocol::Data => encode_data(event).map(Bytes::from),
            StreamProtocol::Text => match event {
                StreamEvent::TextDelta(text) if !text.is_empty() => {
                    Some(Bytes::copy_from_slice(text.as_bytes()))
                }
                _ => None,
            },
        };
        if frame.is_some() {
            self.sequence += 1;
        }
        frame
    }
}

fn encode_data(event: &StreamEvent) -> Option<String> {
    let (tag, payload) = match event {
        StreamEvent::TextDelta(text) => ('0', json!(text)),
        StreamEvent::ToolCallStarted { id, name } => (
            'b',
            json!({"toolCallId": id, "toolName": name}),
        ),
        StreamEvent::ToolCallArgsDelta { id, fragment } => (
            'c',
            json!({"toolCallId": id, "argsTextDelta": fragment}),
        ),
        StreamEvent::ToolCallReady { id, name, args } => (
            '9',
            json!({"toolCallId": id, "toolName": name, "args": args}),
        ),
        StreamEvent::ToolResult { id, result, .. } => (
            'a',
            json!({"toolCallId": id, "result": result}),
        ),
        StreamEvent::StepFinish { reason, usage } => (
            'e',
            json!({
                "finishReason": wire_reason(*reason),
                "usage": wire_usage(usage),
                "isContinued": false,
            }),
        ),
        // Tool errors reach the client through their `a:` result payload.
        StreamEvent::Error { kind, message } if kind.is_turn_fatal() => ('3', json!(message)),
        StreamEvent::Error { .. } => return None,
        StreamEvent::Finish { reason, usage } => (
            'd',
            json!({
                "finishReason": wire_reason(*reason),
                "usage": wire_usage(usage),
            }),
        ),
    };
    Some(format!("{tag}:{payload}\n"))
}

fn wire_reason(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::ToolCalls => "tool-calls",
        FinishReason::Length => "length",
        FinishReason::ContentFilter => "content-filter",
        FinishReason::Error => "error",
        FinishReason::RoundLimit | FinishReason::Other => "other",
    }
}

fn wire_usage(usage: &Usage) -> Value {
    json!({
        "promptTokens": usage.prompt_tokens,
        "completionTokens": usage.completion_tokens,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::ErrorKind;

    fn data(event: StreamEvent) -> String {
        let mut encoder = ProtocolEncoder::new(StreamProtocol::Data);
        let bytes = encoder.encode(&event).expect("event should be rendered");
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_text_line_escapes() {
        assert_eq!(
            data(StreamEvent::TextDelta("say \"hi\"\n".into())),
            "0:\"say \\\"hi\\\"\\n\"\n"
        );
    }

    #[test]
    fn test_tool_lines() {
        assert_eq!(
            data(StreamEvent::ToolCallStarted {
                id: "call_1".into(),
                name: "close_globe".into(),
            }),
            "b:{\"toolCallId\":\"call_1\",\"toolName\":\"close_globe\"}\n"
        );
        assert_eq!(
            data(StreamEvent::ToolCallArgsDelta {
                id: "call_1".into(),
                fragment: "{\"loc".into(),
            }),
            "c:{\"argsTextDelta\":\"{\\\"loc\",\"toolCallId\":\"call_1\"}\n"
        );
        assert_eq!(
            data(StreamEvent::ToolResult {
                id: "call_1".into(),
                name: "close_globe".into(),
                result: json!({"status": "success"}),
            }),
            "a:{\"result\":{\"status\":\"success\"},\"toolCallId\":\"call_1\"}\n"
        );
    }

    #[test]
    fn test_finish_lines() {
        let usage = Usage {
            prompt_tokens: 12,
            completion_tokens: 3,
        };
        let step = data(StreamEvent::StepFinish {
            reason: FinishReason::ToolCalls,
            usage,
        });
        assert!(step.starts_with("e:"));
        let payload: Value = serde_json::from_str(&step[2..]).unwrap();
        assert_eq!(payload["finishReason"], "tool-calls");
        assert_eq!(payload["usage"]["promptTokens"], 12);
        assert_eq!(payload["isContinued"], false);

        let finish = data(StreamEvent::Finish {
            reason: FinishReason::RoundLimit,
            usage,
        });
        assert!(finish.starts_with("d:") && finish.ends_with('\n'));
        let payload: Value = serde_json::from_str(&finish[2..]).unwrap();
        assert_eq!(payload["finishReason"], "other");
        assert_eq!(payload["usage"]["completionTokens"], 3);
    }

    #[test]
    fn test_only_fatal_errors_rendered() {
        let mut encoder = ProtocolEncoder::new(StreamProtocol::Data);
        let tool_error = StreamEvent::Error {
            kind: ErrorKind::ToolNotFound,
            message: "unknown tool".into(),
        };
        assert!(encoder.encode(&tool_error).is_none());

        let upstream = StreamEvent::Error {
            kind: ErrorKind::UpstreamFailure,
            message: "stream error: reset".into(),
        };
        assert_eq!(
            encoder.encode(&upstream).unwrap(),
            Bytes::from_static(b"3:\"stream error: reset\"\n")
        );
        assert_eq!(encoder.frames_written(), 1);
    }

    #[test]
    fn test_text_protocol_forwards_text_only() {
        let mut encoder = ProtocolEncoder::new(StreamProtocol::Text);
        let events = vec![
            StreamEvent::ToolCallStarted {
                id: "c".into(),
                name: "close_globe".into(),
            },
            StreamEvent::TextDelta("Closed ".into()),
            StreamEvent::ToolResult {
                id: "c".into(),
                name: "close_globe".into(),
                result: json!({}),
            },
            StreamEvent::TextDelta("the globe.".into()),
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: Usage::default(),
            },
        ];
        let out: Vec<u8> = events
            .iter()
            .filter_map(|e| encoder.encode(e))
            .flat_map(|b| b.to_vec())
            .collect();
        assert_eq!(out, b"Closed the globe.");
        assert_eq!(encoder.frames_written(), 2);
    }
}
