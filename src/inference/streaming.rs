//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads the HTTP body as a byte stream, splits on SSE boundaries
//! (`data: …\n\n`), parses each chunk as JSON, and turns the deltas into
//! [`ProviderEvent`]s: text, tool-call start/argument/end, and a final
//! finish event carrying the accumulated usage.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{ChatCompletionChunk, ChunkToolCall, CompletionFinish, ProviderEvent, Usage};

// ─── SSE line parser ─────────────────────────────────────────────────────────

/// Parse raw SSE bytes into `ProviderEvent`s.
///
/// Bytes are buffered across network chunk boundaries and only decoded once
/// a full event (terminated by a blank line) is available, so multi-byte
/// UTF-8 sequences split by the transport are never mangled. A read error
/// from the underlying stream is yielded once and ends the stream, as is a
/// body that ends before either `[DONE]` or a `finish_reason`.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<ProviderEvent, InferenceError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let reader = SseReader {
        byte_stream: Box::pin(byte_stream),
        state: StreamState::default(),
        buffer: Vec::new(),
        queue: VecDeque::new(),
        truncated: None,
        exhausted: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(event) = reader.queue.pop_front() {
                return Some((Ok(event), reader));
            }
            if let Some(e) = reader.truncated.take() {
                return Some((Err(e), reader));
            }
            if reader.exhausted {
                return None;
            }

            // Complete SSE event already buffered?
            if let Some(end) = find_event_end(&reader.buffer) {
                let raw: Vec<u8> = reader.buffer.drain(..end + 2).collect();
                let event = String::from_utf8_lossy(&raw[..end]).into_owned();
                if let Err(e) = reader.state.process_event(&event, &mut reader.queue) {
                    reader.exhausted = true;
                    return Some((Err(e), reader));
                }
                continue;
            }

            match reader.byte_stream.next().await {
                Some(Ok(bytes)) => {
                    reader
                        .buffer
                        .extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r'));
                }
                Some(Err(e)) => {
                    reader.exhausted = true;
                    return Some((
                        Err(InferenceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        reader,
                    ));
                }
                None => {
                    // Body ended: flush a trailing event without its blank line.
                    reader.exhausted = true;
                    let rest = String::from_utf8_lossy(&reader.buffer).into_owned();
                    reader.buffer.clear();
                    if !rest.trim().is_empty() {
                        if let Err(e) = reader.state.process_event(rest.trim(), &mut reader.queue)
                        {
                            return Some((Err(e), reader));
                        }
                    }
                    if reader.state.finished || reader.state.finish_reason.is_some() {
                        reader.state.finish(&mut reader.queue);
                    } else {
                        reader.truncated = Some(InferenceError::StreamError {
                            reason: "stream ended before completion".to_string(),
                        });
                    }
                }
            }
        }
    })
}

struct SseReader<S> {
    byte_stream: Pin<Box<S>>,
    state: StreamState,
    buffer: Vec<u8>,
    queue: VecDeque<ProviderEvent>,
    /// Yielded after the queue drains when the body stopped mid-answer.
    truncated: Option<InferenceError>,
    exhausted: bool,
}

/// Position of the first `\n\n` (carriage returns are stripped on ingest).
fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

// ─── Stream State ────────────────────────────────────────────────────────────

/// A tool call seen in this completion, keyed by the provider's `index`.
#[derive(Debug)]
struct OpenCall {
    index: u32,
    id: String,
    open: bool,
}

/// Mutable state for turning SSE deltas into provider events.
#[derive(Debug, Default)]
struct StreamState {
    calls: Vec<OpenCall>,
    finish_reason: Option<CompletionFinish>,
    usage: Usage,
    /// Set once `[DONE]` (or end of body after a finish reason) has produced
    /// the `Finish` event.
    finished: bool,
}

impl StreamState {
    /// Process a single SSE event string (may contain multiple `data:` lines).
    fn process_event(
        &mut self,
        event: &str,
        out: &mut VecDeque<ProviderEvent>,
    ) -> Result<(), InferenceError> {
        if self.finished {
            return Ok(());
        }

        let mut data_content = String::new();
        for line in event.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    self.finish(out);
                    return Ok(());
                }
                data_content.push_str(data);
            }
            // Comments (`:`), `event:` and `id:` lines carry nothing we use.
        }

        if data_content.is_empty() {
            return Ok(());
        }

        let chunk: ChatCompletionChunk =
            serde_json::from_str(&data_content).map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse SSE chunk: {e} (data: {data_content})"),
            })?;

        self.process_chunk(chunk, out);
        Ok(())
    }

    fn process_chunk(&mut self, chunk: ChatCompletionChunk, out: &mut VecDeque<ProviderEvent>) {
        if let Some(usage) = chunk.usage {
            self.usage = usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                out.push_back(ProviderEvent::Text(content));
            }
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            self.process_tool_delta(tc, out);
        }

        if let Some(reason) = choice.finish_reason {
            self.close_open_calls(out);
            self.finish_reason = Some(CompletionFinish::from(reason.as_str()));
        }
    }

    /// Route one tool-call fragment to a new or existing call.
    ///
    /// A fragment starts a new call when its index is unseen, or when it
    /// carries an id different from the call already at that index (some
    /// gateways report every parallel call under index 0).
    fn process_tool_delta(&mut self, tc: ChunkToolCall, out: &mut VecDeque<ProviderEvent>) {
        let index = tc.index.unwrap_or(0);
        let call_id = tc.id.filter(|id| !id.is_empty());
        let (name, arguments) = match tc.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };

        let existing = self
            .calls
            .iter()
            .rposition(|c| c.index == index)
            .filter(|&pos| match &call_id {
                Some(id) => self.calls[pos].id == *id,
                None => true,
            });

        let id = match existing {
            Some(pos) if self.calls[pos].open => self.calls[pos].id.clone(),
            Some(pos) => {
                tracing::warn!(
                    call_id = %self.calls[pos].id,
                    index,
                    "fragment for an already closed tool call ignored"
                );
                return;
            }
            None => {
                self.close_open_calls(out);
                let id = call_id
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
                self.calls.push(OpenCall {
                    index,
                    id: id.clone(),
                    open: true,
                });
                out.push_back(ProviderEvent::ToolCallStart {
                    id: id.clone(),
                    name: name.unwrap_or_default(),
                });
                id
            }
        };

        if let Some(fragment) = arguments {
            if !fragment.is_empty() {
                out.push_back(ProviderEvent::ToolCallArgs { id, fragment });
            }
        }
    }

    fn close_open_calls(&mut self, out: &mut VecDeque<ProviderEvent>) {
        for call in self.calls.iter_mut().filter(|c| c.open) {
            call.open = false;
            out.push_back(ProviderEvent::ToolCallEnd {
                id: call.id.clone(),
            });
        }
    }

    /// Finalize the completion: close any open calls and emit `Finish`.
    fn finish(&mut self, out: &mut VecDeque<ProviderEvent>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.close_open_calls(out);

        let reason = self.finish_reason.take().unwrap_or_else(|| {
            if self.calls.is_empty() {
                CompletionFinish::Stop
            } else {
                CompletionFinish::ToolCalls
            }
        });
        out.push_back(ProviderEvent::Finish {
            reason,
            usage: self.usage,
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
