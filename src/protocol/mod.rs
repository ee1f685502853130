//! Protocol Encoder: wire renderings of orchestrator events.
//!
//! Two formats, chosen per request:
//! - `data`: one tagged JSON line per event (AI SDK data stream v1)
//! - `text`: assistant text only, verbatim, no framing

pub mod encoder;

pub use encoder::ProtocolEncoder;

use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

/// Wire format requested by the client (`?protocol=`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    #[default]
    Data,
    Text,
}

impl StreamProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamProtocol::Data => "data",
            StreamProtocol::Text => "text",
        }
    }

    /// Headers set once, before the first byte of the stream.
    pub fn response_headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            StreamProtocol::Data => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
                headers.insert(
                    HeaderName::from_static("x-vercel-ai-data-stream"),
                    HeaderValue::from_static("v1"),
                );
            }
            StreamProtocol::Text => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
            }
        }
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_headers() {
        let headers = StreamProtocol::Data.response_headers();
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers["x-vercel-ai-data-stream"], "v1");
        assert_eq!(headers["x-accel-buffering"], "no");
    }

    #[test]
    fn test_text_headers() {
        let headers = StreamProtocol::Text.response_headers();
        assert_eq!(headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert!(headers.get("x-vercel-ai-data-stream").is_none());
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn test_protocol_parse() {
        let p: StreamProtocol = serde_json::from_str(r#""text""#).unwrap();
        assert_eq!(p, StreamProtocol::Text);
        assert!(serde_json::from_str::<StreamProtocol>(r#""sse""#).is_err());
        assert_eq!(StreamProtocol::default(), StreamProtocol::Data);
    }
}
