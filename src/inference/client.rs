//! OpenAI-compatible completion client.
//!
//! Sends streaming chat completion requests to the configured provider and
//! hands back a stream of [`ProviderEvent`]s. The [`CompletionProvider`]
//! trait is the seam the orchestrator depends on, so tests can drive it with
//! scripted rounds instead of a live endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client as HttpClient;

use crate::config::ProviderConfig;

use super::errors::InferenceError;
use super::streaming::parse_sse_stream;
use super::types::{
    ChatCompletionRequest, ChatMessage, ProviderEvent, StreamOptions, ToolDefinition,
};

/// Stream of decoded provider events for one completion round.
///
/// Dropping it releases the underlying HTTP connection.
pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, InferenceError>>;

// ─── CompletionProvider ──────────────────────────────────────────────────────

/// A chat-completion service that streams text and tool-call deltas.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Start one streaming completion over `messages`, advertising `tools`.
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ProviderStream, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the configured chat-completion endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ProviderConfig,
}

impl InferenceClient {
    /// Create a client from the provider configuration.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: ProviderConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// The base URL of the configured endpoint.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
        tools: &'a [ToolDefinition],
    ) -> ChatCompletionRequest<'a> {
        let has_tools = !tools.is_empty();
        ChatCompletionRequest {
            model,
            messages,
            tools: has_tools.then_some(tools),
            tool_choice: has_tools.then_some("auto"),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[async_trait]
impl CompletionProvider for InferenceClient {
    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ProviderStream, InferenceError> {
        let url = self.completions_url();
        let body = self.build_request(model, messages, tools);

        // Request metadata only; the body can be huge.
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = tools.len(),
            "completion request"
        );

        let mut request = self
            .http
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream");
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.config.request_timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "completion request rejected");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_sse_stream(response.bytes_stream()).boxed())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{CompletionFinish, Role};
    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    fn provider_config(base_url: String) -> ProviderConfig {
        ProviderConfig {
            base_url,
            api_key: Some("sk-test".to_string()),
            model: "test-model".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            request_timeout_secs: 10,
            connect_timeout_secs: 2,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn test_build_request_with_tools() {
        let client = InferenceClient::from_config(provider_config("http://x/v1".into())).unwrap();
        let messages = vec![ChatMessage::text(Role::User, "weather in Paris?")];
        let tools = vec![ToolDefinition::function(
            "close_globe",
            "Closes the globe view",
            serde_json::json!({"type": "object", "properties": {}}),
        )];
        let req = client.build_request("test-model", &messages, &tools);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["tools"][0]["function"]["name"], "close_globe");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_build_request_without_tools() {
        let client = InferenceClient::from_config(provider_config("http://x/v1".into())).unwrap();
        let messages = vec![ChatMessage::text(Role::User, "hi")];
        let req = client.build_request("m", &messages, &[]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let client = InferenceClient::from_config(provider_config("http://x/v1/".into())).unwrap();
        assert_eq!(client.completions_url(), "http://x/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_stream_completion_against_local_endpoint() {
        let seen_auth: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let seen = seen_auth.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    let body = concat!(
                        "data: {\"choices\":[{\"delta\":{\"content\":\"Bonjour\"}}]}\n\n",
                        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                        "data: [DONE]\n\n",
                    );
                    ([("content-type", "text/event-stream")], body).into_response()
                }
            }),
        );
        let base_url = serve(app).await;
        let client = InferenceClient::from_config(provider_config(base_url)).unwrap();

        let messages = vec![ChatMessage::text(Role::User, "hi")];
        let stream = client
            .stream_completion("test-model", &messages, &[])
            .await
            .unwrap();
        let events: Vec<ProviderEvent> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(events[0], ProviderEvent::Text("Bonjour".into()));
        assert!(matches!(
            events[1],
            ProviderEvent::Finish {
                reason: CompletionFinish::Stop,
                ..
            }
        ));
        assert_eq!(
            seen_auth.lock().unwrap().as_deref(),
            Some("Bearer sk-test")
        );
    }

    #[tokio::test]
    async fn test_stream_completion_http_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = serve(app).await;
        let client = InferenceClient::from_config(provider_config(base_url)).unwrap();

        let err = match client.stream_completion("m", &[], &[]).await {
            Err(e) => e,
            Ok(_) => panic!("expected HTTP error"),
        };
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_stream_completion_body_dropped_mid_stream() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
                    Ok("data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\n"),
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "upstream went away",
                    )),
                ];
                Body::from_stream(futures::stream::iter(chunks))
            }),
        );
        let base_url = serve(app).await;
        let client = InferenceClient::from_config(provider_config(base_url)).unwrap();

        let stream = client.stream_completion("m", &[], &[]).await.unwrap();
        let events: Vec<Result<ProviderEvent, InferenceError>> = stream.collect().await;

        assert!(matches!(events[0], Ok(ProviderEvent::Text(ref t)) if t == "one"));
        assert!(matches!(
            events.last(),
            Some(Err(InferenceError::StreamError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            InferenceClient::from_config(provider_config(format!("http://{addr}/v1"))).unwrap();
        let result = client.stream_completion("m", &[], &[]).await;
        assert!(matches!(
            result,
            Err(InferenceError::ConnectionFailed { .. })
        ));
    }
}
