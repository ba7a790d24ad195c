//! Chat-completion client for OpenAI-style and OpenRouter-style providers.
//!
//! One `LlmClient` is built at startup and shared by every handler through
//! `web::Data`. Provider responses are walked with explicit presence checks at
//! each level; nothing here panics on an unexpected shape, every failure is an
//! `LlmError`.

use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{LlmProvider, LlmSettings};

/// TCP connect timeout for provider calls. The overall call timeout comes from
/// `LlmSettings::timeout` or the per-call override.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how much of an error body is kept in messages and logs.
const MAX_ERROR_BODY: usize = 512;

/// Errors raised by the provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Error envelope inside an otherwise successful response
    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("LLM response has no {0}")]
    EmptyResponse(&'static str),

    #[error("LLM response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("LLM API key is not configured")]
    MissingApiKey,
}

/// Message author as understood by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Inline image as a `data:<mime>;base64,<data>` URI.
    pub fn image_data(content_type: &str, base64_data: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", content_type, base64_data),
            },
        }
    }
}

/// Message body: a plain string or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the configured call timeout
    pub timeout: Option<Duration>,
}

impl CompletionOptions {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            timeout: None,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Incremental text deltas of a streamed completion.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Shared chat-completion client.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    settings: LlmSettings,
    endpoint: String,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let endpoint = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            settings,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.provider
    }

    pub fn is_configured(&self) -> bool {
        self.settings.has_api_key()
    }

    /// Single-turn completion: one system message and one user message.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user: impl Into<MessageContent>,
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let messages = [Message::system(system_prompt), Message::user(user)];
        self.chat(&messages, options).await
    }

    /// Multi-turn completion returning the full reply text.
    pub async fn chat(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let timeout = options.timeout.unwrap_or(self.settings.timeout);
        let request = self.build_request(messages, options, false)?;

        let call = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                return Err(status_error(status.as_u16(), &body));
            }

            let value: Value = serde_json::from_str(&body)?;
            extract_completion_text(&value)
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("LLM call exceeded {:?}", timeout);
                Err(LlmError::Timeout(timeout))
            }
        }
    }

    /// Streamed completion. The timeout covers the time to the response head;
    /// once deltas flow, the stream runs until the provider ends it.
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<DeltaStream, LlmError> {
        let timeout = options.timeout.unwrap_or(self.settings.timeout);
        let request = self.build_request(messages, options, true)?;

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout(timeout))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        Ok(sse_deltas(response.bytes_stream()))
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .filter(|_| self.settings.has_api_key())
            .ok_or(LlmError::MissingApiKey)?;

        let body = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
        };

        debug!(
            "LLM request: provider={}, model={}, messages={}, stream={}",
            self.settings.provider,
            self.settings.model,
            messages.len(),
            stream
        );

        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        if self.settings.provider == LlmProvider::OpenRouter {
            if let Some(site_url) = &self.settings.site_url {
                request = request.header("HTTP-Referer", site_url);
            }
            if let Some(site_name) = &self.settings.site_name {
                request = request.header("X-Title", site_name);
            }
        }

        Ok(request)
    }
}

/// One meaningful line of a provider event stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Failed(String),
}

/// Interpret one complete `data:` line. Blank lines, comments, other fields and
/// chunks without text yield `None`.
fn parse_sse_line(line: &[u8]) -> Option<SseLine> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseLine::Done);
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping undecodable stream chunk: {}", e);
            return None;
        }
    };
    if let Some(message) = provider_error(&value) {
        return Some(SseLine::Failed(message));
    }
    extract_delta_text(&value).map(SseLine::Delta)
}

/// Turn a raw event-stream body into text deltas.
///
/// Bytes are buffered until a full line is available; network chunks may split
/// a multi-byte character, a line never does. A final line without a trailing
/// newline is still read when the body ends.
fn sse_deltas<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
    LlmError: From<E>,
{
    let deltas = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures_util::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::from(e));
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                match parse_sse_line(&line) {
                    Some(SseLine::Delta(delta)) => {
                        yield Ok(delta);
                    }
                    Some(SseLine::Done) => {
                        return;
                    }
                    Some(SseLine::Failed(message)) => {
                        yield Err(LlmError::Provider(message));
                        return;
                    }
                    None => {}
                }
            }
        }

        match parse_sse_line(&buffer) {
            Some(SseLine::Delta(delta)) => {
                yield Ok(delta);
            }
            Some(SseLine::Failed(message)) => {
                yield Err(LlmError::Provider(message));
            }
            Some(SseLine::Done) | None => {}
        }
    };

    Box::pin(deltas)
}

/// Message of a provider error envelope, if the value carries one.
fn provider_error(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

fn status_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| provider_error(&v))
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());
    LlmError::Status { status, message }
}

/// Join the text parts of an array-shaped `content`.
fn join_text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

/// Pull the reply text out of a non-streaming completion body.
///
/// Accepts `choices[0].message.content` as a string or as a list of text parts,
/// and the legacy `choices[0].text`.
pub fn extract_completion_text(value: &Value) -> Result<String, LlmError> {
    if let Some(message) = provider_error(value) {
        return Err(LlmError::Provider(message));
    }

    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(LlmError::EmptyResponse("choices"))?;

    let text = match choice.get("message") {
        Some(message) if message.is_object() => match message.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(parts)) => join_text_parts(parts),
            _ => return Err(LlmError::EmptyResponse("content")),
        },
        _ => choice
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse("message"))?,
    };

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse("content"));
    }

    Ok(text)
}

/// Text of one streamed chunk (`choices[0].delta.content`), if any.
pub fn extract_delta_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    let content = choice.get("delta")?.get("content")?;
    match content {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(parts) => Some(join_text_parts(parts)).filter(|t| !t.is_empty()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta_event(text: &str) -> String {
        format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]}))
    }

    async fn collect_deltas(chunks: Vec<Vec<u8>>) -> Vec<String> {
        let body = futures_util::stream::iter(
            chunks
                .into_iter()
                .map(Ok::<Vec<u8>, reqwest::Error>)
                .collect::<Vec<_>>(),
        );
        sse_deltas(body)
            .map(|delta| delta.expect("delta"))
            .collect::<Vec<String>>()
            .await
    }

    #[tokio::test]
    async fn test_stream_keeps_characters_split_across_chunks() {
        let event = delta_event("Grüße").into_bytes();
        // Cut between the two bytes of 'ü'
        let cut = event.iter().position(|b| *b == 0xC3).expect("two-byte char") + 1;

        let mut trailing = delta_event(" → 🚗").into_bytes();
        trailing.truncate(trailing.len() - 2);

        let deltas = collect_deltas(vec![
            event[..cut].to_vec(),
            event[cut..].to_vec(),
            trailing,
        ])
        .await;

        assert_eq!(deltas, vec!["Grüße".to_string(), " → 🚗".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_stops_at_done_and_reports_errors() {
        let mut body = delta_event("a").into_bytes();
        body.extend_from_slice(b": keep-alive\n\ndata: [DONE]\n\n");
        body.extend_from_slice(delta_event("ignored").as_bytes());
        assert_eq!(collect_deltas(vec![body]).await, vec!["a".to_string()]);

        let failing = futures_util::stream::iter(vec![Ok::<Vec<u8>, reqwest::Error>(
            b"data: {\"error\": {\"message\": \"rate limited\"}}\n".to_vec(),
        )]);
        let results: Vec<Result<String, LlmError>> = sse_deltas(failing).collect().await;
        assert!(matches!(
            results.as_slice(),
            [Err(LlmError::Provider(message))] if message == "rate limited"
        ));
    }

    #[test]
    fn test_extracts_message_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "print(1)"}}]});
        assert_eq!(extract_completion_text(&body).unwrap(), "print(1)");
    }

    #[test]
    fn test_extracts_content_parts_and_legacy_text() {
        let parts = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "a"},
            {"type": "text", "text": "b"}
        ]}}]});
        assert_eq!(extract_completion_text(&parts).unwrap(), "ab");

        let legacy = json!({"choices": [{"text": "hello"}]});
        assert_eq!(extract_completion_text(&legacy).unwrap(), "hello");
    }

    #[test]
    fn test_empty_shapes_are_classified() {
        assert!(matches!(
            extract_completion_text(&json!({"choices": []})),
            Err(LlmError::EmptyResponse("choices"))
        ));
        assert!(matches!(
            extract_completion_text(&json!({"id": "x"})),
            Err(LlmError::EmptyResponse("choices"))
        ));
        assert!(matches!(
            extract_completion_text(&json!({"choices": [{}]})),
            Err(LlmError::EmptyResponse("message"))
        ));
        assert!(matches!(
            extract_completion_text(&json!({"choices": [{"message": {"role": "assistant"}}]})),
            Err(LlmError::EmptyResponse("content"))
        ));
        assert!(matches!(
            extract_completion_text(&json!({"choices": [{"message": {"content": "   "}}]})),
            Err(LlmError::EmptyResponse("content"))
        ));
    }

    #[test]
    fn test_error_envelope_is_provider_error() {
        let body = json!({"error": {"message": "Rate limit exceeded", "code": 429}});
        match extract_completion_text(&body) {
            Err(LlmError::Provider(msg)) => assert_eq!(msg, "Rate limit exceeded"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_status_error_prefers_envelope_message() {
        match status_error(401, r#"{"error":{"message":"No auth credentials found"}}"#) {
            LlmError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "No auth credentials found");
            }
            other => panic!("unexpected: {:?}", other),
        }

        match status_error(502, "Bad Gateway") {
            LlmError::Status { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_delta_text() {
        let chunk = json!({"choices": [{"delta": {"content": "Hel"}}]});
        assert_eq!(extract_delta_text(&chunk).as_deref(), Some("Hel"));

        let role_only = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(extract_delta_text(&role_only), None);

        assert_eq!(extract_delta_text(&json!({"choices": []})), None);
    }

    #[test]
    fn test_multimodal_message_serialization() {
        let message = Message::user(vec![
            ContentPart::text("Analyze"),
            ContentPart::image_data("image/png", "AAAA"),
        ]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["type"], "image_url");
        assert_eq!(
            value["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );

        let plain = serde_json::to_value(Message::system("hi")).unwrap();
        assert_eq!(plain, json!({"role": "system", "content": "hi"}));
    }

    #[test]
    fn test_request_omits_stream_flag_when_false() {
        let messages = [Message::user("x")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 10,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("stream").is_none());
        assert_eq!(value["max_tokens"], 10);
    }
}
