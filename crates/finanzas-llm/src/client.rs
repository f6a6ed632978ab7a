// OpenAI chat-completions client.
//
// `stream_chat` posts with `stream: true` and parses the Server-Sent Events
// into `LlmEvent` variants forwarded over an mpsc channel for the app loop.
// `complete` is the plain request/response call used by the AI analysis.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use finanzas_core::config::{Config, LlmConfig};

use crate::protocol::{ChatMessage, LlmEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("API key not configured")]
    MissingApiKey,

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response contained no content")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Model and sampling settings for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl CompletionParams {
    /// Settings for assistant chat turns.
    pub fn chat(cfg: &LlmConfig) -> Self {
        CompletionParams {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            presence_penalty: Some(cfg.presence_penalty),
            frequency_penalty: Some(cfg.frequency_penalty),
        }
    }

    /// Settings for the one-shot AI analysis.
    pub fn analysis(cfg: &LlmConfig) -> Self {
        CompletionParams {
            model: cfg.analysis_model.clone(),
            max_tokens: cfg.analysis_max_tokens,
            temperature: cfg.temperature,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

fn build_request<'a>(
    messages: &'a [ChatMessage],
    params: &'a CompletionParams,
    stream: bool,
) -> ChatRequest<'a> {
    ChatRequest {
        model: &params.model,
        messages,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
        stream,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Low-level client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Stream a completion as `LlmEvent`s over `tx`.
    ///
    /// Returns when the stream is complete, an error occurs, or the receiver
    /// is dropped. Failures are reported as `LlmEvent::Error`, not as `Err`.
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: LlmError::MissingApiKey.to_string(),
                    generation,
                })
                .await;
            return Ok(());
        }

        let body = build_request(messages, params, true);
        info!(
            model = %params.model,
            messages = messages.len(),
            generation,
            "starting streamed completion"
        );

        let request = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: format!("Failed to create event source: {e}"),
                        generation,
                    })
                    .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();
                    if data == "[DONE]" {
                        debug!(input_tokens, output_tokens, "stream finished");
                        let _ = tx
                            .send(LlmEvent::Complete {
                                full_text,
                                input_tokens,
                                output_tokens,
                                generation,
                            })
                            .await;
                        es.close();
                        return Ok(());
                    }

                    if let Some((prompt, completion)) = parse_usage(data) {
                        input_tokens = prompt;
                        output_tokens = completion;
                    }
                    if let Some(reason) = parse_finish_reason(data) {
                        debug!(%reason, "finish_reason");
                    }
                    if let Some(text) = parse_delta_content(data) {
                        if text.is_empty() {
                            continue;
                        }
                        full_text.push_str(&text);
                        if tx.send(LlmEvent::Token { text, generation }).await.is_err() {
                            // Receiver dropped; nobody is listening.
                            es.close();
                            return Ok(());
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("SSE stream ended without [DONE]");
                    break;
                }
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    let message = extract_error_message(&err);
                    let _ = tx.send(LlmEvent::Error { message, generation }).await;
                    es.close();
                    return Ok(());
                }
            }
        }
        es.close();

        if full_text.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "Stream ended unexpectedly without any content".to_string(),
                    generation,
                })
                .await;
        } else {
            let _ = tx
                .send(LlmEvent::Complete {
                    full_text,
                    input_tokens,
                    output_tokens,
                    generation,
                })
                .await;
        }

        Ok(())
    }

    /// Run a completion and return the first choice's content.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let body = build_request(messages, params, false);
        info!(model = %params.model, messages = messages.len(), "sending completion request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = parse_error_body(&text).unwrap_or(text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;
        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        info!(
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(Completion {
            content,
            model: parsed.model.unwrap_or_else(|| params.model.clone()),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured API client or a stand-in that reports it is disabled.
pub enum LlmClient {
    Active(OpenAiClient),
    /// No API key configured.
    Disabled,
}

impl LlmClient {
    /// `Active` when an OpenAI key is present in credentials.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.openai_api_key {
            Some(key) if !key.is_empty() => {
                LlmClient::Active(OpenAiClient::new(config.llm.base_url.clone(), key.clone()))
            }
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }

    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => client.stream_chat(messages, params, tx, generation).await,
            LlmClient::Disabled => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: LlmError::NotConfigured.to_string(),
                        generation,
                    })
                    .await;
                Ok(())
            }
        }
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, LlmError> {
        match self {
            LlmClient::Active(client) => client.complete(messages, params).await,
            LlmClient::Disabled => Err(LlmError::NotConfigured),
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// Extract `choices[0].delta.content` from a chunk.
///
/// Expected shape: `{ "choices": [ { "delta": { "content": "..." } } ] }`
pub(crate) fn parse_delta_content(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `choices[0].finish_reason` when set.
pub(crate) fn parse_finish_reason(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("choices")?
        .get(0)?
        .get("finish_reason")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `(prompt_tokens, completion_tokens)` from the final usage chunk.
///
/// Expected shape: `{ "choices": [], "usage": { "prompt_tokens": N, "completion_tokens": M } }`
pub(crate) fn parse_usage(data: &str) -> Option<(u32, u32)> {
    let v: Value = serde_json::from_str(data).ok()?;
    let usage = v.get("usage")?;
    let prompt = usage.get("prompt_tokens")?.as_u64()? as u32;
    let completion = usage.get("completion_tokens")?.as_u64()? as u32;
    Some((prompt, completion))
}

/// Extract `error.message` from an API error body.
pub(crate) fn parse_error_body(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.is_empty())
}

fn extract_error_message(err: &reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
            format!("API returned status {status}")
        }
        reqwest_eventsource::Error::Transport(e) => {
            format!("Network error: {e}")
        }
        other => format!("Stream error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use finanzas_core::config::{
        BackendConfig, BackendKind, CredentialsConfig, UiConfig,
    };
    use finanzas_core::context::ContextSettings;

    fn llm_config() -> LlmConfig {
        LlmConfig {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            max_tokens: 500,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
            history_limit: 10,
            analysis_model: "gpt-4.1-nano".into(),
            analysis_max_tokens: 1500,
        }
    }

    fn make_test_config(api_key: Option<String>) -> Config {
        Config {
            backend: BackendConfig {
                kind: BackendKind::Local,
                url: String::new(),
                local_path: ":memory:".into(),
            },
            llm: llm_config(),
            context: ContextSettings::default(),
            ui: UiConfig::default(),
            credentials: CredentialsConfig {
                openai_api_key: api_key,
                ..CredentialsConfig::default()
            },
        }
    }

    // -- SSE chunk parsing --

    #[test]
    fn parse_delta_content_text() {
        let data = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [ { "index": 0, "delta": { "content": "Hola" }, "finish_reason": null } ]
        }"#;
        assert_eq!(parse_delta_content(data), Some("Hola".to_string()));
        assert_eq!(parse_finish_reason(data), None);
    }

    #[test]
    fn parse_delta_role_only_chunk() {
        let data = r#"{ "choices": [ { "index": 0, "delta": { "role": "assistant" } } ] }"#;
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_finish_reason_stop() {
        let data = r#"{ "choices": [ { "index": 0, "delta": {}, "finish_reason": "stop" } ] }"#;
        assert_eq!(parse_finish_reason(data), Some("stop".to_string()));
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_usage_chunk() {
        let data = r#"{
            "choices": [],
            "usage": { "prompt_tokens": 812, "completion_tokens": 96, "total_tokens": 908 }
        }"#;
        assert_eq!(parse_usage(data), Some((812, 96)));
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_usage_null() {
        let data = r#"{ "choices": [ { "delta": { "content": "x" } } ], "usage": null }"#;
        assert_eq!(parse_usage(data), None);
    }

    #[test]
    fn parse_helpers_reject_invalid_json() {
        assert_eq!(parse_delta_content("[DONE]"), None);
        assert_eq!(parse_usage("{broken"), None);
        assert_eq!(parse_finish_reason("nope"), None);
    }

    #[test]
    fn parse_error_body_message() {
        let body = r#"{ "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" } }"#;
        assert_eq!(
            parse_error_body(body),
            Some("Incorrect API key provided".to_string())
        );
        assert_eq!(parse_error_body("<html>bad gateway</html>"), None);
    }

    // -- Request body --

    #[test]
    fn streaming_request_body() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hola")];
        let params = CompletionParams::chat(&llm_config());
        let v = serde_json::to_value(build_request(&messages, &params, true)).unwrap();
        assert_eq!(v["model"], "gpt-3.5-turbo");
        assert_eq!(v["max_tokens"], 500);
        assert_eq!(v["stream"], true);
        assert_eq!(v["stream_options"]["include_usage"], true);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "hola");
        assert!((v["presence_penalty"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn analysis_request_body_omits_penalties() {
        let messages = vec![ChatMessage::user("analiza")];
        let params = CompletionParams::analysis(&llm_config());
        let v = serde_json::to_value(build_request(&messages, &params, false)).unwrap();
        assert_eq!(v["model"], "gpt-4.1-nano");
        assert_eq!(v["max_tokens"], 1500);
        assert_eq!(v["stream"], false);
        assert!(v.get("stream_options").is_none());
        assert!(v.get("presence_penalty").is_none());
        assert!(v.get("frequency_penalty").is_none());
    }

    #[test]
    fn endpoint_joins_base_url() {
        let c = OpenAiClient::new("http://localhost:8080/v1/", "k");
        assert_eq!(c.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    // -- Disabled / missing key paths --

    #[tokio::test]
    async fn disabled_client_sends_error_event() {
        let client = LlmClient::Disabled;
        let (tx, mut rx) = mpsc::channel(8);
        let params = CompletionParams::chat(&llm_config());

        client
            .stream_chat(&[ChatMessage::user("hola")], &params, tx, 1)
            .await
            .expect("should not fail");

        let event = rx.recv().await.expect("should receive an event");
        assert_eq!(
            event,
            LlmEvent::Error {
                message: "LLM not configured".to_string(),
                generation: 1,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_api_key_sends_error_event() {
        let client = OpenAiClient::new("https://api.openai.com/v1", "");
        let (tx, mut rx) = mpsc::channel(8);
        let params = CompletionParams::chat(&llm_config());

        client
            .stream_chat(&[ChatMessage::user("hola")], &params, tx, 42)
            .await
            .expect("should not fail");

        let event = rx.recv().await.expect("should receive an event");
        assert_eq!(
            event,
            LlmEvent::Error {
                message: "API key not configured".to_string(),
                generation: 42,
            }
        );
    }

    #[tokio::test]
    async fn disabled_complete_is_an_error() {
        let params = CompletionParams::analysis(&llm_config());
        let err = LlmClient::Disabled
            .complete(&[ChatMessage::user("x")], &params)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));

        let err = OpenAiClient::new("https://api.openai.com/v1", "")
            .complete(&[ChatMessage::user("x")], &params)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    // -- from_config --

    #[test]
    fn from_config_with_api_key_returns_active() {
        let client = LlmClient::from_config(&make_test_config(Some("sk-test".into())));
        assert!(client.is_enabled());
    }

    #[test]
    fn from_config_without_api_key_returns_disabled() {
        assert!(!LlmClient::from_config(&make_test_config(None)).is_enabled());
        assert!(!LlmClient::from_config(&make_test_config(Some(String::new()))).is_enabled());
    }

    #[test]
    fn chat_response_first_choice() {
        let body = r#"{
            "id": "chatcmpl-2",
            "model": "gpt-4.1-nano-2025-04-14",
            "choices": [ { "index": 0, "message": { "role": "assistant", "content": "Análisis" } } ],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Análisis"));
        assert_eq!(parsed.usage.map(|u| u.completion_tokens), Some(3));
    }
}
