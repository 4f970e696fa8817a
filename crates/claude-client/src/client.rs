use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream::TextStream;
use crate::types::{ChatMessage, ErrorEnvelope, MessageRequest, StreamEvent, Delta};
use crate::{ClaudeError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─── Completion ───────────────────────────────────────────────────────────

/// A source of streamed completions.
///
/// [`ClaudeClient`] talks to Anthropic. Tests and offline tools implement
/// this with scripted [`TextStream`]s.
pub trait Completion: Send + Sync {
    fn stream(&self, system: &str, messages: Vec<ChatMessage>) -> TextStream;
}

// ─── ClaudeClient ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ClaudeClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Read the API key from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(ClaudeError::MissingApiKey(var.to_string())),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, system: &str, messages: Vec<ChatMessage>) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages,
            stream: true,
        }
    }

    /// Stream a completion and return the concatenated text.
    pub async fn complete(&self, system: &str, messages: Vec<ChatMessage>) -> Result<String> {
        collect(Completion::stream(self, system, messages)).await
    }
}

impl Completion for ClaudeClient {
    fn stream(&self, system: &str, messages: Vec<ChatMessage>) -> TextStream {
        let (tx, rx) = mpsc::channel(64);
        let body = self.request(system, messages);
        let builder = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        debug!(model = %body.model, messages = body.messages.len(), "opening message stream");
        tokio::spawn(pump(builder, tx));
        TextStream::from_channel(rx)
    }
}

/// Drive one SSE connection, forwarding text deltas until the message ends.
async fn pump(builder: reqwest::RequestBuilder, tx: mpsc::Sender<Result<String>>) {
    let mut es = match EventSource::new(builder) {
        Ok(es) => es,
        Err(e) => {
            let _ = tx.send(Err(ClaudeError::Stream(e.to_string()))).await;
            return;
        }
    };

    while let Some(event) = es.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(msg)) => {
                let parsed: StreamEvent = match serde_json::from_str(&msg.data) {
                    Ok(ev) => ev,
                    Err(source) => {
                        let _ = tx
                            .send(Err(ClaudeError::Parse {
                                data: msg.data,
                                source,
                            }))
                            .await;
                        break;
                    }
                };
                match parsed {
                    StreamEvent::ContentBlockDelta {
                        delta: Delta::TextDelta { text },
                        ..
                    } => {
                        if tx.send(Ok(text)).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    StreamEvent::MessageDelta { delta, usage } => {
                        debug!(stop_reason = ?delta.stop_reason, ?usage, "message delta");
                    }
                    StreamEvent::Error { error } => {
                        warn!(kind = %error.kind, message = %error.message, "error event in message stream");
                        let _ = tx
                            .send(Err(ClaudeError::Api {
                                status: error.status(),
                                message: error.message,
                            }))
                            .await;
                        break;
                    }
                    StreamEvent::MessageStop => break,
                    _ => {}
                }
            }
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorEnvelope>(&body)
                    .map(|env| env.error.message)
                    .unwrap_or(body);
                let _ = tx
                    .send(Err(ClaudeError::Api {
                        status: status.as_u16(),
                        message,
                    }))
                    .await;
                break;
            }
            Err(e) => {
                let _ = tx.send(Err(ClaudeError::Stream(e.to_string()))).await;
                break;
            }
        }
    }
    es.close();
}

/// Drain a [`TextStream`] into one string. The first error aborts.
pub async fn collect(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

// ─── Tests ────────────────────────────────────────────────────────────────
