//! Streaming client for an OpenAI-compatible chat completion API (Groq by default).
//!
//! The client only establishes the stream. A spawned reader turns the SSE body into
//! [`ModelEvent`]s on a channel so the response streamer never touches raw frames.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::config::ApiKey;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model credential is not configured")]
    MissingCredential,

    #[error("model provider rejected the credential ({status})")]
    Unauthorized { status: u16 },

    #[error("model provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("model provider rejected the request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("network error talking to model provider: {0}")]
    Network(String),

    #[error("model request timed out")]
    Timeout,

    #[error("model provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("model stream failed: {0}")]
    Stream(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ModelError {
    /// Network faults, timeouts and provider 5xx may succeed on a later attempt.
    /// Everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Network(_) | ModelError::Timeout | ModelError::Upstream { .. }
        )
    }

    fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => ModelError::Unauthorized { status: code },
            429 => ModelError::RateLimited(message),
            500..=599 => ModelError::Upstream {
                status: code,
                message,
            },
            _ => ModelError::InvalidRequest {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout
        } else {
            ModelError::Network(err.to_string())
        }
    }
}

/// A tool call requested by the model, with its arguments still as raw JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl Serialize for ModelToolCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        json!({
            "id": self.id,
            "type": "function",
            "function": { "name": self.name, "arguments": self.arguments },
        })
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ModelMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ModelToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl Serialize for ToolDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            },
        })
        .serialize(serializer)
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, alias = "prompt_tokens")]
    pub prompt_tokens: u32,
    #[serde(default, alias = "completion_tokens")]
    pub completion_tokens: u32,
    #[serde(default, alias = "total_tokens")]
    pub total_tokens: u32,
}

#[derive(Debug)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ModelToolCall),
    Finish {
        reason: String,
        usage: Option<Usage>,
    },
    Error(ModelError),
}

/// Events of one established completion. Ends after `Finish` or `Error`.
pub struct CompletionStream {
    events: mpsc::Receiver<ModelEvent>,
}

impl CompletionStream {
    pub async fn next(&mut self) -> Option<ModelEvent> {
        self.events.recv().await
    }

    #[cfg(test)]
    pub(crate) fn from_events(events: Vec<ModelEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Self { events: rx }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Opens a streaming completion. Errors here happen before any output exists.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ModelError>;
}

#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    completions_url: String,
    api_key: ApiKey,
    model: String,
    first_byte_timeout: Duration,
}

impl GroqClient {
    pub fn new(
        base_url: &str,
        api_key: ApiKey,
        model: impl Into<String>,
        first_byte_timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(20)
            .user_agent(concat!("portfolio-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ModelError::Client(e.to_string()))?;

        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            first_byte_timeout,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
            body["tool_choice"] = json!("auto");
            body["parallel_tool_calls"] = json!(false);
        }

        body
    }
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("completions_url", &self.completions_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl ChatModel for GroqClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ModelError> {
        let body = self.request_body(request);
        trace!(
            "Sending completion request to {} with {} messages",
            self.completions_url,
            request.messages.len()
        );

        let send = self
            .client
            .post(&self.completions_url)
            .bearer_auth(self.api_key.expose())
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = match timeout(self.first_byte_timeout, send).await {
            Ok(result) => result?,
            Err(_) => return Err(ModelError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, message));
        }

        debug!("Model stream established ({})", status);
        Ok(spawn_stream_reader(response, STREAM_CHUNK_TIMEOUT))
    }
}

fn spawn_stream_reader(response: reqwest::Response, chunk_timeout: Duration) -> CompletionStream {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut assembler = StreamAssembler::default();

        loop {
            match timeout(chunk_timeout, body.next()).await {
                Ok(Some(Ok(bytes))) => {
                    buffer.extend_from_slice(&bytes);

                    while let Some(frame) = extract_sse_frame(&mut buffer) {
                        match handle_frame(&frame, &mut assembler, &tx).await {
                            FrameAction::Continue => {}
                            FrameAction::Done => {
                                send_finish(&mut assembler, &tx).await;
                                return;
                            }
                            FrameAction::Abort => return,
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    error!("Model stream read failed: {:?}", e);
                    let _ = tx.send(ModelEvent::Error(ModelError::from(e))).await;
                    return;
                }
                Ok(None) => {
                    // The last frame may arrive without its blank-line terminator.
                    if !buffer.is_empty() {
                        buffer.extend_from_slice(b"\n\n");
                        while let Some(frame) = extract_sse_frame(&mut buffer) {
                            match handle_frame(&frame, &mut assembler, &tx).await {
                                FrameAction::Continue => {}
                                FrameAction::Done => break,
                                FrameAction::Abort => return,
                            }
                        }
                    }
                    send_finish(&mut assembler, &tx).await;
                    return;
                }
                Err(_) => {
                    error!("Model stream chunk timeout after {:?}", chunk_timeout);
                    let _ = tx.send(ModelEvent::Error(ModelError::Timeout)).await;
                    return;
                }
            }
        }
    });

    CompletionStream { events: rx }
}

enum FrameAction {
    Continue,
    Done,
    Abort,
}

/// Applies one `data:` payload. `Abort` means the reader must stop without a
/// finish event.
async fn handle_frame(
    frame: &str,
    assembler: &mut StreamAssembler,
    tx: &mpsc::Sender<ModelEvent>,
) -> FrameAction {
    if frame == "[DONE]" {
        return FrameAction::Done;
    }

    let chunk: Value = match serde_json::from_str(frame) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Skipping malformed model stream frame: {}", e);
            return FrameAction::Continue;
        }
    };

    if let Some(err) = chunk.get("error") {
        error!("Model provider reported a stream error: {}", err);
        let _ = tx
            .send(ModelEvent::Error(ModelError::Stream(err.to_string())))
            .await;
        return FrameAction::Abort;
    }

    if let Some(text) = assembler.ingest(&chunk) {
        if tx.send(ModelEvent::TextDelta(text)).await.is_err() {
            return FrameAction::Abort;
        }
    }

    FrameAction::Continue
}

async fn send_finish(assembler: &mut StreamAssembler, tx: &mpsc::Sender<ModelEvent>) {
    for event in assembler.finish() {
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Pops the next `data:` payload off the buffer, skipping comment and empty frames.
fn extract_sse_frame(buffer: &mut Vec<u8>) -> Option<String> {
    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..pos + 2).collect();
        let frame = String::from_utf8_lossy(&raw[..pos]);

        if let Some(data) = frame.lines().find_map(|line| line.strip_prefix("data:")) {
            return Some(data.trim_start().to_string());
        }
    }
    None
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates tool-call fragments, finish reason and usage across chunks.
#[derive(Default)]
struct StreamAssembler {
    tool_calls: BTreeMap<u64, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
}

impl StreamAssembler {
    /// Records one chunk and returns its text delta, if any.
    fn ingest(&mut self, chunk: &Value) -> Option<String> {
        let usage = chunk
            .get("usage")
            .or_else(|| chunk.pointer("/x_groq/usage"))
            .filter(|u| !u.is_null());
        if let Some(usage) = usage {
            if let Ok(usage) = serde_json::from_value::<Usage>(usage.clone()) {
                self.usage = Some(usage);
            }
        }

        let choice = chunk.pointer("/choices/0")?;

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }

        if let Some(calls) = choice.pointer("/delta/tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let slot = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    slot.id = id.to_string();
                }
                if let Some(name) = call.pointer("/function/name").and_then(Value::as_str) {
                    slot.name.push_str(name);
                }
                if let Some(args) = call.pointer("/function/arguments").and_then(Value::as_str) {
                    slot.arguments.push_str(args);
                }
            }
        }

        choice
            .pointer("/delta/content")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    /// Completed tool calls in index order followed by the finish event. Empty
    /// on a second call.
    fn finish(&mut self) -> Vec<ModelEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events: Vec<ModelEvent> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|call| {
                ModelEvent::ToolCall(ModelToolCall {
                    id: if call.id.is_empty() {
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        call.id
                    },
                    name: call.name,
                    arguments: call.arguments,
                })
            })
            .collect();

        events.push(ModelEvent::Finish {
            reason: self
                .finish_reason
                .take()
                .unwrap_or_else(|| "stop".to_string()),
            usage: self.usage.take(),
        });
        events
    }
}
