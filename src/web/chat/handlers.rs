//! POST /api/chat: validate, rate limit, open the first model stream and hand
//! the turn to the stream processor.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::constants::HEADER_MODEL_USED;
use super::errors::{insert_rate_limit_headers, ChatError};
use super::prompts::build_messages;
use super::retry::{invoke_with_retry, RetryPolicy};
use super::stream_processor::{ChatTurn, StreamProcessor};
use super::validation::{validate_chat_body, ValidationLimits};
use crate::groq::{CompletionRequest, ModelError};
use crate::AppState;

const UNKNOWN_CLIENT: &str = "unknown";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}

/// Rate-limit key for the caller: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then a shared bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ChatError> {
    let limits = ValidationLimits {
        max_messages: state.config.max_messages,
        max_message_length: state.config.max_message_length,
    };
    let conversation = validate_chat_body(&body, &limits).map_err(|e| {
        debug!("Rejected chat body: {}", e);
        e
    })?;

    let client = client_key(&headers);
    let decision = state.rate_limiter.check(&client);
    if !decision.allowed {
        warn!("Rate limit exceeded for client {}", client);
        return Err(ChatError::RateLimited(decision));
    }

    let Some(model) = state.model.clone() else {
        error!("Chat request received but no model credential is configured");
        return Err(ModelError::MissingCredential.into());
    };

    info!(
        "Chat request from {} with {} messages ({} remaining in window)",
        client,
        conversation.len(),
        decision.remaining
    );

    let request = CompletionRequest {
        messages: build_messages(&state.profile, &conversation),
        tools: state.tools.definitions(),
        temperature: state.config.temperature,
        max_tokens: state.config.max_tokens,
    };
    let retry = RetryPolicy {
        max_retries: state.config.max_retries,
        base_delay: state.config.retry_base_delay(),
    };
    let deadline = Instant::now() + state.config.request_timeout();

    let first = timeout_at(deadline, invoke_with_retry(model.as_ref(), &request, &retry))
        .await
        .map_err(|_| ChatError::Timeout)??;

    let model_name = model.model_name().to_string();
    let frames = StreamProcessor::spawn(
        ChatTurn {
            model,
            tools: state.tools.clone(),
            request,
            retry,
            max_steps: state.config.max_steps,
            deadline,
        },
        first,
    );

    let events =
        ReceiverStream::new(frames).map(|frame| Ok::<Event, Infallible>(frame.into_event()));

    let mut response = Sse::new(events).into_response();
    let response_headers = response.headers_mut();
    insert_rate_limit_headers(response_headers, &decision);
    if let Ok(value) = HeaderValue::from_str(&model_name) {
        response_headers.insert(HEADER_MODEL_USED, value);
    }

    Ok(response)
}
