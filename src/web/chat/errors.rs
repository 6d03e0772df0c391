//! Failure taxonomy for the chat endpoint and its mapping to user-facing output.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use super::constants::{
    HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
    MSG_INVALID_REQUEST, MSG_NETWORK, MSG_RATE_LIMITED, MSG_SERVICE_UNAVAILABLE, MSG_TIMEOUT,
    MSG_UNKNOWN, MSG_UPSTREAM_RATE_LIMITED,
};
use super::validation::ValidationError;
use crate::groq::ModelError;
use crate::rate_limit::RateLimitDecision;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request validation failed: {0:?}")]
    Validation(#[from] ValidationError),

    #[error("client exceeded {} requests per window", .0.limit)]
    RateLimited(RateLimitDecision),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("request deadline exceeded")]
    Timeout,
}

/// What the client is told about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps a failure to a sanitized message and status. Full detail is logged here
/// and never returned.
pub fn classify(err: &ChatError) -> ClassifiedError {
    error!("Chat request failed: {:?}", err);

    let (status, message) = match err {
        ChatError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        ChatError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, MSG_RATE_LIMITED.to_string()),
        ChatError::Model(e) => classify_model_error(e),
        ChatError::Timeout => (StatusCode::INTERNAL_SERVER_ERROR, MSG_TIMEOUT.to_string()),
    };

    ClassifiedError { status, message }
}

fn classify_model_error(err: &ModelError) -> (StatusCode, String) {
    let (status, message) = match err {
        ModelError::MissingCredential | ModelError::Unauthorized { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, MSG_SERVICE_UNAVAILABLE)
        }
        ModelError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, MSG_UPSTREAM_RATE_LIMITED),
        ModelError::Network(_) | ModelError::Upstream { .. } => {
            (StatusCode::BAD_GATEWAY, MSG_NETWORK)
        }
        ModelError::Timeout => (StatusCode::INTERNAL_SERVER_ERROR, MSG_TIMEOUT),
        ModelError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, MSG_INVALID_REQUEST),
        ModelError::Stream(_) | ModelError::Client(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, MSG_UNKNOWN)
        }
    };
    (status, message.to_string())
}

/// `X-RateLimit-Limit` and `X-RateLimit-Remaining` for any decision.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(
        HeaderName::from_static(HEADER_RATE_LIMIT_LIMIT),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RATE_LIMIT_REMAINING),
        HeaderValue::from(decision.remaining),
    );
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let classified = classify(&self);
        let mut response = (
            classified.status,
            Json(ErrorBody {
                error: classified.message,
            }),
        )
            .into_response();

        if let ChatError::RateLimited(decision) = &self {
            let headers = response.headers_mut();
            insert_rate_limit_headers(headers, decision);

            let reset_at_ms =
                chrono::Utc::now().timestamp_millis() + decision.reset_in.as_millis() as i64;
            headers.insert(
                HeaderName::from_static(HEADER_RATE_LIMIT_RESET),
                HeaderValue::from(reset_at_ms),
            );
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(decision.retry_after_secs()),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn classified(err: ChatError) -> (u16, String) {
        let c = classify(&err);
        (c.status.as_u16(), c.message)
    }

    #[test]
    fn test_model_errors_map_to_fixed_messages() {
        assert_eq!(
            classified(ModelError::MissingCredential.into()),
            (503, MSG_SERVICE_UNAVAILABLE.to_string())
        );
        assert_eq!(
            classified(ModelError::Unauthorized { status: 401 }.into()),
            (503, MSG_SERVICE_UNAVAILABLE.to_string())
        );
        assert_eq!(
            classified(ModelError::RateLimited("quota".into()).into()),
            (429, MSG_UPSTREAM_RATE_LIMITED.to_string())
        );
        assert_eq!(
            classified(ModelError::Network("connection reset".into()).into()),
            (502, MSG_NETWORK.to_string())
        );
        assert_eq!(
            classified(
                ModelError::Upstream {
                    status: 503,
                    message: "overloaded".into()
                }
                .into()
            ),
            (502, MSG_NETWORK.to_string())
        );
        assert_eq!(
            classified(ModelError::Timeout.into()),
            (500, MSG_TIMEOUT.to_string())
        );
        assert_eq!(
            classified(ModelError::Stream("connection reset mid-body".into()).into()),
            (500, MSG_UNKNOWN.to_string())
        );
    }

    #[test]
    fn test_internal_detail_never_leaks() {
        let err = ChatError::Model(ModelError::InvalidRequest {
            status: 400,
            message: "secret internal detail gsk_live_123".into(),
        });
        let (status, message) = classified(err);
        assert_eq!(status, 400);
        assert!(!message.contains("gsk_live_123"));
    }

    #[tokio::test]
    async fn test_rate_limited_response_carries_headers() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_in: Duration::from_millis(41_200),
        };

        let before_ms = chrono::Utc::now().timestamp_millis();
        let response = ChatError::RateLimited(decision).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["retry-after"], "42");

        let reset: i64 = headers["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
        assert!(reset >= before_ms + 41_200);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], MSG_RATE_LIMITED);
    }
}
