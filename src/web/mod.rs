pub mod chat;
pub mod github_routes;

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::AppState;

/// Added to the request timeout for the outer layer so the chat handler's own
/// deadline fires first and answers with a classified error body.
const TIMEOUT_LAYER_MARGIN: Duration = Duration::from_secs(1);

/// Every route plus the shared HTTP layers.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.cors_allowed_origins);
    let request_timeout = app_state.config.request_timeout() + TIMEOUT_LAYER_MARGIN;

    Router::new()
        .route("/health", get(health))
        .merge(chat::router(app_state.clone()))
        .merge(github_routes::router(app_state))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::groq::ChatModel;
    use crate::web::chat::test_support::StalledModel;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_health_and_security_headers() {
        let state = Arc::new(AppState::from_config(ChatConfig::default(), None).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_chat_errors_also_carry_security_headers() {
        let state = Arc::new(AppState::from_config(ChatConfig::default(), None).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/chat", addr))
            .header("origin", "https://portfolio.example")
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_stalled_first_model_call_times_out_with_json_body() {
        let config = ChatConfig {
            request_timeout_secs: 1,
            ..ChatConfig::default()
        };
        let model: Arc<dyn ChatModel> = Arc::new(StalledModel);
        let state = Arc::new(AppState::from_config(config, Some(model)).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/chat", addr))
            .json(&json!({"messages": [{"role": "user", "content": "hello"}]}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"error": "Request timed out. Please try again."}));
    }
}
