use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::github::GithubError;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct StarsResponse {
    pub stars: u64,
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/api/github-stars", get(github_stars_handler))
        .with_state(app_state)
}

async fn github_stars_handler(State(app_state): State<Arc<AppState>>) -> Response {
    let (Some(client), Some(repo)) = (&app_state.github, &app_state.config.github_repo) else {
        debug!("GitHub stars requested but no repository is configured");
        return (StatusCode::SERVICE_UNAVAILABLE, "GitHub repository not configured")
            .into_response();
    };

    match client.repo_stars(repo).await {
        Ok(stars) => Json(StarsResponse { stars }).into_response(),
        Err(GithubError::Service { status, message }) => {
            error!("GitHub returned {} for {}: {}", status, repo, message);
            let status =
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, "Failed to fetch stars").into_response()
        }
        Err(e) => {
            error!("Failed to fetch stars for {}: {}", repo, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch stars").into_response()
        }
    }
}
