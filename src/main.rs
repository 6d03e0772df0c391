mod brave;
mod config;
mod github;
mod groq;
mod rate_limit;
mod reaper;
mod tool_cache;
mod web;

use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::brave::{BraveClient, BraveError};
use crate::config::{ChatConfig, ConfigError};
use crate::github::{GithubClient, GithubError};
use crate::groq::{ChatModel, GroqClient, ModelError};
use crate::rate_limit::RateLimiter;
use crate::reaper::{spawn_reaper, Sweep};
use crate::tool_cache::ToolCache;
use crate::web::chat::tools::{Profile, ToolRegistry};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build model client: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to build search client: {0}")]
    Search(#[from] BraveError),

    #[error("Failed to build GitHub client: {0}")]
    Github(#[from] GithubError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-wide state shared by every request.
pub struct AppState {
    pub config: ChatConfig,
    /// `None` when no model credential is configured; chat requests get a 503.
    pub model: Option<Arc<dyn ChatModel>>,
    pub profile: Arc<Profile>,
    pub tools: Arc<ToolRegistry>,
    pub tool_cache: Arc<ToolCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub github: Option<GithubClient>,
}

impl AppState {
    /// Wires the stores, tool registry and outbound clients around `model`.
    pub fn from_config(
        config: ChatConfig,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self, StartupError> {
        let profile = Arc::new(Profile::load(config.profile_path.as_deref())?);

        let search = match &config.brave_api_key {
            Some(key) => Some(BraveClient::new(
                &config.brave_base_url,
                key.clone(),
                config.search_timeout(),
                config.search_min_interval(),
            )?),
            None => {
                warn!("BRAVE_API_KEY is not set; web search will report it is unavailable");
                None
            }
        };

        let github = match &config.github_repo {
            Some(_) => Some(GithubClient::new(
                &config.github_base_url,
                config.github_token.clone(),
            )?),
            None => None,
        };

        let tool_cache = Arc::new(ToolCache::new(config.tool_cache_ttl()));
        let tools = Arc::new(ToolRegistry::with_default_tools(
            tool_cache.clone(),
            profile.clone(),
            search,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window(),
        ));

        Ok(Self {
            config,
            model,
            profile,
            tools,
            tool_cache,
            rate_limiter,
            github,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ChatConfig::from_env()?;

    let model: Option<Arc<dyn ChatModel>> = match &config.groq_api_key {
        Some(key) => Some(Arc::new(GroqClient::new(
            &config.groq_base_url,
            key.clone(),
            config.model.clone(),
            config.request_timeout(),
        )?)),
        None => {
            warn!("GROQ_API_KEY is not set; chat requests will return 503");
            None
        }
    };

    let app_state = Arc::new(AppState::from_config(config, model)?);
    info!(
        "Loaded profile for {} with {} tools",
        app_state.profile.name(),
        app_state.tools.len()
    );

    let sweepers: Vec<Arc<dyn Sweep>> = vec![
        app_state.rate_limiter.clone(),
        app_state.tool_cache.clone(),
    ];
    let _reaper = spawn_reaper(app_state.config.reaper_interval(), sweepers);

    let bind_addr = app_state.config.bind_addr;
    let app = web::router(app_state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
