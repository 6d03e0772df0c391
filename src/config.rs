//! Runtime configuration loaded from the process environment.
//!
//! Every knob has a default matching the production deployment; `.env` files are
//! honoured through `dotenv` in `main`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_GROQ_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_BRAVE_BASE: &str = "https://api.search.brave.com/res/v1";
pub const DEFAULT_GITHUB_BASE: &str = "https://api.github.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("configuration out of range: {0}")]
    OutOfRange(#[from] validator::ValidationErrors),

    #[error("failed to read profile data from {path}: {source}")]
    ProfileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile data is not valid JSON: {0}")]
    ProfileJson(#[from] serde_json::Error),
}

/// A credential read from the environment. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, Validate)]
pub struct ChatConfig {
    pub bind_addr: SocketAddr,

    /// Model service credential. `None` turns every chat request into a 503.
    pub groq_api_key: Option<ApiKey>,
    #[validate(url)]
    pub groq_base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[validate(range(min = 1, max = 8))]
    pub max_steps: u32,

    /// Web search credential. `None` degrades only the search tool.
    pub brave_api_key: Option<ApiKey>,
    #[validate(url)]
    pub brave_base_url: String,
    #[validate(range(min = 1))]
    pub search_timeout_secs: u64,
    pub search_min_interval_ms: u64,

    #[validate(range(min = 1))]
    pub rate_limit_max_requests: u32,
    #[validate(range(min = 1))]
    pub rate_limit_window_secs: u64,
    #[validate(range(min = 1))]
    pub tool_cache_ttl_secs: u64,

    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,

    #[validate(range(min = 1))]
    pub max_messages: usize,
    #[validate(range(min = 1))]
    pub max_message_length: usize,

    #[validate(range(min = 1))]
    pub reaper_interval_secs: u64,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    pub profile_path: Option<PathBuf>,

    pub github_token: Option<ApiKey>,
    /// `owner/name` of the repository whose stars are reported.
    pub github_repo: Option<String>,
    #[validate(url)]
    pub github_base_url: String,

    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            groq_api_key: None,
            groq_base_url: DEFAULT_GROQ_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.5,
            max_tokens: 500,
            max_steps: 2,
            brave_api_key: None,
            brave_base_url: DEFAULT_BRAVE_BASE.to_string(),
            search_timeout_secs: 10,
            search_min_interval_ms: 100,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            tool_cache_ttl_secs: 300,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            max_messages: 50,
            max_message_length: 10_000,
            reaper_interval_secs: 300,
            request_timeout_secs: 30,
            profile_path: None,
            github_token: None,
            github_repo: None,
            github_base_url: DEFAULT_GITHUB_BASE.to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let d = Self::default();

        let host: IpAddr = parse_or(&get, "HOST", d.bind_addr.ip())?;
        let port: u16 = parse_or(&get, "PORT", d.bind_addr.port())?;

        let config = Self {
            bind_addr: SocketAddr::new(host, port),
            groq_api_key: get("GROQ_API_KEY").map(ApiKey::new),
            groq_base_url: get("GROQ_BASE_URL").unwrap_or(d.groq_base_url),
            model: get("CHAT_MODEL").unwrap_or(d.model),
            temperature: parse_or(&get, "CHAT_TEMPERATURE", d.temperature)?,
            max_tokens: parse_or(&get, "CHAT_MAX_TOKENS", d.max_tokens)?,
            max_steps: parse_or(&get, "CHAT_MAX_STEPS", d.max_steps)?,
            brave_api_key: get("BRAVE_API_KEY").map(ApiKey::new),
            brave_base_url: get("BRAVE_BASE_URL").unwrap_or(d.brave_base_url),
            search_timeout_secs: parse_or(&get, "SEARCH_TIMEOUT_SECS", d.search_timeout_secs)?,
            search_min_interval_ms: parse_or(
                &get,
                "SEARCH_MIN_INTERVAL_MS",
                d.search_min_interval_ms,
            )?,
            rate_limit_max_requests: parse_or(
                &get,
                "RATE_LIMIT_MAX_REQUESTS",
                d.rate_limit_max_requests,
            )?,
            rate_limit_window_secs: parse_or(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                d.rate_limit_window_secs,
            )?,
            tool_cache_ttl_secs: parse_or(&get, "TOOL_CACHE_TTL_SECS", d.tool_cache_ttl_secs)?,
            max_retries: parse_or(&get, "MODEL_MAX_RETRIES", d.max_retries)?,
            retry_base_delay_ms: parse_or(
                &get,
                "MODEL_RETRY_BASE_DELAY_MS",
                d.retry_base_delay_ms,
            )?,
            max_messages: parse_or(&get, "MAX_MESSAGES", d.max_messages)?,
            max_message_length: parse_or(&get, "MAX_MESSAGE_LENGTH", d.max_message_length)?,
            reaper_interval_secs: parse_or(&get, "REAPER_INTERVAL_SECS", d.reaper_interval_secs)?,
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", d.request_timeout_secs)?,
            profile_path: get("PROFILE_PATH").map(PathBuf::from),
            github_token: get("GITHUB_TOKEN").map(ApiKey::new),
            github_repo: get("GITHUB_REPO"),
            github_base_url: get("GITHUB_BASE_URL").unwrap_or(d.github_base_url),
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn tool_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tool_cache_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn search_min_interval(&self) -> Duration {
        Duration::from_millis(self.search_min_interval_ms)
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw,
        }),
        None => Ok(default),
    }
}
