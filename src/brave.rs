//! Brave web search client used by the `getWebSearch` tool.
//!
//! Only the web search endpoint is used. Outbound calls are spaced by a
//! process-wide minimum interval and bounded by a hard timeout.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::ApiKey;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BraveError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),
    #[error("search request timed out")]
    Timeout,
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for BraveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BraveError::Timeout
        } else {
            BraveError::Request(err)
        }
    }
}

/// Shared Brave client. Clones share the connection pool and the throttle.
#[derive(Clone)]
pub struct BraveClient {
    client: reqwest::Client,
    base_url: Arc<String>,
    api_key: ApiKey,
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl BraveClient {
    pub fn new(
        base_url: &str,
        api_key: ApiKey,
        request_timeout: Duration,
        min_interval: Duration,
    ) -> Result<Self, BraveError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("portfolio-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BraveError::Request)?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            api_key,
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        })
    }

    /// Waits until at least `min_interval` has passed since the previous call
    /// made by any clone of this client.
    async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let since = last.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// Runs one web search, waiting out the minimum interval first.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, BraveError> {
        self.throttle().await;

        let url = format!("{}/web/search", self.base_url);

        let mut query_params = vec![("q", request.query.clone())];
        if let Some(count) = request.count {
            query_params.push(("count", count.to_string()));
        }
        if let Some(freshness) = &request.freshness {
            query_params.push(("freshness", freshness.clone()));
        }
        if let Some(country) = &request.country {
            query_params.push(("country", country.clone()));
        }

        debug!(
            "Brave search: query={:?} count={:?} freshness={:?} country={:?}",
            request.query, request.count, request.freshness, request.country
        );

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", self.api_key.expose())
            .header("Accept", "application/json")
            .query(&query_params)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Brave API error: {} - {}", status, error_text);
            return Err(BraveError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let search_response = response.json::<SearchResponse>().await?;
        Ok(search_response)
    }
}

impl std::fmt::Debug for BraveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BraveClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub country: Option<String>,
    pub count: Option<u32>,
    pub freshness: Option<String>,
}

impl SearchRequest {
    pub fn new(query: String) -> Self {
        Self {
            query,
            country: None,
            count: Some(5),
            freshness: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub web: Option<WebResults>,
    /// Some deployments return results at the top level instead of under `web`.
    #[serde(default)]
    pub results: Option<Vec<SearchResult>>,
}

impl SearchResponse {
    /// `None` when the response carries neither result layout.
    pub fn into_results(self) -> Option<Vec<SearchResult>> {
        match self.web.and_then(|web| web.results) {
            Some(results) => Some(results),
            None => self.results,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebResults {
    #[serde(default)]
    pub results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "link")]
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
}
