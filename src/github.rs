use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::ApiKey;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service error: {status} - {message}")]
    Service { status: StatusCode, message: String },
}

#[derive(Debug, Clone, Deserialize)]
struct RepoResponse {
    stargazers_count: u64,
}

#[derive(Clone)]
pub struct GithubClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<ApiKey>,
}

impl GithubClient {
    pub fn new(base_url: &str, token: Option<ApiKey>) -> Result<Self, GithubError> {
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base_url)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("portfolio-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Star count of `repo`, given as `owner/name`.
    pub async fn repo_stars(&self, repo: &str) -> Result<u64, GithubError> {
        let url = self.base_url.join(&format!("repos/{}", repo))?;

        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token.expose());
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status.is_success() {
            Ok(resp.json::<RepoResponse>().await?.stargazers_count)
        } else {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .and_then(|m| m.as_str())
                        .map(ToOwned::to_owned)
                })
                .unwrap_or(text);

            Err(GithubError::Service { status, message })
        }
    }
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_repo_stars_reads_stargazers_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/portfolio"))
            .and(header("authorization", "Bearer gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "octo/portfolio",
                "stargazers_count": 42
            })))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), Some(ApiKey::new("gh-token"))).unwrap();
        assert_eq!(client.repo_stars("octo/portfolio").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_service_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), None).unwrap();
        match client.repo_stars("octo/missing").await.unwrap_err() {
            GithubError::Service { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            GithubClient::new("not a url", None),
            Err(GithubError::InvalidBaseUrl(_))
        ));
    }
}
