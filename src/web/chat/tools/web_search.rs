//! `getWebSearch`: Brave web search rendered as a readable digest for the model.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use validator::Validate;

use super::{validate_arguments, Tool, ToolError};
use crate::brave::{BraveClient, BraveError, SearchRequest, SearchResult};

const DEFAULT_COUNT: i64 = 5;
const MAX_COUNT: i64 = 10;

const MSG_MISSING_KEY: &str = "Web search is currently unavailable due to missing API configuration. Please set the BRAVE_API_KEY environment variable.";
const MSG_EMPTY_QUERY: &str = "Search query cannot be empty. Please provide a valid search term.";
const MSG_AUTH: &str = "Search authentication failed. Please check your API key configuration.";
const MSG_RATE_LIMITED: &str = "Search rate limit exceeded. Please try again in a few moments.";
const MSG_UNAVAILABLE: &str = "Search service is temporarily unavailable. Please try again later.";
const MSG_TIMEOUT: &str = "Search request timed out. Please try again with a simpler query.";
const MSG_NETWORK: &str =
    "Network error occurred while searching. Please check your internet connection.";
const VERIFY_NOTE: &str = "*Note: These results are from web search and may contain recent information. Always verify important facts from multiple sources.*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Pd,
    Pw,
    Pm,
    Py,
    All,
}

impl Freshness {
    /// Brave query value; `None` for no filter.
    fn code(self) -> Option<&'static str> {
        match self {
            Freshness::Pd => Some("pd"),
            Freshness::Pw => Some("pw"),
            Freshness::Pm => Some("pm"),
            Freshness::Py => Some("py"),
            Freshness::All => None,
        }
    }

    fn label(self) -> Option<&'static str> {
        match self {
            Freshness::Pd => Some("Past day"),
            Freshness::Pw => Some("Past week"),
            Freshness::Pm => Some("Past month"),
            Freshness::Py => Some("Past year"),
            Freshness::All => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(default)]
    pub count: Option<f64>,
    #[serde(default)]
    pub freshness: Option<Freshness>,
    #[serde(default)]
    #[validate(length(equal = 2))]
    pub country: Option<String>,
}

impl WebSearchArgs {
    fn result_count(&self) -> u32 {
        self.count
            .map(|c| c.round() as i64)
            .unwrap_or(DEFAULT_COUNT)
            .clamp(1, MAX_COUNT) as u32
    }
}

pub struct WebSearchTool {
    client: Option<BraveClient>,
}

impl WebSearchTool {
    pub fn new(client: Option<BraveClient>) -> Self {
        Self { client }
    }

    fn parse(&self, args: &Value) -> Result<WebSearchArgs, ToolError> {
        let invalid = |message: String| ToolError::InvalidArguments {
            tool: self.name().to_string(),
            message,
        };
        let parsed: WebSearchArgs =
            serde_json::from_value(args.clone()).map_err(|e| invalid(e.to_string()))?;
        parsed.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(parsed)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "getWebSearch"
    }

    fn description(&self) -> &str {
        "Search the web for current information, recent news, or up-to-date data. Use this for \
         current events, recent developments, or any topic that needs real-time data."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query. Be specific and include relevant keywords."
                },
                "count": {
                    "type": "number",
                    "description": "Number of results to return (1-10, default 5)"
                },
                "freshness": {
                    "type": "string",
                    "enum": ["pd", "pw", "pm", "py", "all"],
                    "description": "Time period: pd=past day, pw=past week, pm=past month, py=past year, all=all time"
                },
                "country": {
                    "type": "string",
                    "description": "Two-letter country code for localized results (e.g. 'US', 'GB')"
                }
            },
            "required": ["query"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        validate_arguments(self.name(), &self.parameters(), args)?;
        self.parse(args).map(|_| ())
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = self.parse(args)?;

        let Some(client) = &self.client else {
            warn!("Web search requested but no Brave API key is configured");
            return Ok(Value::String(MSG_MISSING_KEY.to_string()));
        };

        let query = args.query.trim();
        if query.is_empty() {
            return Ok(Value::String(MSG_EMPTY_QUERY.to_string()));
        }

        let count = args.result_count();
        let country = args.country.as_deref().map(str::to_uppercase);

        let mut request = SearchRequest::new(query.to_string());
        request.count = Some(count);
        request.freshness = args.freshness.and_then(Freshness::code).map(str::to_string);
        request.country = country.clone();

        let results = client
            .search(request)
            .await
            .map_err(search_failure)?
            .into_results();

        debug!(
            "Web search for {:?} returned {} results",
            query,
            results.as_ref().map_or(0, Vec::len)
        );

        Ok(Value::String(format_results(
            query,
            args.freshness,
            country.as_deref(),
            results,
            count as usize,
        )))
    }
}

fn search_failure(err: BraveError) -> ToolError {
    let message = match &err {
        BraveError::Api { status: 401, .. } => MSG_AUTH.to_string(),
        BraveError::Api { status: 429, .. } => MSG_RATE_LIMITED.to_string(),
        BraveError::Api { status, .. } if *status >= 500 => MSG_UNAVAILABLE.to_string(),
        BraveError::Api { status, .. } => format!(
            "Unable to perform web search at the moment. Error: search provider returned {}",
            status
        ),
        BraveError::Timeout => MSG_TIMEOUT.to_string(),
        BraveError::Request(_) => MSG_NETWORK.to_string(),
    };
    ToolError::Execution(message)
}

fn format_result(index: usize, result: &SearchResult) -> String {
    let mut lines = vec![format!("{}. **{}**", index + 1, result.title)];

    if let Some(text) = result.snippet.as_ref().or(result.description.as_ref()) {
        lines.push(format!("   {}", text));
    }
    if let Some(age) = result.age.as_ref().or(result.published.as_ref()) {
        lines.push(format!("   Published: {}", age));
    }
    lines.push(format!("   Source: {}", result.url));

    lines.join("\n")
}

fn format_results(
    query: &str,
    freshness: Option<Freshness>,
    country: Option<&str>,
    results: Option<Vec<SearchResult>>,
    count: usize,
) -> String {
    let Some(results) = results else {
        return format!(
            "No search results found for \"{}\". The search service returned an unexpected response format.",
            query
        );
    };

    if results.is_empty() {
        return format!(
            "No search results found for \"{}\". Try:\n\
             • Using different keywords\n\
             • Checking your spelling\n\
             • Using more general terms",
            query
        );
    }

    let formatted = results
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, result)| format_result(i, result))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut lines = vec![format!("Search results for \"{}\":", query)];
    if let Some(label) = freshness.and_then(Freshness::label) {
        lines.push(format!("Time filter: {}", label));
    }
    if let Some(country) = country {
        lines.push(format!("Location: {}", country));
    }
    lines.push(formatted);
    lines.push(VERIFY_NOTE.to_string());

    lines.join("\n")
}
