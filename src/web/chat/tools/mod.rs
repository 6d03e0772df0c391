//! Tools the model can call, and the registry that dispatches them.

pub mod profile;
pub mod web_search;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::messages::{ToolInvocation, ToolState};
use crate::brave::BraveClient;
use crate::groq::{ModelToolCall, ToolDefinition};
use crate::tool_cache::ToolCache;

pub use profile::Profile;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Execution(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        validate_arguments(self.name(), &self.parameters(), args)
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError>;
}

/// Registry of available tools. Execution goes through the shared result cache.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    cache: Arc<ToolCache>,
}

impl ToolRegistry {
    pub fn new(cache: Arc<ToolCache>) -> Self {
        Self {
            tools: BTreeMap::new(),
            cache,
        }
    }

    /// The full portfolio tool set.
    pub fn with_default_tools(
        cache: Arc<ToolCache>,
        profile: Arc<Profile>,
        search: Option<BraveClient>,
    ) -> Self {
        let mut registry = Self::new(cache);
        for tool in profile::profile_tools(profile) {
            registry.register(tool);
        }
        registry.register(Arc::new(web_search::WebSearchTool::new(search)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// The invocation record announced before the call runs.
    pub fn pending(call: &ModelToolCall) -> ToolInvocation {
        ToolInvocation {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: parse_arguments(&call.arguments)
                .unwrap_or_else(|_| Value::String(call.arguments.clone())),
            state: ToolState::Pending,
            result: None,
        }
    }

    /// Resolves one model tool call. Never fails: problems become an `error`
    /// invocation whose result explains them to the model.
    pub async fn dispatch(&self, call: &ModelToolCall) -> ToolInvocation {
        let mut invocation = Self::pending(call);

        match self.resolve(call).await {
            Ok(result) => {
                info!("Tool {} ({}) completed", call.name, call.id);
                invocation.state = ToolState::Result;
                invocation.result = Some(result);
            }
            Err(e) => {
                warn!("Tool {} ({}) failed: {}", call.name, call.id, e);
                invocation.state = ToolState::Error;
                invocation.result = Some(json!({ "error": e.to_string() }));
            }
        }

        invocation
    }

    async fn resolve(&self, call: &ModelToolCall) -> Result<Value, ToolError> {
        let args = parse_arguments(&call.arguments).map_err(|e| ToolError::InvalidArguments {
            tool: call.name.clone(),
            message: format!("arguments are not valid JSON: {}", e),
        })?;

        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        tool.validate(&args)?;

        debug!("Dispatching tool {} with {}", call.name, args);
        self.cache
            .get_or_compute(&call.name, &args, || tool.execute(&args))
            .await
    }
}

/// Checks `args` against a tool's parameter schema. Top-level `null` values
/// count as absent.
pub fn validate_arguments(tool: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message,
    };

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| invalid(format!("invalid parameter schema: {}", e)))?;

    let args = match args {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    };

    let violations: Vec<String> = validator.iter_errors(&args).map(|e| e.to_string()).collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(invalid(violations.join("; ")))
    }
}

/// Blank or `null` arguments mean an empty object.
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str(raw)? {
        Value::Null => Ok(json!({})),
        value => Ok(value),
    }
}
