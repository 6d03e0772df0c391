//! Conversation wire types and their conversion into model messages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::groq::{ModelMessage, ModelToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One caller-supplied conversation entry. The server never stores these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolInvocation {
        #[serde(rename = "toolInvocation")]
        tool_invocation: ToolInvocation,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    #[serde(alias = "call", alias = "partial-call")]
    Pending,
    Executing,
    Result,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolInvocation {
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, ToolState::Result | ToolState::Error)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ConversationMessage {
    /// `content`, or the concatenated text parts when `content` is empty.
    pub fn text(&self) -> String {
        if !self.content.is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn resolved_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::ToolInvocation { tool_invocation } if tool_invocation.is_resolved() => {
                Some(tool_invocation)
            }
            _ => None,
        })
    }
}

/// Result payload as the text the model sees in a tool message.
pub fn tool_result_text(result: Option<&Value>) -> String {
    match result {
        Some(Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

/// Maps the conversation onto chat-completion messages, preserving order.
///
/// Resolved tool invocations carried on assistant messages become an assistant
/// tool-call message followed by one tool message per call. Unresolved
/// invocations are dropped since the provider rejects calls without results.
pub fn to_model_messages(conversation: &[ConversationMessage]) -> Vec<ModelMessage> {
    let mut out = Vec::with_capacity(conversation.len());

    for message in conversation {
        match message.role {
            Role::System => out.push(ModelMessage::System {
                content: message.text(),
            }),
            Role::User => out.push(ModelMessage::User {
                content: message.text(),
            }),
            Role::Assistant => {
                let invocations: Vec<&ToolInvocation> = message.resolved_invocations().collect();
                let text = message.text();

                if invocations.is_empty() {
                    out.push(ModelMessage::Assistant {
                        content: Some(text),
                        tool_calls: Vec::new(),
                    });
                    continue;
                }

                out.push(ModelMessage::Assistant {
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: invocations
                        .iter()
                        .map(|inv| ModelToolCall {
                            id: inv.tool_call_id.clone(),
                            name: inv.tool_name.clone(),
                            arguments: inv.args.to_string(),
                        })
                        .collect(),
                });
                out.extend(invocations.iter().map(|inv| ModelMessage::Tool {
                    tool_call_id: inv.tool_call_id.clone(),
                    content: tool_result_text(inv.result.as_ref()),
                }));
            }
            Role::Tool => {
                let before = out.len();
                out.extend(message.resolved_invocations().map(|inv| ModelMessage::Tool {
                    tool_call_id: inv.tool_call_id.clone(),
                    content: tool_result_text(inv.result.as_ref()),
                }));
                if out.len() == before {
                    debug!("Dropping tool message without a resolved invocation");
                }
            }
        }
    }

    out
}
