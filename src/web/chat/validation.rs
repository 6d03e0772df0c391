//! Structural and size checks on an inbound chat body.
//!
//! Runs on the raw JSON first so limits apply before any typed decoding, then
//! decodes into [`ConversationMessage`]s. Fails on the first violation.

use serde_json::Value;

use super::messages::ConversationMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid request format. Messages array is required.")]
    MissingMessages,

    #[error("Too many messages in conversation. Please start a new chat.")]
    TooManyMessages { count: usize, max: usize },

    #[error("Invalid message format.")]
    InvalidMessage { index: usize },

    #[error("Message too long. Please shorten your message.")]
    MessageTooLong {
        index: usize,
        length: usize,
        max: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_messages: usize,
    /// Counted in characters, not bytes.
    pub max_message_length: usize,
}

pub fn validate_chat_body(
    body: &[u8],
    limits: &ValidationLimits,
) -> Result<Vec<ConversationMessage>, ValidationError> {
    let parsed: Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::MissingMessages)?;

    let messages = parsed
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingMessages)?;

    if messages.len() > limits.max_messages {
        return Err(ValidationError::TooManyMessages {
            count: messages.len(),
            max: limits.max_messages,
        });
    }

    for (index, message) in messages.iter().enumerate() {
        if !message.is_object() {
            return Err(ValidationError::InvalidMessage { index });
        }

        if let Some(content) = message.get("content").and_then(Value::as_str) {
            let length = content.chars().count();
            if length > limits.max_message_length {
                return Err(ValidationError::MessageTooLong {
                    index,
                    length,
                    max: limits.max_message_length,
                });
            }
        }
    }

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            serde_json::from_value(message.clone())
                .map_err(|_| ValidationError::InvalidMessage { index })
        })
        .collect()
}
