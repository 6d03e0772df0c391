//! Typed SSE frames for the chat stream

use axum::response::sse::Event;
use serde_json::{json, Value};

use super::constants::{
    EVENT_ERROR, EVENT_FINISH, EVENT_TEXT_DELTA, EVENT_TOOL_CALL, EVENT_TOOL_RESULT,
};
use super::messages::ToolInvocation;
use crate::groq::Usage;

/// One unit of the streamed response, emitted in order. `Error` and `Finish`
/// are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Text(String),
    ToolCall(ToolInvocation),
    ToolResult(ToolInvocation),
    Error(String),
    Finish {
        reason: String,
        usage: Option<Usage>,
    },
}

impl StreamFrame {
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamFrame::Text(_) => EVENT_TEXT_DELTA,
            StreamFrame::ToolCall(_) => EVENT_TOOL_CALL,
            StreamFrame::ToolResult(_) => EVENT_TOOL_RESULT,
            StreamFrame::Error(_) => EVENT_ERROR,
            StreamFrame::Finish { .. } => EVENT_FINISH,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StreamFrame::Text(text) => json!({ "text": text }),
            StreamFrame::ToolCall(invocation) | StreamFrame::ToolResult(invocation) => {
                json!(invocation)
            }
            StreamFrame::Error(message) => json!({ "error": message }),
            StreamFrame::Finish { reason, usage } => {
                let mut payload = json!({ "finishReason": reason });
                if let Some(usage) = usage {
                    payload["usage"] = json!(usage);
                }
                payload
            }
        }
    }

    pub fn into_event(self) -> Event {
        Event::default()
            .event(self.event_type())
            .data(self.payload().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::chat::messages::ToolState;

    #[test]
    fn test_frame_payloads() {
        assert_eq!(
            StreamFrame::Text("hi".into()).payload(),
            json!({"text": "hi"})
        );
        assert_eq!(
            StreamFrame::Error("Request timed out. Please try again.".into()).payload(),
            json!({"error": "Request timed out. Please try again."})
        );
        assert_eq!(
            StreamFrame::Finish {
                reason: "stop".into(),
                usage: None
            }
            .payload(),
            json!({"finishReason": "stop"})
        );

        let usage = Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: 7,
        };
        assert_eq!(
            StreamFrame::Finish {
                reason: "stop".into(),
                usage: Some(usage)
            }
            .payload()["usage"],
            json!({"promptTokens": 3, "completionTokens": 4, "totalTokens": 7})
        );
    }

    #[test]
    fn test_tool_frames_serialize_invocation() {
        let frame = StreamFrame::ToolResult(ToolInvocation {
            tool_call_id: "call_9".into(),
            tool_name: "getContact".into(),
            args: json!({}),
            state: ToolState::Result,
            result: Some(json!({"email": "hello@example.com"})),
        });

        assert_eq!(frame.event_type(), "tool-result");
        assert_eq!(
            frame.payload(),
            json!({
                "toolCallId": "call_9",
                "toolName": "getContact",
                "args": {},
                "state": "result",
                "result": {"email": "hello@example.com"}
            })
        );
    }
}
