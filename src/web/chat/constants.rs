//! Constants used throughout the chat endpoint

/// Frames buffered between the stream processor and the HTTP body
pub const CLIENT_CHANNEL_BUFFER: usize = 64;

/// SSE event names
pub const EVENT_TEXT_DELTA: &str = "text-delta";
pub const EVENT_TOOL_CALL: &str = "tool-call";
pub const EVENT_TOOL_RESULT: &str = "tool-result";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_FINISH: &str = "finish";

/// Finish reason when the model ends a step without giving one
pub const FINISH_REASON_STOP: &str = "stop";

/// Response headers
pub const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const HEADER_MODEL_USED: &str = "x-model-used";

/// User-facing error messages
pub const MSG_RATE_LIMITED: &str =
    "Rate limit exceeded. Please wait before making another request.";
pub const MSG_SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable. Please try again later.";
pub const MSG_UPSTREAM_RATE_LIMITED: &str = "Too many requests. Please wait a moment and try again.";
pub const MSG_NETWORK: &str = "Network error. Please check your connection and try again.";
pub const MSG_TIMEOUT: &str = "Request timed out. Please try again.";
pub const MSG_INVALID_REQUEST: &str = "Invalid request. Please check your message and try again.";
pub const MSG_UNKNOWN: &str = "An unexpected error occurred. Please try again.";
