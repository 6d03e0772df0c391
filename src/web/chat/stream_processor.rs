//! Drives one chat turn after the first model stream is open: forwards text,
//! runs requested tools, re-invokes the model for follow-up steps and emits a
//! single terminal frame.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace};

use super::constants::{CLIENT_CHANNEL_BUFFER, FINISH_REASON_STOP};
use super::errors::{classify, ChatError};
use super::events::StreamFrame;
use super::messages::tool_result_text;
use super::retry::{invoke_with_retry, RetryPolicy};
use super::tools::ToolRegistry;
use crate::groq::{
    ChatModel, CompletionRequest, CompletionStream, ModelError, ModelEvent, ModelMessage,
    ModelToolCall, Usage,
};

/// Everything a turn needs beyond the already-open first stream.
pub struct ChatTurn {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<ToolRegistry>,
    pub request: CompletionRequest,
    pub retry: RetryPolicy,
    pub max_steps: u32,
    pub deadline: Instant,
}

#[derive(Debug)]
enum ProcessorError {
    ClientGone,
    Model(ModelError),
    Deadline,
}

#[derive(Debug, Default)]
struct StepOutcome {
    text: String,
    tool_calls: Vec<ModelToolCall>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

pub struct StreamProcessor {
    turn: ChatTurn,
    tx: mpsc::Sender<StreamFrame>,
}

impl StreamProcessor {
    /// Starts the turn on its own task and returns the frame receiver. Dropping
    /// the receiver stops the task at its next emit.
    pub fn spawn(turn: ChatTurn, first: CompletionStream) -> mpsc::Receiver<StreamFrame> {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_BUFFER);
        let processor = Self { turn, tx };
        tokio::spawn(processor.run(first));
        rx
    }

    async fn run(mut self, first: CompletionStream) {
        let terminal = match self.drive(first).await {
            Ok(frame) => frame,
            Err(ProcessorError::ClientGone) => {
                debug!("Client disconnected; stopping chat stream");
                return;
            }
            Err(ProcessorError::Model(e)) => StreamFrame::Error(classify(&ChatError::Model(e)).message),
            Err(ProcessorError::Deadline) => StreamFrame::Error(classify(&ChatError::Timeout).message),
        };

        trace!("Chat stream ending with {}", terminal.event_type());
        let _ = self.tx.send(terminal).await;
    }

    /// Runs steps until the model stops asking for tools or the step budget is
    /// spent. Returns the `finish` frame.
    async fn drive(&mut self, first: CompletionStream) -> Result<StreamFrame, ProcessorError> {
        let mut stream = first;
        let mut step = 1;

        loop {
            let outcome = self.within_deadline(self.consume(&mut stream)).await??;

            if outcome.tool_calls.is_empty() {
                return Ok(StreamFrame::Finish {
                    reason: outcome
                        .finish_reason
                        .unwrap_or_else(|| FINISH_REASON_STOP.to_string()),
                    usage: outcome.usage,
                });
            }

            let results = self.within_deadline(self.run_tools(&outcome.tool_calls)).await??;

            if step >= self.turn.max_steps {
                info!("Chat turn reached the step limit ({})", self.turn.max_steps);
                return Ok(StreamFrame::Finish {
                    reason: outcome
                        .finish_reason
                        .unwrap_or_else(|| FINISH_REASON_STOP.to_string()),
                    usage: outcome.usage,
                });
            }

            self.append_step(outcome, results);
            step += 1;

            debug!("Starting chat step {}/{}", step, self.turn.max_steps);
            let model = self.turn.model.clone();
            stream = self
                .within_deadline(invoke_with_retry(
                    model.as_ref(),
                    &self.turn.request,
                    &self.turn.retry,
                ))
                .await?
                .map_err(ProcessorError::Model)?;
        }
    }

    async fn within_deadline<F, T>(&self, fut: F) -> Result<T, ProcessorError>
    where
        F: std::future::Future<Output = T>,
    {
        timeout_at(self.turn.deadline, fut)
            .await
            .map_err(|_| ProcessorError::Deadline)
    }

    async fn emit(&self, frame: StreamFrame) -> Result<(), ProcessorError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ProcessorError::ClientGone)
    }

    /// Forwards text deltas as they arrive and gathers the rest of the step.
    async fn consume(&self, stream: &mut CompletionStream) -> Result<StepOutcome, ProcessorError> {
        let mut outcome = StepOutcome::default();

        while let Some(event) = stream.next().await {
            match event {
                ModelEvent::TextDelta(text) => {
                    outcome.text.push_str(&text);
                    self.emit(StreamFrame::Text(text)).await?;
                }
                ModelEvent::ToolCall(call) => outcome.tool_calls.push(call),
                ModelEvent::Finish { reason, usage } => {
                    outcome.finish_reason = Some(reason);
                    outcome.usage = usage;
                    break;
                }
                ModelEvent::Error(e) => return Err(ProcessorError::Model(e)),
            }
        }

        if outcome.finish_reason.is_none()
            && outcome.tool_calls.is_empty()
            && outcome.text.is_empty()
        {
            return Err(ProcessorError::Model(ModelError::Stream(
                "stream ended without output".to_string(),
            )));
        }

        Ok(outcome)
    }

    /// Dispatches each call once, in order, announcing it before it runs.
    async fn run_tools(
        &self,
        calls: &[ModelToolCall],
    ) -> Result<Vec<(String, String)>, ProcessorError> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            self.emit(StreamFrame::ToolCall(ToolRegistry::pending(call)))
                .await?;
            let invocation = self.turn.tools.dispatch(call).await;
            results.push((
                invocation.tool_call_id.clone(),
                tool_result_text(invocation.result.as_ref()),
            ));
            self.emit(StreamFrame::ToolResult(invocation)).await?;
        }

        Ok(results)
    }

    fn append_step(&mut self, outcome: StepOutcome, results: Vec<(String, String)>) {
        let messages = &mut self.turn.request.messages;
        messages.push(ModelMessage::Assistant {
            content: if outcome.text.is_empty() {
                None
            } else {
                Some(outcome.text)
            },
            tool_calls: outcome.tool_calls,
        });
        messages.extend(
            results
                .into_iter()
                .map(|(tool_call_id, content)| ModelMessage::Tool {
                    tool_call_id,
                    content,
                }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_cache::ToolCache;
    use crate::web::chat::messages::ToolState;
    use crate::web::chat::test_support::ScriptedModel;
    use crate::web::chat::tools::Profile;
    use serde_json::json;
    use std::time::Duration;

    fn turn(model: Arc<ScriptedModel>, deadline: Duration) -> ChatTurn {
        let cache = Arc::new(ToolCache::new(Duration::from_secs(300)));
        ChatTurn {
            model,
            tools: Arc::new(ToolRegistry::with_default_tools(
                cache,
                Arc::new(Profile::bundled()),
                None,
            )),
            request: CompletionRequest {
                messages: vec![ModelMessage::User {
                    content: "hi".into(),
                }],
                tools: Vec::new(),
                temperature: 0.5,
                max_tokens: 500,
            },
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1000),
            },
            max_steps: 2,
            deadline: Instant::now() + deadline,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamFrame>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_text_only_turn() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let first = CompletionStream::from_events(ScriptedModel::text_reply("Hello there"));

        let frames = collect(StreamProcessor::spawn(
            turn(model.clone(), Duration::from_secs(30)),
            first,
        ))
        .await;

        assert_eq!(
            frames,
            vec![
                StreamFrame::Text("Hello there".into()),
                StreamFrame::Finish {
                    reason: "stop".into(),
                    usage: None
                },
            ]
        );
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_tool_step_then_follow_up_answer() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ScriptedModel::text_reply(
            "I work with Python.",
        ))]));
        let first = CompletionStream::from_events(ScriptedModel::tool_call_reply(
            "call_1",
            "getSkills",
            "{}",
        ));

        let frames = collect(StreamProcessor::spawn(
            turn(model.clone(), Duration::from_secs(30)),
            first,
        ))
        .await;

        assert_eq!(frames.len(), 4);
        match (&frames[0], &frames[1]) {
            (StreamFrame::ToolCall(call), StreamFrame::ToolResult(result)) => {
                assert_eq!(call.state, ToolState::Pending);
                assert_eq!(result.state, ToolState::Result);
                assert_eq!(result.tool_call_id, "call_1");
            }
            other => panic!("unexpected frames {:?}", other),
        }
        assert_eq!(frames[2], StreamFrame::Text("I work with Python.".into()));
        assert!(matches!(frames[3], StreamFrame::Finish { .. }));

        let follow_up = &model.requests()[0];
        assert_eq!(follow_up.messages.len(), 3);
        match &follow_up.messages[1] {
            ModelMessage::Assistant { tool_calls, .. } => assert_eq!(tool_calls[0].name, "getSkills"),
            other => panic!("unexpected message {:?}", other),
        }
        assert!(matches!(
            &follow_up.messages[2],
            ModelMessage::Tool { tool_call_id, .. } if tool_call_id == "call_1"
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model_not_client() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ScriptedModel::text_reply(
            "I can't do that.",
        ))]));
        let first =
            CompletionStream::from_events(ScriptedModel::tool_call_reply("c", "getWeather", "{}"));

        let frames = collect(StreamProcessor::spawn(
            turn(model, Duration::from_secs(30)),
            first,
        ))
        .await;

        match &frames[1] {
            StreamFrame::ToolResult(result) => {
                assert_eq!(result.state, ToolState::Error);
                assert_eq!(result.result, Some(json!({"error": "Unknown tool: getWeather"})));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(matches!(frames.last(), Some(StreamFrame::Finish { .. })));
    }

    #[tokio::test]
    async fn test_step_limit_stops_after_tools() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ScriptedModel::tool_call_reply(
            "call_2",
            "getContact",
            "{}",
        ))]));
        let first = CompletionStream::from_events(ScriptedModel::tool_call_reply(
            "call_1",
            "getSkills",
            "{}",
        ));

        let frames = collect(StreamProcessor::spawn(
            turn(model.clone(), Duration::from_secs(30)),
            first,
        ))
        .await;

        let tool_results = frames
            .iter()
            .filter(|f| matches!(f, StreamFrame::ToolResult(_)))
            .count();
        assert_eq!(tool_results, 2);
        assert_eq!(model.calls(), 1);
        assert_eq!(
            frames.last(),
            Some(&StreamFrame::Finish {
                reason: "tool_calls".into(),
                usage: None
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_failure_becomes_error_frame() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Network("down".into())),
            Err(ModelError::Network("down".into())),
            Err(ModelError::Network("down".into())),
        ]));
        let first =
            CompletionStream::from_events(ScriptedModel::tool_call_reply("c", "getSkills", "{}"));

        let frames = collect(StreamProcessor::spawn(
            turn(model.clone(), Duration::from_secs(30)),
            first,
        ))
        .await;

        assert_eq!(model.calls(), 3);
        assert_eq!(
            frames.last(),
            Some(&StreamFrame::Error(
                "Network error. Please check your connection and try again.".into()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_stream_with_timeout_frame() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Ok(ScriptedModel::text_reply("late")),
        ]));
        let first =
            CompletionStream::from_events(ScriptedModel::tool_call_reply("c", "getSkills", "{}"));

        let frames = collect(StreamProcessor::spawn(
            turn(model, Duration::from_millis(1500)),
            first,
        ))
        .await;

        assert_eq!(
            frames.last(),
            Some(&StreamFrame::Error("Request timed out. Please try again.".into()))
        );
        assert!(!frames.iter().any(|f| f == &StreamFrame::Text("late".into())));
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_terminal_frame() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let first = CompletionStream::from_events(vec![
            ModelEvent::TextDelta("partial".into()),
            ModelEvent::Error(ModelError::Timeout),
        ]);

        let frames = collect(StreamProcessor::spawn(
            turn(model, Duration::from_secs(30)),
            first,
        ))
        .await;

        assert_eq!(
            frames,
            vec![
                StreamFrame::Text("partial".into()),
                StreamFrame::Error("Request timed out. Please try again.".into()),
            ]
        );
    }
}
