use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::groq::{
    ChatModel, CompletionRequest, CompletionStream, ModelError, ModelEvent, ModelToolCall,
};

type Scripted = Result<Vec<ModelEvent>, ModelError>;

/// Model double that replays one scripted outcome per call and records requests.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text_reply(text: &str) -> Vec<ModelEvent> {
        vec![
            ModelEvent::TextDelta(text.to_string()),
            ModelEvent::Finish {
                reason: "stop".to_string(),
                usage: None,
            },
        ]
    }

    pub fn tool_call_reply(id: &str, name: &str, arguments: &str) -> Vec<ModelEvent> {
        vec![
            ModelEvent::ToolCall(ModelToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }),
            ModelEvent::Finish {
                reason: "tool_calls".to_string(),
                usage: None,
            },
        ]
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(events)) => Ok(CompletionStream::from_events(events)),
            Some(Err(e)) => Err(e),
            None => Err(ModelError::Stream("script exhausted".to_string())),
        }
    }
}

/// Model double whose calls never resolve.
pub struct StalledModel;

#[async_trait]
impl ChatModel for StalledModel {
    fn model_name(&self) -> &str {
        "stalled-model"
    }

    async fn stream_completion(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionStream, ModelError> {
        std::future::pending().await
    }
}
