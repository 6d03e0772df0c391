//! Bounded retries with linear backoff around opening a model stream.

use backoff::backoff::Backoff;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::groq::{ChatModel, CompletionRequest, CompletionStream, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub base_delay: Duration,
}

/// `base_delay * n` after the n-th failed attempt, until attempts run out.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base_delay: Duration,
    max_retries: u32,
    failures: u32,
}

impl LinearBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            base_delay: policy.base_delay,
            max_retries: policy.max_retries,
            failures: 0,
        }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.max_retries {
            None
        } else {
            Some(self.base_delay * self.failures)
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Opens a completion stream, retrying only failures marked retryable.
///
/// Once a stream is returned no further attempts are made; mid-stream errors
/// arrive through the stream itself.
pub async fn invoke_with_retry(
    model: &dyn ChatModel,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<CompletionStream, ModelError> {
    let attempt = AtomicU32::new(0);
    let max_retries = policy.max_retries;

    let operation = || {
        let current = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            debug!(
                "Model call attempt {}/{} with {}",
                current,
                max_retries,
                model.model_name()
            );
            model.stream_completion(request).await.map_err(|e| {
                if e.is_retryable() {
                    backoff::Error::transient(e)
                } else {
                    error!("Model call failed with non-retryable error: {}", e);
                    backoff::Error::permanent(e)
                }
            })
        }
    };

    let notify = |err: ModelError, delay: Duration| {
        warn!(
            "Model call failed (attempt {}/{}): {}; retrying in {:?}",
            attempt.load(Ordering::SeqCst),
            max_retries,
            err,
            delay
        );
    };

    let result =
        backoff::future::retry_notify(LinearBackoff::new(policy), operation, notify).await;

    if let Err(e) = &result {
        if e.is_retryable() {
            error!("Model call failed after {} attempts: {}", max_retries, e);
        }
    }
    result
}
