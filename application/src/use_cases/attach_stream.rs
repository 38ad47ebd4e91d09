//! Attach Stream use case
//!
//! Client-side resume loop for one stream key. Polls the buffer until a
//! terminal payload is observed, honoring the server's suggested retry
//! delay while live, and treating a payload that fails to parse as "not
//! yet usable" rather than an error. The loop is bounded by a
//! [`RetryPolicy`] and stops immediately on session teardown.

use crate::ports::stream_buffer::{ResumeOutcome, StreamBuffer};
use crate::retry::{RetryDecision, RetryPolicy};
use roundtable_domain::{StreamKey, StreamPayload};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Errors from attaching to a stream
#[derive(Error, Debug)]
pub enum AttachError {
    /// Not a user-facing error: the caller falls through to Start.
    #[error("No buffer exists for {0}")]
    NoBuffer(String),

    #[error("Gave up polling {0} without a terminal response")]
    Exhausted(String),

    #[error("Session torn down while polling")]
    Cancelled,
}

/// A terminal payload with its provenance marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedPayload {
    pub payload: StreamPayload,
    /// True when the payload was found already buffered, false when this
    /// poller watched the stream complete.
    pub resumed_from_buffer: bool,
}

/// Use case for re-attaching to a resumable stream
pub struct AttachStreamUseCase<B: StreamBuffer> {
    buffer: Arc<B>,
}

impl<B: StreamBuffer> AttachStreamUseCase<B> {
    pub fn new(buffer: Arc<B>) -> Self {
        Self { buffer }
    }

    pub async fn attach(
        &self,
        key: &StreamKey,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<AttachedPayload, AttachError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AttachError::Cancelled);
            }

            let delay = match self.buffer.resume(key).await {
                ResumeOutcome::NoBuffer => {
                    return Err(AttachError::NoBuffer(key.to_string()));
                }
                ResumeOutcome::Active { retry_after_ms } => {
                    trace!(key = %key, retry_after_ms, "stream still active");
                    Duration::from_millis(retry_after_ms)
                }
                ResumeOutcome::Completed {
                    payload,
                    resumed_from_buffer,
                } => match StreamPayload::parse(&payload) {
                    Ok(payload) => {
                        return Ok(AttachedPayload {
                            payload,
                            resumed_from_buffer,
                        });
                    }
                    Err(e) => {
                        // Likely a truncated write; poll again instead of
                        // surfacing corruption.
                        debug!(key = %key, error = %e, "buffered payload not yet usable");
                        policy.delay(attempt)
                    }
                },
            };

            match policy.decide(attempt, started.elapsed()) {
                RetryDecision::Exhausted => {
                    return Err(AttachError::Exhausted(key.to_string()));
                }
                RetryDecision::Retry(_) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AttachError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            attempt += 1;
        }
    }
}
