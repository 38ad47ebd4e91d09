//! Pre-Search Coordinator
//!
//! Manages the optional web-search phase that precedes participant
//! streaming. The record is created at most once per round; a coordinator
//! that finds a record already in flight waits on it instead of searching
//! again, and a buffered result is reused without re-querying the backend.

use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::progress::RoundProgressNotifier;
use crate::ports::round_state::RoundStateStore;
use crate::ports::search::{SearchError, SearchGateway};
use crate::ports::stream_buffer::{StartOutcome, StreamBuffer};
use crate::retry::{RetryDecision, RetryPolicy};
use roundtable_domain::{
    FinishReason, Message, PreSearchRecord, PreSearchStatus, Round, RoundNumber, StreamKey,
    StreamPayload, ThreadId,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Errors from the pre-search phase
#[derive(Error, Debug)]
pub enum PreSearchError {
    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("Pre-search already failed for round {0}; start a fresh round to retry")]
    AlreadyFailed(RoundNumber),

    #[error("Pre-search for round {0} stalled without reaching a terminal status")]
    Stalled(RoundNumber),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Use case for running (or waiting on) a round's pre-search phase
pub struct RunPreSearchUseCase<S, R, B, W>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    W: SearchGateway,
{
    messages: Arc<S>,
    state: Arc<R>,
    buffer: Arc<B>,
    search: Arc<W>,
}

impl<S, R, B, W> RunPreSearchUseCase<S, R, B, W>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    W: SearchGateway,
{
    pub fn new(messages: Arc<S>, state: Arc<R>, buffer: Arc<B>, search: Arc<W>) -> Self {
        Self {
            messages,
            state,
            buffer,
            search,
        }
    }

    pub async fn execute(
        &self,
        round: &Round,
        query: &str,
        progress: &dyn RoundProgressNotifier,
    ) -> Result<PreSearchRecord, PreSearchError> {
        let thread = round.thread().clone();
        let number = round.number();

        match self.state.pre_search(&thread, number).await? {
            Some(record) if record.status == PreSearchStatus::Complete => return Ok(record),
            Some(record) if record.status == PreSearchStatus::Failed => {
                return Err(PreSearchError::AlreadyFailed(number));
            }
            Some(_) => {
                // Another coordinator owns the phase; wait for it to land.
                return self.wait_for_completion(&thread, number).await;
            }
            None => {}
        }

        self.state
            .put_pre_search(&thread, PreSearchRecord::pending(number))
            .await?;

        let key = StreamKey::pre_search(thread.clone(), number);
        match self.buffer.start(&key).await {
            StartOutcome::Started => {
                self.run_search(&thread, number, &key, query, progress)
                    .await
            }
            StartOutcome::Buffered { payload, .. } => {
                // A previous attempt already produced the result.
                match StreamPayload::parse(&payload) {
                    Ok(payload) => {
                        self.persist_result(&thread, number, &payload.text).await?;
                        Ok(PreSearchRecord::complete(number, payload.text))
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "buffered pre-search payload unusable");
                        self.buffer.fail(&key).await;
                        self.run_search(&thread, number, &key, query, progress)
                            .await
                    }
                }
            }
            StartOutcome::Conflict => self.wait_for_completion(&thread, number).await,
        }
    }

    async fn run_search(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
        key: &StreamKey,
        query: &str,
        progress: &dyn RoundProgressNotifier,
    ) -> Result<PreSearchRecord, PreSearchError> {
        self.state
            .put_pre_search(thread, PreSearchRecord::streaming(number))
            .await?;

        match self.search.search(query).await {
            Ok(result) => {
                progress.on_stream_chunk("presearch", &result);
                let payload = StreamPayload::new(result.clone(), FinishReason::Stop);
                self.buffer.complete(key, &payload.to_json()).await;
                self.persist_result(thread, number, &result).await?;
                info!(thread = %thread, round = %number, "pre-search complete");
                Ok(PreSearchRecord::complete(number, result))
            }
            Err(e) => {
                self.buffer.fail(key).await;
                self.state
                    .put_pre_search(thread, PreSearchRecord::failed(number))
                    .await?;
                Err(PreSearchError::Search(e))
            }
        }
    }

    async fn persist_result(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
        result: &str,
    ) -> Result<(), PreSearchError> {
        self.state
            .put_pre_search(thread, PreSearchRecord::complete(number, result))
            .await?;

        // Retries reuse the deterministic id, so only append the transcript
        // entry once.
        let existing = self.messages.round_messages(thread, number).await?;
        if !existing
            .iter()
            .any(|m| m.role() == roundtable_domain::Role::PreSearch)
        {
            self.messages
                .append(
                    thread,
                    Message::pre_search(
                        thread.clone(),
                        number,
                        result,
                        Some(FinishReason::Stop),
                    ),
                )
                .await?;
        }
        Ok(())
    }

    /// Poll the persisted record until it reaches a terminal status.
    async fn wait_for_completion(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
    ) -> Result<PreSearchRecord, PreSearchError> {
        let policy = RetryPolicy::resume_poll();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if let Some(record) = self.state.pre_search(thread, number).await? {
                match record.status {
                    PreSearchStatus::Complete => return Ok(record),
                    PreSearchStatus::Failed => {
                        return Err(PreSearchError::AlreadyFailed(number));
                    }
                    PreSearchStatus::Pending | PreSearchStatus::Streaming => {}
                }
            }
            match policy.decide(attempt, started.elapsed()) {
                RetryDecision::Exhausted => return Err(PreSearchError::Stalled(number)),
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }
}
