//! Analysis/Moderator phase
//!
//! The gate decides when the post-round summarization may start: every
//! participant finished, pre-search settled, and no presentation
//! transitions outstanding. Once open, the moderator streams through the
//! buffer like any other stream. A stalled in-flight analysis stops
//! blocking after the 60 s fallback window and is taken over.

use crate::ports::generation::{GenerationGateway, PromptMessage};
use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::progress::RoundProgressNotifier;
use crate::ports::round_state::RoundStateStore;
use crate::ports::stream_buffer::{StartOutcome, StreamBuffer};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::use_cases::attach_stream::AttachStreamUseCase;
use crate::use_cases::stream_participants::build_context;
use chrono::Utc;
use roundtable_domain::{
    analysis_reached_terminal, should_trigger_moderator, AnalysisStatus, FinishReason, Message,
    ModeratorAnalysis, ParticipantStatus, PreSearchStatus, Role, Round, RoundNumber, StreamEvent,
    StreamKey, StreamPayload, ThreadId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from the moderator phase
#[derive(Error, Debug)]
pub enum ModeratorError {
    #[error("Moderator gate did not clear: {0}")]
    GateTimeout(String),

    #[error("Moderator generation failed: {0}")]
    Generation(String),

    #[error("Moderator analysis already failed for round {0}; start a fresh round to retry")]
    AlreadyFailed(RoundNumber),

    #[error("Pre-search failed; the round cannot be summarized")]
    PreSearchFailed,

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Use case for gating and running the moderator summarization
pub struct RunModeratorUseCase<S, R, B, G>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    G: GenerationGateway,
{
    messages: Arc<S>,
    state: Arc<R>,
    buffer: Arc<B>,
    gateway: Arc<G>,
}

impl<S, R, B, G> RunModeratorUseCase<S, R, B, G>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    G: GenerationGateway,
{
    pub fn new(messages: Arc<S>, state: Arc<R>, buffer: Arc<B>, gateway: Arc<G>) -> Self {
        Self {
            messages,
            state,
            buffer,
            gateway,
        }
    }

    /// Block until the gate opens, re-evaluating every condition from
    /// persisted state on each pass.
    pub async fn await_gate(
        &self,
        round: &Round,
        pending_animations: &AtomicUsize,
    ) -> Result<(), ModeratorError> {
        let thread = round.thread().clone();
        let number = round.number();
        let expected = round.snapshot().participant_count();
        let web_search = round.snapshot().web_search_enabled;

        let policy = RetryPolicy::gate_poll();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let transcript = self.messages.round_messages(&thread, number).await?;
            let participants = participant_status(&transcript, expected);
            let pre_search = self.state.pre_search(&thread, number).await?;

            if let Some(record) = &pre_search {
                if record.status == PreSearchStatus::Failed {
                    return Err(ModeratorError::PreSearchFailed);
                }
            }

            // Web search enabled but no record visible yet: the gate's
            // pre-search condition treats absence as "never requested", so
            // guard against the optimistic-blocking window explicitly.
            let blocked_on_missing_record = web_search && pre_search.is_none();

            let animations = pending_animations.load(Ordering::SeqCst);
            if !blocked_on_missing_record
                && should_trigger_moderator(participants, pre_search.as_ref(), animations)
            {
                return Ok(());
            }

            match policy.decide(attempt, started.elapsed()) {
                RetryDecision::Exhausted => {
                    return Err(ModeratorError::GateTimeout(format!(
                        "participants {}/{} finished, streaming={}, pre_search={:?}, animations={}",
                        participants.finished,
                        participants.expected,
                        participants.streaming,
                        pre_search.map(|r| r.status),
                        animations
                    )));
                }
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// Run the moderator stream (or adopt an existing one) to completion.
    pub async fn execute(
        &self,
        round: &Round,
        progress: &dyn RoundProgressNotifier,
        cancel: &CancellationToken,
    ) -> Result<Message, ModeratorError> {
        let thread = round.thread().clone();
        let number = round.number();

        if let Some(analysis) = self.state.analysis(&thread, number).await? {
            match analysis.status {
                AnalysisStatus::Complete => {
                    if let Some(message) = self.stored_moderator_message(&thread, number).await? {
                        return Ok(message);
                    }
                    // Analysis landed but the transcript entry didn't;
                    // rebuild it from the analysis data.
                    let message = Message::moderator(
                        thread.clone(),
                        number,
                        analysis.data.unwrap_or_default(),
                        Some(FinishReason::Stop),
                    );
                    self.messages.append(&thread, message.clone()).await?;
                    return Ok(message);
                }
                AnalysisStatus::Failed => {
                    return Err(ModeratorError::AlreadyFailed(number));
                }
                AnalysisStatus::Pending | AnalysisStatus::Streaming => {
                    if let Some(message) =
                        self.wait_out_inflight(&thread, number, cancel).await?
                    {
                        return Ok(message);
                    }
                    // Stalled beyond the fallback window; take it over.
                    warn!(thread = %thread, round = %number, "adopting stalled moderator analysis");
                }
            }
        }

        self.state
            .put_analysis(&thread, ModeratorAnalysis::pending(number, Utc::now()))
            .await?;

        let key = StreamKey::moderator(thread.clone(), number);
        let payload = match self.buffer.start(&key).await {
            StartOutcome::Started => self.generate(&thread, number, round, &key, progress).await?,
            StartOutcome::Buffered { payload, .. } => match StreamPayload::parse(&payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(key = %key, error = %e, "clearing malformed moderator payload");
                    self.buffer.fail(&key).await;
                    self.generate(&thread, number, round, &key, progress).await?
                }
            },
            StartOutcome::Conflict => {
                let attach = AttachStreamUseCase::new(self.buffer.clone());
                attach
                    .attach(&key, &RetryPolicy::resume_poll(), cancel)
                    .await
                    .map(|attached| attached.payload)
                    .map_err(|e| ModeratorError::Generation(e.to_string()))?
            }
        };

        self.state
            .put_analysis(
                &thread,
                ModeratorAnalysis::pending(number, Utc::now()).completed(payload.text.clone()),
            )
            .await?;

        if let Some(message) = self.stored_moderator_message(&thread, number).await? {
            return Ok(message);
        }
        let message = Message::moderator(
            thread.clone(),
            number,
            payload.text,
            Some(payload.finish_reason),
        );
        self.messages.append(&thread, message.clone()).await?;
        info!(thread = %thread, round = %number, "moderator summarization complete");
        Ok(message)
    }

    async fn generate(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
        round: &Round,
        key: &StreamKey,
        progress: &dyn RoundProgressNotifier,
    ) -> Result<StreamPayload, ModeratorError> {
        self.state
            .put_analysis(
                thread,
                ModeratorAnalysis::pending(number, Utc::now())
                    .with_status(AnalysisStatus::Streaming),
            )
            .await?;

        let transcript = self.messages.thread_messages(thread).await?;
        let mut context = build_context(&transcript, number, round.snapshot().mode);
        context.push(PromptMessage::system(
            "Summarize the discussion above for the user: the main points of \
             agreement, the disagreements, and a concise overall answer.",
        ));

        let model = round.snapshot().moderator.clone();
        let mut handle = match self.gateway.generate(&model, &context).await {
            Ok(handle) => handle,
            Err(e) => {
                return self.fail(thread, number, key, e.to_string()).await;
            }
        };

        let mut full = String::new();
        while let Some(event) = handle.receiver.recv().await {
            match event {
                StreamEvent::Delta(chunk) => {
                    self.buffer.append_chunk(key, &chunk).await;
                    progress.on_stream_chunk("moderator", &chunk);
                    full.push_str(&chunk);
                }
                StreamEvent::Completed(text) => {
                    if full.is_empty() {
                        full = text;
                    }
                    let payload = StreamPayload::new(full, FinishReason::Stop);
                    self.buffer.complete(key, &payload.to_json()).await;
                    return Ok(payload);
                }
                StreamEvent::Error(reason) => {
                    return self.fail(thread, number, key, reason).await;
                }
            }
        }
        self.fail(thread, number, key, "stream ended without completion".to_string())
            .await
    }

    async fn fail(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
        key: &StreamKey,
        reason: String,
    ) -> Result<StreamPayload, ModeratorError> {
        self.buffer.fail(key).await;
        self.state
            .put_analysis(
                thread,
                ModeratorAnalysis::pending(number, Utc::now()).failed(),
            )
            .await?;
        Err(ModeratorError::Generation(reason))
    }

    /// Wait on an analysis another producer is streaming, bounded by the
    /// stall fallback: returns the finished message if it lands, `None` if
    /// the analysis should be adopted.
    async fn wait_out_inflight(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, ModeratorError> {
        let policy = RetryPolicy::gate_poll();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ModeratorError::Cancelled);
            }
            let Some(analysis) = self.state.analysis(thread, number).await? else {
                return Ok(None);
            };
            match analysis.status {
                AnalysisStatus::Complete => {
                    return Ok(self.stored_moderator_message(thread, number).await?);
                }
                AnalysisStatus::Failed => {
                    return Err(ModeratorError::AlreadyFailed(number));
                }
                AnalysisStatus::Pending | AnalysisStatus::Streaming => {
                    // The stall fallback bounds waiting on a lost stream.
                    if analysis_reached_terminal(&analysis, false, Utc::now()) {
                        return Ok(None);
                    }
                }
            }
            match policy.decide(attempt, started.elapsed()) {
                RetryDecision::Exhausted => return Ok(None),
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    async fn stored_moderator_message(
        &self,
        thread: &ThreadId,
        number: RoundNumber,
    ) -> Result<Option<Message>, StoreError> {
        let messages = self.messages.round_messages(thread, number).await?;
        Ok(messages
            .into_iter()
            .find(|m| m.role() == Role::Moderator && m.finish_reason().is_some()))
    }
}

/// Derive the gate's participant condition from a round's messages.
pub fn participant_status(transcript: &[Message], expected: usize) -> ParticipantStatus {
    let finished = (0..expected)
        .filter(|&index| {
            transcript.iter().any(|m| {
                m.id.is_deterministic()
                    && m.participant_index() == Some(index)
                    && m.finish_reason().is_some()
            })
        })
        .count();
    let streaming = transcript
        .iter()
        .any(|m| m.role() == Role::Assistant && m.is_streaming());
    ParticipantStatus::new(expected, finished, streaming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::progress::NoProgress;
    use crate::use_cases::support::{
        snapshot, MemBuffer, MemMessageStore, MemRoundStateStore, ScriptedGateway,
    };
    use roundtable_domain::{PreSearchRecord, RoundState, ThreadId};

    fn thread() -> ThreadId {
        ThreadId::new("t")
    }

    fn round(n: usize) -> Round {
        Round::resumed_at(
            thread(),
            RoundNumber::ZERO,
            snapshot(n),
            RoundState::AnalysisGate,
        )
    }

    struct Fixture {
        uc: RunModeratorUseCase<MemMessageStore, MemRoundStateStore, MemBuffer, ScriptedGateway>,
        messages: Arc<MemMessageStore>,
        state: Arc<MemRoundStateStore>,
    }

    fn fixture(responses: Vec<Result<String, String>>) -> Fixture {
        let messages = Arc::new(MemMessageStore::default());
        let state = Arc::new(MemRoundStateStore::default());
        let buffer = Arc::new(MemBuffer::default());
        let gateway = Arc::new(ScriptedGateway::new(responses));
        Fixture {
            uc: RunModeratorUseCase::new(messages.clone(), state.clone(), buffer, gateway),
            messages,
            state,
        }
    }

    async fn seed_finished_round(messages: &MemMessageStore, n: usize) {
        messages
            .append(&thread(), Message::user(thread(), RoundNumber::ZERO, "q"))
            .await
            .unwrap();
        for i in 0..n {
            messages
                .append(
                    &thread(),
                    Message::assistant(
                        thread(),
                        RoundNumber::ZERO,
                        i,
                        format!("answer {}", i),
                        Some(FinishReason::Stop),
                    ),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_gate_opens_when_participants_done() {
        let f = fixture(vec![]);
        seed_finished_round(&f.messages, 2).await;
        f.uc.await_gate(&round(2), &AtomicUsize::new(0))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_times_out_while_participant_missing() {
        let f = fixture(vec![]);
        seed_finished_round(&f.messages, 1).await;
        // Participant 1 never arrives; the gate must exhaust its policy
        // rather than loop forever.
        let result = f.uc.await_gate(&round(2), &AtomicUsize::new(0)).await;
        assert!(matches!(result, Err(ModeratorError::GateTimeout(_))));
    }

    #[tokio::test]
    async fn test_gate_surfaces_pre_search_failure() {
        let f = fixture(vec![]);
        seed_finished_round(&f.messages, 1).await;
        f.state
            .put_pre_search(&thread(), PreSearchRecord::failed(RoundNumber::ZERO))
            .await
            .unwrap();
        let err = f
            .uc
            .await_gate(&round(1), &AtomicUsize::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ModeratorError::PreSearchFailed));
    }

    #[tokio::test]
    async fn test_moderator_streams_and_persists() {
        let f = fixture(vec![Ok("the summary".to_string())]);
        seed_finished_round(&f.messages, 2).await;

        let message = f
            .uc
            .execute(&round(2), &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(message.id.to_string(), "t_r0_moderator");
        assert_eq!(message.content(), "the summary");

        let analysis = f
            .state
            .analysis(&thread(), RoundNumber::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Complete);
        assert_eq!(analysis.data.as_deref(), Some("the summary"));
    }

    #[tokio::test]
    async fn test_completed_analysis_reused_without_generation() {
        let f = fixture(vec![]);
        seed_finished_round(&f.messages, 1).await;
        f.messages
            .append(
                &thread(),
                Message::moderator(
                    thread(),
                    RoundNumber::ZERO,
                    "existing summary",
                    Some(FinishReason::Stop),
                ),
            )
            .await
            .unwrap();
        f.state
            .put_analysis(
                &thread(),
                ModeratorAnalysis::pending(RoundNumber::ZERO, Utc::now())
                    .completed("existing summary"),
            )
            .await
            .unwrap();

        let message = f
            .uc
            .execute(&round(1), &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(message.content(), "existing summary");
    }

    #[tokio::test]
    async fn test_failed_analysis_is_terminal() {
        let f = fixture(vec![]);
        seed_finished_round(&f.messages, 1).await;
        f.state
            .put_analysis(
                &thread(),
                ModeratorAnalysis::pending(RoundNumber::ZERO, Utc::now()).failed(),
            )
            .await
            .unwrap();

        let err = f
            .uc
            .execute(&round(1), &NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModeratorError::AlreadyFailed(_)));
    }

    #[tokio::test]
    async fn test_generation_failure_persists_failed_analysis() {
        let f = fixture(vec![Err("model exploded".to_string())]);
        seed_finished_round(&f.messages, 1).await;

        let err = f
            .uc
            .execute(&round(1), &NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModeratorError::Generation(_)));

        let analysis = f
            .state
            .analysis(&thread(), RoundNumber::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
    }

    #[test]
    fn test_participant_status_derivation() {
        let transcript = vec![
            Message::user(thread(), RoundNumber::ZERO, "q"),
            Message::assistant(
                thread(),
                RoundNumber::ZERO,
                0,
                "done",
                Some(FinishReason::Stop),
            ),
            Message::assistant(thread(), RoundNumber::ZERO, 1, "partial", None),
        ];
        let status = participant_status(&transcript, 3);
        assert_eq!(status.finished, 1);
        assert!(status.streaming);
        assert!(!status.all_finished());
    }
}
