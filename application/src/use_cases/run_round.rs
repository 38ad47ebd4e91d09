//! Round Lifecycle Controller
//!
//! Composes the phases of one round behind a single state machine:
//! `ConfigCheck → PreSearch? → ParticipantStreaming → AnalysisGate →
//! ModeratorStreaming → Complete`, with `Failed` absorbing. Because every
//! phase is idempotent against persisted state, the same loop drives both
//! a fresh round and one reconstructed after a disconnect.

use crate::ports::generation::GenerationGateway;
use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::progress::RoundProgressNotifier;
use crate::ports::round_state::RoundStateStore;
use crate::ports::search::SearchGateway;
use crate::ports::stream_buffer::StreamBuffer;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::use_cases::run_moderator::{participant_status, ModeratorError, RunModeratorUseCase};
use crate::use_cases::run_presearch::{PreSearchError, RunPreSearchUseCase};
use crate::use_cases::stream_participants::{
    next_incomplete_index, SequencerError, StreamParticipantsUseCase,
};
use roundtable_domain::{
    AnalysisStatus, ConfigSnapshot, Message, ModeratorAnalysis, PreSearchRecord, Role, Round,
    RoundState, ThreadId,
};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from driving a round's lifecycle
#[derive(Error, Debug)]
pub enum RunRoundError {
    #[error("Configuration changed since the round was frozen; start a fresh round")]
    ConfigMismatch,

    #[error("Timed out waiting for configuration persistence confirmation")]
    ConfigConfirmationTimeout,

    #[error("No round found to resume")]
    NothingToResume,

    #[error("Round is in a failed state; start a fresh round")]
    RoundFailed,

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    PreSearch(#[from] PreSearchError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Moderator(#[from] ModeratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Use case composing one round end to end
pub struct RunRoundUseCase<S, R, B, G, W>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    G: GenerationGateway,
    W: SearchGateway,
{
    messages: Arc<S>,
    state: Arc<R>,
    pre_search: RunPreSearchUseCase<S, R, B, W>,
    sequencer: StreamParticipantsUseCase<S, B, G>,
    moderator: RunModeratorUseCase<S, R, B, G>,
}

impl<S, R, B, G, W> RunRoundUseCase<S, R, B, G, W>
where
    S: MessageStore,
    R: RoundStateStore,
    B: StreamBuffer,
    G: GenerationGateway,
    W: SearchGateway,
{
    pub fn new(
        messages: Arc<S>,
        state: Arc<R>,
        buffer: Arc<B>,
        gateway: Arc<G>,
        search: Arc<W>,
    ) -> Self {
        Self {
            pre_search: RunPreSearchUseCase::new(
                messages.clone(),
                state.clone(),
                buffer.clone(),
                search,
            ),
            sequencer: StreamParticipantsUseCase::new(
                messages.clone(),
                buffer.clone(),
                gateway.clone(),
            ),
            moderator: RunModeratorUseCase::new(
                messages.clone(),
                state.clone(),
                buffer,
                gateway,
            ),
            messages,
            state,
        }
    }

    /// Drive the round from its current state to `Complete`.
    ///
    /// Transport-level failures inside a phase retry via resume polling;
    /// terminal failures fail the round and release the thread for a fresh
    /// submission. Cancellation leaves the round resumable.
    pub async fn execute(
        &self,
        round: &mut Round,
        pending_animations: &AtomicUsize,
        progress: &dyn RoundProgressNotifier,
        cancel: &CancellationToken,
    ) -> Result<(), RunRoundError> {
        let result = self.drive(round, pending_animations, progress, cancel).await;

        match &result {
            Ok(()) => {
                self.state.clear_active_round(round.thread()).await?;
            }
            Err(RunRoundError::Cancelled) => {
                // Resumable: the active-round marker stays set.
            }
            Err(e) => {
                warn!(thread = %round.thread(), round = %round.number(), error = %e, "round failed");
                round.fail();
                self.state.clear_active_round(round.thread()).await?;
            }
        }
        result
    }

    async fn drive(
        &self,
        round: &mut Round,
        pending_animations: &AtomicUsize,
        progress: &dyn RoundProgressNotifier,
        cancel: &CancellationToken,
    ) -> Result<(), RunRoundError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RunRoundError::Cancelled);
            }

            match round.state() {
                RoundState::Idle => {
                    round
                        .advance(RoundState::ConfigCheck)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::ConfigCheck => {
                    progress.on_phase_start(RoundState::ConfigCheck);
                    self.confirm_config_persisted(round).await?;
                    progress.on_phase_complete(RoundState::ConfigCheck);

                    let next = if round.snapshot().web_search_enabled {
                        RoundState::PreSearch
                    } else {
                        RoundState::ParticipantStreaming
                    };
                    round
                        .advance(next)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::PreSearch => {
                    progress.on_phase_start(RoundState::PreSearch);
                    let query = self.user_query(round).await?;
                    self.pre_search.execute(round, &query, progress).await?;
                    progress.on_phase_complete(RoundState::PreSearch);
                    round
                        .advance(RoundState::ParticipantStreaming)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::ParticipantStreaming => {
                    progress.on_phase_start(RoundState::ParticipantStreaming);
                    self.sequencer.execute(round, progress, cancel).await?;
                    progress.on_phase_complete(RoundState::ParticipantStreaming);
                    round
                        .advance(RoundState::AnalysisGate)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::AnalysisGate => {
                    progress.on_phase_start(RoundState::AnalysisGate);
                    self.moderator.await_gate(round, pending_animations).await?;
                    progress.on_phase_complete(RoundState::AnalysisGate);
                    round
                        .advance(RoundState::ModeratorStreaming)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::ModeratorStreaming => {
                    progress.on_phase_start(RoundState::ModeratorStreaming);
                    self.moderator.execute(round, progress, cancel).await?;
                    progress.on_phase_complete(RoundState::ModeratorStreaming);
                    round
                        .advance(RoundState::Complete)
                        .map_err(|_| RunRoundError::ConfigMismatch)?;
                }
                RoundState::Complete => {
                    info!(thread = %round.thread(), round = %round.number(), "round complete");
                    return Ok(());
                }
                RoundState::Failed => {
                    return Err(RunRoundError::RoundFailed);
                }
            }
        }
    }

    /// Reconstruct a round purely from persisted state.
    ///
    /// Refuses with `ConfigMismatch` when the frozen snapshot no longer
    /// matches the caller's current configuration; the user must start a
    /// fresh round instead.
    pub async fn resume(
        &self,
        thread: &ThreadId,
        current: &ConfigSnapshot,
    ) -> Result<Round, RunRoundError> {
        let Some(number) = self.messages.last_round_number(thread).await? else {
            return Err(RunRoundError::NothingToResume);
        };
        let Some(snapshot) = self.state.snapshot(thread, number).await? else {
            return Err(RunRoundError::NothingToResume);
        };
        if snapshot != *current {
            return Err(RunRoundError::ConfigMismatch);
        }

        let transcript = self.messages.round_messages(thread, number).await?;
        let pre_search = self.state.pre_search(thread, number).await?;
        let analysis = self.state.analysis(thread, number).await?;

        let state = reconstruct_state(&snapshot, &transcript, pre_search.as_ref(), analysis.as_ref());
        info!(thread = %thread, round = %number, state = %state, "round reconstructed from persisted state");
        Ok(Round::resumed_at(thread.clone(), number, snapshot, state))
    }

    /// The round's user message drives the pre-search query; reading it
    /// back from the store keeps resume independent of in-memory state.
    async fn user_query(&self, round: &Round) -> Result<String, RunRoundError> {
        let transcript = self
            .messages
            .round_messages(round.thread(), round.number())
            .await?;
        transcript
            .iter()
            .find(|m| m.role() == Role::User)
            .map(|m| m.content().to_string())
            .ok_or_else(|| {
                RunRoundError::Store(StoreError::Corrupt(
                    "round has no persisted user message".to_string(),
                ))
            })
    }

    /// Bounded wait for the frozen snapshot to be visibly persisted so
    /// downstream consumers see the changelog before streaming starts.
    async fn confirm_config_persisted(&self, round: &Round) -> Result<(), RunRoundError> {
        let policy = RetryPolicy::config_confirmation();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if let Some(stored) = self
                .state
                .snapshot(round.thread(), round.number())
                .await?
            {
                if stored == *round.snapshot() {
                    return Ok(());
                }
                // A different snapshot under this round number means the
                // configuration moved underneath us.
                return Err(RunRoundError::ConfigMismatch);
            }
            match policy.decide(attempt, started.elapsed()) {
                RetryDecision::Exhausted => {
                    return Err(RunRoundError::ConfigConfirmationTimeout);
                }
                RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }
}

/// Decide which lifecycle state persisted data places the round in.
pub fn reconstruct_state(
    snapshot: &ConfigSnapshot,
    transcript: &[Message],
    pre_search: Option<&PreSearchRecord>,
    analysis: Option<&ModeratorAnalysis>,
) -> RoundState {
    let has_user = transcript.iter().any(|m| m.role() == Role::User);
    if !has_user {
        return RoundState::ConfigCheck;
    }

    let moderator_done = transcript
        .iter()
        .any(|m| m.role() == Role::Moderator && m.finish_reason().is_some());
    if moderator_done {
        return RoundState::Complete;
    }

    if let Some(analysis) = analysis {
        if analysis.status == AnalysisStatus::Failed {
            return RoundState::Failed;
        }
        return RoundState::ModeratorStreaming;
    }

    let expected = snapshot.participant_count();
    let next = next_incomplete_index(transcript, transcript[0].round, expected);
    if next < expected {
        // Pre-search still owes its result before participants may stream
        let records = pre_search.map(std::slice::from_ref).unwrap_or(&[]);
        let waiting = snapshot.web_search_enabled
            && roundtable_domain::should_wait_for_pre_search(true, records, transcript[0].round);
        if waiting && next == 0 {
            return RoundState::PreSearch;
        }
        return RoundState::ParticipantStreaming;
    }

    if participant_status(transcript, expected).all_finished() {
        return RoundState::AnalysisGate;
    }
    RoundState::ParticipantStreaming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::progress::NoProgress;
    use crate::use_cases::submit_round::{SubmitRoundInput, SubmitRoundUseCase};
    use crate::use_cases::support::{
        snapshot, MemBuffer, MemMessageStore, MemRoundStateStore, ScriptedGateway, ScriptedSearch,
    };
    use roundtable_domain::{reconcile, FinishReason, RoundNumber};

    struct Fixture {
        run: RunRoundUseCase<
            MemMessageStore,
            MemRoundStateStore,
            MemBuffer,
            ScriptedGateway,
            ScriptedSearch,
        >,
        submit: SubmitRoundUseCase<MemMessageStore, MemRoundStateStore>,
        messages: Arc<MemMessageStore>,
        state: Arc<MemRoundStateStore>,
    }

    fn fixture(responses: Vec<Result<String, String>>, search: ScriptedSearch) -> Fixture {
        let messages = Arc::new(MemMessageStore::default());
        let state = Arc::new(MemRoundStateStore::default());
        let buffer = Arc::new(MemBuffer::default());
        let gateway = Arc::new(ScriptedGateway::new(responses));
        Fixture {
            run: RunRoundUseCase::new(
                messages.clone(),
                state.clone(),
                buffer,
                gateway,
                Arc::new(search),
            ),
            submit: SubmitRoundUseCase::new(messages.clone(), state.clone()),
            messages,
            state,
        }
    }

    fn thread() -> ThreadId {
        ThreadId::new("t")
    }

    #[tokio::test]
    async fn test_full_round_without_web_search() {
        let f = fixture(
            vec![
                Ok("first".to_string()),
                Ok("second".to_string()),
                Ok("summary".to_string()),
            ],
            ScriptedSearch::ok("unused"),
        );
        let out = f
            .submit
            .execute(SubmitRoundInput::new(thread(), "question", snapshot(2)))
            .await
            .unwrap();

        let mut round = out.round;
        f.run
            .execute(
                &mut round,
                &AtomicUsize::new(0),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(round.state(), RoundState::Complete);
        // Thread released for the next submission
        assert!(f.state.active_round(&thread()).await.unwrap().is_none());

        let transcript = f.messages.thread_messages(&thread()).await.unwrap();
        let ids: Vec<String> = transcript.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(
            ids,
            vec!["t_r0_user", "t_r0_p0", "t_r0_p1", "t_r0_moderator"]
        );
    }

    #[tokio::test]
    async fn test_full_round_with_web_search() {
        let f = fixture(
            vec![Ok("answer".to_string()), Ok("summary".to_string())],
            ScriptedSearch::ok("search results"),
        );
        let out = f
            .submit
            .execute(SubmitRoundInput::new(
                thread(),
                "question",
                snapshot(1).with_web_search(true),
            ))
            .await
            .unwrap();

        let mut round = out.round;
        f.run
            .execute(
                &mut round,
                &AtomicUsize::new(0),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let transcript = f.messages.thread_messages(&thread()).await.unwrap();
        let ids: Vec<String> = transcript.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(
            ids,
            vec!["t_r0_user", "t_r0_presearch", "t_r0_p0", "t_r0_moderator"]
        );
    }

    #[tokio::test]
    async fn test_generation_failure_fails_round_and_releases_thread() {
        let f = fixture(
            vec![Err("backend down".to_string())],
            ScriptedSearch::ok("unused"),
        );
        let out = f
            .submit
            .execute(SubmitRoundInput::new(thread(), "question", snapshot(1)))
            .await
            .unwrap();

        let mut round = out.round;
        let err = f
            .run
            .execute(
                &mut round,
                &AtomicUsize::new(0),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunRoundError::Sequencer(_)));
        assert_eq!(round.state(), RoundState::Failed);
        // The user can retry the whole round
        assert!(f.state.active_round(&thread()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_refuses_config_mismatch() {
        let f = fixture(vec![], ScriptedSearch::ok("unused"));
        f.submit
            .execute(SubmitRoundInput::new(thread(), "question", snapshot(2)))
            .await
            .unwrap();

        let err = f.run.resume(&thread(), &snapshot(3)).await.unwrap_err();
        assert!(matches!(err, RunRoundError::ConfigMismatch));
    }

    #[tokio::test]
    async fn test_resume_continues_mid_sequence() {
        let f = fixture(
            vec![Ok("second answer".to_string()), Ok("summary".to_string())],
            ScriptedSearch::ok("unused"),
        );
        let out = f
            .submit
            .execute(SubmitRoundInput::new(thread(), "question", snapshot(2)))
            .await
            .unwrap();
        drop(out);

        // p0 finished before the disconnect
        f.messages
            .append(
                &thread(),
                Message::assistant(
                    thread(),
                    RoundNumber::ZERO,
                    0,
                    "first answer",
                    Some(FinishReason::Stop),
                ),
            )
            .await
            .unwrap();

        let mut round = f.run.resume(&thread(), &snapshot(2)).await.unwrap();
        assert_eq!(round.state(), RoundState::ParticipantStreaming);

        f.run
            .execute(
                &mut round,
                &AtomicUsize::new(0),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let transcript = f.messages.thread_messages(&thread()).await.unwrap();
        let reconciled = reconcile(&transcript);
        let ids: Vec<String> = reconciled
            .messages
            .iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["t_r0_user", "t_r0_p0", "t_r0_p1", "t_r0_moderator"]
        );
    }

    #[tokio::test]
    async fn test_resume_of_completed_round_is_noop() {
        let f = fixture(
            vec![Ok("a".to_string()), Ok("s".to_string())],
            ScriptedSearch::ok("unused"),
        );
        let out = f
            .submit
            .execute(SubmitRoundInput::new(thread(), "q", snapshot(1)))
            .await
            .unwrap();
        let mut round = out.round;
        f.run
            .execute(
                &mut round,
                &AtomicUsize::new(0),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let resumed = f.run.resume(&thread(), &snapshot(1)).await.unwrap();
        assert_eq!(resumed.state(), RoundState::Complete);
    }

    #[tokio::test]
    async fn test_resume_with_nothing_persisted() {
        let f = fixture(vec![], ScriptedSearch::ok("unused"));
        let err = f.run.resume(&thread(), &snapshot(1)).await.unwrap_err();
        assert!(matches!(err, RunRoundError::NothingToResume));
    }

    #[test]
    fn test_reconstruct_state_variants() {
        let snap = snapshot(2);
        let user = Message::user(thread(), RoundNumber::ZERO, "q");
        let done0 = Message::assistant(
            thread(),
            RoundNumber::ZERO,
            0,
            "a",
            Some(FinishReason::Stop),
        );
        let done1 = Message::assistant(
            thread(),
            RoundNumber::ZERO,
            1,
            "b",
            Some(FinishReason::Stop),
        );
        let moderator = Message::moderator(
            thread(),
            RoundNumber::ZERO,
            "s",
            Some(FinishReason::Stop),
        );

        assert_eq!(reconstruct_state(&snap, &[], None, None), RoundState::ConfigCheck);
        assert_eq!(
            reconstruct_state(&snap, &[user.clone()], None, None),
            RoundState::ParticipantStreaming
        );
        assert_eq!(
            reconstruct_state(&snap, &[user.clone(), done0.clone()], None, None),
            RoundState::ParticipantStreaming
        );
        assert_eq!(
            reconstruct_state(
                &snap,
                &[user.clone(), done0.clone(), done1.clone()],
                None,
                None
            ),
            RoundState::AnalysisGate
        );
        assert_eq!(
            reconstruct_state(
                &snap,
                &[user.clone(), done0.clone(), done1.clone()],
                None,
                Some(&ModeratorAnalysis::pending(
                    RoundNumber::ZERO,
                    chrono::Utc::now()
                ))
            ),
            RoundState::ModeratorStreaming
        );
        assert_eq!(
            reconstruct_state(
                &snap,
                &[user.clone(), done0, done1, moderator],
                None,
                None
            ),
            RoundState::Complete
        );

        // Web search enabled with no visible record blocks before p0
        let searching = snapshot(2).with_web_search(true);
        assert_eq!(
            reconstruct_state(&searching, &[user], None, None),
            RoundState::PreSearch
        );
    }
}
