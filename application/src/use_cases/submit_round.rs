//! Submit Round use case
//!
//! Admits one user turn: rejects concurrent rounds, assigns the round
//! number from persisted state, freezes the configuration snapshot, and
//! records the changelog against the prior round before any streaming
//! starts.

use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::round_state::RoundStateStore;
use roundtable_domain::{
    diff_snapshots, ChangeEntry, ConfigSnapshot, DomainError, Message, Round, RoundNumber,
    RoundState, ThreadId,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while admitting a round
#[derive(Error, Debug)]
pub enum SubmitRoundError {
    #[error("A round is already active for this thread")]
    RoundConflict,

    #[error("User input is empty")]
    EmptyInput,

    #[error("Invalid configuration snapshot: {0}")]
    InvalidSnapshot(DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Input for the SubmitRound use case
#[derive(Debug, Clone)]
pub struct SubmitRoundInput {
    pub thread: ThreadId,
    pub user_input: String,
    pub snapshot: ConfigSnapshot,
}

impl SubmitRoundInput {
    pub fn new(
        thread: ThreadId,
        user_input: impl Into<String>,
        snapshot: ConfigSnapshot,
    ) -> Self {
        Self {
            thread,
            user_input: user_input.into(),
            snapshot,
        }
    }
}

/// Output of a successful submission
#[derive(Debug, Clone)]
pub struct SubmitRoundOutput {
    pub round: Round,
    pub changelog: Vec<ChangeEntry>,
}

/// Use case for admitting a new round
pub struct SubmitRoundUseCase<S: MessageStore, R: RoundStateStore> {
    messages: Arc<S>,
    state: Arc<R>,
}

impl<S: MessageStore, R: RoundStateStore> SubmitRoundUseCase<S, R> {
    pub fn new(messages: Arc<S>, state: Arc<R>) -> Self {
        Self { messages, state }
    }

    pub async fn execute(
        &self,
        input: SubmitRoundInput,
    ) -> Result<SubmitRoundOutput, SubmitRoundError> {
        if input.user_input.trim().is_empty() {
            return Err(SubmitRoundError::EmptyInput);
        }
        input
            .snapshot
            .validate()
            .map_err(SubmitRoundError::InvalidSnapshot)?;

        if self.state.active_round(&input.thread).await?.is_some() {
            return Err(SubmitRoundError::RoundConflict);
        }

        let number = match self.messages.last_round_number(&input.thread).await? {
            Some(last) => last.next(),
            None => RoundNumber::ZERO,
        };

        // Pure comparison against the prior round's frozen snapshot; never
        // blocks streaming.
        let previous = match number.value() {
            0 => None,
            _ => {
                self.state
                    .snapshot(&input.thread, RoundNumber::new(number.value() - 1))
                    .await?
            }
        };
        let changelog = diff_snapshots(previous.as_ref(), &input.snapshot);
        if !changelog.is_empty() {
            debug!(
                thread = %input.thread,
                round = %number,
                entries = changelog.len(),
                "configuration changed since previous round"
            );
        }

        // The round number is assigned the moment the user message is
        // durably recorded.
        let user_message = Message::user(input.thread.clone(), number, input.user_input.clone());
        self.messages.append(&input.thread, user_message).await?;
        self.state
            .put_snapshot(&input.thread, number, input.snapshot.clone())
            .await?;
        self.state
            .put_changelog(&input.thread, number, changelog.clone())
            .await?;
        self.state.set_active_round(&input.thread, number).await?;

        info!(thread = %input.thread, round = %number, "round admitted");

        let round = Round::resumed_at(
            input.thread,
            number,
            input.snapshot,
            RoundState::ConfigCheck,
        );
        Ok(SubmitRoundOutput { round, changelog })
    }
}
