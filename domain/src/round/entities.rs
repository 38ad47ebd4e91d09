//! Round entities and the round state machine

use crate::core::error::DomainError;
use crate::core::model::ModelRef;
use crate::core::thread::ThreadId;
use serde::{Deserialize, Serialize};

/// Number of a round within a thread (Value Object)
///
/// Strictly increasing, assigned once when the round's user message is
/// durably recorded. The first round of a thread is round 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoundNumber(u64);

impl RoundNumber {
    pub const ZERO: RoundNumber = RoundNumber(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number the next round of the thread will carry.
    pub fn next(&self) -> RoundNumber {
        RoundNumber(self.0 + 1)
    }
}

impl std::fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One configured AI responder within a round (Entity)
///
/// `index` is 0-based and dense within the round's configuration snapshot;
/// it doubles as the participant's streaming priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub index: usize,
    pub model: ModelRef,
}

impl Participant {
    pub fn new(id: impl Into<String>, index: usize, model: ModelRef) -> Self {
        Self {
            id: id.into(),
            index,
            model,
        }
    }
}

/// Conversation mode selected for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Participants answer the user turn in priority order.
    Standard,
    /// Participants answer in priority order and are prompted to engage
    /// with the previous answers.
    Debate,
}

impl ConversationMode {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationMode::Standard => "standard",
            ConversationMode::Debate => "debate",
        }
    }
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frozen configuration for one round (Entity)
///
/// Taken when the round starts; later participant-list edits apply only to
/// future rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub participants: Vec<Participant>,
    pub mode: ConversationMode,
    pub web_search_enabled: bool,
    pub moderator: ModelRef,
}

impl ConfigSnapshot {
    pub fn new(participants: Vec<Participant>, moderator: ModelRef) -> Self {
        Self {
            participants,
            mode: ConversationMode::Standard,
            web_search_enabled: false,
            moderator,
        }
    }

    pub fn with_mode(mut self, mode: ConversationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search_enabled = enabled;
        self
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Validate the snapshot: participant indices must be dense 0..n-1.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (position, participant) in self.participants.iter().enumerate() {
            if participant.index != position {
                return Err(DomainError::InvalidSnapshot(format!(
                    "participant '{}' has index {} at position {}",
                    participant.id, participant.index, position
                )));
            }
        }
        Ok(())
    }
}

/// State of a round's lifecycle
///
/// `Failed` is absorbing and reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Idle,
    ConfigCheck,
    PreSearch,
    ParticipantStreaming,
    AnalysisGate,
    ModeratorStreaming,
    Complete,
    Failed,
}

impl RoundState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundState::Complete | RoundState::Failed)
    }

    /// Whether `next` is a legal forward transition from this state.
    ///
    /// Pre-search is optional, so `ConfigCheck` may skip straight to
    /// `ParticipantStreaming`.
    pub fn can_advance_to(&self, next: RoundState) -> bool {
        use RoundState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, ConfigCheck)
                | (ConfigCheck, PreSearch)
                | (ConfigCheck, ParticipantStreaming)
                | (PreSearch, ParticipantStreaming)
                | (ParticipantStreaming, AnalysisGate)
                | (AnalysisGate, ModeratorStreaming)
                | (ModeratorStreaming, Complete)
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            RoundState::Idle => "idle",
            RoundState::ConfigCheck => "config_check",
            RoundState::PreSearch => "pre_search",
            RoundState::ParticipantStreaming => "participant_streaming",
            RoundState::AnalysisGate => "analysis_gate",
            RoundState::ModeratorStreaming => "moderator_streaming",
            RoundState::Complete => "complete",
            RoundState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user turn and all its streaming activity (Entity)
///
/// Identified by `(thread, number)`. Owned by the lifecycle controller for
/// the duration of the round; immutable once terminal.
#[derive(Debug, Clone)]
pub struct Round {
    thread: ThreadId,
    number: RoundNumber,
    snapshot: ConfigSnapshot,
    state: RoundState,
    current_participant: Option<usize>,
}

impl Round {
    pub fn new(thread: ThreadId, number: RoundNumber, snapshot: ConfigSnapshot) -> Self {
        Self {
            thread,
            number,
            snapshot,
            state: RoundState::Idle,
            current_participant: None,
        }
    }

    /// Reconstruct a round mid-flight, e.g. from persisted state on resume.
    pub fn resumed_at(
        thread: ThreadId,
        number: RoundNumber,
        snapshot: ConfigSnapshot,
        state: RoundState,
    ) -> Self {
        Self {
            thread,
            number,
            snapshot,
            state,
            current_participant: None,
        }
    }

    pub fn thread(&self) -> &ThreadId {
        &self.thread
    }

    pub fn number(&self) -> RoundNumber {
        self.number
    }

    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn current_participant(&self) -> Option<usize> {
        self.current_participant
    }

    /// Advance the state machine along a legal edge.
    pub fn advance(&mut self, next: RoundState) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::RoundImmutable);
        }
        if !self.state.can_advance_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next != RoundState::ParticipantStreaming {
            self.current_participant = None;
        }
        Ok(())
    }

    /// Absorbing failure edge, legal from any non-terminal state.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = RoundState::Failed;
            self.current_participant = None;
        }
    }

    /// Record which participant is currently streaming.
    pub fn set_current_participant(&mut self, index: Option<usize>) {
        self.current_participant = index;
    }
}
