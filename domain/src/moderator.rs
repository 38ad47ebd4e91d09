//! Moderator analysis and its start gate

use crate::presearch::{PreSearchRecord, PreSearchStatus};
use crate::round::entities::RoundNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds after which a stalled analysis counts as terminal.
pub const ANALYSIS_STALL_SECS: i64 = 60;

/// Status of a round's moderator analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Streaming,
    Complete,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Complete | AnalysisStatus::Failed)
    }
}

/// The post-round summarization record (Entity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorAnalysis {
    pub round: RoundNumber,
    pub status: AnalysisStatus,
    pub data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ModeratorAnalysis {
    pub fn pending(round: RoundNumber, created_at: DateTime<Utc>) -> Self {
        Self {
            round,
            status: AnalysisStatus::Pending,
            data: None,
            created_at,
        }
    }

    pub fn with_status(mut self, status: AnalysisStatus) -> Self {
        self.status = status;
        self
    }

    pub fn completed(mut self, data: impl Into<String>) -> Self {
        self.status = AnalysisStatus::Complete;
        self.data = Some(data.into());
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = AnalysisStatus::Failed;
        self
    }
}

/// Aggregate completion state of a round's participants
///
/// Derived from the round's messages: `finished` counts assistant messages
/// present with a non-null finish reason, `streaming` is true while any
/// assistant message is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub expected: usize,
    pub finished: usize,
    pub streaming: bool,
}

impl ParticipantStatus {
    pub fn new(expected: usize, finished: usize, streaming: bool) -> Self {
        Self {
            expected,
            finished,
            streaming,
        }
    }

    pub fn all_finished(&self) -> bool {
        self.finished == self.expected && !self.streaming
    }
}

/// Whether the moderator phase may start.
///
/// All three conditions must hold: every participant finished and none
/// streaming; pre-search absent (never requested) or complete; and no
/// in-flight presentation transitions declared by the caller. The gate is
/// re-evaluated on every relevant state change, so this stays a pure
/// function of its inputs.
pub fn should_trigger_moderator(
    participants: ParticipantStatus,
    pre_search: Option<&PreSearchRecord>,
    pending_animation_count: usize,
) -> bool {
    if !participants.all_finished() {
        return false;
    }
    let pre_search_clear = match pre_search {
        None => true,
        Some(record) => record.status == PreSearchStatus::Complete,
    };
    pre_search_clear && pending_animation_count == 0
}

/// Completion-detection fallback for an in-flight analysis.
///
/// Bounds indefinite waiting on a stalled or lost stream without a push
/// notification from the generation backend: a `Streaming` analysis older
/// than [`ANALYSIS_STALL_SECS`], or a `Pending` one that nobody is
/// currently streaming and is equally old, counts as terminal.
pub fn analysis_reached_terminal(
    analysis: &ModeratorAnalysis,
    currently_streaming: bool,
    now: DateTime<Utc>,
) -> bool {
    let age = now.signed_duration_since(analysis.created_at).num_seconds();
    match analysis.status {
        AnalysisStatus::Complete | AnalysisStatus::Failed => true,
        AnalysisStatus::Streaming => age > ANALYSIS_STALL_SECS,
        AnalysisStatus::Pending => !currently_streaming && age > ANALYSIS_STALL_SECS,
    }
}
