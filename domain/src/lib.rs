//! Domain layer for roundtable
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Round
//!
//! A round is one user turn and everything it triggers: an optional
//! pre-search phase, one streamed response per configured participant in
//! priority order, and a moderator summarization once every participant has
//! finished. Rounds are numbered per thread, starting at 0.
//!
//! ## Resumability
//!
//! Every streaming step writes through a keyed buffer so that a client can
//! detach and re-attach without restarting generation. The whole round is
//! reconstructible from persisted state alone.

pub mod buffer;
pub mod core;
pub mod message;
pub mod moderator;
pub mod presearch;
pub mod round;
pub mod stream;

// Re-export commonly used types
pub use buffer::{
    BufferStatus, StreamBufferEntry, StreamKey, StreamPayload, StreamType, BUFFER_TTL_SECS,
    COMPLETION_GRACE_SECS,
};
pub use core::{error::DomainError, model::ModelRef, thread::ThreadId};
pub use message::{
    entities::{FinishReason, Message, MessageBody, Role},
    id::{DeterministicId, MessageId, Slot, TRANSIENT_PREFIX},
    reconciler::{reconcile, ReconcileOutcome},
};
pub use moderator::{
    analysis_reached_terminal, should_trigger_moderator, AnalysisStatus, ModeratorAnalysis,
    ParticipantStatus, ANALYSIS_STALL_SECS,
};
pub use presearch::{should_wait_for_pre_search, PreSearchRecord, PreSearchStatus};
pub use round::{
    changelog::{diff_snapshots, ChangeEntry},
    entities::{ConfigSnapshot, ConversationMode, Participant, Round, RoundNumber, RoundState},
    session::SessionFlags,
};
pub use stream::StreamEvent;
