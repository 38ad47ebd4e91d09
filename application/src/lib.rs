//! Application layer for roundtable
//!
//! This crate contains use cases, port definitions, and the retry policy.
//! It depends only on the domain layer.

pub mod ports;
pub mod retry;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    generation::{GatewayError, GenerationGateway, PromptMessage, PromptRole, StreamHandle},
    message_store::{MessageStore, StoreError},
    progress::{NoProgress, RoundProgressNotifier},
    round_state::RoundStateStore,
    search::{SearchError, SearchGateway},
    stream_buffer::{ResumeOutcome, StartOutcome, StreamBuffer},
};
pub use retry::{RetryDecision, RetryPolicy};
pub use use_cases::attach_stream::{AttachError, AttachStreamUseCase, AttachedPayload};
pub use use_cases::run_moderator::{ModeratorError, RunModeratorUseCase};
pub use use_cases::run_presearch::{PreSearchError, RunPreSearchUseCase};
pub use use_cases::run_round::{RunRoundError, RunRoundUseCase};
pub use use_cases::stream_participants::{SequencerError, StreamParticipantsUseCase};
pub use use_cases::submit_round::{
    SubmitRoundError, SubmitRoundInput, SubmitRoundOutput, SubmitRoundUseCase,
};
