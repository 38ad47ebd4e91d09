//! Progress notification port
//!
//! Defines the interface for reporting round progress. Implementations
//! live in the presentation layer.

use roundtable_domain::{Participant, RoundState};

/// Callback for progress updates during round execution
pub trait RoundProgressNotifier: Send + Sync {
    /// Called when a lifecycle phase starts.
    fn on_phase_start(&self, phase: RoundState);

    /// Called when a participant begins streaming.
    fn on_participant_start(&self, participant: &Participant);

    /// Called when a participant finishes (or fails).
    fn on_participant_complete(&self, participant: &Participant, success: bool);

    /// Called for each text chunk of any stream. `source` is the stream
    /// label (participant id, "presearch", "moderator").
    fn on_stream_chunk(&self, _source: &str, _chunk: &str) {}

    /// Called when a lifecycle phase completes.
    fn on_phase_complete(&self, phase: RoundState);
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl RoundProgressNotifier for NoProgress {
    fn on_phase_start(&self, _phase: RoundState) {}
    fn on_participant_start(&self, _participant: &Participant) {}
    fn on_participant_complete(&self, _participant: &Participant, _success: bool) {}
    fn on_phase_complete(&self, _phase: RoundState) {}
}
