//! Stream resumption buffer port
//!
//! Two entry points per stream key, mirroring the external interface: a
//! Start that refuses a second concurrent generation but prefers returning
//! an existing buffered payload over a conflict, and a Resume that a
//! detached client polls until it observes a terminal payload.

use async_trait::async_trait;
use roundtable_domain::StreamKey;

/// Outcome of a Start call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// No entry existed; a streaming entry was created and the caller now
    /// owns the generation for this key.
    Started,
    /// A terminal payload already exists; returned instead of a conflict so
    /// rapid re-submission never duplicates generation.
    Buffered {
        payload: String,
        freshly_completed: bool,
    },
    /// A generation is genuinely active for this key and nothing is
    /// buffered yet. Transient: resume first, then retry Start after
    /// backoff.
    Conflict,
}

/// Outcome of a Resume call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No buffer for this key; the caller falls through to Start.
    NoBuffer,
    /// Stream is live; poll Resume again after the suggested delay, never
    /// call Start while active.
    Active { retry_after_ms: u64 },
    /// Terminal payload. `resumed_from_buffer` distinguishes a payload the
    /// poller watched complete from one found already buffered.
    Completed {
        payload: String,
        resumed_from_buffer: bool,
    },
}

/// Server-side keyed cache of in-flight and recently-completed streams
///
/// The buffer is a synchronization point: it enforces at most one active
/// generation per stream key, nothing more general.
#[async_trait]
pub trait StreamBuffer: Send + Sync {
    async fn start(&self, key: &StreamKey) -> StartOutcome;

    /// Append a chunk to a live entry. No-op for unknown or terminal keys.
    async fn append_chunk(&self, key: &StreamKey, chunk: &str);

    /// Mark the entry terminal with its final payload.
    async fn complete(&self, key: &StreamKey, payload: &str);

    /// Remove the entry after a terminal failure.
    async fn fail(&self, key: &StreamKey);

    async fn resume(&self, key: &StreamKey) -> ResumeOutcome;
}
