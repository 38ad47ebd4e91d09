//! Stream resumption buffer entries
//!
//! The buffer is the server-side keyed cache of in-flight and
//! recently-completed stream payloads. Entries live under a
//! `(thread, round, stream type)` key, expire passively after
//! [`BUFFER_TTL_SECS`], and survive completion for a grace window so a
//! detached client gets one final resume read.

use crate::core::thread::ThreadId;
use crate::message::entities::FinishReason;
use crate::round::entities::RoundNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed buffer TTL; not configurable per request.
pub const BUFFER_TTL_SECS: i64 = 3600;

/// Seconds a completed entry stays readable before removal.
pub const COMPLETION_GRACE_SECS: i64 = 30;

/// Which of a round's streams a buffer entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    PreSearch,
    Participant(usize),
    Moderator,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::PreSearch => write!(f, "presearch"),
            StreamType::Participant(index) => write!(f, "p{}", index),
            StreamType::Moderator => write!(f, "moderator"),
        }
    }
}

/// Key of one resumable stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub thread: ThreadId,
    pub round: RoundNumber,
    pub stream: StreamType,
}

impl StreamKey {
    pub fn new(thread: ThreadId, round: RoundNumber, stream: StreamType) -> Self {
        Self {
            thread,
            round,
            stream,
        }
    }

    pub fn pre_search(thread: ThreadId, round: RoundNumber) -> Self {
        Self::new(thread, round, StreamType::PreSearch)
    }

    pub fn participant(thread: ThreadId, round: RoundNumber, index: usize) -> Self {
        Self::new(thread, round, StreamType::Participant(index))
    }

    pub fn moderator(thread: ThreadId, round: RoundNumber) -> Self {
        Self::new(thread, round, StreamType::Moderator)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:r{}:{}", self.thread, self.round, self.stream)
    }
}

/// Lifecycle status of a buffer entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    Streaming,
    Complete { completed_at: DateTime<Utc> },
}

/// One buffered stream payload
///
/// While streaming, `payload` accumulates raw chunks; on completion it is
/// replaced with the serialized [`StreamPayload`]. `observed_streaming`
/// records whether any resume call attached while the stream was live,
/// which distinguishes "freshly completed" from "resumed from buffer" at
/// read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBufferEntry {
    pub key: StreamKey,
    pub payload: String,
    pub status: BufferStatus,
    pub created_at: DateTime<Utc>,
    pub observed_streaming: bool,
}

impl StreamBufferEntry {
    pub fn streaming(key: StreamKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            payload: String::new(),
            status: BufferStatus::Streaming,
            created_at: now,
            observed_streaming: false,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.payload.push_str(chunk);
    }

    pub fn complete(&mut self, payload: impl Into<String>, now: DateTime<Utc>) {
        self.payload = payload.into();
        self.status = BufferStatus::Complete { completed_at: now };
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.status, BufferStatus::Streaming)
    }

    /// Passive TTL expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at).num_seconds() > BUFFER_TTL_SECS
    }

    /// Whether a completed entry has outlived its final-read grace window.
    pub fn past_grace(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            BufferStatus::Streaming => false,
            BufferStatus::Complete { completed_at } => {
                now.signed_duration_since(completed_at).num_seconds() > COMPLETION_GRACE_SECS
            }
        }
    }
}

/// Terminal wire form of a buffered stream
///
/// A partially written payload may fail to parse; callers treat that as
/// "not yet usable", not as corruption to surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPayload {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl StreamPayload {
    pub fn new(text: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish_reason,
        }
    }

    pub fn to_json(&self) -> String {
        // StreamPayload has no map keys that can fail to serialize
        serde_json::to_string(self).expect("stream payload serialization")
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
