//! Message identity
//!
//! A message id is either **deterministic** (server-assigned, stable across
//! retries) or **transient** (client-assigned before server confirmation,
//! prefixed `optimistic-`).
//!
//! The deterministic grammar for assistant messages is exactly
//! `{threadId}_r{roundNumber}_p{participantIndex}` with base-10 integers
//! and no leading zeros beyond `0` itself. The remaining roles reuse the
//! `{threadId}_r{roundNumber}` prefix with a role suffix, keeping one
//! deterministic id per `(thread, round, role)`. Parsing is right-anchored
//! so thread ids containing underscores stay unambiguous.

use crate::core::error::DomainError;
use crate::core::thread::ThreadId;
use crate::message::entities::Role;
use crate::round::entities::RoundNumber;
use serde::{Deserialize, Serialize};

/// Prefix carried by every client-assigned transient id.
pub const TRANSIENT_PREFIX: &str = "optimistic-";

/// The deterministic-id slot within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    User,
    Participant(usize),
    PreSearch,
    Moderator,
}

impl Slot {
    pub fn role(&self) -> Role {
        match self {
            Slot::User => Role::User,
            Slot::Participant(_) => Role::Assistant,
            Slot::PreSearch => Role::PreSearch,
            Slot::Moderator => Role::Moderator,
        }
    }
}

/// A server-assigned, retry-stable message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeterministicId {
    thread: ThreadId,
    round: RoundNumber,
    slot: Slot,
}

impl DeterministicId {
    pub fn new(thread: ThreadId, round: RoundNumber, slot: Slot) -> Self {
        Self {
            thread,
            round,
            slot,
        }
    }

    pub fn thread(&self) -> &ThreadId {
        &self.thread
    }

    pub fn round(&self) -> RoundNumber {
        self.round
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }
}

impl std::fmt::Display for DeterministicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_r{}", self.thread, self.round)?;
        match self.slot {
            Slot::User => write!(f, "_user"),
            Slot::Participant(index) => write!(f, "_p{}", index),
            Slot::PreSearch => write!(f, "_presearch"),
            Slot::Moderator => write!(f, "_moderator"),
        }
    }
}

/// Identity of a message: deterministic or transient
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MessageId {
    Deterministic(DeterministicId),
    Transient(String),
}

impl MessageId {
    pub fn user(thread: ThreadId, round: RoundNumber) -> Self {
        MessageId::Deterministic(DeterministicId::new(thread, round, Slot::User))
    }

    pub fn participant(thread: ThreadId, round: RoundNumber, index: usize) -> Self {
        MessageId::Deterministic(DeterministicId::new(thread, round, Slot::Participant(index)))
    }

    pub fn pre_search(thread: ThreadId, round: RoundNumber) -> Self {
        MessageId::Deterministic(DeterministicId::new(thread, round, Slot::PreSearch))
    }

    pub fn moderator(thread: ThreadId, round: RoundNumber) -> Self {
        MessageId::Deterministic(DeterministicId::new(thread, round, Slot::Moderator))
    }

    /// Build a transient id from a client-chosen suffix.
    pub fn transient(suffix: impl Into<String>) -> Self {
        MessageId::Transient(format!("{}{}", TRANSIENT_PREFIX, suffix.into()))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, MessageId::Transient(_))
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self, MessageId::Deterministic(_))
    }

    pub fn deterministic(&self) -> Option<&DeterministicId> {
        match self {
            MessageId::Deterministic(id) => Some(id),
            MessageId::Transient(_) => None,
        }
    }

    /// Parse an id string, classifying by the transient prefix first.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.starts_with(TRANSIENT_PREFIX) {
            return Ok(MessageId::Transient(raw.to_string()));
        }
        parse_deterministic(raw).map(MessageId::Deterministic)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Deterministic(id) => write!(f, "{}", id),
            MessageId::Transient(raw) => write!(f, "{}", raw),
        }
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = DomainError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        MessageId::parse(&raw)
    }
}

/// Parse a base-10 non-negative index, rejecting leading zeros beyond `0`.
fn parse_index(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Split `{thread}_r{round}` right-anchored.
fn parse_round_prefix(raw: &str) -> Option<(ThreadId, RoundNumber)> {
    let at = raw.rfind("_r")?;
    let round = parse_index(&raw[at + 2..])?;
    let thread = ThreadId::try_new(&raw[..at]).ok()?;
    Some((thread, RoundNumber::new(round)))
}

fn parse_deterministic(raw: &str) -> Result<DeterministicId, DomainError> {
    let invalid = || DomainError::InvalidMessageId(raw.to_string());

    for (suffix, slot) in [
        ("_user", Slot::User),
        ("_presearch", Slot::PreSearch),
        ("_moderator", Slot::Moderator),
    ] {
        if let Some(rest) = raw.strip_suffix(suffix) {
            let (thread, round) = parse_round_prefix(rest).ok_or_else(invalid)?;
            return Ok(DeterministicId::new(thread, round, slot));
        }
    }

    let at = raw.rfind("_p").ok_or_else(invalid)?;
    let index = parse_index(&raw[at + 2..]).ok_or_else(invalid)?;
    let (thread, round) = parse_round_prefix(&raw[..at]).ok_or_else(invalid)?;
    Ok(DeterministicId::new(
        thread,
        round,
        Slot::Participant(index as usize),
    ))
}
