//! Message entities

use crate::core::thread::ThreadId;
use crate::message::id::MessageId;
use crate::round::entities::RoundNumber;
use serde::{Deserialize, Serialize};

/// Why a streamed message stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Aborted,
}

/// Role of a message in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    PreSearch,
    Moderator,
}

/// Message payload, a closed tagged variant
///
/// Consumers match exhaustively on the discriminant; there is no catch-all
/// message shape. Streamed roles carry `finish_reason: None` until their
/// stream completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageBody {
    User {
        content: String,
    },
    Assistant {
        participant_index: usize,
        content: String,
        finish_reason: Option<FinishReason>,
    },
    PreSearch {
        content: String,
        finish_reason: Option<FinishReason>,
    },
    Moderator {
        content: String,
        finish_reason: Option<FinishReason>,
    },
}

/// A message in a thread (Entity)
///
/// Every message carries the number of the round it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub round: RoundNumber,
    pub body: MessageBody,
}

impl Message {
    /// Server-persisted user message with its deterministic id.
    pub fn user(thread: ThreadId, round: RoundNumber, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::user(thread, round),
            round,
            body: MessageBody::User {
                content: content.into(),
            },
        }
    }

    /// Client-side optimistic user message shown before confirmation.
    pub fn optimistic_user(
        suffix: impl Into<String>,
        round: RoundNumber,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::transient(suffix),
            round,
            body: MessageBody::User {
                content: content.into(),
            },
        }
    }

    pub fn assistant(
        thread: ThreadId,
        round: RoundNumber,
        participant_index: usize,
        content: impl Into<String>,
        finish_reason: Option<FinishReason>,
    ) -> Self {
        Self {
            id: MessageId::participant(thread, round, participant_index),
            round,
            body: MessageBody::Assistant {
                participant_index,
                content: content.into(),
                finish_reason,
            },
        }
    }

    pub fn pre_search(
        thread: ThreadId,
        round: RoundNumber,
        content: impl Into<String>,
        finish_reason: Option<FinishReason>,
    ) -> Self {
        Self {
            id: MessageId::pre_search(thread, round),
            round,
            body: MessageBody::PreSearch {
                content: content.into(),
                finish_reason,
            },
        }
    }

    pub fn moderator(
        thread: ThreadId,
        round: RoundNumber,
        content: impl Into<String>,
        finish_reason: Option<FinishReason>,
    ) -> Self {
        Self {
            id: MessageId::moderator(thread, round),
            round,
            body: MessageBody::Moderator {
                content: content.into(),
                finish_reason,
            },
        }
    }

    pub fn role(&self) -> Role {
        match &self.body {
            MessageBody::User { .. } => Role::User,
            MessageBody::Assistant { .. } => Role::Assistant,
            MessageBody::PreSearch { .. } => Role::PreSearch,
            MessageBody::Moderator { .. } => Role::Moderator,
        }
    }

    pub fn content(&self) -> &str {
        match &self.body {
            MessageBody::User { content }
            | MessageBody::Assistant { content, .. }
            | MessageBody::PreSearch { content, .. }
            | MessageBody::Moderator { content, .. } => content,
        }
    }

    /// Completion marker for streamed roles; `None` for user messages.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        match &self.body {
            MessageBody::User { .. } => None,
            MessageBody::Assistant { finish_reason, .. }
            | MessageBody::PreSearch { finish_reason, .. }
            | MessageBody::Moderator { finish_reason, .. } => *finish_reason,
        }
    }

    /// A streamed message without a finish reason is still in flight.
    pub fn is_streaming(&self) -> bool {
        !matches!(self.body, MessageBody::User { .. }) && self.finish_reason().is_none()
    }

    pub fn participant_index(&self) -> Option<usize> {
        match &self.body {
            MessageBody::Assistant {
                participant_index, ..
            } => Some(*participant_index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_metadata_matches_id() {
        let msg = Message::assistant(
            ThreadId::new("t"),
            RoundNumber::new(2),
            1,
            "hello",
            Some(FinishReason::Stop),
        );
        assert_eq!(msg.id.to_string(), "t_r2_p1");
        assert_eq!(msg.participant_index(), Some(1));
        assert_eq!(msg.role(), Role::Assistant);
    }

    #[test]
    fn test_streaming_detection() {
        let streaming = Message::assistant(ThreadId::new("t"), RoundNumber::ZERO, 0, "...", None);
        assert!(streaming.is_streaming());

        let done = Message::assistant(
            ThreadId::new("t"),
            RoundNumber::ZERO,
            0,
            "done",
            Some(FinishReason::Stop),
        );
        assert!(!done.is_streaming());

        // User messages never stream
        let user = Message::user(ThreadId::new("t"), RoundNumber::ZERO, "hi");
        assert!(!user.is_streaming());
    }

    #[test]
    fn test_serde_carries_role_tag() {
        let msg = Message::moderator(
            ThreadId::new("t"),
            RoundNumber::ZERO,
            "summary",
            Some(FinishReason::Stop),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["body"]["role"], "moderator");
        assert_eq!(json["round"], 0);

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_optimistic_user_is_transient() {
        let msg = Message::optimistic_user("42", RoundNumber::new(1), "question");
        assert!(msg.id.is_transient());
        assert_eq!(msg.content(), "question");
    }
}
