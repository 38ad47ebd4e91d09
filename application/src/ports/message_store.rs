//! Message store port
//!
//! The message store is an append-only log of transcript entries keyed by
//! thread. Round numbers are derived from what has been durably recorded,
//! so round assignment always reflects persisted state.

use async_trait::async_trait;
use roundtable_domain::{Message, RoundNumber, ThreadId};
use thiserror::Error;

/// Errors from persistence adapters
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Stored record could not be decoded: {0}")]
    Corrupt(String),
}

/// Append-only message log
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to a thread's log.
    async fn append(&self, thread: &ThreadId, message: Message) -> Result<(), StoreError>;

    /// All messages of a thread in append order.
    async fn thread_messages(&self, thread: &ThreadId) -> Result<Vec<Message>, StoreError>;

    /// Messages belonging to one round, in append order.
    async fn round_messages(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.thread_messages(thread).await?;
        Ok(messages.into_iter().filter(|m| m.round == round).collect())
    }

    /// Highest round number recorded for the thread, if any.
    async fn last_round_number(&self, thread: &ThreadId) -> Result<Option<RoundNumber>, StoreError> {
        let messages = self.thread_messages(thread).await?;
        Ok(messages.iter().map(|m| m.round).max())
    }
}
