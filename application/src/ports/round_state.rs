//! Round state store port
//!
//! Persists everything a round needs beyond the message log: the frozen
//! configuration snapshot, the per-round changelog, pre-search records,
//! moderator analyses, and the per-thread active-round marker. Together
//! with the message store this is sufficient to reconstruct a round after
//! a disconnect.

use crate::ports::message_store::StoreError;
use async_trait::async_trait;
use roundtable_domain::{
    ChangeEntry, ConfigSnapshot, ModeratorAnalysis, PreSearchRecord, RoundNumber, ThreadId,
};

/// Persistent round-scoped state
#[async_trait]
pub trait RoundStateStore: Send + Sync {
    /// The round currently active for a thread, if any.
    async fn active_round(&self, thread: &ThreadId) -> Result<Option<RoundNumber>, StoreError>;

    async fn set_active_round(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<(), StoreError>;

    async fn clear_active_round(&self, thread: &ThreadId) -> Result<(), StoreError>;

    async fn snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ConfigSnapshot>, StoreError>;

    async fn put_snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        snapshot: ConfigSnapshot,
    ) -> Result<(), StoreError>;

    async fn changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Vec<ChangeEntry>, StoreError>;

    async fn put_changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        entries: Vec<ChangeEntry>,
    ) -> Result<(), StoreError>;

    async fn pre_search(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<PreSearchRecord>, StoreError>;

    async fn put_pre_search(
        &self,
        thread: &ThreadId,
        record: PreSearchRecord,
    ) -> Result<(), StoreError>;

    async fn analysis(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ModeratorAnalysis>, StoreError>;

    async fn put_analysis(
        &self,
        thread: &ThreadId,
        analysis: ModeratorAnalysis,
    ) -> Result<(), StoreError>;
}
