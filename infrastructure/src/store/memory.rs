//! In-memory persistence adapters
//!
//! Used by tests and ephemeral runs where transcripts need not outlive
//! the process.

use async_trait::async_trait;
use roundtable_application::ports::message_store::{MessageStore, StoreError};
use roundtable_application::ports::round_state::RoundStateStore;
use roundtable_domain::{
    ChangeEntry, ConfigSnapshot, Message, ModeratorAnalysis, PreSearchRecord, RoundNumber,
    ThreadId,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory append-only message log
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, thread: &ThreadId, message: Message) -> Result<(), StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?
            .entry(thread.as_str().to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn thread_messages(&self, thread: &ThreadId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?
            .get(thread.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct ThreadRoundState {
    active: Option<RoundNumber>,
    snapshots: HashMap<u64, ConfigSnapshot>,
    changelogs: HashMap<u64, Vec<ChangeEntry>>,
    pre_search: HashMap<u64, PreSearchRecord>,
    analyses: HashMap<u64, ModeratorAnalysis>,
}

/// In-memory round-scoped state
#[derive(Default)]
pub struct InMemoryRoundStateStore {
    inner: Mutex<HashMap<String, ThreadRoundState>>,
}

impl InMemoryRoundStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(
        &self,
        thread: &ThreadId,
        f: impl FnOnce(&mut ThreadRoundState) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(f(guard.entry(thread.as_str().to_string()).or_default()))
    }
}

#[async_trait]
impl RoundStateStore for InMemoryRoundStateStore {
    async fn active_round(&self, thread: &ThreadId) -> Result<Option<RoundNumber>, StoreError> {
        self.with(thread, |s| s.active)
    }

    async fn set_active_round(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.active = Some(round))
    }

    async fn clear_active_round(&self, thread: &ThreadId) -> Result<(), StoreError> {
        self.with(thread, |s| s.active = None)
    }

    async fn snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ConfigSnapshot>, StoreError> {
        self.with(thread, |s| s.snapshots.get(&round.value()).cloned())
    }

    async fn put_snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        snapshot: ConfigSnapshot,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| {
            s.snapshots.insert(round.value(), snapshot);
        })
    }

    async fn changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Vec<ChangeEntry>, StoreError> {
        self.with(thread, |s| {
            s.changelogs.get(&round.value()).cloned().unwrap_or_default()
        })
    }

    async fn put_changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        entries: Vec<ChangeEntry>,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| {
            s.changelogs.insert(round.value(), entries);
        })
    }

    async fn pre_search(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<PreSearchRecord>, StoreError> {
        self.with(thread, |s| s.pre_search.get(&round.value()).cloned())
    }

    async fn put_pre_search(
        &self,
        thread: &ThreadId,
        record: PreSearchRecord,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| {
            s.pre_search.insert(record.round.value(), record);
        })
    }

    async fn analysis(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ModeratorAnalysis>, StoreError> {
        self.with(thread, |s| s.analyses.get(&round.value()).cloned())
    }

    async fn put_analysis(
        &self,
        thread: &ThreadId,
        analysis: ModeratorAnalysis,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| {
            s.analyses.insert(analysis.round.value(), analysis);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = InMemoryMessageStore::new();
        let thread = ThreadId::new("t");
        store
            .append(&thread, Message::user(thread.clone(), RoundNumber::ZERO, "hi"))
            .await
            .unwrap();

        let messages = store.thread_messages(&thread).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(store.last_round_number(&thread).await.unwrap(), Some(RoundNumber::ZERO));
    }

    #[tokio::test]
    async fn test_round_state_round_trip() {
        let store = InMemoryRoundStateStore::new();
        let thread = ThreadId::new("t");

        assert!(store.active_round(&thread).await.unwrap().is_none());
        store
            .set_active_round(&thread, RoundNumber::ZERO)
            .await
            .unwrap();
        assert_eq!(
            store.active_round(&thread).await.unwrap(),
            Some(RoundNumber::ZERO)
        );
        store.clear_active_round(&thread).await.unwrap();
        assert!(store.active_round(&thread).await.unwrap().is_none());

        store
            .put_pre_search(&thread, PreSearchRecord::pending(RoundNumber::ZERO))
            .await
            .unwrap();
        let record = store
            .pre_search(&thread, RoundNumber::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.round, RoundNumber::ZERO);
    }
}
