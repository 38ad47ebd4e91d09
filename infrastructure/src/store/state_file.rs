//! File-backed round state store
//!
//! One JSON document per thread holding the active-round marker, frozen
//! snapshots, changelogs, pre-search records, and moderator analyses. The
//! document is small (a handful of rounds of metadata), so each put is a
//! read-modify-rewrite under a lock.

use async_trait::async_trait;
use roundtable_application::ports::message_store::StoreError;
use roundtable_application::ports::round_state::RoundStateStore;
use roundtable_domain::{
    ChangeEntry, ConfigSnapshot, ModeratorAnalysis, PreSearchRecord, RoundNumber, ThreadId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThreadStateDoc {
    active: Option<RoundNumber>,
    #[serde(default)]
    snapshots: HashMap<u64, ConfigSnapshot>,
    #[serde(default)]
    changelogs: HashMap<u64, Vec<ChangeEntry>>,
    #[serde(default)]
    pre_search: HashMap<u64, PreSearchRecord>,
    #[serde(default)]
    analyses: HashMap<u64, ModeratorAnalysis>,
}

/// Round state persisted as one JSON file per thread
pub struct FileRoundStateStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileRoundStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, thread: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.state.json", thread))
    }

    fn read_doc(&self, thread: &ThreadId) -> Result<ThreadStateDoc, StoreError> {
        let path = self.path_for(thread);
        if !path.exists() {
            return Ok(ThreadStateDoc::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn write_doc(&self, thread: &ThreadId, doc: &ThreadStateDoc) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string_pretty(doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        std::fs::write(self.path_for(thread), raw).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn update<T>(
        &self,
        thread: &ThreadId,
        f: impl FnOnce(&mut ThreadStateDoc) -> T,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|e| StoreError::Io(e.to_string()))?;
        let mut doc = self.read_doc(thread)?;
        let out = f(&mut doc);
        self.write_doc(thread, &doc)?;
        Ok(out)
    }

    fn read<T>(
        &self,
        thread: &ThreadId,
        f: impl FnOnce(&ThreadStateDoc) -> T,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(f(&self.read_doc(thread)?))
    }
}

#[async_trait]
impl RoundStateStore for FileRoundStateStore {
    async fn active_round(&self, thread: &ThreadId) -> Result<Option<RoundNumber>, StoreError> {
        self.read(thread, |doc| doc.active)
    }

    async fn set_active_round(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<(), StoreError> {
        self.update(thread, |doc| doc.active = Some(round))
    }

    async fn clear_active_round(&self, thread: &ThreadId) -> Result<(), StoreError> {
        self.update(thread, |doc| doc.active = None)
    }

    async fn snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ConfigSnapshot>, StoreError> {
        self.read(thread, |doc| doc.snapshots.get(&round.value()).cloned())
    }

    async fn put_snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        snapshot: ConfigSnapshot,
    ) -> Result<(), StoreError> {
        self.update(thread, |doc| {
            doc.snapshots.insert(round.value(), snapshot);
        })
    }

    async fn changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Vec<ChangeEntry>, StoreError> {
        self.read(thread, |doc| {
            doc.changelogs.get(&round.value()).cloned().unwrap_or_default()
        })
    }

    async fn put_changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        entries: Vec<ChangeEntry>,
    ) -> Result<(), StoreError> {
        self.update(thread, |doc| {
            doc.changelogs.insert(round.value(), entries);
        })
    }

    async fn pre_search(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<PreSearchRecord>, StoreError> {
        self.read(thread, |doc| doc.pre_search.get(&round.value()).cloned())
    }

    async fn put_pre_search(
        &self,
        thread: &ThreadId,
        record: PreSearchRecord,
    ) -> Result<(), StoreError> {
        self.update(thread, |doc| {
            doc.pre_search.insert(record.round.value(), record);
        })
    }

    async fn analysis(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ModeratorAnalysis>, StoreError> {
        self.read(thread, |doc| doc.analyses.get(&round.value()).cloned())
    }

    async fn put_analysis(
        &self,
        thread: &ThreadId,
        analysis: ModeratorAnalysis,
    ) -> Result<(), StoreError> {
        self.update(thread, |doc| {
            doc.analyses.insert(analysis.round.value(), analysis);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundtable_domain::{ModelRef, Participant};

    fn thread() -> ThreadId {
        ThreadId::new("t")
    }

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::new(
            vec![Participant::new("a", 0, ModelRef::new("m"))],
            ModelRef::new("m"),
        )
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileRoundStateStore::new(dir.path()).unwrap();
            store
                .put_snapshot(&thread(), RoundNumber::ZERO, snapshot())
                .await
                .unwrap();
            store
                .set_active_round(&thread(), RoundNumber::ZERO)
                .await
                .unwrap();
            store
                .put_pre_search(&thread(), PreSearchRecord::complete(RoundNumber::ZERO, "r"))
                .await
                .unwrap();
        }

        let reopened = FileRoundStateStore::new(dir.path()).unwrap();
        assert_eq!(
            reopened.active_round(&thread()).await.unwrap(),
            Some(RoundNumber::ZERO)
        );
        assert_eq!(
            reopened.snapshot(&thread(), RoundNumber::ZERO).await.unwrap(),
            Some(snapshot())
        );
        let record = reopened
            .pre_search(&thread(), RoundNumber::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.result.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_missing_file_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRoundStateStore::new(dir.path()).unwrap();
        assert!(store.active_round(&thread()).await.unwrap().is_none());
        assert!(store
            .changelog(&thread(), RoundNumber::ZERO)
            .await
            .unwrap()
            .is_empty());
    }
}
