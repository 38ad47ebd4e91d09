//! In-memory test doubles for the application ports.

use crate::ports::generation::{
    GatewayError, GenerationGateway, PromptMessage, StreamHandle,
};
use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::round_state::RoundStateStore;
use crate::ports::search::{SearchError, SearchGateway};
use crate::ports::stream_buffer::{ResumeOutcome, StartOutcome, StreamBuffer};
use async_trait::async_trait;
use chrono::Utc;
use roundtable_domain::{
    ChangeEntry, ConfigSnapshot, Message, ModelRef, ModeratorAnalysis, Participant,
    PreSearchRecord, RoundNumber, StreamBufferEntry, StreamEvent, StreamKey, ThreadId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub fn snapshot(n: usize) -> ConfigSnapshot {
    let participants = (0..n)
        .map(|i| Participant::new(format!("participant-{}", i), i, ModelRef::new("test-model")))
        .collect();
    ConfigSnapshot::new(participants, ModelRef::new("moderator-model"))
}

#[derive(Default)]
pub struct MemMessageStore {
    inner: Mutex<HashMap<String, Vec<Message>>>,
}

#[async_trait]
impl MessageStore for MemMessageStore {
    async fn append(&self, thread: &ThreadId, message: Message) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .entry(thread.as_str().to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn thread_messages(&self, thread: &ThreadId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(thread.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct ThreadState {
    active: Option<RoundNumber>,
    snapshots: HashMap<u64, ConfigSnapshot>,
    changelogs: HashMap<u64, Vec<ChangeEntry>>,
    pre_search: HashMap<u64, PreSearchRecord>,
    analyses: HashMap<u64, ModeratorAnalysis>,
}

#[derive(Default)]
pub struct MemRoundStateStore {
    inner: Mutex<HashMap<String, ThreadState>>,
}

impl MemRoundStateStore {
    fn with<T>(&self, thread: &ThreadId, f: impl FnOnce(&mut ThreadState) -> T) -> T {
        let mut guard = self.inner.lock().unwrap();
        f(guard.entry(thread.as_str().to_string()).or_default())
    }
}

#[async_trait]
impl RoundStateStore for MemRoundStateStore {
    async fn active_round(&self, thread: &ThreadId) -> Result<Option<RoundNumber>, StoreError> {
        Ok(self.with(thread, |s| s.active))
    }

    async fn set_active_round(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.active = Some(round));
        Ok(())
    }

    async fn clear_active_round(&self, thread: &ThreadId) -> Result<(), StoreError> {
        self.with(thread, |s| s.active = None);
        Ok(())
    }

    async fn snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ConfigSnapshot>, StoreError> {
        Ok(self.with(thread, |s| s.snapshots.get(&round.value()).cloned()))
    }

    async fn put_snapshot(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        snapshot: ConfigSnapshot,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.snapshots.insert(round.value(), snapshot));
        Ok(())
    }

    async fn changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Vec<ChangeEntry>, StoreError> {
        Ok(self.with(thread, |s| {
            s.changelogs.get(&round.value()).cloned().unwrap_or_default()
        }))
    }

    async fn put_changelog(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
        entries: Vec<ChangeEntry>,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.changelogs.insert(round.value(), entries));
        Ok(())
    }

    async fn pre_search(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<PreSearchRecord>, StoreError> {
        Ok(self.with(thread, |s| s.pre_search.get(&round.value()).cloned()))
    }

    async fn put_pre_search(
        &self,
        thread: &ThreadId,
        record: PreSearchRecord,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.pre_search.insert(record.round.value(), record));
        Ok(())
    }

    async fn analysis(
        &self,
        thread: &ThreadId,
        round: RoundNumber,
    ) -> Result<Option<ModeratorAnalysis>, StoreError> {
        Ok(self.with(thread, |s| s.analyses.get(&round.value()).cloned()))
    }

    async fn put_analysis(
        &self,
        thread: &ThreadId,
        analysis: ModeratorAnalysis,
    ) -> Result<(), StoreError> {
        self.with(thread, |s| s.analyses.insert(analysis.round.value(), analysis));
        Ok(())
    }
}

/// In-memory stream buffer mirroring the production adapter's semantics.
#[derive(Default)]
pub struct MemBuffer {
    entries: Mutex<HashMap<String, StreamBufferEntry>>,
}

impl MemBuffer {
    pub fn entry(&self, key: &StreamKey) -> Option<StreamBufferEntry> {
        self.entries.lock().unwrap().get(&key.to_string()).cloned()
    }
}

#[async_trait]
impl StreamBuffer for MemBuffer {
    async fn start(&self, key: &StreamKey) -> StartOutcome {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&key.to_string()) {
            None => {
                entries.insert(
                    key.to_string(),
                    StreamBufferEntry::streaming(key.clone(), Utc::now()),
                );
                StartOutcome::Started
            }
            Some(entry) if entry.is_streaming() => StartOutcome::Conflict,
            Some(entry) => StartOutcome::Buffered {
                payload: entry.payload.clone(),
                freshly_completed: !entry.observed_streaming,
            },
        }
    }

    async fn append_chunk(&self, key: &StreamKey, chunk: &str) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&key.to_string()) {
            entry.append(chunk);
        }
    }

    async fn complete(&self, key: &StreamKey, payload: &str) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&key.to_string()) {
            entry.complete(payload, Utc::now());
        }
    }

    async fn fail(&self, key: &StreamKey) {
        self.entries.lock().unwrap().remove(&key.to_string());
    }

    async fn resume(&self, key: &StreamKey) -> ResumeOutcome {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&key.to_string()) {
            None => ResumeOutcome::NoBuffer,
            Some(entry) if entry.is_streaming() => {
                entry.observed_streaming = true;
                ResumeOutcome::Active { retry_after_ms: 10 }
            }
            Some(entry) => ResumeOutcome::Completed {
                payload: entry.payload.clone(),
                resumed_from_buffer: !entry.observed_streaming,
            },
        }
    }
}

/// Gateway returning scripted responses in order.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub calls: Mutex<Vec<(ModelRef, Vec<PromptMessage>)>>,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(
        &self,
        model: &ModelRef,
        context: &[PromptMessage],
    ) -> Result<StreamHandle, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.clone(), context.to_vec()));
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("scripted default".to_string()));

        let (tx, rx) = mpsc::channel(4);
        match next {
            Ok(text) => {
                let _ = tx.send(StreamEvent::Delta(text.clone())).await;
                let _ = tx.send(StreamEvent::Completed(text)).await;
            }
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e)).await;
            }
        }
        Ok(StreamHandle::new(rx))
    }
}

/// Search gateway returning one scripted result.
pub struct ScriptedSearch {
    result: Mutex<Option<Result<String, String>>>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            result: Mutex::new(Some(Ok(result.into()))),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            result: Mutex::new(Some(Err(error.into()))),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SearchGateway for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        match self.result.lock().unwrap().take() {
            Some(Ok(result)) => Ok(result),
            Some(Err(e)) => Err(SearchError::Backend(e)),
            None => Ok("repeat search".to_string()),
        }
    }
}
