//! In-memory stream resumption buffer
//!
//! Keyed cache of in-flight and recently-completed stream payloads.
//! Entries expire passively: every access sweeps entries past their TTL
//! and completed entries past the final-read grace window, so no
//! background task is needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roundtable_domain::{StreamBufferEntry, StreamKey};
use roundtable_application::ports::stream_buffer::{ResumeOutcome, StartOutcome, StreamBuffer};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Suggested client poll delay while a stream is live.
const RETRY_AFTER_MS: u64 = 500;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-memory implementation of the stream resumption buffer
pub struct InMemoryStreamBuffer {
    entries: Mutex<HashMap<String, StreamBufferEntry>>,
    clock: Clock,
}

impl Default for InMemoryStreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamBuffer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Box::new(Utc::now),
        }
    }

    /// Inject a clock, used by expiry tests.
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Box::new(clock),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(entries: &mut HashMap<String, StreamBufferEntry>, now: DateTime<Utc>) {
        entries.retain(|key, entry| {
            let keep = !entry.is_expired(now) && !entry.past_grace(now);
            if !keep {
                debug!(key = %key, "buffer entry swept");
            }
            keep
        });
    }
}

#[async_trait]
impl StreamBuffer for InMemoryStreamBuffer {
    async fn start(&self, key: &StreamKey) -> StartOutcome {
        let now = (self.clock)();
        let mut entries = self.entries.lock().unwrap();
        Self::sweep(&mut entries, now);

        match entries.get(&key.to_string()) {
            None => {
                entries.insert(
                    key.to_string(),
                    StreamBufferEntry::streaming(key.clone(), now),
                );
                StartOutcome::Started
            }
            Some(entry) if entry.is_streaming() => StartOutcome::Conflict,
            // Buffer-first precedence: an existing terminal payload is
            // returned instead of a conflict, so rapid re-submission never
            // duplicates generation.
            Some(entry) => StartOutcome::Buffered {
                payload: entry.payload.clone(),
                freshly_completed: !entry.observed_streaming,
            },
        }
    }

    async fn append_chunk(&self, key: &StreamKey, chunk: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&key.to_string()) {
            if entry.is_streaming() {
                entry.append(chunk);
            }
        }
    }

    async fn complete(&self, key: &StreamKey, payload: &str) {
        let now = (self.clock)();
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&key.to_string()) {
            entry.complete(payload, now);
        }
    }

    async fn fail(&self, key: &StreamKey) {
        self.entries.lock().unwrap().remove(&key.to_string());
    }

    async fn resume(&self, key: &StreamKey) -> ResumeOutcome {
        let now = (self.clock)();
        let mut entries = self.entries.lock().unwrap();
        Self::sweep(&mut entries, now);

        match entries.get_mut(&key.to_string()) {
            None => ResumeOutcome::NoBuffer,
            Some(entry) if entry.is_streaming() => {
                entry.observed_streaming = true;
                ResumeOutcome::Active {
                    retry_after_ms: RETRY_AFTER_MS,
                }
            }
            Some(entry) => ResumeOutcome::Completed {
                payload: entry.payload.clone(),
                resumed_from_buffer: !entry.observed_streaming,
            },
        }
    }
}
