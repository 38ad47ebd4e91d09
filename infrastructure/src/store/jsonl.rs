//! JSONL message store
//!
//! One file per thread, one JSON object per line, appended with a flush
//! per write. The append-only shape makes crash recovery trivial: a
//! truncated trailing line is skipped on reload rather than failing the
//! whole transcript.

use async_trait::async_trait;
use roundtable_application::ports::message_store::{MessageStore, StoreError};
use roundtable_domain::{Message, ThreadId};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// JSONL-backed append-only message log
pub struct JsonlMessageStore {
    dir: PathBuf,
    // Serializes appends so interleaved writers cannot shear lines
    write_lock: Mutex<()>,
}

impl JsonlMessageStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path_for(&self, thread: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", thread))
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn append(&self, thread: &ThreadId, message: Message) -> Result<(), StoreError> {
        let line = serde_json::to_string(&message)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(thread))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| StoreError::Io(e.to_string()))?;
        file.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    async fn thread_messages(&self, thread: &ThreadId) -> Result<Vec<Message>, StoreError> {
        let path = self.path_for(thread);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let mut messages = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    // Most likely a write cut short by a crash
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "skipping undecodable transcript line"
                    );
                }
            }
        }
        Ok(messages)
    }
}
