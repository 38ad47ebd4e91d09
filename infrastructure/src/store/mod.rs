//! Persistence adapters

mod jsonl;
mod memory;
mod state_file;

pub use jsonl::JsonlMessageStore;
pub use memory::{InMemoryMessageStore, InMemoryRoundStateStore};
pub use state_file::FileRoundStateStore;
