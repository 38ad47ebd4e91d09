//! Infrastructure layer for roundtable
//!
//! Adapters implementing the application ports: persistence (in-memory and
//! JSONL), the stream resumption buffer, the HTTP generation gateway, the
//! web search gateway, and configuration loading.

pub mod buffer;
pub mod config;
pub mod gateway;
#[cfg(feature = "web-search")]
pub mod search;
pub mod store;

// Re-export commonly used types
pub use buffer::InMemoryStreamBuffer;
pub use config::{ConfigLoader, FileConfig};
pub use gateway::HttpGenerationGateway;
#[cfg(feature = "web-search")]
pub use search::DuckDuckGoSearchGateway;
pub use store::{
    FileRoundStateStore, InMemoryMessageStore, InMemoryRoundStateStore, JsonlMessageStore,
};
