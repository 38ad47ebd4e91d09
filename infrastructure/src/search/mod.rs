//! Web search adapters (behind the `web-search` feature)

mod duckduckgo;

pub use duckduckgo::DuckDuckGoSearchGateway;
