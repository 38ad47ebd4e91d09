//! Search gateway port
//!
//! Seam for the optional pre-search phase. The adapter formats results as
//! markdown; the coordinator stores them verbatim.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the search backend
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search backend returned an error: {0}")]
    Backend(String),

    #[error("Timeout")]
    Timeout,
}

/// Web search used by the pre-search phase
#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}
