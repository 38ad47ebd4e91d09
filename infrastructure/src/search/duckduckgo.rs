//! DuckDuckGo search gateway
//!
//! Implements the pre-search phase against the DuckDuckGo Instant Answer
//! API, which requires no API key. The API returns abstracts, instant
//! answers, definitions, and related topics rather than full result
//! listings, which is enough context for the participants' prompts.

use async_trait::async_trait;
use roundtable_application::ports::search::{SearchError, SearchGateway};
use std::time::Duration;
use tracing::debug;

/// DuckDuckGo Instant Answer API endpoint.
const DDG_API_URL: &str = "https://api.duckduckgo.com/";

/// Pre-search gateway backed by DuckDuckGo
pub struct DuckDuckGoSearchGateway {
    client: reqwest::Client,
}

impl DuckDuckGoSearchGateway {
    pub fn new() -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchGateway for DuckDuckGoSearchGateway {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        debug!(query, "running pre-search");

        let response = self
            .client
            .get(DDG_API_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .header("User-Agent", "Roundtable/0.6 (Pre-Search)")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(SearchError::Backend(format!(
                "search API returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(render_results(query, &body))
    }
}

/// Render the Instant Answer response as a markdown document.
fn render_results(query: &str, data: &serde_json::Value) -> String {
    let mut sections = vec![format!("## Search results: {}", query)];

    let field = |name: &str| data[name].as_str().filter(|s| !s.is_empty());

    if let Some(abstract_text) = field("AbstractText") {
        let source = field("AbstractSource").unwrap_or("unknown");
        let url = field("AbstractURL").unwrap_or("");
        sections.push(format!(
            "### Summary ({})\n{}\nSource: {}",
            source, abstract_text, url
        ));
    }

    if let Some(answer) = field("Answer") {
        sections.push(format!("### Instant answer\n{}", answer));
    }

    if let Some(definition) = field("Definition") {
        let source = field("DefinitionSource").unwrap_or("unknown");
        sections.push(format!("### Definition ({})\n{}", source, definition));
    }

    if let Some(topics) = data["RelatedTopics"].as_array() {
        let lines: Vec<String> = topics
            .iter()
            .filter_map(|topic| {
                let text = topic["Text"].as_str().filter(|s| !s.is_empty())?;
                let url = topic["FirstURL"].as_str().unwrap_or("");
                Some(format!("- {} ({})", text, url))
            })
            .take(10)
            .collect();
        if !lines.is_empty() {
            sections.push(format!("### Related topics\n{}", lines.join("\n")));
        }
    }

    if sections.len() == 1 {
        sections.push("No instant answer available for this query.".to_string());
    }

    sections.join("\n\n")
}
