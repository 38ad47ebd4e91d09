//! HTTP generation gateway
//!
//! Posts the accumulated context to an OpenAI-compatible chat-completions
//! endpoint and bridges the response into the streaming event channel the
//! application layer consumes.

use async_trait::async_trait;
use roundtable_application::ports::generation::{
    GatewayError, GenerationGateway, PromptMessage, PromptRole, StreamHandle,
};
use roundtable_domain::{ModelRef, StreamEvent};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Request timeout for one generation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Gateway speaking the OpenAI-compatible chat-completions protocol
pub struct HttpGenerationGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGenerationGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn role_name(role: PromptRole) -> &'static str {
    match role {
        PromptRole::System => "system",
        PromptRole::User => "user",
        PromptRole::Assistant => "assistant",
    }
}

#[async_trait]
impl GenerationGateway for HttpGenerationGateway {
    async fn generate(
        &self,
        model: &ModelRef,
        context: &[PromptMessage],
    ) -> Result<StreamHandle, GatewayError> {
        let messages: Vec<serde_json::Value> = context
            .iter()
            .map(|m| json!({"role": role_name(m.role), "content": m.content}))
            .collect();
        let body = json!({
            "model": model.as_str(),
            "messages": messages,
            "stream": false,
        });

        debug!(model = %model, messages = context.len(), "dispatching generation");

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::ConnectionError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::ModelNotAvailable(model.to_string()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed(format!(
                "{}: {}",
                status, detail
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GatewayError::RequestFailed("response carried no message content".to_string())
            })?
            .to_string();

        let (tx, rx) = mpsc::channel(1);
        // Receiver may already be gone when the caller aborts
        let _ = tx.send(StreamEvent::Completed(text)).await;
        Ok(StreamHandle::new(rx))
    }
}
