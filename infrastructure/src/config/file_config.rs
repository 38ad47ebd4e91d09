//! File-backed configuration model

use roundtable_domain::{
    ConfigSnapshot, ConversationMode, DomainError, ModelRef, Participant,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One configured participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Display id; defaults to the model reference when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub model: String,
}

/// The `[conversation]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub participants: Vec<ParticipantConfig>,
    /// Moderator model; defaults to the first participant's model.
    pub moderator: Option<String>,
    pub web_search: bool,
    pub mode: ConversationMode,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            moderator: None,
            web_search: false,
            mode: ConversationMode::Standard,
        }
    }
}

/// The `[gateway]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Environment variable holding the API key, if any.
    pub api_key_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            api_key_env: "ROUNDTABLE_API_KEY".to_string(),
        }
    }
}

/// The `[transcript]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Directory for JSONL transcripts; in-memory storage when unset.
    pub dir: Option<PathBuf>,
}

/// Root configuration file model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub conversation: ConversationConfig,
    pub gateway: GatewayConfig,
    pub transcript: TranscriptConfig,
}

impl FileConfig {
    /// Build the frozen snapshot a new round will carry.
    pub fn snapshot(&self) -> Result<ConfigSnapshot, DomainError> {
        let participants: Vec<Participant> = self
            .conversation
            .participants
            .iter()
            .enumerate()
            .map(|(index, p)| {
                let model = ModelRef::try_new(p.model.clone())?;
                let id = p.id.clone().unwrap_or_else(|| p.model.clone());
                Ok(Participant::new(id, index, model))
            })
            .collect::<Result<_, DomainError>>()?;

        let moderator = match &self.conversation.moderator {
            Some(model) => ModelRef::try_new(model.clone())?,
            None => participants
                .first()
                .map(|p| p.model.clone())
                .ok_or_else(|| {
                    DomainError::InvalidSnapshot(
                        "no participants configured and no moderator set".to_string(),
                    )
                })?,
        };

        let snapshot = ConfigSnapshot::new(participants, moderator)
            .with_mode(self.conversation.mode)
            .with_web_search(self.conversation.web_search);
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Resolve the gateway API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.gateway.api_key_env).ok()
    }
}
