//! Configuration changelog
//!
//! When a round's frozen snapshot differs from the prior round's, the
//! difference is recorded as an ordered list of [`ChangeEntry`] values
//! visible to the transcript before streaming begins.

use crate::core::model::ModelRef;
use crate::round::entities::{ConfigSnapshot, ConversationMode};
use serde::{Deserialize, Serialize};

/// One entry in a round's configuration changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeEntry {
    ParticipantAdded { id: String, model: ModelRef },
    ParticipantRemoved { id: String },
    ModeChanged {
        from: ConversationMode,
        to: ConversationMode,
    },
    WebSearchToggled { enabled: bool },
}

impl ChangeEntry {
    /// Human-readable description used by transcript rendering.
    pub fn describe(&self) -> String {
        match self {
            ChangeEntry::ParticipantAdded { id, model } => {
                format!("participant '{}' joined ({})", id, model)
            }
            ChangeEntry::ParticipantRemoved { id } => {
                format!("participant '{}' left", id)
            }
            ChangeEntry::ModeChanged { from, to } => {
                format!("mode changed from {} to {}", from, to)
            }
            ChangeEntry::WebSearchToggled { enabled } => {
                if *enabled {
                    "web search enabled".to_string()
                } else {
                    "web search disabled".to_string()
                }
            }
        }
    }
}

/// Diff two configuration snapshots into an ordered changelog.
///
/// Pure comparison; it must never block streaming. The first round of a
/// thread has no prior snapshot and yields an empty changelog. A
/// participant whose model changed is reported as removed-then-added.
pub fn diff_snapshots(
    previous: Option<&ConfigSnapshot>,
    next: &ConfigSnapshot,
) -> Vec<ChangeEntry> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let mut entries = Vec::new();

    for removed in previous.participants.iter().filter(|prev| {
        !next
            .participants
            .iter()
            .any(|p| p.id == prev.id && p.model == prev.model)
    }) {
        entries.push(ChangeEntry::ParticipantRemoved {
            id: removed.id.clone(),
        });
    }

    for added in next.participants.iter().filter(|p| {
        !previous
            .participants
            .iter()
            .any(|prev| prev.id == p.id && prev.model == p.model)
    }) {
        entries.push(ChangeEntry::ParticipantAdded {
            id: added.id.clone(),
            model: added.model.clone(),
        });
    }

    if previous.mode != next.mode {
        entries.push(ChangeEntry::ModeChanged {
            from: previous.mode,
            to: next.mode,
        });
    }

    if previous.web_search_enabled != next.web_search_enabled {
        entries.push(ChangeEntry::WebSearchToggled {
            enabled: next.web_search_enabled,
        });
    }

    entries
}
