//! Transcript formatting over the reconciled message view

use colored::Colorize;
use roundtable_domain::{ChangeEntry, Message, MessageBody, ReconcileOutcome};

/// Formats reconciled transcripts for the console
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Full transcript: changelog first, then every visible message.
    pub fn format(outcome: &ReconcileOutcome, changelog: &[ChangeEntry]) -> String {
        let mut sections = Vec::new();

        if !changelog.is_empty() {
            let entries: Vec<String> = changelog
                .iter()
                .map(|entry| format!("  * {}", entry.describe()))
                .collect();
            sections.push(format!(
                "{}\n{}",
                "Configuration changes".bold(),
                entries.join("\n")
            ));
        }

        for message in &outcome.messages {
            sections.push(Self::format_message(message));
        }

        sections.join("\n\n")
    }

    /// Only the moderator's summary, when present.
    pub fn format_moderator_only(outcome: &ReconcileOutcome) -> String {
        outcome
            .messages
            .iter()
            .rev()
            .find_map(|message| match &message.body {
                MessageBody::Moderator { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "(no moderator summary)".to_string())
    }

    /// Machine-readable transcript.
    pub fn format_json(outcome: &ReconcileOutcome) -> String {
        serde_json::to_string_pretty(&outcome.messages)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }

    fn format_message(message: &Message) -> String {
        let header = match &message.body {
            MessageBody::User { .. } => "You".bold().to_string(),
            MessageBody::Assistant {
                participant_index, ..
            } => format!("Participant {}", participant_index)
                .cyan()
                .bold()
                .to_string(),
            MessageBody::PreSearch { .. } => "Web search".yellow().bold().to_string(),
            MessageBody::Moderator { .. } => "Moderator".green().bold().to_string(),
        };
        format!("{}\n{}", header, message.content())
    }
}
