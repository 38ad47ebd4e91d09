//! Progress reporting for round execution

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use roundtable_application::ports::progress::RoundProgressNotifier;
use roundtable_domain::{Participant, RoundState};
use std::sync::Mutex;

/// Reports round progress with a spinner per phase
pub struct RoundProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl RoundProgressReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap()
    }

    fn phase_label(phase: RoundState) -> Option<&'static str> {
        match phase {
            RoundState::ConfigCheck => Some("Configuration"),
            RoundState::PreSearch => Some("Web search"),
            RoundState::ParticipantStreaming => Some("Participants"),
            RoundState::AnalysisGate => Some("Waiting to summarize"),
            RoundState::ModeratorStreaming => Some("Moderator"),
            _ => None,
        }
    }
}

impl Default for RoundProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundProgressNotifier for RoundProgressReporter {
    fn on_phase_start(&self, phase: RoundState) {
        let Some(label) = Self::phase_label(phase) else {
            return;
        };
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::spinner_style());
        pb.set_prefix(label);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        *self.bar.lock().unwrap() = Some(pb);
    }

    fn on_participant_start(&self, participant: &Participant) {
        if let Some(pb) = self.bar.lock().unwrap().as_ref() {
            pb.set_message(format!("{} ({})", participant.id, participant.model));
        }
    }

    fn on_participant_complete(&self, participant: &Participant, success: bool) {
        if let Some(pb) = self.bar.lock().unwrap().as_ref() {
            let mark = if success {
                "v".green()
            } else {
                "x".red()
            };
            pb.println(format!("  {} {}", mark, participant.id));
        }
    }

    fn on_phase_complete(&self, phase: RoundState) {
        if let Some(pb) = self.bar.lock().unwrap().take() {
            if let Some(label) = Self::phase_label(phase) {
                pb.finish_with_message(format!("{} done", label.green()));
            } else {
                pb.finish_and_clear();
            }
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl RoundProgressNotifier for SimpleProgress {
    fn on_phase_start(&self, phase: RoundState) {
        if let Some(label) = RoundProgressReporter::phase_label(phase) {
            println!("{} {}", "->".cyan(), label.bold());
        }
    }

    fn on_participant_start(&self, participant: &Participant) {
        println!("  {} streaming...", participant.id);
    }

    fn on_participant_complete(&self, participant: &Participant, success: bool) {
        if success {
            println!("  {} {}", "v".green(), participant.id);
        } else {
            println!("  {} {} (failed)", "x".red(), participant.id);
        }
    }

    fn on_phase_complete(&self, _phase: RoundState) {}
}
