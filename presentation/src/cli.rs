//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the finished round
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full reconciled transcript
    Full,
    /// Moderator summary only
    Moderator,
    /// Machine-readable JSON
    Json,
}

/// Roundtable - multi-participant AI conversation with resumable rounds
#[derive(Debug, Parser)]
#[command(name = "roundtable", version, about)]
pub struct Cli {
    /// The user message opening this round
    pub input: Option<String>,

    /// Thread to append the round to
    #[arg(long, default_value = "default")]
    pub thread: String,

    /// Participant model, repeatable; order sets streaming priority
    #[arg(short = 'p', long = "participant")]
    pub participants: Vec<String>,

    /// Moderator model (defaults to the first participant)
    #[arg(long)]
    pub moderator: Option<String>,

    /// Run the web-search phase before participants stream
    #[arg(long)]
    pub web_search: bool,

    /// Resume the thread's interrupted round instead of submitting
    #[arg(long)]
    pub resume: bool,

    /// Explicit configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Full)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_participants_in_order() {
        let cli = Cli::parse_from([
            "roundtable",
            "question",
            "-p",
            "model-a",
            "-p",
            "model-b",
            "--web-search",
        ]);
        assert_eq!(cli.input.as_deref(), Some("question"));
        assert_eq!(cli.participants, vec!["model-a", "model-b"]);
        assert!(cli.web_search);
        assert_eq!(cli.output, OutputFormat::Full);
    }

    #[test]
    fn test_resume_flag() {
        let cli = Cli::parse_from(["roundtable", "--resume", "--thread", "t1"]);
        assert!(cli.resume);
        assert_eq!(cli.thread, "t1");
        assert!(cli.input.is_none());
    }
}
