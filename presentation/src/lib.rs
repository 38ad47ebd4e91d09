//! Presentation layer for roundtable
//!
//! CLI argument surface, progress reporting, and transcript formatting.

pub mod cli;
pub mod output;
pub mod progress;

pub use cli::{Cli, OutputFormat};
pub use output::ConsoleFormatter;
pub use progress::{RoundProgressReporter, SimpleProgress};
