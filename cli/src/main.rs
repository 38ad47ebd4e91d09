//! CLI entrypoint for roundtable
//!
//! Wires the layers together with dependency injection: JSONL persistence,
//! the in-memory stream buffer, the HTTP generation gateway, and the
//! DuckDuckGo pre-search gateway.

use anyhow::{bail, Context, Result};
use clap::Parser;
use roundtable_application::ports::progress::{NoProgress, RoundProgressNotifier};
use roundtable_application::{
    MessageStore, RoundStateStore, RunRoundUseCase, SubmitRoundInput, SubmitRoundUseCase,
};
use roundtable_domain::{reconcile, SessionFlags, ThreadId};
use roundtable_infrastructure::{
    ConfigLoader, DuckDuckGoSearchGateway, FileRoundStateStore, HttpGenerationGateway,
    InMemoryStreamBuffer, JsonlMessageStore,
};
use roundtable_presentation::{Cli, ConsoleFormatter, OutputFormat, RoundProgressReporter};
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level; a file log keeps the
    // full trace for long-running rounds.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let log_dir = data_dir().join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "roundtable.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    // Merge file configuration with command-line overrides
    let mut config = ConfigLoader::load(cli.config.as_ref())
        .map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;
    if !cli.participants.is_empty() {
        config.conversation.participants = cli
            .participants
            .iter()
            .map(|model| roundtable_infrastructure::config::ParticipantConfig {
                id: None,
                model: model.clone(),
            })
            .collect();
    }
    if let Some(moderator) = &cli.moderator {
        config.conversation.moderator = Some(moderator.clone());
    }
    if cli.web_search {
        config.conversation.web_search = true;
    }

    let snapshot = config
        .snapshot()
        .context("invalid conversation configuration")?;

    // === Dependency injection ===
    let transcript_dir = config
        .transcript
        .dir
        .clone()
        .unwrap_or_else(|| data_dir().join("threads"));
    let messages = Arc::new(JsonlMessageStore::new(&transcript_dir)?);
    let state = Arc::new(FileRoundStateStore::new(&transcript_dir)?);
    let buffer = Arc::new(InMemoryStreamBuffer::new());
    let gateway = Arc::new(HttpGenerationGateway::new(
        config.gateway.base_url.clone(),
        config.api_key(),
    )?);
    let search = Arc::new(DuckDuckGoSearchGateway::new()?);

    let run = RunRoundUseCase::new(
        messages.clone(),
        state.clone(),
        buffer,
        gateway,
        search,
    );

    let thread = ThreadId::try_new(cli.thread.clone())
        .map_err(|e| anyhow::anyhow!("invalid thread id: {}", e))?;

    // The session record keeps identifier-update strictly ahead of any
    // navigation-like side effect.
    let mut session = SessionFlags::mounted();
    session.set_thread(thread.clone());

    let mut round = if cli.resume {
        run.resume(&thread, &snapshot)
            .await
            .context("cannot resume this thread")?
    } else {
        let input = match &cli.input {
            Some(input) => input.clone(),
            None => bail!("an input message is required unless --resume is given"),
        };
        let submit = SubmitRoundUseCase::new(messages.clone(), state.clone());
        let output = submit
            .execute(SubmitRoundInput::new(thread.clone(), input, snapshot))
            .await?;

        if !cli.quiet && !output.changelog.is_empty() {
            println!("Configuration changes this round:");
            for entry in &output.changelog {
                println!("  * {}", entry.describe());
            }
            println!();
        }
        output.round
    };

    if let Some(navigate_to) = session.claim_navigation() {
        info!(thread = %navigate_to, round = %round.number(), "round attached");
    }

    let progress: Box<dyn RoundProgressNotifier> = if cli.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(RoundProgressReporter::new())
    };
    let cancel = CancellationToken::new();
    let animations = AtomicUsize::new(0);

    run.execute(&mut round, &animations, progress.as_ref(), &cancel)
        .await?;

    // Render the reconciled transcript of the finished round
    let transcript = messages.round_messages(&thread, round.number()).await?;
    let reconciled = reconcile(&transcript);
    for duplicate in &reconciled.duplicate_deterministic {
        warn!(id = %duplicate, "duplicate deterministic id dropped during reconciliation");
    }
    let changelog = state.changelog(&thread, round.number()).await?;

    let rendered = match cli.output {
        OutputFormat::Full => ConsoleFormatter::format(&reconciled, &changelog),
        OutputFormat::Moderator => ConsoleFormatter::format_moderator_only(&reconciled),
        OutputFormat::Json => ConsoleFormatter::format_json(&reconciled),
    };
    println!("{}", rendered);

    Ok(())
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("roundtable"))
        .unwrap_or_else(|| PathBuf::from(".roundtable"))
}
