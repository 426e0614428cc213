//! Polyglot CLI - ask questions about a text or transcript.
//!
//! # Usage
//!
//! ```bash
//! # Show how a file is split for indexing
//! polyglot chunk lesson.txt
//!
//! # Find the excerpts closest to a query
//! polyglot search lesson.txt "capital of France" -k 3
//!
//! # Answer a question (OPENAI_API_KEY required)
//! polyglot ask dialog.json "Where does Anna come from?"
//! polyglot ask dialog.json "Where does Anna come from?" --local --dry-run
//! ```
//!
//! Configuration is read from the environment (and a `.env` file), then
//! overridden by flags.

mod cli;
mod output;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use polyglot_retrieval::qa::build_messages;
use polyglot_retrieval::{
    ChatProvider, LocalProvider, OpenAIChatProvider, PolyglotConfig, QaSession, TextChunker,
    Transcript,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    match dotenvy::dotenv() {
        Err(err) if !err.not_found() => return Err(err).context("failed to load .env"),
        _ => {}
    }

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = PolyglotConfig::from_env().context("invalid configuration in environment")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;
    debug!("Resolved configuration: {config:?}");

    dispatch_command(&cli, &config).await
}

async fn dispatch_command(cli: &Cli, config: &PolyglotConfig) -> Result<()> {
    match &cli.command {
        Commands::Chunk { file } => handle_chunk(file, config, cli.json).await,
        Commands::Search { file, query, .. } => {
            handle_search(file, query, cli.local, config, cli.json).await
        }
        Commands::Ask {
            file,
            question,
            dry_run,
            ..
        } => handle_ask(file, question, *dry_run, cli.local, config, cli.json).await,
    }
}

async fn handle_chunk(file: &Path, config: &PolyglotConfig, json: bool) -> Result<()> {
    let transcript = read_transcript(file).await?;
    let chunker = TextChunker::new(config.chunker)?;
    let segments = transcript.to_segments(&chunker)?;

    if json {
        println!("{}", output::format_json(&segments)?);
    } else {
        println!("{}", output::format_segments(&segments));
    }
    Ok(())
}

async fn handle_search(
    file: &Path,
    query: &str,
    local: bool,
    config: &PolyglotConfig,
    json: bool,
) -> Result<()> {
    let session = load_session(file, local, config).await?;
    let hits = session.search(query, config.qa.top_k).await?;

    if json {
        println!("{}", output::format_json(&hits)?);
    } else {
        println!("{}", output::format_hits(query, &hits));
    }
    Ok(())
}

async fn handle_ask(
    file: &Path,
    question: &str,
    dry_run: bool,
    local: bool,
    config: &PolyglotConfig,
    json: bool,
) -> Result<()> {
    let session = load_session(file, local, config).await?;

    if dry_run {
        let sources = session.search(question, config.qa.top_k).await?;
        if sources.is_empty() {
            bail!("{} contains no text to search", file.display());
        }
        let messages = build_messages(question, &sources);
        if json {
            println!("{}", output::format_json(&messages)?);
        } else {
            for message in &messages {
                println!("--- {:?} ---\n{}\n", message.role, message.content);
            }
            println!("dry-run enabled; skipping chat call.");
        }
        return Ok(());
    }

    let answer = session.ask(question).await?;
    if json {
        println!("{}", output::format_json(&answer)?);
    } else {
        println!("{}", output::format_answer(&answer));
    }
    Ok(())
}

async fn read_transcript(file: &Path) -> Result<Transcript> {
    Transcript::from_path(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))
}

async fn load_session(file: &Path, local: bool, config: &PolyglotConfig) -> Result<QaSession> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")?;

    let session = if local {
        let chat = config.openai.api_key.as_ref().map(|key| {
            Arc::new(
                OpenAIChatProvider::new()
                    .with_api_key(key.clone())
                    .with_base_url(config.openai.base_url.clone())
                    .with_client(client.clone()),
            ) as Arc<dyn ChatProvider>
        });
        QaSession::new(config, Arc::new(LocalProvider::new()), chat)?
    } else {
        QaSession::from_config(config, client)?
    };

    let transcript = read_transcript(file).await?;
    let stats = session
        .load_transcript(&transcript)
        .await
        .with_context(|| format!("failed to index {}", file.display()))?;
    info!(
        "Indexed {} segments in {} batches ({} tokens)",
        stats.segments, stats.batches, stats.usage.total_tokens
    );

    Ok(session)
}
