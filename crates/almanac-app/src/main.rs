//! Almanac application binary - composition root.
//!
//! Ties the Almanac crates together for one-shot commands over a
//! directory of notes:
//! 1. Load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the record store, content index and gateways
//! 4. Load the directory into a fresh space as `text` sources
//! 5. Run the requested search, stats or question

mod cli;
mod offline;
mod space;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use almanac_chat::ConversationOrchestrator;
use almanac_core::error::AlmanacError;
use almanac_core::types::SpaceId;
use almanac_core::AlmanacConfig;
use almanac_gateway::{CompletionGateway, ScriptedTranscriptionGateway, TranscriptionGateway};
use almanac_search::{ContentIndex, SearchSurface};
use almanac_sources::SourceLifecycleManager;
use almanac_storage::RecordStore;

use crate::cli::{CliArgs, Command};
use crate::offline::OfflineCompletionGateway;

/// Transcription gateway named by `[transcription].provider`.
fn transcription_gateway(provider: &str) -> Result<Arc<dyn TranscriptionGateway>, AlmanacError> {
    match provider {
        "mock" => Ok(Arc::new(ScriptedTranscriptionGateway::new())),
        other => Err(AlmanacError::Config(format!(
            "unsupported transcription provider: {}",
            other
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = AlmanacConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over the flag and the config file.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Almanac v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    // One-shot commands summarize explicitly rather than in the background.
    config.summarization.auto_summarize = false;

    // Core components.
    let store = Arc::new(RecordStore::new());
    let index = Arc::new(ContentIndex::new(config.search.clone()));
    let completer: Arc<dyn CompletionGateway> = Arc::new(OfflineCompletionGateway);
    let manager = SourceLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&index),
        transcription_gateway(&config.transcription.provider)?,
        Arc::clone(&completer),
        &config,
    );
    let space_id = SpaceId::new();

    match args.command {
        Command::Search {
            dir,
            query,
            scope,
            limit,
            json,
        } => {
            space::load_directory(&manager, space_id, &dir).await?;
            let results = index.search(space_id, &query, scope.into(), limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results for \"{}\".", query.trim());
            } else {
                for result in &results {
                    let surface = match result.surface {
                        SearchSurface::Content => "content",
                        SearchSurface::Summary => "summary",
                    };
                    println!(
                        "{:.4}  {} ({}, {})",
                        result.score, result.name, result.source_type, surface
                    );
                    for excerpt in &result.excerpts {
                        println!("    {}", excerpt);
                    }
                }
            }
        }
        Command::Stats { dir, summarize } => {
            let sources = space::load_directory(&manager, space_id, &dir).await?;
            if summarize {
                for source in &sources {
                    manager.summarize_source(source.id, None).await?;
                }
            }
            let stats = index.stats(space_id)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Ask { dir, question } => {
            space::load_directory(&manager, space_id, &dir).await?;
            let orchestrator = ConversationOrchestrator::new(
                Arc::clone(&store),
                Arc::clone(&index),
                completer,
                &config,
            )
            .with_events(manager.event_sender());
            let conversation = orchestrator.create_conversation(space_id)?;
            orchestrator.post_user_message(conversation.id, &question)?;
            let reply = orchestrator.generate_reply(conversation.id).await?;

            println!("{}", reply.content);
            if !reply.sources_used.is_empty() {
                println!("\nSources:");
                for (i, source) in reply.sources_used.iter().enumerate() {
                    println!("  [{}] {} ({})", i + 1, source.name, source.source_type);
                }
            }
        }
    }

    Ok(())
}
