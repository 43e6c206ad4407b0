// ClickNook - self-hosted product analytics with AI-named events
//
// Startup wiring, leaf-first: stores, then the naming engine, then the
// HTTP server and background tasks. Shutdown drains the naming workers
// and checkpoints both databases.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clicknook::cli::Cli;
use clicknook::config::Config;
use clicknook::naming::{provider_from_config, NameCache, Namer};
use clicknook::scheduler::AlertScheduler;
use clicknook::server::{self, AppState};
use clicknook::source::Matcher;
use clicknook::storage::{Encryptor, EventStore, MetaStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "clicknook=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    // Stores first; everything else hangs off these two handles.
    let encryptor = Encryptor::new(&config.data_dir)?;
    let meta = Arc::new(MetaStore::open(&config.meta_db_path(), encryptor)?);
    let events = Arc::new(EventStore::open(&config.events_db_path())?);

    // Single-project deployment: bootstrap one if the store is empty so
    // ingestion works out of the box.
    let project = match meta.list_projects()?.into_iter().next() {
        Some(project) => project,
        None => {
            let project = meta.create_project(&clicknook::storage::meta::generate_token(8), "Default Project")?;
            tracing::info!("created default project, api key: {}", project.api_key);
            project
        }
    };

    // Naming engine: provider from stored settings (None disables naming),
    // matcher wired in when a source connection exists.
    let provider = provider_from_config(meta.get_llm_config(&project.id)?.as_ref());
    if provider.is_some() {
        tracing::info!("naming provider loaded from settings");
    }
    let namer = Arc::new(Namer::new(
        provider,
        NameCache::new(meta.clone()),
        events.clone(),
        2,
    ));

    let matcher = Arc::new(Matcher::new(meta.clone()));
    if meta.get_source_connection(&project.id)?.is_some() {
        namer.set_matcher(Some(matcher.clone()));
    }

    let state = AppState {
        config: config.clone(),
        events: events.clone(),
        meta: meta.clone(),
        namer: namer.clone(),
        matcher,
    };

    if config.dev_mode {
        tracing::warn!("dev mode: dashboard session auth disabled");
    }

    // Background alert evaluation.
    tokio::spawn(AlertScheduler::new(events.clone(), meta.clone()).run());

    server::serve(state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down...");
    })
    .await?;

    // Drain naming workers, then flush both WALs.
    namer.shutdown().await;
    if let Err(e) = events.checkpoint() {
        tracing::warn!("checkpointing event store: {e:#}");
    }
    if let Err(e) = meta.checkpoint() {
        tracing::warn!("checkpointing metadata store: {e:#}");
    }

    tracing::info!("shutdown complete");
    Ok(())
}
