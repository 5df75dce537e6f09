use anyhow::{Context, Result};
use clap::Parser;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticket_common::ConfigStore;
use ticketd::config::DaemonConfig;
use ticketd::engine::TicketLifecycleEngine;
use ticketd::index::TicketIndex;
use ticketd::memory_transport::MemoryTransport;
use ticketd::registry::TicketRegistry;
use ticketd::restore::restore_state;
use ticketd::rpc;
use ticketd::state::DaemonState;
use ticketd::transcript::HtmlTranscriptExporter;
use ticketd::transport::Transport;

const SANDBOX_ROOT: &str = "/tmp/ticketd-sandbox";

#[derive(Parser, Debug)]
#[command(name = "ticketd", version, about = "Support ticket lifecycle daemon")]
struct Args {
    /// Daemon config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep every file under /tmp/ticketd-sandbox
    #[arg(long)]
    sandbox: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaemonConfig::load(args.config.as_deref())?;
    if args.sandbox {
        config = config.rooted_at(Path::new(SANDBOX_ROOT));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("[BOOT] ticketd v{} starting...", env!("CARGO_PKG_VERSION"));

    for dir in [&config.state_dir, &config.transcripts_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    if let Some(parent) = config.config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let store = Arc::new(
        ConfigStore::open(&config.config_path)
            .with_context(|| format!("Failed to load {}", config.config_path.display()))?,
    );
    info!("[BOOT] Ticket config loaded ({} categories)", store.categories().len());

    let exporter = HtmlTranscriptExporter::new(&config.transcripts_dir);
    match exporter.cleanup_older_than(config.transcript_max_age()) {
        Ok(0) => {}
        Ok(n) => info!("[BOOT] Removed {} expired transcripts", n),
        Err(e) => warn!("[BOOT] Transcript cleanup failed: {}", e),
    }

    // No gateway adapter ships with the daemon; the in-memory transport
    // stands in for the platform. Its guild starts empty on every boot.
    let memory = Arc::new(MemoryTransport::new());
    match store.channels().ticket_category {
        Some(id) => memory.add_container_with_id(&id),
        None => {
            let container = memory.add_container();
            store
                .update_channels(|c| c.ticket_category = Some(container.clone()))
                .context("Failed to record the ticket category")?;
            info!("[BOOT] Ticket category set to {}", container);
        }
    }
    let transport: Arc<dyn Transport> = memory;

    // None of the indexed channels exist in a fresh in-memory guild, so
    // restoring would drop them all and the next write would empty the file.
    let index = TicketIndex::in_dir(&config.state_dir);
    warn!(
        "[BOOT] Using in-memory transport; ticket index at {} is left untouched",
        index.path().display()
    );
    let registry = Arc::new(TicketRegistry::new());
    let summary = restore_state(&registry, None, &store, transport.as_ref()).await;
    info!(
        "[BOOT] Restored {} tickets from index, {} from topics ({} dropped)",
        summary.from_index, summary.from_topics, summary.dropped
    );

    let engine = Arc::new(TicketLifecycleEngine::new(
        store,
        registry,
        transport,
        Arc::new(exporter),
    ));
    let state = Arc::new(DaemonState::new(engine));

    let socket = &config.socket_path;
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if socket.exists() {
        std::fs::remove_file(socket).context("Failed to remove old socket")?;
    }
    let listener = UnixListener::bind(socket)
        .with_context(|| format!("Failed to bind socket at {}", socket.display()))?;
    std::fs::set_permissions(socket, std::fs::Permissions::from_mode(0o660))
        .context("Failed to set socket permissions")?;
    info!("[BOOT] RPC online ({}, permissions: 0660)", socket.display());

    info!("[READY] ticketd operational");

    rpc::serve_until(listener, state, socket, shutdown_signal())
        .await
        .context("RPC server error")?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Cannot listen for SIGTERM, only Ctrl-C stops ticketd: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}
