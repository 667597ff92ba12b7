//! hamsterd: DHT metadata crawler daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use hamster_core::{HamsterConfig, InfoHash, TorrentRecord};
use hamster_services::{CrawlSettings, Crawler, Store};

mod sidecar;

use sidecar::SidecarEngine;

#[derive(Parser, Debug)]
#[command(name = "hamsterd", version, about = "Index torrents discovered on the DHT")]
struct Cli {
    /// SQLite index file (`:memory:` for a throwaway index).
    #[arg(long, global = true, env = "HAMSTER_DB_FILE")]
    db_file: Option<PathBuf>,

    /// Config file to load instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address of the DHT engine sidecar.
    #[arg(long, global = true)]
    engine_addr: Option<String>,

    /// Log level, used when RUST_LOG is unset.
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Crawl the DHT and index metadata (default).
    Run,
    /// Print the most recently indexed torrents.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one torrent and its files.
    Show {
        /// 40 hex characters for v1, 64 for v2.
        info_hash: InfoHash,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}. Exiting...");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let db_path = &config.database.path;
    if config.database.is_in_memory() {
        tracing::info!(database = "(in-memory)", "hamster starting");
    } else {
        tracing::info!(database = %db_path.display(), "hamster starting");
    }

    let mut store = Store::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    store.migrate().context("failed to migrate database")?;

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => crawl(config, store).await,
        Cmd::List { limit } => {
            let torrents = store.recent_torrents(limit)?;
            println!("{} torrent(s) indexed", store.torrent_count()?);
            for t in &torrents {
                print_summary(t);
            }
            Ok(())
        }
        Cmd::Show { info_hash } => {
            let torrent = store
                .find_torrent(&info_hash)?
                .with_context(|| format!("torrent {info_hash} is not indexed"))?;
            print_summary(&torrent);
            for file in &torrent.files {
                println!("    {:>14}  {}", file.size, file.path);
            }
            Ok(())
        }
    }
}

/// Defaults → file → env, then command-line flags on top.
fn load_config(cli: &Cli) -> Result<HamsterConfig> {
    let mut config = match &cli.config {
        Some(path) => HamsterConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HamsterConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            HamsterConfig::default()
        }),
    };

    if let Some(path) = &cli.db_file {
        config.database.path = path.clone();
    }
    if let Some(addr) = &cli.engine_addr {
        config.engine.addr = addr.clone();
    }
    Ok(config)
}

async fn crawl(config: HamsterConfig, store: Store) -> Result<()> {
    let (engine, events) = SidecarEngine::start(&config.engine)
        .await
        .context("failed to start engine session")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => tracing::info!(signal, "interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "failed to listen for signals"),
        }
        let _ = shutdown_tx.send(());
    });

    let crawler = Crawler::new(store, engine, CrawlSettings::from(&config.crawler));
    let stats = crawler.run(events, shutdown_rx).await;

    tracing::info!(
        indexed = stats.torrents_indexed,
        persist_failures = stats.persist_failures,
        "crawler stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "SIGINT")
}

fn print_summary(t: &TorrentRecord) {
    println!(
        "{:>8}  {}  {:>14}  {}",
        t.id, t.info_hash, t.total_size, t.name
    );
}
