//! Thin process entry point: parse library roots, bootstrap [`Core`],
//! run one scan, then keep the watcher and transcode worker alive until
//! interrupted. The HTTP feed/streaming surface lives outside this
//! crate; this binary is the standalone ingestion daemon.

use anyhow::Result;
use clap::Parser;
use podible_core::audio::FfmpegEngine;
use podible_core::models::Config;
use podible_core::utils::check_engine;
use podible_core::Core;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// Serve a filesystem tree of audiobooks as a podcast feed.
#[derive(Parser, Debug)]
#[command(name = "podible", version)]
struct Cli {
    /// Library roots, each laid out as <root>/<author>/<title>. The
    /// server starts with zero roots; a feed request against an empty
    /// library surfaces as a runtime error rather than refusing to boot.
    roots: Vec<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    for dep in check_engine() {
        if dep.found {
            tracing::info!("{dep}");
        } else {
            tracing::warn!("{dep}");
        }
    }

    let config = Config::from_env(cli.roots);
    let core = Arc::new(
        Core::bootstrap(config, Arc::new(FfmpegEngine::new()), Arc::new(FfmpegEngine::new())).await?,
    );

    tracing::info!("Running initial scan over {} root(s)", core.config.roots.len());
    if let Err(e) = core.scan().await {
        tracing::error!("Initial scan failed: {e}");
    }

    let _watcher = core.spawn_watcher()?;
    core.spawn_worker();

    tokio::spawn(status_loop(Arc::clone(&core)));

    tracing::info!("podible is running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}

/// Periodic status log: how many books are ready versus still pipelined.
async fn status_loop(core: Arc<Core>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let ready = core.library.books_sorted().await.len();
        let counts = core.transcode_state.state_counts().await;
        tracing::info!("Library: {ready} streamable book(s); transcode states: {counts:?}");
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "podible_core=debug" } else { "podible_core=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}
