//! Oakes Tracker - terminal dashboard
//!
//! Shows messages synced into Supabase, updates live from the realtime feed,
//! and takes filter and read-toggle commands on stdin.

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use input::{parse_line, Input, HELP};
use render::render_view;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_core::{
    DashboardEngine, DashboardEvent, DashboardView, LoadState, SourceFilter, StatusFilter,
    TrackerConfig,
};
use tracker_supabase::{RealtimeFeed, RestClient};

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Live dashboard for messages synced from Arbor and Gmail")]
struct Cli {
    /// Path to JSON config file (defaults to SUPABASE_URL / SUPABASE_ANON_KEY)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Initial read-status filter
    #[arg(long, default_value = "all")]
    status: StatusFilter,

    /// Initial source filter
    #[arg(long, default_value = "all")]
    source: SourceFilter,

    /// Initial search text
    #[arg(long)]
    search: Option<String>,

    /// Print the dashboard once after loading and exit
    #[arg(long)]
    once: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tracker=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_view(view: &DashboardView) {
    println!("{}", "-".repeat(72));
    print!("{}", render_view(view));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::from_env().context("no --config given and environment incomplete")?,
    };

    info!("Starting Oakes Tracker against {}", config.supabase_url);

    let store = Arc::new(RestClient::from_config(&config)?);
    let feed = Arc::new(RealtimeFeed::new(&config)?);
    let (handle, mut events, engine) = DashboardEngine::spawn(store, feed, config);

    handle.set_status_filter(cli.status).await?;
    handle.set_source_filter(cli.source).await?;
    if let Some(query) = cli.search.clone() {
        handle.set_search(query).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = !cli.once;
    let mut latest: Option<DashboardView> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(DashboardEvent::ViewUpdated(view)) => {
                    let settled = view.state != LoadState::Loading;
                    if !cli.once || settled {
                        print_view(&view);
                    }
                    latest = Some(view);
                    if cli.once && settled {
                        break;
                    }
                }
                Some(DashboardEvent::ToggleFailed { id, error }) => {
                    warn!("Could not update {}: {}", id, error);
                }
                Some(event) => debug!("Dashboard event: {:?}", event),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(Input::Command(command))) => handle.send(command).await?,
                    Ok(Some(Input::Redraw)) => {
                        if let Some(view) = &latest {
                            print_view(view);
                        }
                    }
                    Ok(Some(Input::Help)) => println!("{}", HELP),
                    Ok(Some(Input::Quit)) => break,
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Stop listening first so the engine never blocks on a full event channel
    drop(events);
    // The engine may already have stopped on its own
    let _ = handle.shutdown().await;
    engine.await?;

    info!("Oakes Tracker stopped");
    Ok(())
}
