//! htmldir - HTML directory listings kept current with inotify
//!
//! Entry point for the htmldir daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use htmldir::config::DEFAULT_OUTPUT_FILENAME;
use htmldir::listing::{regenerate_all, should_render, write_listing, ListingTemplate};
use htmldir::observability::init_tracing;
use htmldir::watcher::{watch, DEFAULT_CHANNEL_CAPACITY};
use htmldir::Config;

/// htmldir - write an HTML listing into every directory and keep it current
#[derive(Parser, Debug)]
#[command(name = "htmldir")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Absolute path of the served tree
    #[arg(env = "HTMLDIR_BASE_DIR")]
    base_dir: PathBuf,

    /// Regenerate every listing before watching
    #[arg(long, env = "HTMLDIR_ALL")]
    all: bool,

    /// Exit after regenerating (requires --all)
    #[arg(long, env = "HTMLDIR_EXIT")]
    exit: bool,

    /// Bound of the event channel
    #[arg(long, env = "HTMLDIR_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    capacity: usize,

    /// File name of the listing written into each directory
    #[arg(long, env = "HTMLDIR_OUTPUT_NAME", default_value = DEFAULT_OUTPUT_FILENAME)]
    output_name: String,

    /// Template file for the listings (built-in layout if unset)
    #[arg(long, env = "HTMLDIR_TEMPLATE")]
    template: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HTMLDIR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "HTMLDIR_LOG_JSON")]
    log_json: bool,

    /// Print every event as a JSON line on stdout
    #[arg(long, env = "HTMLDIR_DUMP_EVENTS")]
    dump_events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("htmldir v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        regenerate_all: cli.all,
        exit_after_regenerate: cli.exit,
        channel_capacity: cli.capacity,
        output_filename: cli.output_name,
        template: cli.template,
        log_level: cli.log_level,
        log_json: cli.log_json,
        ..Config::new(&cli.base_dir)
    };

    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;

    tracing::info!(path = %config.base_dir.display(), "Directory");

    let template = Arc::new(ListingTemplate::load(config.template.as_deref())?);

    if config.regenerate_only() {
        let base = config.base_dir.clone();
        let output = config.output_filename.clone();
        let summary =
            tokio::task::spawn_blocking(move || regenerate_all(&base, &output, &template))
                .await
                .context("regeneration task failed")?;
        if summary.failed > 0 {
            tracing::warn!(failed = summary.failed, "Some listings could not be written");
        }
        return Ok(());
    }

    let mut handle = watch(
        config.base_dir.clone(),
        config.regenerate_all,
        config.channel_capacity,
    )?;

    // Announcements of the existing tree fill the channel first, so only
    // wait for the walk when nothing is announced.
    if !config.regenerate_all {
        let watches = handle.initialized().await?;
        tracing::info!(watches, "Watching tree");
    }

    let base: Arc<PathBuf> = Arc::new(config.base_dir);
    let output: Arc<str> = Arc::from(config.output_filename);

    while let Some(event) = handle.recv().await {
        if cli.dump_events {
            println!("{}", event.to_json());
        }
        if !should_render(&event, &output) {
            continue;
        }

        let base = Arc::clone(&base);
        let output = Arc::clone(&output);
        let template = Arc::clone(&template);
        let dir = event.dir;
        let written =
            tokio::task::spawn_blocking(move || write_listing(&base, &dir, &output, &template))
                .await
                .context("listing task failed")?;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to write listing");
        }
    }

    let stats = handle.stats();
    tracing::info!(
        records = stats.records_read,
        forwarded = stats.events_forwarded,
        "Event stream closed"
    );

    tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("watcher join task failed")?
        .context("watcher stopped")?;

    Ok(())
}
