//! Replays recorded bin snapshots through change detection.
//!
//! Reads one JSON snapshot per line (the realtime store's `bins` value),
//! feeds them through a [`BinFeed`] in order, and prints every emitted
//! event as a JSON line. Notifications go to the log.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use binwatch::notify::LogSink;
use binwatch::{
    BinFeed, BinwatchConfig, BinwatchError, Muted, NotificationDispatcher, Permission,
    PermissionPrompt, PermissionState,
};

/// Replay recorded bin snapshots and print the events they produce.
#[derive(clap::Parser, Debug)]
struct Args {
    /// JSON-lines file of snapshots, oldest first. Reads stdin when omitted.
    input: Option<PathBuf>,
    /// Configuration file. Defaults apply when omitted or missing.
    #[clap(long, env = "BINWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Seed the status cache from the first snapshot instead of alerting on it.
    #[clap(long)]
    seed: bool,
}

/// The replay runs unattended, so every permission reads as granted.
struct Unattended;

impl PermissionPrompt for Unattended {
    fn query(&self, _: Permission) -> PermissionState {
        PermissionState::Granted
    }

    fn request(&self, _: Permission) -> PermissionState {
        PermissionState::Granted
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut cfg = match &args.config {
        Some(path) => BinwatchConfig::load_or_default(path)?,
        None => BinwatchConfig::default(),
    };
    if args.seed {
        cfg.seed_status_cache_on_start = true;
    }
    tracing::info!(?args, "starting replay");

    let dispatcher = NotificationDispatcher::new(
        &cfg,
        Arc::new(LogSink),
        Arc::new(Muted),
        Arc::new(Unattended),
    );
    let feed = BinFeed::new(&cfg, Some(Arc::new(dispatcher)));
    let events = feed.subscribe()?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping unparseable snapshot");
                continue;
            }
        };
        feed.deliver_json(&value)?;
        feed.flush()?;

        for event in events.drain() {
            let json = serde_json::to_string(&event).map_err(|e| BinwatchError::Internal {
                message: e.to_string(),
            })?;
            writeln!(out, "{json}")?;
        }
    }

    tracing::info!(
        snapshots = feed.processed_snapshots(),
        events = feed.emitted_events(),
        dropped = feed.dropped_events(),
        "replay finished"
    );
    Ok(())
}
