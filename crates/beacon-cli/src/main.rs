//! # beacon
//!
//! Command line front end: `watch` streams hub events as JSON lines,
//! `process` runs work requests from a file through the engine.

#![deny(unsafe_code)]

mod output;
mod process;
mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use beacon_core::logging::{LogFormat, init_subscriber};
use beacon_settings::{load_settings, load_settings_from_path};
use clap::{Parser, Subcommand};

/// Beacon real-time analytics client.
#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Watch analytics hub events and run processing requests")]
struct Cli {
    /// Settings file (defaults to `~/.beacon/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings; `RUST_LOG` wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the hub and print every event as a JSON line.
    Watch(watch::WatchArgs),
    /// Run a work request, or an array of them, and print the responses.
    Process(process::ProcessArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("Failed to load settings")?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(level, format);

    match cli.command {
        Command::Watch(args) => watch::run(&settings, args).await,
        Command::Process(args) => process::run(&settings, args).await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
