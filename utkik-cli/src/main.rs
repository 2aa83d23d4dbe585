//! ## utkik-cli
//! **Unified operational interface**
//! Utkik main entrypoint: batched forward and reverse name resolution on
//! a bounded pool of reactor threads, raced against a wall-clock deadline.
//!
//! ### Expectations:
//! - POSIX-compliant argument parsing
//! - A batch cut short by its deadline is a result, not an error: the
//!   process still exits zero and reports what finished

use anyhow::{Context, Result};
use clap::Parser;
use utkik_config::UtkikConfig;
use utkik_telemetry::logging::EventLogger;

mod commands;

use commands::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => UtkikConfig::load_from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => UtkikConfig::load().context("loading layered configuration")?,
    };
    EventLogger::init_with_filter(&config.telemetry.log_level);

    match cli.command {
        Commands::Resolve(resolve_args) => commands::run_resolve_mode(resolve_args, config),
        Commands::Check => commands::run_check_mode(config),
    }
}
