use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use utkik_config::UtkikConfig;
use utkik_reactor::SchedPolicy;
use utkik_resolver::{EngineOptions, LookupTarget, ResolverEngine, MAX_WORKERS};
use utkik_telemetry::EventLogger;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; the layered default search is used when absent.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve hostnames and addresses in parallel under a deadline
    Resolve(ResolveArgs),
    /// Load the layered configuration, validate it and print the result
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Hostnames get forward lookups, IP literals reverse lookups.
    #[arg(required = true)]
    pub targets: Vec<String>,
    /// Override the configured batch deadline, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Override the configured post-deadline grace period, in milliseconds.
    #[arg(long)]
    pub grace_ms: Option<u64>,
    /// Override the configured worker count.
    #[arg(long)]
    pub workers: Option<usize>,
}

pub fn run_resolve_mode(args: ResolveArgs, config: UtkikConfig) -> Result<()> {
    let targets: Vec<LookupTarget> = args.targets.iter().map(|raw| parse_target(raw)).collect();
    let options = engine_options(&args, &config);

    let engine = ResolverEngine::new(options);
    let report = engine
        .resolve_all(&targets)
        .context("running the resolution batch")?;

    for (target, outcome) in targets.iter().zip(&report.outcomes) {
        let summary = match outcome {
            Some(Ok(name)) => {
                println!("{target}\t{name}");
                "resolved"
            }
            Some(Err(error)) => {
                println!("{target}\t<{error}>");
                "failed"
            }
            None => {
                println!("{target}\t<deadline>");
                "deadline"
            }
        };
        EventLogger::log_lookup(&target.to_string(), summary);
    }
    info!(
        completed = report.completed,
        total = targets.len(),
        "resolution batch finished"
    );

    if config.telemetry.metrics_enabled {
        eprint!("{}", engine.metrics().gather_metrics()?);
    }
    Ok(())
}

pub fn run_check_mode(config: UtkikConfig) -> Result<()> {
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn engine_options(args: &ResolveArgs, config: &UtkikConfig) -> EngineOptions {
    let resolver = &config.resolver;
    EngineOptions {
        workers: args.workers.unwrap_or(resolver.workers).min(MAX_WORKERS),
        timeout: Duration::from_millis(args.timeout_ms.unwrap_or(resolver.timeout_ms)),
        grace: Duration::from_millis(args.grace_ms.unwrap_or(resolver.grace_ms)),
        policy: sched_policy(&resolver.policy, resolver.priority),
        inbox_capacity: config.reactor.inbox_capacity,
    }
}

/// IP literals ask for their name, anything else for its address.
fn parse_target(raw: &str) -> LookupTarget {
    match raw.parse::<IpAddr>() {
        Ok(addr) => LookupTarget::Addr(addr),
        Err(_) => LookupTarget::Host(raw.to_string()),
    }
}

/// Config validation restricts `name` to the three known classes.
fn sched_policy(name: &str, priority: i32) -> SchedPolicy {
    match name {
        "fifo" => SchedPolicy::Fifo(priority),
        "round_robin" => SchedPolicy::RoundRobin(priority),
        _ => SchedPolicy::Inherit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_resolve_invocation() {
        let cli = Cli::parse_from([
            "utkik",
            "resolve",
            "--timeout-ms",
            "250",
            "--workers",
            "4",
            "192.0.2.1",
            "name.example",
        ]);
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.timeout_ms, Some(250));
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.targets.len(), 2);
            }
            _ => panic!("expected the resolve subcommand"),
        }
    }

    #[test]
    fn literals_become_reverse_targets() {
        assert!(matches!(parse_target("192.0.2.1"), LookupTarget::Addr(_)));
        assert!(matches!(parse_target("name.example"), LookupTarget::Host(_)));
    }

    #[test]
    fn overrides_fall_back_to_the_config() {
        let config = UtkikConfig::default();
        let args = ResolveArgs {
            targets: vec!["name.example".into()],
            timeout_ms: Some(1500),
            grace_ms: None,
            workers: None,
        };

        let options = engine_options(&args, &config);
        assert_eq!(options.timeout, Duration::from_millis(1500));
        assert_eq!(options.grace, Duration::from_millis(config.resolver.grace_ms));
        assert_eq!(options.workers, config.resolver.workers);
    }
}
