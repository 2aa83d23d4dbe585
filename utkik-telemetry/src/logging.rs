//! ## utkik-telemetry::logging
//! **Structured logger for reactor and resolver events**
//!
//! ### Expectations:
//! - Filterable via `RUST_LOG`, defaulting to `info`
//! - Thread names on every line; with one reactor per thread they identify
//!   the worker directly
//! - Negligible overhead for disabled levels

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Call once, before spawning any
    /// reactor threads.
    pub fn init() {
        Self::init_with_filter("info")
    }

    /// Like [`EventLogger::init`] with a configured fallback filter;
    /// `RUST_LOG` still takes precedence when set.
    pub fn init_with_filter(default_filter: &str) {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string())),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .init()
    }

    /// Logs one finished lookup with its outcome summary attached.
    pub fn log_lookup(query: &str, outcome: &str) {
        tracing::info!(query, outcome, "lookup completed");
    }
}
