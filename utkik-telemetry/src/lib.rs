//! # Utkik Telemetry and Monitoring
//!
//! Crate for logging and metrics shared by the reactor and resolver crates.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
