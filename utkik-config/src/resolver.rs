//! Resolution engine configuration parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Worker pool and deadline settings for the resolution engine.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ResolverConfig {
    /// Worker threads per batch; the pool is additionally clamped to the
    /// number of targets.
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,

    /// Wall-clock budget for a whole batch, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub timeout_ms: u64,

    /// Post-deadline allowance for workers to join, in milliseconds.
    #[serde(default = "default_grace_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub grace_ms: u64,

    /// Worker scheduling class: inherit, fifo, or round_robin.
    #[serde(default = "default_policy")]
    #[validate(custom(function = validation::validate_sched_policy))]
    pub policy: String,

    /// Real-time priority, used by the fifo and round_robin classes.
    #[serde(default)]
    #[validate(range(min = 0, max = 99))]
    pub priority: i32,
}

fn default_workers() -> usize {
    num_cpus::get().min(64)
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_grace_ms() -> u64 {
    2000
}

fn default_policy() -> String {
    "inherit".into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_ms: default_timeout_ms(),
            grace_ms: default_grace_ms(),
            policy: default_policy(),
            priority: 0,
        }
    }
}
