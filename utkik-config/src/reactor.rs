//! Reactor thread configuration parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Per-thread reactor tuning.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ReactorConfig {
    /// Virtual-signal inbox slots per worker reactor. Senders see
    /// backpressure once this many wakeups are queued undrained.
    #[serde(default = "default_inbox_capacity")]
    #[validate(range(min = 1, max = 65536))]
    pub inbox_capacity: usize,
}

fn default_inbox_capacity() -> usize {
    64
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: default_inbox_capacity(),
        }
    }
}
