//! Custom validation functions for configuration.
//!
//! Shared validation logic used across the configuration modules.

use validator::ValidationError;

/// Validate a worker scheduling class name.
pub fn validate_sched_policy(policy: &str) -> Result<(), ValidationError> {
    let valid = ["inherit", "fifo", "round_robin"].contains(&policy.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_sched_policy"))
    }
}

/// Validate a log filter level.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
