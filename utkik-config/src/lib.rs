//! # Utkik Configuration System
//!
//! Hierarchical configuration management for the Utkik resolver stack.
//!
//! ## Features
//! - **Unified Configuration**: Single source of truth across all components
//! - **Validation**: Runtime validation of critical parameters
//! - **Environment Awareness**: Overrides per deployment environment
//! - **Layered Sources**: Defaults, YAML files, then environment variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod reactor;
mod resolver;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use reactor::ReactorConfig;
pub use resolver::ResolverConfig;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container for all Utkik components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct UtkikConfig {
    /// Reactor thread tuning (inbox sizing).
    #[validate(nested)]
    pub reactor: ReactorConfig,

    /// Resolution engine parameters (pool size, deadline, scheduling).
    #[validate(nested)]
    pub resolver: ResolverConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl UtkikConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/utkik.yaml` - base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - environment-specific overrides.
    /// 4. `UTKIK_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Start with defaults.
        let mut figment = Figment::from(Serialized::defaults(UtkikConfig::default()));

        if Path::new("config/utkik.yaml").exists() {
            figment = figment.merge(Yaml::file("config/utkik.yaml"));
        } else {
            println!("config/utkik.yaml not found, using default configuration");
        }

        let env = std::env::var("UTKIK_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        figment
            .merge(Env::prefixed("UTKIK_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path for testing/validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(
                path.to_string_lossy().to_string(),
            )));
        }

        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("UTKIK_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_validation() {
        let config = UtkikConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn environment_override() {
        // Override a field via environment variable.
        std::env::set_var("UTKIK_RESOLVER__TIMEOUT_MS", "1234");
        let config = UtkikConfig::load().unwrap();
        assert_eq!(config.resolver.timeout_ms, 1234);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = UtkikConfig::load_from_path("config/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn bad_policy_fails_validation() {
        let config = UtkikConfig {
            resolver: ResolverConfig {
                policy: "preemptive".into(),
                ..ResolverConfig::default()
            },
            ..UtkikConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
