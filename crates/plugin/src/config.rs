//! Runtime configuration for plugins built on this crate.
//!
//! Uses figment to merge configuration from:
//! 1. Default values
//! 2. Environment variables prefixed with `PROTOPLUG_`
//!
//! Plugins are invoked by the compiler with no arguments of their own, so the
//! environment is the only way to tune them at run time.

use crate::validate::ValidationMode;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

/// Prefix for environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "PROTOPLUG_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes
    /// precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Downgrade unnormalized and duplicate response file names to warnings.
    #[serde(default)]
    pub lenient: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lenient: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
    }

    pub fn validation_mode(&self) -> ValidationMode {
        if self.lenient {
            ValidationMode::Lenient
        } else {
            ValidationMode::Strict
        }
    }
}
