//! Configuration loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid config:
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:3000"
//! max_body_bytes = 2097152
//! attach_error_context = false
//!
//! [pool]
//! max_idle = 1024
//!
//! [throttle]
//! limit = 60
//! window_secs = 60
//! sweep_interval_secs = 300
//! # max_penalty_hits = 10
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::throttle::ThrottleConfig;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub throttle: ThrottleConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Larger bodies are answered with `413` before any middleware runs.
    pub max_body_bytes: usize,
    /// Render errors as `{"message", "request_id", "path"}` JSON.
    pub attach_error_context: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_owned(),
            max_body_bytes: 2 * 1024 * 1024,
            attach_error_context: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle contexts kept for reuse.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_idle: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            addr = "127.0.0.1:8080"

            [throttle]
            limit = 2
            max_penalty_hits = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.addr, "127.0.0.1:8080");
        assert_eq!(config.server.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.throttle.limit, 2);
        assert_eq!(config.throttle.window_secs, 60);
        assert_eq!(config.throttle.max_penalty_hits, Some(5));
        assert_eq!(config.pool.max_idle, 1024);
    }

    #[test]
    fn type_errors_surface_as_config_errors() {
        let err = Config::from_toml_str("[pool]\nmax_idle = \"lots\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
