//! Configuration schema definitions.
//!
//! This module defines the static server configuration, read once at
//! startup. The domains and accounts it serves live in the dynamic
//! configuration managed by [`crate::store`].
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the admin daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name of this mail server.
    pub hostname: String,

    /// Directory holding the dynamic configuration file and DKIM keys.
    pub config_dir: PathBuf,

    /// Directory holding per-account data.
    pub data_dir: PathBuf,

    /// Dynamic configuration file name, relative to `config_dir`.
    pub dynamic_file: String,

    pub postmaster: PostmasterConfig,

    /// Publish an MTA-STS policy for newly added domains.
    pub mta_sts_enabled: bool,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
            dynamic_file: "domains.toml".to_string(),
            postmaster: PostmasterConfig::default(),
            mta_sts_enabled: true,
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Path of the dynamic configuration file.
    pub fn dynamic_path(&self) -> PathBuf {
        self.config_dir.join(&self.dynamic_file)
    }
}

/// Where mail to `postmaster@` of every domain is delivered.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostmasterConfig {
    pub account: String,
}

impl Default for PostmasterConfig {
    fn default() -> Self {
        Self {
            account: "admin".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds. Key generation counts against it.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
            max_body_size: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
