// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control-plane configuration.
//!
//! Supports both programmatic and file-based configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Router listen address.
    #[serde(default = "default_router_bind")]
    pub router_bind: String,

    /// Gateway listen address.
    #[serde(default = "default_gateway_bind")]
    pub gateway_bind: String,

    /// Metrics listen address.
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: String,

    /// Working directory for the persisted CA.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Time after which to assume an RPC has timed out (seconds).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Interval between probe cycles (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Dial timeout after which a switch counts as unreachable (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Length of a single throughput chunk (bytes).
    #[serde(default = "default_throughput_length")]
    pub throughput_length: u64,

    /// Number of throughput chunks per probe.
    #[serde(default = "default_throughput_chunks")]
    pub throughput_chunks: u64,

    /// CA validity (seconds).
    #[serde(default = "default_ca_validity")]
    pub ca_validity_secs: u64,

    /// Validity of per-call certificates (seconds).
    #[serde(default = "default_call_cert_validity")]
    pub call_cert_validity_secs: u64,

    /// Validity of switch benchmark listen certificates (seconds).
    #[serde(default = "default_benchmark_listen_cert_validity")]
    pub benchmark_listen_cert_validity_secs: u64,

    /// Validity of benchmark client certificates (seconds).
    #[serde(default = "default_benchmark_client_cert_validity")]
    pub benchmark_client_cert_validity_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_router_bind() -> String {
    "0.0.0.0:1337".to_string()
}

fn default_gateway_bind() -> String {
    "0.0.0.0:1338".to_string()
}

fn default_metrics_bind() -> String {
    "0.0.0.0:1339".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_call_timeout() -> u64 {
    60
}

fn default_probe_interval() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_throughput_length() -> u64 {
    1_048_576
}

fn default_throughput_chunks() -> u64 {
    100
}

fn default_ca_validity() -> u64 {
    // 10 years
    10 * 365 * 24 * 3600
}

fn default_call_cert_validity() -> u64 {
    3600
}

fn default_benchmark_listen_cert_validity() -> u64 {
    // 1 year
    365 * 24 * 3600
}

fn default_benchmark_client_cert_validity() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            router_bind: default_router_bind(),
            gateway_bind: default_gateway_bind(),
            metrics_bind: default_metrics_bind(),
            workdir: default_workdir(),
            call_timeout_secs: default_call_timeout(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
            throughput_length: default_throughput_length(),
            throughput_chunks: default_throughput_chunks(),
            ca_validity_secs: default_ca_validity(),
            call_cert_validity_secs: default_call_cert_validity(),
            benchmark_listen_cert_validity_secs: default_benchmark_listen_cert_validity(),
            benchmark_client_cert_validity_secs: default_benchmark_client_cert_validity(),
            log_level: default_log_level(),
        }
    }
}

impl ControlConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, bind) in [
            ("router_bind", &self.router_bind),
            ("gateway_bind", &self.gateway_bind),
            ("metrics_bind", &self.metrics_bind),
        ] {
            if bind.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} cannot be empty", name)));
            }
        }

        if self.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe_interval_secs cannot be 0".into(),
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe_timeout_secs cannot be 0".into()));
        }
        if self.throughput_length == 0 || self.throughput_chunks == 0 {
            return Err(ConfigError::Invalid(
                "throughput_length and throughput_chunks cannot be 0".into(),
            ));
        }
        if self.call_cert_validity_secs == 0 {
            return Err(ConfigError::Invalid(
                "call_cert_validity_secs cannot be 0".into(),
            ));
        }

        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ca_validity(&self) -> Duration {
        Duration::from_secs(self.ca_validity_secs)
    }

    pub fn call_cert_validity(&self) -> Duration {
        Duration::from_secs(self.call_cert_validity_secs)
    }

    pub fn benchmark_listen_cert_validity(&self) -> Duration {
        Duration::from_secs(self.benchmark_listen_cert_validity_secs)
    }

    pub fn benchmark_client_cert_validity(&self) -> Duration {
        Duration::from_secs(self.benchmark_client_cert_validity_secs)
    }
}
