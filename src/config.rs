//! Facilitator configuration (SPEC_FULL.md "Config"): bind address,
//! registered `(network, scheme)` handlers, and upto-session-engine tuning.
//!
//! Grounded in the teacher's `config.rs` layered resolution (CLI flag ->
//! JSON file -> env var -> hardcoded default), simplified to this crate's
//! flat registration list since the concrete per-chain client configs
//! (`Eip155ChainConfig`, `SolanaChainConfig`, `AptosChainConfig`) are out of
//! scope here (spec.md §1 Non-goals).

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::network::NetworkId;

/// CLI arguments, following the teacher's `CliArgs` (a config file path,
/// resolved from `--config`/`CONFIG` env, defaulting to `config.json`).
#[derive(Parser, Debug)]
#[command(name = "x402-upto-facilitator")]
#[command(about = "x402 payment facilitator: dispatcher + upto session engine")]
pub struct CliArgs {
    /// Path to an optional JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,
}

/// One `(network, scheme)` pair to register against a shared signer at
/// startup, plus the RPC endpoint the eventual concrete `SignerPort`
/// implementation would bind to. `rpc_url` is carried here as a forward
/// seam for a real chain client (spec.md §1 Non-goal) rather than consumed
/// by this crate directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredNetwork {
    pub network: NetworkId,
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
}

/// Session-engine tuning (spec.md §4.5-§4.6): sweep cadence and the
/// deadline buffer used by both `accrue` and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEngineConfig {
    #[serde(default = "config_defaults::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "config_defaults::default_deadline_buffer_secs")]
    pub deadline_buffer_secs: u64,
}

impl Default for SessionEngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: config_defaults::default_sweep_interval_secs(),
            deadline_buffer_secs: config_defaults::default_deadline_buffer_secs(),
        }
    }
}

/// Top-level facilitator configuration. Fields fall back to environment
/// variables, then to hardcoded defaults, the same layering the teacher's
/// `Config` applies via `serde(default = ...)`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    networks: Vec<RegisteredNetwork>,
    #[serde(default)]
    session_engine: SessionEngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            networks: Vec::new(),
            session_engine: SessionEngineConfig::default(),
        }
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn networks(&self) -> &[RegisteredNetwork] {
        &self.networks
    }

    pub fn session_engine(&self) -> &SessionEngineConfig {
        &self.session_engine
    }

    /// Loads configuration from the `--config`/`CONFIG` JSON file if it
    /// exists, else falls back to defaults layered with environment
    /// variables. Missing config file is not fatal — per spec.md §7 only a
    /// misconfigured signer or malformed registered-network string aborts
    /// startup, not an absent optional file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if !cli_args.config.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(cli_args.config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
    pub const DEFAULT_DEADLINE_BUFFER_SECS: u64 = 60;

    /// `$PORT` env var, falling back to [`DEFAULT_PORT`].
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST` env var, falling back to [`DEFAULT_HOST`].
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    /// `$UPTO_SWEEP_INTERVAL_SECS` env var, falling back to
    /// [`DEFAULT_SWEEP_INTERVAL_SECS`] (spec.md §4.6 "implementation-chosen
    /// cadence").
    pub fn default_sweep_interval_secs() -> u64 {
        env::var("UPTO_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// `$UPTO_DEADLINE_BUFFER_SECS` env var, falling back to
    /// [`DEFAULT_DEADLINE_BUFFER_SECS`] (spec.md §4.5 `deadlineBufferSec`
    /// default).
    pub fn default_deadline_buffer_secs() -> u64 {
        env::var("UPTO_DEADLINE_BUFFER_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DEADLINE_BUFFER_SECS)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_hardcoded_fallbacks() {
        let config = Config::default();
        assert_eq!(config.port(), config_defaults::DEFAULT_PORT);
        assert_eq!(config.session_engine().sweep_interval_secs, 30);
        assert_eq!(config.session_engine().deadline_buffer_secs, 60);
        assert!(config.networks().is_empty());
    }

    #[test]
    fn deserializes_registered_networks_from_json() {
        let json = serde_json::json!({
            "networks": [
                {"network": "eip155:8453", "scheme": "upto"}
            ]
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.networks().len(), 1);
        assert_eq!(config.networks()[0].scheme, "upto");
    }
}
