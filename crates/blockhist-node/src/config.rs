//! Node configuration.
//!
//! [`NodeConfig`] is resolved in three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (explicit path, else `<config_dir>/blockhist/blockhist.toml`)
//! 3. `BLOCKHIST_*` environment variables; nested fields use `__`
//!    (e.g. `BLOCKHIST_HISTORY__ACTIVATION_HEIGHT=2500`)
//!
//! Command-line flags are applied on top by the binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use blockhist_core::constants::DEFAULT_RPC_PORT;
use blockhist_core::service::HistoryConfig;

use crate::node::NodeError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BLOCKHIST";

/// Configuration for a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "blockhist_core=trace").
    pub log_level: String,
    /// Log output format, "text" or "json".
    pub log_format: String,
    pub history: HistoryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            history: HistoryConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }

    /// Load from `path` (required if given) or the default location (optional),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of the
    /// process environment when it is given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, NodeError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(default) = default_config_path() {
                    builder = builder.add_source(File::from(default).required(false));
                }
            }
        }
        let config: NodeConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the history service cannot be built with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.history
            .validate()
            .map_err(|e| NodeError::History(e.into()))?;
        Ok(())
    }
}

/// `<config_dir>/blockhist/blockhist.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("blockhist").join("blockhist.toml"))
}
