//! Block-hash history node binary.
//!
//! Starts the canonical chain, the history window over it, and the JSON-RPC
//! server through which consensus notifications arrive and lookups are served.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use blockhist_core::store::WindowBoundary;
use blockhist_node_lib::{start_rpc_server, Node, NodeConfig};

/// Bounded-window historical block-hash node.
#[derive(Parser, Debug)]
#[command(
    name = "blockhist-node",
    version,
    about = "Historical block-hash window with JSON-RPC lookups"
)]
struct Args {
    /// Config file (TOML). Defaults to <config_dir>/blockhist/blockhist.toml if present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tip height at which lookups activate
    #[arg(long)]
    activation_height: Option<u64>,

    /// Number of trailing blocks served
    #[arg(long)]
    window_size: Option<u64>,

    /// Extra ring slots kept below the window for shallow reorgs
    #[arg(long)]
    reorg_slack: Option<u64>,

    /// Serve [tip - W, tip - 1] instead of [tip - W + 1, tip]
    #[arg(long)]
    exclude_tip: bool,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Load the layered config and apply command-line overrides on top.
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(height) = self.activation_height {
            config.history.activation_height = height;
        }
        if let Some(size) = self.window_size {
            config.history.window_size = size;
        }
        if let Some(slack) = self.reorg_slack {
            config.history.reorg_slack = slack;
        }
        if self.exclude_tip {
            config.history.boundary = WindowBoundary::ExcludeTip;
        }
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    init_logging(&config.log_level, &config.log_format);

    info!("blockhist node v{}", env!("CARGO_PKG_VERSION"));
    info!(
        activation_height = config.history.activation_height,
        window_size = config.history.window_size,
        reorg_slack = config.history.reorg_slack,
        boundary = ?config.history.boundary,
        "history configuration"
    );

    let node = Node::new(config.clone()).context("failed to start node")?;

    let rpc_handle = start_rpc_server(&config.rpc_addr(), node.clone())
        .await
        .context("failed to start RPC server")?;
    info!("RPC server listening on {}", config.rpc_addr());
    info!("blockhist node running (Ctrl+C to stop)");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
        }
    };

    tokio::select! {
        _ = rpc_handle.clone().stopped() => {
            info!("RPC server exited");
        }
        _ = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    rpc_handle.stop().ok();
    info!(tip = ?node.chain_tip().map(|(height, _)| height), "blockhist node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_overrides() {
        let args = Args::parse_from([
            "blockhist-node",
            "--activation-height",
            "2500",
            "--exclude-tip",
            "--rpc-port",
            "19999",
        ]);
        assert_eq!(args.activation_height, Some(2500));
        assert!(args.exclude_tip);
        assert_eq!(args.rpc_port, Some(19999));
        assert_eq!(args.window_size, None);
    }
}
