//! # blockhist-node: node composition, configuration and RPC.
//!
//! - [`node::Node`]: canonical chain plus history service, fed by chain events
//! - [`rpc`]: JSON-RPC server for lookups and event notifications
//! - [`config::NodeConfig`]: node configuration (file, env, defaults)

pub mod config;
pub mod node;
pub mod rpc;

pub use config::NodeConfig;
pub use node::{Node, NodeError};
pub use rpc::start_rpc_server;
