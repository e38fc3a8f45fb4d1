//! JSON-RPC server for the history node.
//!
//! Uses jsonrpsee 0.24. Read methods answer lookups against the history
//! window; notification methods (`connectblock`, `disconnectblock`,
//! `reorgchain`) are how the consensus layer feeds chain events in.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use blockhist_core::error::{HistoryError, LookupError};
use blockhist_core::reconciler::ReconcileOutcome;
use blockhist_core::service::HistoryInfo;
use blockhist_core::store::WindowBoundary;
use blockhist_core::types::{BlockRef, Hash256, ReorgEvent};

use crate::node::{Node, NodeError};

/// Generic failure.
pub const RPC_MISC_ERROR: i32 = -1;
/// Bad argument (hash or hex encoding).
pub const RPC_INVALID_PARAMETER: i32 = -8;
/// A chain notification was rejected.
pub const RPC_EVENT_REJECTED: i32 = -25;
/// History service is halted or has no chain to resync from.
pub const RPC_HISTORY_HALTED: i32 = -40;
pub const RPC_NOT_ACTIVATED: i32 = -41;
pub const RPC_FUTURE_BLOCK: i32 = -42;
pub const RPC_OUT_OF_WINDOW: i32 = -43;
pub const RPC_MALFORMED_QUERY: i32 = -44;
pub const RPC_MISSING_ENTRY: i32 = -45;

/// JSON form of a block notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRefJson {
    pub height: u64,
    /// Block hash as hex.
    pub hash: String,
    /// Parent block hash as hex.
    pub parent_hash: String,
}

impl BlockRefJson {
    fn parse(&self) -> Result<BlockRef, ErrorObjectOwned> {
        Ok(BlockRef::new(
            self.height,
            parse_hash(&self.hash)?,
            parse_hash(&self.parent_hash)?,
        ))
    }
}

impl From<&BlockRef> for BlockRefJson {
    fn from(block: &BlockRef) -> Self {
        Self {
            height: block.height,
            hash: block.hash.to_hex(),
            parent_hash: block.parent_hash.to_hex(),
        }
    }
}

/// Result of the raw boundary call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResultJson {
    /// `"None"` on success, otherwise the failure kind.
    pub excepted: String,
    /// Returned word as hex; empty on failure.
    pub output: String,
}

/// Result of an applied chain notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileJson {
    pub tip_height: Option<u64>,
    pub tip_hash: Option<String>,
    pub disconnected: u64,
    pub connected: u64,
    pub backfilled: u64,
}

impl From<ReconcileOutcome> for ReconcileJson {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            tip_height: outcome.tip.map(|t| t.height),
            tip_hash: outcome.tip.map(|t| t.hash.to_hex()),
            disconnected: outcome.disconnected,
            connected: outcome.connected,
            backfilled: outcome.backfilled,
        }
    }
}

/// JSON representation of the history service state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryInfoJson {
    pub window_size: u64,
    /// `"include-tip"` or `"exclude-tip"`.
    pub boundary: String,
    pub activation_height: u64,
    pub enabled: bool,
    pub tip_height: Option<u64>,
    pub tip_hash: Option<String>,
    /// Oldest served height.
    pub oldest: Option<u64>,
    /// Newest served height.
    pub newest: Option<u64>,
    pub live_entries: u64,
    pub capacity: u64,
    pub halted: Option<String>,
}

impl From<HistoryInfo> for HistoryInfoJson {
    fn from(info: HistoryInfo) -> Self {
        let boundary = match info.boundary {
            WindowBoundary::IncludeTip => "include-tip",
            WindowBoundary::ExcludeTip => "exclude-tip",
        };
        Self {
            window_size: info.window_size,
            boundary: boundary.to_string(),
            activation_height: info.activation_height,
            enabled: info.state == blockhist_core::activation::ActivationState::Enabled,
            tip_height: info.tip.map(|t| t.height),
            tip_hash: info.tip.map(|t| t.hash.to_hex()),
            oldest: info.range.map(|r| r.oldest),
            newest: info.range.map(|r| r.newest),
            live_entries: info.live_entries,
            capacity: info.capacity,
            halted: info.halted,
        }
    }
}

/// Parse a 64-character hex string (optionally `0x`-prefixed) into a Hash256.
pub fn parse_hash(hex_str: &str) -> Result<Hash256, ErrorObjectOwned> {
    hex_str
        .parse::<Hash256>()
        .map_err(|e| rpc_error(RPC_INVALID_PARAMETER, &e.to_string()))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// RPC error for a rejected lookup. The failure kind travels as `data`.
pub fn lookup_error(e: &LookupError) -> ErrorObjectOwned {
    let code = match e {
        LookupError::NotActivated { .. } => RPC_NOT_ACTIVATED,
        LookupError::FutureBlock { .. } => RPC_FUTURE_BLOCK,
        LookupError::OutOfWindow { .. } => RPC_OUT_OF_WINDOW,
        LookupError::MalformedQuery { .. } => RPC_MALFORMED_QUERY,
        LookupError::Halted(_) => RPC_HISTORY_HALTED,
        LookupError::MissingEntry(_) => RPC_MISSING_ENTRY,
    };
    ErrorObjectOwned::owned(code, e.to_string(), Some(e.kind()))
}

fn node_error(e: &NodeError) -> ErrorObjectOwned {
    match e {
        NodeError::History(HistoryError::Lookup(e)) => lookup_error(e),
        NodeError::History(HistoryError::Halted(_) | HistoryError::NoSource) => {
            rpc_error(RPC_HISTORY_HALTED, &e.to_string())
        }
        NodeError::History(_) => rpc_error(RPC_EVENT_REJECTED, &e.to_string()),
        NodeError::Config(_) | NodeError::Rpc(_) => rpc_error(RPC_MISC_ERROR, &e.to_string()),
    }
}

/// The history JSON-RPC interface.
#[rpc(server)]
pub trait HistoryRpc {
    /// Returns the chain tip height.
    #[method(name = "getblockcount")]
    async fn get_block_count(&self) -> Result<u64, ErrorObjectOwned>;

    /// Returns the chain tip hash.
    #[method(name = "getbestblockhash")]
    async fn get_best_block_hash(&self) -> Result<String, ErrorObjectOwned>;

    /// Returns the windowed hash of the block at `height`.
    #[method(name = "gethistoricalblockhash")]
    async fn get_historical_block_hash(&self, height: u64) -> Result<String, ErrorObjectOwned>;

    /// Raw boundary call: a hex-encoded 32-byte query word.
    #[method(name = "callhistory")]
    async fn call_history(&self, input: String) -> Result<CallResultJson, ErrorObjectOwned>;

    /// Returns window, activation and halt state.
    #[method(name = "gethistoryinfo")]
    async fn get_history_info(&self) -> Result<HistoryInfoJson, ErrorObjectOwned>;

    /// Notifies a block connected on top of the tip.
    #[method(name = "connectblock")]
    async fn connect_block(
        &self,
        height: u64,
        hash: String,
        parent_hash: String,
    ) -> Result<ReconcileJson, ErrorObjectOwned>;

    /// Notifies the tip was disconnected.
    #[method(name = "disconnectblock")]
    async fn disconnect_block(
        &self,
        height: u64,
        hash: String,
        parent_hash: String,
    ) -> Result<ReconcileJson, ErrorObjectOwned>;

    /// Notifies a branch switch.
    #[method(name = "reorgchain")]
    async fn reorg_chain(
        &self,
        disconnected: Vec<BlockRefJson>,
        connected: Vec<BlockRefJson>,
    ) -> Result<ReconcileJson, ErrorObjectOwned>;

    /// Rebuilds the history window from the chain.
    #[method(name = "resynchistory")]
    async fn resync_history(&self) -> Result<HistoryInfoJson, ErrorObjectOwned>;
}

/// Implementation of the history JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl HistoryRpcServer for RpcServerImpl {
    async fn get_block_count(&self) -> Result<u64, ErrorObjectOwned> {
        let (height, _) = self
            .node
            .chain_tip()
            .ok_or_else(|| rpc_error(RPC_MISC_ERROR, "chain is empty"))?;
        Ok(height)
    }

    async fn get_best_block_hash(&self) -> Result<String, ErrorObjectOwned> {
        let (_, hash) = self
            .node
            .chain_tip()
            .ok_or_else(|| rpc_error(RPC_MISC_ERROR, "chain is empty"))?;
        Ok(hash.to_hex())
    }

    async fn get_historical_block_hash(&self, height: u64) -> Result<String, ErrorObjectOwned> {
        let hash = self.node.lookup(height).map_err(|e| lookup_error(&e))?;
        Ok(hash.to_hex())
    }

    async fn call_history(&self, input: String) -> Result<CallResultJson, ErrorObjectOwned> {
        let raw = input.strip_prefix("0x").unwrap_or(&input);
        let bytes =
            hex::decode(raw).map_err(|_| rpc_error(RPC_INVALID_PARAMETER, "invalid hex encoding"))?;
        Ok(match self.node.call(&bytes) {
            Ok(word) => CallResultJson {
                excepted: "None".to_string(),
                output: hex::encode(word),
            },
            Err(e) => CallResultJson {
                excepted: e.kind().to_string(),
                output: String::new(),
            },
        })
    }

    async fn get_history_info(&self) -> Result<HistoryInfoJson, ErrorObjectOwned> {
        Ok(self.node.info().into())
    }

    async fn connect_block(
        &self,
        height: u64,
        hash: String,
        parent_hash: String,
    ) -> Result<ReconcileJson, ErrorObjectOwned> {
        let block = BlockRef::new(height, parse_hash(&hash)?, parse_hash(&parent_hash)?);
        let outcome = self
            .node
            .process_connect(block)
            .map_err(|e| node_error(&e))?;
        Ok(outcome.into())
    }

    async fn disconnect_block(
        &self,
        height: u64,
        hash: String,
        parent_hash: String,
    ) -> Result<ReconcileJson, ErrorObjectOwned> {
        let block = BlockRef::new(height, parse_hash(&hash)?, parse_hash(&parent_hash)?);
        let outcome = self
            .node
            .process_disconnect(block)
            .map_err(|e| node_error(&e))?;
        Ok(outcome.into())
    }

    async fn reorg_chain(
        &self,
        disconnected: Vec<BlockRefJson>,
        connected: Vec<BlockRefJson>,
    ) -> Result<ReconcileJson, ErrorObjectOwned> {
        let reorg = ReorgEvent {
            disconnected: disconnected
                .iter()
                .map(BlockRefJson::parse)
                .collect::<Result<_, _>>()?,
            connected: connected
                .iter()
                .map(BlockRefJson::parse)
                .collect::<Result<_, _>>()?,
        };
        let outcome = self
            .node
            .process_reorg(reorg)
            .map_err(|e| node_error(&e))?;
        Ok(outcome.into())
    }

    async fn resync_history(&self) -> Result<HistoryInfoJson, ErrorObjectOwned> {
        self.node.resync().map_err(|e| node_error(&e))?;
        Ok(self.node.info().into())
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns a [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, NodeError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| NodeError::Rpc(e.to_string()))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockhist_core::activation::ActivationState;
    use blockhist_core::store::WindowRange;
    use blockhist_core::tracker::ChainTip;

    #[test]
    fn parse_hash_valid() {
        let hash = parse_hash(&"aa".repeat(32)).unwrap();
        assert_eq!(hash, Hash256([0xAA; 32]));
        let prefixed = parse_hash(&format!("0x{}", "00".repeat(32))).unwrap();
        assert_eq!(prefixed, Hash256::ZERO);
    }

    #[test]
    fn parse_hash_wrong_length() {
        let err = parse_hash("abcdef").unwrap_err();
        assert_eq!(err.code(), RPC_INVALID_PARAMETER);
        assert!(err.message().contains("64 hex characters"));
    }

    #[test]
    fn parse_hash_invalid_hex() {
        let err = parse_hash(&"zz".repeat(32)).unwrap_err();
        assert!(err.message().contains("invalid hex"));
    }

    #[test]
    fn lookup_errors_have_distinct_codes() {
        let errors = [
            LookupError::NotActivated { tip: Some(1), activation_height: 2500 },
            LookupError::FutureBlock { requested: 2501, tip: 2500 },
            LookupError::OutOfWindow { requested: 2550, oldest: 2551 },
            LookupError::MalformedQuery { len: 31 },
            LookupError::Halted("x".into()),
            LookupError::MissingEntry(7),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| lookup_error(e).code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());

        let err = lookup_error(&LookupError::FutureBlock { requested: 2501, tip: 2500 });
        assert_eq!(err.code(), RPC_FUTURE_BLOCK);
        assert_eq!(err.data().map(|d| d.get()), Some("\"FutureBlock\""));
    }

    #[test]
    fn block_ref_json_round_trips() {
        let block = BlockRef::new(9, Hash256([1; 32]), Hash256([2; 32]));
        let json = BlockRefJson::from(&block);
        assert_eq!(json.parse().unwrap(), block);
    }

    #[test]
    fn history_info_json_serializes() {
        let info = HistoryInfo {
            window_size: 8191,
            boundary: WindowBoundary::IncludeTip,
            activation_height: 2500,
            state: ActivationState::Enabled,
            tip: Some(ChainTip { height: 2600, hash: Hash256([0xAB; 32]) }),
            range: Some(WindowRange { oldest: 0, newest: 2600 }),
            live_entries: 2601,
            capacity: 8320,
            halted: None,
        };
        let json = serde_json::to_value(HistoryInfoJson::from(info)).unwrap();
        assert_eq!(json["boundary"], "include-tip");
        assert_eq!(json["enabled"], true);
        assert_eq!(json["tip_height"], 2600);
        assert_eq!(json["newest"], 2600);
        assert!(json["halted"].is_null());
    }

    #[test]
    fn call_result_json_serializes() {
        let result = CallResultJson {
            excepted: "None".into(),
            output: "ab".repeat(32),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"excepted\":\"None\""));
    }
}
