//! Shared test helpers for E2E and integration tests.

use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use blockhist_core::chain::MemoryChain;
use blockhist_core::service::HistoryConfig;
use blockhist_core::store::WindowBoundary;
use blockhist_core::traits::{CallOutcome, HistoryCall};
use blockhist_core::types::{BlockRef, Hash256};
use blockhist_node_lib::config::NodeConfig;
use blockhist_node_lib::node::{Node, NodeCanonicalChain};

/// Deterministic hash for the block at `height` on `branch`.
pub fn block_hash(branch: u8, height: u64) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(b"blockhist-test");
    hasher.update([branch]);
    hasher.update(height.to_le_bytes());
    Hash256(hasher.finalize().into())
}

/// Blocks `from..=to` of `branch`, the first hanging off `parent`.
pub fn make_branch(branch: u8, from: u64, to: u64, parent: Hash256) -> Vec<BlockRef> {
    let mut prev = parent;
    (from..=to)
        .map(|height| {
            let block = BlockRef::new(height, block_hash(branch, height), prev);
            prev = block.hash;
            block
        })
        .collect()
}

/// Chain of `branch` blocks from genesis to `tip`.
pub fn make_chain(branch: u8, tip: u64) -> MemoryChain {
    let mut chain = MemoryChain::new();
    for block in make_branch(branch, 0, tip, Hash256::ZERO) {
        chain
            .connect(block)
            .unwrap_or_else(|e| panic!("building test chain: {e}"));
    }
    chain
}

/// Chain behind a lock plus the adapter the history service reads it through.
pub fn shared_chain(chain: MemoryChain) -> (Arc<RwLock<MemoryChain>>, Arc<NodeCanonicalChain>) {
    let chain = Arc::new(RwLock::new(chain));
    let source = Arc::new(NodeCanonicalChain::new(Arc::clone(&chain)));
    (chain, source)
}

pub fn history_config(
    activation_height: u64,
    window_size: u64,
    reorg_slack: u64,
    boundary: WindowBoundary,
) -> HistoryConfig {
    HistoryConfig {
        activation_height,
        window_size,
        reorg_slack,
        boundary,
    }
}

/// Node with an empty chain and the given history settings.
pub fn test_node(history: HistoryConfig) -> Arc<Node> {
    let config = NodeConfig {
        history,
        ..NodeConfig::default()
    };
    Node::new(config).unwrap_or_else(|e| panic!("starting test node: {e}"))
}

/// Connect `count` new `branch` blocks on top of the node's tip.
pub fn mine(node: &Node, branch: u8, count: u64) {
    for _ in 0..count {
        let (height, parent) = match node.chain_tip() {
            Some((height, hash)) => (height + 1, hash),
            None => (0, Hash256::ZERO),
        };
        node.process_connect(BlockRef::new(height, block_hash(branch, height), parent))
            .unwrap_or_else(|e| panic!("connecting block {height}: {e}"));
    }
}

/// Mine until the tip is at `height`.
pub fn mine_to(node: &Node, branch: u8, height: u64) {
    let next = node.chain_tip().map_or(0, |(tip, _)| tip + 1);
    if height >= next {
        mine(node, branch, height - next + 1);
    }
}

/// Boundary that drops the last byte of every successful answer.
pub struct TruncatingBoundary<C>(pub C);

impl<C: HistoryCall> HistoryCall for TruncatingBoundary<C> {
    fn call(&self, input: &[u8]) -> CallOutcome {
        let mut outcome = self.0.call(input);
        outcome.output.pop();
        outcome
    }
}
