//! Node composition.
//!
//! The [`Node`] keeps the canonical chain and the history service side by
//! side. Consensus notifications update the chain first, then the service.
//! The [`NodeCanonicalChain`] adapter bridges the chain (behind a `RwLock`) to
//! the read-only [`CanonicalChain`] trait the service backfills and resyncs from.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{info, warn};

use blockhist_core::chain::MemoryChain;
use blockhist_core::error::{HistoryError, LookupError};
use blockhist_core::reconciler::ReconcileOutcome;
use blockhist_core::service::{HistoryInfo, HistoryService};
use blockhist_core::tracker::ChainTip;
use blockhist_core::traits::CanonicalChain;
use blockhist_core::types::{BlockRef, ChainEvent, Hash256, ReorgEvent};

use crate::config::NodeConfig;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("rpc server: {0}")]
    Rpc(String),
}

/// Adapter bridging `MemoryChain` (behind `RwLock`) to the read-only `CanonicalChain` trait.
///
/// Takes a read lock on each call.
pub struct NodeCanonicalChain {
    chain: Arc<RwLock<MemoryChain>>,
}

impl NodeCanonicalChain {
    pub fn new(chain: Arc<RwLock<MemoryChain>>) -> Self {
        Self { chain }
    }
}

impl CanonicalChain for NodeCanonicalChain {
    fn chain_tip(&self) -> Result<Option<(u64, Hash256)>, HistoryError> {
        self.chain.read().chain_tip()
    }

    fn block_hash(&self, height: u64) -> Result<Option<Hash256>, HistoryError> {
        self.chain.read().block_hash(height)
    }
}

/// Canonical chain plus the history service it feeds.
pub struct Node {
    chain: Arc<RwLock<MemoryChain>>,
    history: Arc<HistoryService>,
    /// Serializes chain events and resyncs.
    writer: Mutex<()>,
    config: NodeConfig,
}

impl Node {
    /// Create a node with an empty chain.
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        Self::with_chain(config, MemoryChain::new())
    }

    /// Create a node over an existing chain; the history window is built from it.
    pub fn with_chain(config: NodeConfig, chain: MemoryChain) -> Result<Arc<Self>, NodeError> {
        let chain = Arc::new(RwLock::new(chain));
        let source: Arc<dyn CanonicalChain> =
            Arc::new(NodeCanonicalChain::new(Arc::clone(&chain)));
        let history = Arc::new(HistoryService::with_source(&config.history, source)?);

        Ok(Arc::new(Self {
            chain,
            history,
            writer: Mutex::new(()),
            config,
        }))
    }

    /// Apply a consensus notification to the chain, then to the history window.
    ///
    /// The chain rejects events that do not link up; nothing changes then.
    /// If the chain accepts an event the history service cannot reconcile,
    /// the service halts until [`resync`](Self::resync).
    pub fn process_event(&self, event: &ChainEvent) -> Result<ReconcileOutcome, NodeError> {
        let _guard = self.writer.lock();
        self.chain
            .write()
            .apply(event)
            .map_err(HistoryError::from)?;
        let outcome = self.history.apply(event)?;
        Ok(outcome)
    }

    pub fn process_connect(&self, block: BlockRef) -> Result<ReconcileOutcome, NodeError> {
        self.process_event(&ChainEvent::Connected(block))
    }

    pub fn process_disconnect(&self, block: BlockRef) -> Result<ReconcileOutcome, NodeError> {
        self.process_event(&ChainEvent::Disconnected(block))
    }

    pub fn process_reorg(&self, reorg: ReorgEvent) -> Result<ReconcileOutcome, NodeError> {
        self.process_event(&ChainEvent::Reorg(reorg))
    }

    /// Make `branch` canonical, deriving the disconnected side from the chain.
    pub fn switch_branch(&self, branch: Vec<BlockRef>) -> Result<ReorgEvent, NodeError> {
        let _guard = self.writer.lock();
        let reorg = self
            .chain
            .write()
            .reorg_to(branch)
            .map_err(HistoryError::from)?;
        self.history.apply(&ChainEvent::Reorg(reorg.clone()))?;
        Ok(reorg)
    }

    /// Rebuild the history window from the chain and clear any halt.
    pub fn resync(&self) -> Result<Option<ChainTip>, NodeError> {
        let _guard = self.writer.lock();
        if let Some(reason) = self.history.halted() {
            warn!(%reason, "resyncing halted history service");
        }
        let tip = self.history.resync()?;
        info!(tip = tip.map(|t| t.height), "history resync complete");
        Ok(tip)
    }

    pub fn lookup(&self, height: u64) -> Result<Hash256, LookupError> {
        self.history.lookup(height)
    }

    /// Raw 32-byte boundary call.
    pub fn call(&self, input: &[u8]) -> Result<[u8; 32], LookupError> {
        self.history.lookup_word(input)
    }

    /// Canonical chain tip as `(height, hash)`.
    pub fn chain_tip(&self) -> Option<(u64, Hash256)> {
        self.chain.read().tip().map(|b| (b.height, b.hash))
    }

    /// Canonical hash at `height`, regardless of the history window.
    pub fn block_hash(&self, height: u64) -> Option<Hash256> {
        self.chain.read().block_at(height).map(|b| b.hash)
    }

    pub fn info(&self) -> HistoryInfo {
        self.history.info()
    }

    pub fn history(&self) -> &Arc<HistoryService> {
        &self.history
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
