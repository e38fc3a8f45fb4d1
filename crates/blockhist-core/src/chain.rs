//! In-memory canonical chain.
//!
//! Holds the canonical `BlockRef` at every height and enforces the same
//! linkage rules as the tip tracker. Serves as the [`CanonicalChain`] source
//! for bootstrap, resync and backfill, and as the chain model in tests.

use crate::error::{ChainError, HistoryError};
use crate::traits::CanonicalChain;
use crate::types::{BlockRef, ChainEvent, Hash256, ReorgEvent};

/// Canonical chain, indexed by height. No persistence, unbounded growth.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    blocks: Vec<BlockRef>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tip block.
    pub fn tip(&self) -> Option<&BlockRef> {
        self.blocks.last()
    }

    pub fn height(&self) -> Option<u64> {
        self.tip().map(|b| b.height)
    }

    /// Canonical block at `height`.
    pub fn block_at(&self, height: u64) -> Option<&BlockRef> {
        usize::try_from(height).ok().and_then(|i| self.blocks.get(i))
    }

    /// Number of connected blocks (tip height + 1).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Check that `branch` can replace everything from height `base` upward.
    fn check_branch(&self, base: usize, branch: &[BlockRef]) -> Result<(), ChainError> {
        let mut prev = base.checked_sub(1).and_then(|i| self.blocks.get(i)).copied();
        let mut expected = base as u64;
        for block in branch {
            if block.height != expected {
                return Err(ChainError::HeightMismatch {
                    expected,
                    got: block.height,
                });
            }
            match prev {
                Some(parent) if block.parent_hash != parent.hash => {
                    return Err(ChainError::ParentMismatch {
                        height: block.height,
                        expected: parent.hash.to_string(),
                        got: block.parent_hash.to_string(),
                    });
                }
                _ => {}
            }
            prev = Some(*block);
            expected += 1;
        }
        Ok(())
    }

    /// Connect a block on top of the tip.
    pub fn connect(&mut self, block: BlockRef) -> Result<(), ChainError> {
        self.check_branch(self.blocks.len(), std::slice::from_ref(&block))?;
        self.blocks.push(block);
        Ok(())
    }

    /// Remove and return the tip.
    pub fn disconnect_tip(&mut self) -> Result<BlockRef, ChainError> {
        self.blocks.pop().ok_or(ChainError::EmptyChain)
    }

    /// Make `branch` canonical, replacing every block at or above its first height.
    ///
    /// Returns the event describing the switch, ready to hand to the history
    /// service.
    pub fn reorg_to(&mut self, branch: Vec<BlockRef>) -> Result<ReorgEvent, ChainError> {
        let first = branch.first().ok_or(ChainError::EmptyBranch)?;
        let base = usize::try_from(first.height)
            .ok()
            .filter(|base| *base <= self.blocks.len())
            .ok_or(ChainError::UnknownForkPoint(first.height))?;
        self.check_branch(base, &branch)?;

        let mut disconnected = self.blocks.split_off(base);
        disconnected.reverse();
        self.blocks.extend_from_slice(&branch);
        Ok(ReorgEvent {
            disconnected,
            connected: branch,
        })
    }

    /// Apply a notification produced elsewhere. All-or-nothing.
    pub fn apply(&mut self, event: &ChainEvent) -> Result<(), ChainError> {
        match event {
            ChainEvent::Connected(block) => self.connect(*block),
            ChainEvent::Disconnected(block) => {
                if self.tip() != Some(block) {
                    return Err(ChainError::NotTip(block.height));
                }
                self.disconnect_tip().map(|_| ())
            }
            ChainEvent::Reorg(reorg) => {
                for (depth, block) in reorg.disconnected.iter().enumerate() {
                    let at = self.blocks.len().checked_sub(depth + 1);
                    if at.and_then(|i| self.blocks.get(i)) != Some(block) {
                        return Err(ChainError::NotTip(block.height));
                    }
                }
                let base = self.blocks.len() - reorg.disconnected.len();
                self.check_branch(base, &reorg.connected)?;
                self.blocks.truncate(base);
                self.blocks.extend_from_slice(&reorg.connected);
                Ok(())
            }
        }
    }
}

impl CanonicalChain for MemoryChain {
    fn chain_tip(&self) -> Result<Option<(u64, Hash256)>, HistoryError> {
        Ok(self.tip().map(|b| (b.height, b.hash)))
    }

    fn block_hash(&self, height: u64) -> Result<Option<Hash256>, HistoryError> {
        Ok(self.block_at(height).map(|b| b.hash))
    }
}
