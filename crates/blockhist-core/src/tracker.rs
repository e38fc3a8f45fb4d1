//! Chain tip tracker: follows connect/disconnect notifications and checks
//! that each one fits the chain we already know.
//!
//! Validation is split from mutation: [`ChainTipTracker::simulate`] walks a
//! whole event against a copy of the tip and reports the resulting tip, so a
//! bad event is rejected before anything observable changes.

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::types::{BlockRef, Hash256, ReorgEvent};

/// Height and hash of the canonical head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash256,
}

impl From<&BlockRef> for ChainTip {
    fn from(block: &BlockRef) -> Self {
        Self {
            height: block.height,
            hash: block.hash,
        }
    }
}

/// Tracks the canonical tip. Only ever moved by chain events.
#[derive(Debug, Clone, Default)]
pub struct ChainTipTracker {
    tip: Option<ChainTip>,
}

impl ChainTipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known tip (bootstrap / resync).
    pub fn with_tip(tip: Option<ChainTip>) -> Self {
        Self { tip }
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.tip
    }

    pub fn height(&self) -> Option<u64> {
        self.tip.map(|t| t.height)
    }

    /// Validate that `block` extends `tip`.
    fn check_connect(tip: Option<ChainTip>, block: &BlockRef) -> Result<(), ReconcileError> {
        match tip {
            None if block.height != 0 => Err(ReconcileError::HeightMismatch {
                expected: 0,
                got: block.height,
            }),
            None => Ok(()),
            Some(tip) if block.height != tip.height + 1 => Err(ReconcileError::HeightMismatch {
                expected: tip.height + 1,
                got: block.height,
            }),
            Some(tip) if block.parent_hash != tip.hash => Err(ReconcileError::ParentMismatch {
                height: block.height,
                expected: tip.hash.to_string(),
                got: block.parent_hash.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Validate that `block` is `tip` and return the tip left behind.
    fn check_disconnect(
        tip: Option<ChainTip>,
        block: &BlockRef,
    ) -> Result<Option<ChainTip>, ReconcileError> {
        let tip = tip.ok_or(ReconcileError::EmptyChain)?;
        if tip.height != block.height || tip.hash != block.hash {
            return Err(ReconcileError::NotTip {
                height: block.height,
                tip: tip.hash.to_string(),
                got: block.hash.to_string(),
            });
        }
        Ok(block.height.checked_sub(1).map(|height| ChainTip {
            height,
            hash: block.parent_hash,
        }))
    }

    /// Walk `event` against the current tip without changing it.
    ///
    /// Returns the tip the chain ends at.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::EmptyChain`] if a disconnect arrives with no tip
    /// - [`ReconcileError::NotTip`] if a disconnected block is not the tip at that point
    /// - [`ReconcileError::HeightMismatch`] / [`ReconcileError::ParentMismatch`] if a
    ///   connected block does not extend the tip at that point
    pub fn simulate(&self, event: &ReorgEvent) -> Result<Option<ChainTip>, ReconcileError> {
        let mut tip = self.tip;
        for block in &event.disconnected {
            tip = Self::check_disconnect(tip, block)?;
        }
        for block in &event.connected {
            Self::check_connect(tip, block)?;
            tip = Some(ChainTip::from(block));
        }
        Ok(tip)
    }

    /// Lowest height the event touches, i.e. the fork point's child.
    pub fn lowest_touched(event: &ReorgEvent) -> Option<u64> {
        let low_disconnect = event.disconnected.last().map(|b| b.height);
        let low_connect = event.connected.first().map(|b| b.height);
        match (low_disconnect, low_connect) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Apply a validated event's outcome.
    pub(crate) fn set_tip(&mut self, tip: Option<ChainTip>) {
        self.tip = tip;
    }
}
