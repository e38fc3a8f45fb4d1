//! Historical hash store: a tagged-slot ring keyed by height.
//!
//! Each slot holds `(absolute_height, hash)`. A height maps to slot
//! `height % capacity`, and a read only trusts the slot when its tag equals
//! the requested height, so wrap-around and abandoned branches can never be
//! served by accident.
//!
//! The ring is physically larger than the served window:
//!
//! ```text
//! capacity = window + 1 + reorg_slack
//! ```
//!
//! The extra slot lets the tip-exclusive boundary keep `window + 1` heights
//! alive, and the slack keeps entries just below the window around so that a
//! shallow disconnect brings them back without re-reading the chain. Only the
//! heights inside [`HistoryWindow::range`] are ever returned.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_WINDOW_SIZE;
use crate::error::{ConfigError, LookupError};
use crate::types::Hash256;

/// Whether the current tip is part of the served window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowBoundary {
    /// Serve `[tip - W + 1, tip]`.
    #[default]
    IncludeTip,
    /// Serve `[tip - W, tip - 1]`; the tip itself counts as a future block.
    ExcludeTip,
}

/// Inclusive range of served heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRange {
    pub oldest: u64,
    pub newest: u64,
}

impl WindowRange {
    pub fn contains(&self, height: u64) -> bool {
        self.oldest <= height && height <= self.newest
    }

    /// Number of heights in the range.
    pub fn count(&self) -> u64 {
        self.newest - self.oldest + 1
    }
}

/// Window size and boundary policy. Pure arithmetic, no storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    size: u64,
    boundary: WindowBoundary,
}

impl HistoryWindow {
    pub fn new(size: u64, boundary: WindowBoundary) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowTooLarge(size));
        }
        Ok(Self { size, boundary })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn boundary(&self) -> WindowBoundary {
        self.boundary
    }

    /// Served heights at `tip`, or `None` when nothing is servable yet
    /// (tip-exclusive window at genesis).
    pub fn range(&self, tip: u64) -> Option<WindowRange> {
        match self.boundary {
            WindowBoundary::IncludeTip => Some(WindowRange {
                oldest: tip.saturating_sub(self.size - 1),
                newest: tip,
            }),
            WindowBoundary::ExcludeTip => tip.checked_sub(1).map(|newest| WindowRange {
                oldest: tip.saturating_sub(self.size),
                newest,
            }),
        }
    }

    /// Classify `height` against the window at `tip`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::FutureBlock`] if `height` is above the newest served height
    /// - [`LookupError::OutOfWindow`] if `height` is below the oldest served height
    pub fn check(&self, tip: u64, height: u64) -> Result<(), LookupError> {
        let Some(range) = self.range(tip) else {
            return Err(LookupError::FutureBlock {
                requested: height,
                tip,
            });
        };
        if height > range.newest {
            return Err(LookupError::FutureBlock {
                requested: height,
                tip,
            });
        }
        if height < range.oldest {
            return Err(LookupError::OutOfWindow {
                requested: height,
                oldest: range.oldest,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    height: u64,
    hash: Hash256,
}

/// Fixed-capacity ring of canonical hashes for the trailing window.
///
/// Not thread-safe on its own; the lookup service wraps it in a `RwLock`
/// together with the tip tracker.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    window: HistoryWindow,
    slots: Vec<Option<Slot>>,
    /// Tip the served range is computed from. `None` before the first block.
    tip: Option<u64>,
}

impl HistoryStore {
    /// `reorg_slack` is expected to be bounded by
    /// [`HistoryConfig::validate`](crate::service::HistoryConfig::validate).
    pub fn new(window: HistoryWindow, reorg_slack: u64) -> Self {
        let capacity = window.size().saturating_add(1).saturating_add(reorg_slack) as usize;
        Self {
            window,
            slots: vec![None; capacity],
            tip: None,
        }
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    /// Physical slot count (served window plus retained slack).
    pub fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    pub fn tip(&self) -> Option<u64> {
        self.tip
    }

    /// Currently served heights.
    pub fn range(&self) -> Option<WindowRange> {
        self.tip.and_then(|tip| self.window.range(tip))
    }

    fn index(&self, height: u64) -> usize {
        (height % self.capacity()) as usize
    }

    /// Upsert the hash for `height`.
    ///
    /// Writing above the current tip advances it, which slides the window and
    /// stops serving whatever fell below it in the same step.
    pub fn put(&mut self, height: u64, hash: Hash256) {
        let index = self.index(height);
        self.slots[index] = Some(Slot { height, hash });
        if self.tip.is_none_or(|tip| height > tip) {
            self.tip = Some(height);
        }
    }

    /// Lower the tip after a disconnect. Never raises it.
    ///
    /// Slots above the new tip keep their bytes but fall out of the served
    /// range; the next `put` at that height overwrites them.
    pub fn rewind(&mut self, tip: Option<u64>) {
        self.tip = self.tip.zip(tip).map(|(current, new)| current.min(new));
    }

    /// Served hash for `height`, if it lies in the window and the slot holds it.
    pub fn get(&self, height: u64) -> Option<Hash256> {
        if !self.range()?.contains(height) {
            return None;
        }
        self.peek(height)
    }

    /// Slot content for `height` regardless of the served range.
    pub fn peek(&self, height: u64) -> Option<Hash256> {
        match self.slots[self.index(height)] {
            Some(slot) if slot.height == height => Some(slot.hash),
            _ => None,
        }
    }

    /// Heights in `[from, to]` whose slot no longer holds them.
    pub fn missing(&self, from: u64, to: u64) -> Vec<u64> {
        if from > to {
            return Vec::new();
        }
        (from..=to).filter(|h| self.peek(*h).is_none()).collect()
    }

    /// Number of served heights that currently resolve.
    pub fn live_entries(&self) -> u64 {
        match self.range() {
            Some(range) => (range.oldest..=range.newest)
                .filter(|h| self.peek(*h).is_some())
                .count() as u64,
            None => 0,
        }
    }

    /// Drop every entry and the tip.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.tip = None;
    }
}
