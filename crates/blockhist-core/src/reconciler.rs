//! Reorg reconciler: applies chain events to the tracker and store as one unit.
//!
//! Every event is handled in two phases.
//!
//! 1. **Plan**: walk the event against the tracker ([`ChainTipTracker::simulate`])
//!    and work out which heights re-enter the window from below without being
//!    carried by the event itself. Those are read from the canonical source.
//!    Nothing is mutated here, so any failure leaves the window as it was.
//! 2. **Commit**: rewind past the disconnected blocks, write the connected and
//!    backfilled ones, then move the tip.
//!
//! Plain connects and disconnects are the degenerate reorgs with one side empty.

use tracing::debug;

use crate::error::ReconcileError;
use crate::store::{HistoryStore, HistoryWindow, WindowRange};
use crate::tracker::{ChainTip, ChainTipTracker};
use crate::traits::CanonicalChain;
use crate::types::{ChainEvent, Hash256, ReorgEvent};

/// Summary of one applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Tip after the event.
    pub tip: Option<ChainTip>,
    pub disconnected: u64,
    pub connected: u64,
    /// Heights re-read from the canonical source.
    pub backfilled: u64,
}

/// Applies events against an optional canonical source.
pub struct ReorgReconciler<'a> {
    source: Option<&'a dyn CanonicalChain>,
}

impl<'a> ReorgReconciler<'a> {
    pub fn new(source: Option<&'a dyn CanonicalChain>) -> Self {
        Self { source }
    }

    /// Apply any chain event.
    pub fn apply_event(
        &self,
        tracker: &mut ChainTipTracker,
        store: &mut HistoryStore,
        event: &ChainEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match event {
            ChainEvent::Connected(block) => {
                let reorg = ReorgEvent {
                    disconnected: vec![],
                    connected: vec![*block],
                };
                self.apply(tracker, store, &reorg)
            }
            ChainEvent::Disconnected(block) => {
                let reorg = ReorgEvent {
                    disconnected: vec![*block],
                    connected: vec![],
                };
                self.apply(tracker, store, &reorg)
            }
            ChainEvent::Reorg(reorg) => self.apply(tracker, store, reorg),
        }
    }

    /// Apply a branch switch.
    ///
    /// # Errors
    ///
    /// Any [`ReconcileError`] from validation, or
    /// [`ReconcileError::BackfillUnavailable`] / [`ReconcileError::Source`] when a
    /// height re-entering the window cannot be re-read. On error neither the
    /// tracker nor the store has been touched.
    pub fn apply(
        &self,
        tracker: &mut ChainTipTracker,
        store: &mut HistoryStore,
        event: &ReorgEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        // Plan.
        let new_tip = tracker.simulate(event)?;
        let old_range = store.range();
        let new_range = new_tip.and_then(|tip| store.window().range(tip.height));
        let backfill = self.plan_backfill(store, old_range, new_range, event)?;

        // Commit.
        for block in &event.disconnected {
            store.rewind(block.height.checked_sub(1));
        }
        // Ascending, so in every slot the highest connected height wins and no
        // abandoned-branch tag survives above the fork.
        for block in &event.connected {
            store.put(block.height, block.hash);
        }
        for (height, hash) in &backfill {
            store.put(*height, *hash);
        }
        store.rewind(new_tip.map(|tip| tip.height));
        tracker.set_tip(new_tip);

        if !backfill.is_empty() {
            debug!(
                count = backfill.len(),
                from = backfill.first().map(|(h, _)| *h),
                to = backfill.last().map(|(h, _)| *h),
                "backfilled window from canonical source"
            );
        }

        Ok(ReconcileOutcome {
            tip: new_tip,
            disconnected: event.disconnected.len() as u64,
            connected: event.connected.len() as u64,
            backfilled: backfill.len() as u64,
        })
    }

    /// Heights that enter the new window from below, are not carried by the
    /// event, and are no longer held by their slot.
    fn plan_backfill(
        &self,
        store: &HistoryStore,
        old_range: Option<WindowRange>,
        new_range: Option<WindowRange>,
        event: &ReorgEvent,
    ) -> Result<Vec<(u64, Hash256)>, ReconcileError> {
        let Some(new) = new_range else {
            return Ok(Vec::new());
        };
        let upper = match old_range {
            Some(old) if new.oldest >= old.oldest => return Ok(Vec::new()),
            Some(old) => new.newest.min(old.oldest - 1),
            None => new.newest,
        };
        let carried = |height: u64| {
            matches!(
                (event.connected.first(), event.connected.last()),
                (Some(lo), Some(hi)) if lo.height <= height && height <= hi.height
            )
        };

        store
            .missing(new.oldest, upper)
            .into_iter()
            .filter(|h| !carried(*h))
            .map(|height| self.fetch(height).map(|hash| (height, hash)))
            .collect()
    }

    fn fetch(&self, height: u64) -> Result<Hash256, ReconcileError> {
        let source = self
            .source
            .ok_or(ReconcileError::BackfillUnavailable(height))?;
        source
            .block_hash(height)
            .map_err(|e| ReconcileError::Source(e.to_string()))?
            .ok_or(ReconcileError::BackfillUnavailable(height))
    }

    /// Build a fresh tracker and store from the canonical source.
    ///
    /// Fills the whole ring (served window plus slack) so that shallow
    /// disconnects right after a resync need no further reads.
    pub fn rebuild(
        source: &dyn CanonicalChain,
        window: HistoryWindow,
        reorg_slack: u64,
    ) -> Result<(ChainTipTracker, HistoryStore), ReconcileError> {
        let mut store = HistoryStore::new(window, reorg_slack);
        let tip = source
            .chain_tip()
            .map_err(|e| ReconcileError::Source(e.to_string()))?;
        let Some((height, hash)) = tip else {
            return Ok((ChainTipTracker::new(), store));
        };

        let reconciler = ReorgReconciler::new(Some(source));
        let low = height.saturating_sub(store.capacity() - 1);
        for h in low..height {
            store.put(h, reconciler.fetch(h)?);
        }
        store.put(height, hash);

        let tracker = ChainTipTracker::with_tip(Some(ChainTip { height, hash }));
        Ok((tracker, store))
    }
}
