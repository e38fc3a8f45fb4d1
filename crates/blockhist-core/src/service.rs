//! Lookup service: the externally callable read path plus the write path
//! that feeds it chain events.
//!
//! Tracker, store and halt flag live together behind one `parking_lot::RwLock`.
//! Each chain event is validated and applied under a single write guard, so a
//! lookup sees either the whole pre-event window or the whole post-event one.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::activation::{ActivationGate, ActivationState};
use crate::codec::{decode_query, encode_response};
use crate::constants::{
    DEFAULT_ACTIVATION_HEIGHT, DEFAULT_REORG_SLACK, HISTORY_SERVE_WINDOW, MAX_REORG_SLACK,
    WORD_SIZE,
};
use crate::error::{ConfigError, HistoryError, LookupError};
use crate::reconciler::{ReconcileOutcome, ReorgReconciler};
use crate::store::{HistoryStore, HistoryWindow, WindowBoundary, WindowRange};
use crate::tracker::{ChainTip, ChainTipTracker};
use crate::traits::{CallOutcome, CanonicalChain, HistoryCall};
use crate::types::{ChainEvent, Hash256};

/// Startup parameters of the history service. Immutable once the service is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Lowest tip height at which lookups are answered.
    pub activation_height: u64,
    /// Number of trailing blocks served.
    pub window_size: u64,
    /// Extra ring slots kept below the window.
    pub reorg_slack: u64,
    pub boundary: WindowBoundary,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            activation_height: DEFAULT_ACTIVATION_HEIGHT,
            window_size: HISTORY_SERVE_WINDOW,
            reorg_slack: DEFAULT_REORG_SLACK,
            boundary: WindowBoundary::default(),
        }
    }
}

impl HistoryConfig {
    pub fn window(&self) -> Result<HistoryWindow, ConfigError> {
        HistoryWindow::new(self.window_size, self.boundary)
    }

    /// Check the window and the slack, returning the window on success.
    pub fn validate(&self) -> Result<HistoryWindow, ConfigError> {
        let window = self.window()?;
        if self.reorg_slack > MAX_REORG_SLACK {
            return Err(ConfigError::SlackTooLarge {
                slack: self.reorg_slack,
                max: MAX_REORG_SLACK,
            });
        }
        Ok(window)
    }
}

/// Snapshot of the service for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryInfo {
    pub window_size: u64,
    pub boundary: WindowBoundary,
    pub activation_height: u64,
    pub state: ActivationState,
    pub tip: Option<ChainTip>,
    /// Heights currently served, if any.
    pub range: Option<WindowRange>,
    pub live_entries: u64,
    pub capacity: u64,
    /// Reason lookups are halted, if they are.
    pub halted: Option<String>,
}

struct WindowState {
    tracker: ChainTipTracker,
    store: HistoryStore,
    halted: Option<String>,
}

/// Bounded-window historical block-hash service.
pub struct HistoryService {
    gate: ActivationGate,
    window: HistoryWindow,
    reorg_slack: u64,
    state: RwLock<WindowState>,
    source: Option<Arc<dyn CanonicalChain>>,
}

impl HistoryService {
    /// Empty service with no canonical source. The first event must connect genesis.
    pub fn new(config: &HistoryConfig) -> Result<Self, HistoryError> {
        let window = config.validate()?;
        Ok(Self {
            gate: ActivationGate::new(config.activation_height),
            window,
            reorg_slack: config.reorg_slack,
            state: RwLock::new(WindowState {
                tracker: ChainTipTracker::new(),
                store: HistoryStore::new(window, config.reorg_slack),
                halted: None,
            }),
            source: None,
        })
    }

    /// Service bootstrapped from `source`, which also backs later backfills
    /// and resyncs.
    pub fn with_source(
        config: &HistoryConfig,
        source: Arc<dyn CanonicalChain>,
    ) -> Result<Self, HistoryError> {
        let mut service = Self::new(config)?;
        service.source = Some(source);
        service.resync()?;
        Ok(service)
    }

    /// Apply one chain event.
    ///
    /// On any reconciliation failure the service halts: the error is returned,
    /// lookups fail with [`LookupError::Halted`], and further events are
    /// refused until [`resync`](Self::resync) succeeds.
    pub fn apply(&self, event: &ChainEvent) -> Result<ReconcileOutcome, HistoryError> {
        let mut state = self.state.write();
        if let Some(reason) = &state.halted {
            return Err(HistoryError::Halted(reason.clone()));
        }

        let reconciler = ReorgReconciler::new(self.source.as_deref());
        let WindowState {
            tracker,
            store,
            halted,
        } = &mut *state;
        match reconciler.apply_event(tracker, store, event) {
            Ok(outcome) => {
                log_applied(event, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "chain event rejected, halting history lookups");
                *halted = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Rebuild the window from the canonical source and clear any halt.
    ///
    /// The replacement is built without holding the lock. Callers must not
    /// apply events concurrently with a resync.
    pub fn resync(&self) -> Result<Option<ChainTip>, HistoryError> {
        let source = self.source.as_deref().ok_or(HistoryError::NoSource)?;
        let (tracker, store) = ReorgReconciler::rebuild(source, self.window, self.reorg_slack)?;
        let tip = tracker.tip();
        let live = store.live_entries();

        *self.state.write() = WindowState {
            tracker,
            store,
            halted: None,
        };
        info!(
            tip = tip.map(|t| t.height),
            live_entries = live,
            "history window rebuilt from canonical chain"
        );
        Ok(tip)
    }

    /// Canonical hash of block `height`.
    ///
    /// # Errors
    ///
    /// Checked in this order: [`LookupError::Halted`], [`LookupError::NotActivated`],
    /// [`LookupError::FutureBlock`], [`LookupError::OutOfWindow`],
    /// [`LookupError::MissingEntry`].
    pub fn lookup(&self, height: u64) -> Result<Hash256, LookupError> {
        let state = self.state.read();
        if let Some(reason) = &state.halted {
            return Err(LookupError::Halted(reason.clone()));
        }
        let tip = state.tracker.height();
        let Some(tip) = tip.filter(|t| self.gate.is_enabled(*t)) else {
            return Err(LookupError::NotActivated {
                tip,
                activation_height: self.gate.height(),
            });
        };
        self.window.check(tip, height)?;
        state
            .store
            .get(height)
            .ok_or(LookupError::MissingEntry(height))
    }

    /// Raw-word lookup: a 32-byte big-endian block number in, the 32-byte hash out.
    pub fn lookup_word(&self, input: &[u8]) -> Result<[u8; WORD_SIZE], LookupError> {
        let height = decode_query(input)?;
        self.lookup(height).map(|hash| encode_response(&hash))
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.state.read().tracker.tip()
    }

    pub fn activation_state(&self) -> ActivationState {
        self.gate.state(self.state.read().tracker.height())
    }

    pub fn is_enabled(&self) -> bool {
        self.activation_state() == ActivationState::Enabled
    }

    pub fn halted(&self) -> Option<String> {
        self.state.read().halted.clone()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn window(&self) -> HistoryWindow {
        self.window
    }

    pub fn info(&self) -> HistoryInfo {
        let state = self.state.read();
        let tip = state.tracker.tip();
        HistoryInfo {
            window_size: self.window.size(),
            boundary: self.window.boundary(),
            activation_height: self.gate.height(),
            state: self.gate.state(tip.map(|t| t.height)),
            tip,
            range: state.store.range(),
            live_entries: state.store.live_entries(),
            capacity: state.store.capacity(),
            halted: state.halted.clone(),
        }
    }
}

impl HistoryCall for HistoryService {
    fn call(&self, input: &[u8]) -> CallOutcome {
        match self.lookup_word(input) {
            Ok(word) => CallOutcome::success(word.to_vec()),
            Err(e) => {
                debug!(kind = e.kind(), error = %e, "history call failed");
                CallOutcome::failure()
            }
        }
    }
}

fn log_applied(event: &ChainEvent, outcome: &ReconcileOutcome) {
    match event {
        ChainEvent::Connected(block) => {
            debug!(height = block.height, hash = %block.hash, "block connected")
        }
        ChainEvent::Disconnected(block) => {
            info!(height = block.height, hash = %block.hash, "block disconnected")
        }
        ChainEvent::Reorg(reorg) => info!(
            depth = reorg.depth(),
            fork_height = reorg.fork_height(),
            connected = outcome.connected,
            backfilled = outcome.backfilled,
            tip = outcome.tip.map(|t| t.height),
            "reorg applied"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::codec::encode_query;
    use crate::types::{BlockRef, ReorgEvent};

    fn h(branch: u8, height: u64) -> Hash256 {
        let mut bytes = [branch; 32];
        bytes[..8].copy_from_slice(&height.to_be_bytes());
        Hash256(bytes)
    }

    fn config(activation_height: u64, window_size: u64) -> HistoryConfig {
        HistoryConfig {
            activation_height,
            window_size,
            reorg_slack: 4,
            boundary: WindowBoundary::IncludeTip,
        }
    }

    fn grow(service: &HistoryService, branch: u8, to: u64) {
        let from = service.tip().map_or(0, |t| t.height + 1);
        let mut parent = service.tip().map_or(Hash256::ZERO, |t| t.hash);
        for height in from..=to {
            let block = BlockRef::new(height, h(branch, height), parent);
            service.apply(&ChainEvent::Connected(block)).unwrap();
            parent = block.hash;
        }
    }

    #[test]
    fn default_config_uses_reference_window() {
        let config = HistoryConfig::default();
        assert_eq!(config.window_size, 8191);
        assert_eq!(config.boundary, WindowBoundary::IncludeTip);
        assert!(config.window().is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let err = HistoryService::new(&config(0, 0)).err().unwrap();
        assert!(matches!(err, HistoryError::Config(ConfigError::ZeroWindow)));
    }

    #[test]
    fn oversized_slack_rejected() {
        let config = HistoryConfig {
            reorg_slack: u64::MAX,
            ..HistoryConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SlackTooLarge { slack: u64::MAX, max: MAX_REORG_SLACK })
        );
        let err = HistoryService::new(&config).err().unwrap();
        assert!(matches!(
            err,
            HistoryError::Config(ConfigError::SlackTooLarge { .. })
        ));

        let at_limit = HistoryConfig {
            reorg_slack: MAX_REORG_SLACK,
            ..HistoryConfig::default()
        };
        let service = HistoryService::new(&at_limit).unwrap();
        assert_eq!(service.info().capacity, HISTORY_SERVE_WINDOW + 1 + MAX_REORG_SLACK);
    }

    #[test]
    fn empty_chain_is_not_activated() {
        let service = HistoryService::new(&config(0, 16)).unwrap();
        assert_eq!(
            service.lookup(0),
            Err(LookupError::NotActivated { tip: None, activation_height: 0 })
        );
        assert!(!service.is_enabled());
    }

    #[test]
    fn gate_precedes_window_checks() {
        let service = HistoryService::new(&config(20, 16)).unwrap();
        grow(&service, 1, 19);
        for height in [0, 10, 19, 20, 500] {
            assert!(matches!(
                service.lookup(height),
                Err(LookupError::NotActivated { tip: Some(19), activation_height: 20 })
            ));
        }
        grow(&service, 1, 20);
        assert_eq!(service.lookup(20), Ok(h(1, 20)));
        assert_eq!(service.activation_state(), ActivationState::Enabled);
    }

    #[test]
    fn lookup_classifies_heights() {
        let service = HistoryService::new(&config(0, 16)).unwrap();
        grow(&service, 1, 100);
        assert_eq!(service.lookup(100), Ok(h(1, 100)));
        assert_eq!(service.lookup(85), Ok(h(1, 85)));
        assert_eq!(
            service.lookup(84),
            Err(LookupError::OutOfWindow { requested: 84, oldest: 85 })
        );
        assert_eq!(
            service.lookup(101),
            Err(LookupError::FutureBlock { requested: 101, tip: 100 })
        );
    }

    #[test]
    fn raw_call_boundary() {
        let service = HistoryService::new(&config(0, 16)).unwrap();
        grow(&service, 1, 10);
        let outcome = service.call(&encode_query(7));
        assert!(outcome.success);
        assert_eq!(outcome.output, h(1, 7).as_bytes().to_vec());

        assert_eq!(service.call(&encode_query(11)), CallOutcome::failure());
        assert_eq!(service.call(&[0u8; 31]), CallOutcome::failure());
        assert_eq!(
            service.lookup_word(&[0u8; 33]),
            Err(LookupError::MalformedQuery { len: 33 })
        );
        let mut huge = [0xFFu8; 32];
        huge[0] = 0x01;
        assert!(matches!(service.lookup_word(&huge), Err(LookupError::FutureBlock { .. })));
    }

    #[test]
    fn bad_event_halts_until_resync() {
        let chain = Arc::new(RwLock::new(MemoryChain::new()));
        struct Shared(Arc<RwLock<MemoryChain>>);
        impl CanonicalChain for Shared {
            fn chain_tip(&self) -> Result<Option<(u64, Hash256)>, HistoryError> {
                self.0.read().chain_tip()
            }
            fn block_hash(&self, height: u64) -> Result<Option<Hash256>, HistoryError> {
                self.0.read().block_hash(height)
            }
        }
        {
            let mut chain = chain.write();
            for height in 0..=30 {
                let parent = chain.tip().map_or(Hash256::ZERO, |b| b.hash);
                chain.connect(BlockRef::new(height, h(1, height), parent)).unwrap();
            }
        }
        let service =
            HistoryService::with_source(&config(0, 16), Arc::new(Shared(chain.clone()))).unwrap();
        assert_eq!(service.lookup(30), Ok(h(1, 30)));

        let gap = BlockRef::new(40, h(1, 40), h(1, 39));
        assert!(service.apply(&ChainEvent::Connected(gap)).is_err());
        assert!(matches!(service.lookup(30), Err(LookupError::Halted(_))));
        let next = BlockRef::new(31, h(1, 31), h(1, 30));
        assert!(matches!(
            service.apply(&ChainEvent::Connected(next)),
            Err(HistoryError::Halted(_))
        ));

        assert_eq!(service.resync().unwrap().map(|t| t.height), Some(30));
        assert_eq!(service.halted(), None);
        assert_eq!(service.lookup(30), Ok(h(1, 30)));
    }

    #[test]
    fn resync_without_source_fails() {
        let service = HistoryService::new(&config(0, 16)).unwrap();
        assert!(matches!(service.resync(), Err(HistoryError::NoSource)));
    }

    #[test]
    fn reorg_serves_new_branch() {
        let service = HistoryService::new(&config(0, 16)).unwrap();
        grow(&service, 1, 40);
        let disconnected: Vec<BlockRef> = (35..=40)
            .rev()
            .map(|height| BlockRef::new(height, h(1, height), h(1, height - 1)))
            .collect();
        let mut parent = h(1, 34);
        let connected: Vec<BlockRef> = (35..=42)
            .map(|height| {
                let block = BlockRef::new(height, h(2, height), parent);
                parent = block.hash;
                block
            })
            .collect();
        let event = ChainEvent::Reorg(ReorgEvent { disconnected, connected });
        service.apply(&event).unwrap();
        for height in 27..=42 {
            let expected = if height >= 35 { h(2, height) } else { h(1, height) };
            assert_eq!(service.lookup(height), Ok(expected));
        }
    }

    #[test]
    fn info_reports_window() {
        let service = HistoryService::new(&config(5, 16)).unwrap();
        grow(&service, 1, 50);
        let info = service.info();
        assert_eq!(info.window_size, 16);
        assert_eq!(info.capacity, 21);
        assert_eq!(info.range, Some(WindowRange { oldest: 35, newest: 50 }));
        assert_eq!(info.live_entries, 16);
        assert_eq!(info.state, ActivationState::Enabled);
        assert_eq!(info.halted, None);
    }
}
