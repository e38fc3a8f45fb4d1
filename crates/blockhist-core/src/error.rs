//! Error types for the historical block-hash service.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("hash must be 64 hex characters, got {0}")] InvalidLength(usize),
    #[error("invalid hex in hash")] InvalidHex,
}

/// Why a lookup was rejected. Every variant is a deterministic function of
/// chain state and input; none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("history lookups not activated: tip {tip:?} below activation height {activation_height}")] NotActivated { tip: Option<u64>, activation_height: u64 },
    #[error("block {requested} is in the future (tip {tip})")] FutureBlock { requested: u64, tip: u64 },
    #[error("block {requested} is outside the history window (oldest {oldest})")] OutOfWindow { requested: u64, oldest: u64 },
    #[error("malformed query: expected 32 bytes, got {len}")] MalformedQuery { len: usize },
    #[error("history service halted: {0}")] Halted(String),
    #[error("no stored hash for in-window block {0}")] MissingEntry(u64),
}

impl LookupError {
    /// Short, stable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotActivated { .. } => "NotActivated",
            Self::FutureBlock { .. } => "FutureBlock",
            Self::OutOfWindow { .. } => "OutOfWindow",
            Self::MalformedQuery { .. } => "MalformedQuery",
            Self::Halted(_) => "Halted",
            Self::MissingEntry(_) => "MissingEntry",
        }
    }
}

/// A chain event that cannot be applied to the current window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("empty chain: no tip to disconnect")] EmptyChain,
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("parent mismatch at height {height}: expected {expected}, got {got}")] ParentMismatch { height: u64, expected: String, got: String },
    #[error("block {got} at height {height} is not the tip {tip}")] NotTip { height: u64, tip: String, got: String },
    #[error("no canonical source can supply block {0}")] BackfillUnavailable(u64),
    #[error("canonical source: {0}")] Source(String),
}

/// Failure reported to a caching consumer of the lookup boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("batch count must be between 1 and {max}, got {got}")] InvalidBatch { got: u64, max: u64 },
    #[error("lookup call for block {0} failed")] CallFailed(u64),
    #[error("malformed response for block {height}: expected 32 bytes, got {len}")] MalformedResponse { height: u64, len: usize },
    #[error("block range overflows at start {0}")] RangeOverflow(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")] ZeroWindow,
    #[error("window size {0} exceeds addressable capacity")] WindowTooLarge(u64),
    #[error("reorg slack {slack} exceeds maximum {max}")] SlackTooLarge { slack: u64, max: u64 },
}

/// In-memory canonical chain rejected a block or branch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain is empty")] EmptyChain,
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("parent mismatch at height {height}: expected {expected}, got {got}")] ParentMismatch { height: u64, expected: String, got: String },
    #[error("block at height {0} is not the chain tip")] NotTip(u64),
    #[error("branch does not fork from a known block at height {0}")] UnknownForkPoint(u64),
    #[error("branch is empty")] EmptyBranch,
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error(transparent)] Lookup(#[from] LookupError),
    #[error(transparent)] Reconcile(#[from] ReconcileError),
    #[error(transparent)] Client(#[from] ClientError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] ParseHash(#[from] ParseHashError),
    #[error("chain: {0}")] Chain(#[from] ChainError),
    #[error("history service halted: {0}")] Halted(String),
    #[error("no canonical source configured")] NoSource,
}
