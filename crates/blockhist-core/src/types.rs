//! Core types: block hashes, block references, and chain events.
//!
//! Heights are `u64` throughout. A [`BlockRef`] is the unit the consensus
//! layer hands us on every connect/disconnect notification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseHashError;

/// A 32-byte block hash in the chain's native byte order.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Lowercase hex encoding without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash256 {
    type Err = ParseHashError;

    /// Parse 64 hex characters, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(ParseHashError::InvalidLength(digits.len()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out).map_err(|_| ParseHashError::InvalidHex)?;
        Ok(Self(out))
    }
}

/// A block as seen by this service: its height, its hash, and its parent.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockRef {
    /// Height of the block.
    pub height: u64,
    /// Hash of the block.
    pub hash: Hash256,
    /// Hash of the block at `height - 1`. Zero for genesis.
    pub parent_hash: Hash256,
}

impl BlockRef {
    pub fn new(height: u64, hash: Hash256, parent_hash: Hash256) -> Self {
        Self {
            height,
            hash,
            parent_hash,
        }
    }

    /// Whether `self` directly extends `parent`.
    pub fn extends(&self, parent: &BlockRef) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}

/// A switch of canonical branch, delivered as one unit.
///
/// `disconnected` walks back from the old tip (highest first);
/// `connected` walks forward from the fork point (lowest first).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ReorgEvent {
    pub disconnected: Vec<BlockRef>,
    pub connected: Vec<BlockRef>,
}

impl ReorgEvent {
    /// Number of blocks rolled back.
    pub fn depth(&self) -> u64 {
        self.disconnected.len() as u64
    }

    /// Height of the last block shared by both branches, if any blocks are disconnected.
    pub fn fork_height(&self) -> Option<u64> {
        self.disconnected
            .last()
            .and_then(|lowest| lowest.height.checked_sub(1))
    }
}

/// A notification from the consensus layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block was connected on top of the current tip.
    Connected(BlockRef),
    /// The current tip was disconnected.
    Disconnected(BlockRef),
    /// The canonical branch changed.
    Reorg(ReorgEvent),
}
