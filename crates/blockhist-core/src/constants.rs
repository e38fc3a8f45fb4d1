//! Protocol constants for the historical block-hash window.

/// Number of trailing blocks whose hashes are served.
pub const HISTORY_SERVE_WINDOW: u64 = 8191;

/// Address at which execution environments reach the lookup boundary.
///
/// `0x0000F90827F1C53a10cb7A02335B175320002935`
pub const HISTORY_STORAGE_ADDRESS: [u8; 20] = [
    0x00, 0x00, 0xF9, 0x08, 0x27, 0xF1, 0xC5, 0x3A, 0x10, 0xCB, 0x7A, 0x02, 0x33, 0x5B, 0x17,
    0x53, 0x20, 0x00, 0x29, 0x35,
];

/// Size in bytes of both the query word and the response word.
pub const WORD_SIZE: usize = 32;

/// Largest batch a caching consumer may request in one invocation.
pub const MAX_CLIENT_BATCH: u64 = 50;

/// Extra ring slots retained below the window so shallow reorgs need no backfill.
pub const DEFAULT_REORG_SLACK: u64 = 128;

/// Default activation height. Zero means active from genesis.
pub const DEFAULT_ACTIVATION_HEIGHT: u64 = 0;

/// Largest window a ring may be configured with (slots are `usize`-indexed).
pub const MAX_WINDOW_SIZE: u64 = 1 << 24;

/// Largest reorg slack accepted. Deeper disconnects backfill from the chain.
pub const MAX_REORG_SLACK: u64 = HISTORY_SERVE_WINDOW + 1;

/// Default TCP port for the JSON-RPC server.
pub const DEFAULT_RPC_PORT: u16 = 18_545;
