//! Caching consumer of the lookup boundary.
//!
//! Copies a bounded batch of recent hashes into its own storage. A batch is
//! all-or-nothing: one failed or malformed answer and nothing is stored.
//! Stored values are the client's own and are not touched by later reorgs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::codec::{decode_response, encode_query};
use crate::constants::MAX_CLIENT_BATCH;
use crate::error::ClientError;
use crate::traits::HistoryCall;
use crate::types::Hash256;

pub struct HistoryCacheClient<C> {
    boundary: C,
    stored: BTreeMap<u64, Hash256>,
    last_stored_block: Option<u64>,
}

impl<C: HistoryCall> HistoryCacheClient<C> {
    pub fn new(boundary: C) -> Self {
        Self {
            boundary,
            stored: BTreeMap::new(),
            last_stored_block: None,
        }
    }

    /// One lookup through the boundary.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CallFailed`] if the boundary signals failure
    /// - [`ClientError::MalformedResponse`] if it reports success with anything
    ///   other than exactly 32 bytes
    pub fn historical_block_hash(&self, height: u64) -> Result<Hash256, ClientError> {
        let outcome = self.boundary.call(&encode_query(height));
        if !outcome.success {
            return Err(ClientError::CallFailed(height));
        }
        decode_response(height, &outcome.output)
    }

    /// Fetch and store hashes for `start..start + count`.
    ///
    /// `count` must be in `1..=50`. On success `start` becomes the last stored
    /// block and the number of stored hashes is returned.
    pub fn store_recent_hashes(&mut self, start: u64, count: u64) -> Result<usize, ClientError> {
        if count == 0 || count > MAX_CLIENT_BATCH {
            return Err(ClientError::InvalidBatch {
                got: count,
                max: MAX_CLIENT_BATCH,
            });
        }
        let end = start
            .checked_add(count - 1)
            .ok_or(ClientError::RangeOverflow(start))?;

        let batch = (start..=end)
            .map(|height| self.historical_block_hash(height).map(|hash| (height, hash)))
            .collect::<Result<Vec<_>, _>>()?;

        let stored = batch.len();
        self.stored.extend(batch);
        self.last_stored_block = Some(start);
        debug!(start, count, "stored recent block hashes");
        Ok(stored)
    }

    pub fn stored_hash(&self, height: u64) -> Option<Hash256> {
        self.stored.get(&height).copied()
    }

    /// Start of the most recent successful batch.
    pub fn last_stored_block(&self) -> Option<u64> {
        self.last_stored_block
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn boundary(&self) -> &C {
        &self.boundary
    }
}
