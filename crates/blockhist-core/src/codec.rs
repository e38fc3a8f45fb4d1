//! Fixed 32-byte words exchanged at the lookup boundary.
//!
//! Queries are a big-endian unsigned 256-bit block number. Responses are the
//! raw block hash. Anything that is not exactly one word is rejected.

use crate::constants::WORD_SIZE;
use crate::error::{ClientError, LookupError};
use crate::types::Hash256;

/// Decode a query word into a block number.
///
/// Numbers above `u64::MAX` saturate to `u64::MAX`: no chain reaches that
/// height, so they classify as future blocks like any other height past the tip.
pub fn decode_query(input: &[u8]) -> Result<u64, LookupError> {
    if input.len() != WORD_SIZE {
        return Err(LookupError::MalformedQuery { len: input.len() });
    }
    let (high, low) = input.split_at(WORD_SIZE - 8);
    if high.iter().any(|b| *b != 0) {
        return Ok(u64::MAX);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}

/// Encode a block number as a query word.
pub fn encode_query(height: u64) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 8..].copy_from_slice(&height.to_be_bytes());
    word
}

/// Encode a hash as a response word.
pub fn encode_response(hash: &Hash256) -> [u8; WORD_SIZE] {
    *hash.as_bytes()
}

/// Decode a response word received for `height`.
///
/// A short or long output is a hard failure, never a zero hash.
pub fn decode_response(height: u64, output: &[u8]) -> Result<Hash256, ClientError> {
    let word: [u8; WORD_SIZE] = output
        .try_into()
        .map_err(|_| ClientError::MalformedResponse {
            height,
            len: output.len(),
        })?;
    Ok(Hash256(word))
}
