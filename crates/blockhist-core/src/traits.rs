//! Trait interfaces at the service's seams:
//! - [`CanonicalChain`]: canonical-hash-at-height queries (implemented by the chain layer)
//! - [`HistoryCall`]: the raw 32-byte lookup boundary (implemented by the lookup service)

use std::sync::Arc;

use crate::error::HistoryError;
use crate::types::Hash256;

/// Read-only view of the canonical chain, used to bootstrap the window and
/// to backfill heights a deep reorg brings back into it.
pub trait CanonicalChain: Send + Sync {
    /// Current tip as `(height, hash)`. `None` if no blocks are connected.
    fn chain_tip(&self) -> Result<Option<(u64, Hash256)>, HistoryError>;

    /// Canonical hash at `height`. `None` if height exceeds the tip.
    fn block_hash(&self, height: u64) -> Result<Option<Hash256>, HistoryError>;
}

impl<T: CanonicalChain + ?Sized> CanonicalChain for Arc<T> {
    fn chain_tip(&self) -> Result<Option<(u64, Hash256)>, HistoryError> {
        (**self).chain_tip()
    }

    fn block_hash(&self, height: u64) -> Result<Option<Hash256>, HistoryError> {
        (**self).block_hash(height)
    }
}

/// Result of a raw call: a success flag and the returned bytes.
///
/// Mirrors a contract call: failures carry no output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallOutcome {
    pub success: bool,
    pub output: Vec<u8>,
}

impl CallOutcome {
    pub fn success(output: Vec<u8>) -> Self {
        Self {
            success: true,
            output,
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }
}

/// The lookup boundary as seen by executing code: one query word in,
/// one response word out or a signaled failure.
pub trait HistoryCall: Send + Sync {
    fn call(&self, input: &[u8]) -> CallOutcome;
}

impl<T: HistoryCall + ?Sized> HistoryCall for Arc<T> {
    fn call(&self, input: &[u8]) -> CallOutcome {
        (**self).call(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl HistoryCall for Fixed {
        fn call(&self, input: &[u8]) -> CallOutcome {
            CallOutcome::success(input.to_vec())
        }
    }

    #[test]
    fn history_call_dyn_compatible() {
        let boundary: Arc<dyn HistoryCall> = Arc::new(Fixed);
        let outcome = boundary.call(&[1, 2, 3]);
        assert!(outcome.success);
        assert_eq!(outcome.output, vec![1, 2, 3]);
    }

    #[test]
    fn failure_has_no_output() {
        let outcome = CallOutcome::failure();
        assert!(!outcome.success);
        assert!(outcome.output.is_empty());
    }
}
