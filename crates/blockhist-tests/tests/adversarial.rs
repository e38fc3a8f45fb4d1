//! Property tests for the history window.
//!
//! Random chains, windows and reorgs; after every step each answer must
//! match the canonical chain or be the failure the window rules predict.

use proptest::prelude::*;

use blockhist_core::chain::MemoryChain;
use blockhist_core::error::LookupError;
use blockhist_core::service::HistoryService;
use blockhist_core::store::WindowBoundary;
use blockhist_core::types::{ChainEvent, Hash256};
use blockhist_tests::helpers::*;

/// Expected answer for `height` given the canonical chain.
fn expected(
    chain: &MemoryChain,
    activation: u64,
    window: u64,
    boundary: WindowBoundary,
    height: u64,
) -> Result<Hash256, &'static str> {
    let Some(tip) = chain.height() else {
        return Err("NotActivated");
    };
    if tip < activation {
        return Err("NotActivated");
    }
    let (oldest, newest) = match boundary {
        WindowBoundary::IncludeTip => (tip.saturating_sub(window - 1), Some(tip)),
        WindowBoundary::ExcludeTip => (tip.saturating_sub(window), tip.checked_sub(1)),
    };
    match newest {
        Some(newest) if height <= newest => {}
        _ => return Err("FutureBlock"),
    }
    if height < oldest {
        return Err("OutOfWindow");
    }
    chain.block_at(height).map(|b| b.hash).ok_or("MissingEntry")
}

fn check_all(
    service: &HistoryService,
    chain: &MemoryChain,
    activation: u64,
    window: u64,
    boundary: WindowBoundary,
) -> Result<(), TestCaseError> {
    let top = chain.height().map_or(0, |h| h + 3);
    for height in 0..=top {
        let got = service.lookup(height).map_err(|e| e.kind());
        let want = expected(chain, activation, window, boundary, height);
        prop_assert_eq!(got, want, "height {}", height);
    }
    Ok(())
}

fn boundary_strategy() -> impl Strategy<Value = WindowBoundary> {
    prop_oneof![Just(WindowBoundary::IncludeTip), Just(WindowBoundary::ExcludeTip)]
}

// ======================================================================
// Property 1: Linear growth serves exactly the window
// ======================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn linear_chain_matches_window(
        tip in 0u64..300,
        window in 1u64..64,
        slack in 0u64..8,
        activation in 0u64..200,
        boundary in boundary_strategy(),
    ) {
        let (chain, source) = shared_chain(MemoryChain::new());
        let service = HistoryService::with_source(
            &history_config(activation, window, slack, boundary),
            source,
        ).unwrap();
        for block in make_branch(1, 0, tip, Hash256::ZERO) {
            chain.write().connect(block).unwrap();
            service.apply(&ChainEvent::Connected(block)).unwrap();
        }
        check_all(&service, &chain.read(), activation, window, boundary)?;
    }
}

// ======================================================================
// Property 2: Any sequence of reorgs leaves the window canonical
// ======================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn reorgs_keep_window_canonical(
        initial in 1u64..150,
        window in 1u64..48,
        slack in 0u64..6,
        boundary in boundary_strategy(),
        steps in prop::collection::vec((0u64..80, 0u64..80), 1..6),
    ) {
        let (chain, source) = shared_chain(make_chain(1, initial));
        let service = HistoryService::with_source(
            &history_config(0, window, slack, boundary),
            source,
        ).unwrap();

        for (i, (depth, length)) in steps.into_iter().enumerate() {
            let tip = chain.read().height().unwrap();
            let fork = tip.saturating_sub(depth);
            let branch_id = (i + 2) as u8;
            let fork_hash = chain.read().block_at(fork).unwrap().hash;
            let branch = make_branch(branch_id, fork + 1, fork + 1 + length, fork_hash);
            let reorg = chain.write().reorg_to(branch).unwrap();
            service.apply(&ChainEvent::Reorg(reorg)).unwrap();
            check_all(&service, &chain.read(), 0, window, boundary)?;
        }
    }
}

// ======================================================================
// Property 3: Gate precedes every other classification
// ======================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn below_activation_everything_is_rejected(
        tip in 0u64..100,
        gap in 1u64..100,
        height in 0u64..1_000,
    ) {
        let (_chain, source) = shared_chain(make_chain(1, tip));
        let service = HistoryService::with_source(
            &history_config(tip + gap, 16, 4, WindowBoundary::IncludeTip),
            source,
        ).unwrap();
        let is_not_activated = matches!(
            service.lookup(height),
            Err(LookupError::NotActivated { .. })
        );
        prop_assert!(is_not_activated);
    }
}

// ======================================================================
// Property 4: Lookups are idempotent and side-effect free
// ======================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn repeated_lookups_are_identical(
        tip in 0u64..200,
        window in 1u64..32,
        heights in prop::collection::vec(0u64..260, 1..20),
    ) {
        let (_chain, source) = shared_chain(make_chain(1, tip));
        let service = HistoryService::with_source(
            &history_config(0, window, 2, WindowBoundary::IncludeTip),
            source,
        ).unwrap();
        let before = service.info();
        for height in heights {
            let first = service.lookup(height);
            let second = service.lookup(height);
            prop_assert_eq!(first, second);
        }
        prop_assert_eq!(service.info(), before);
    }
}

// ======================================================================
// Property 5: Rejected events change nothing observable except the halt
// ======================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bad_connect_halts_without_mutating(
        tip in 1u64..100,
        skip in 2u64..20,
    ) {
        let (_chain, source) = shared_chain(make_chain(1, tip));
        let service = HistoryService::with_source(
            &history_config(0, 16, 4, WindowBoundary::IncludeTip),
            source,
        ).unwrap();
        let before = service.info();

        let height = tip + skip;
        let stray = blockhist_core::types::BlockRef::new(
            height,
            block_hash(1, height),
            block_hash(1, height - 1),
        );
        prop_assert!(service.apply(&ChainEvent::Connected(stray)).is_err());

        let after = service.info();
        prop_assert!(after.halted.is_some());
        prop_assert_eq!(after.tip, before.tip);
        prop_assert_eq!(after.live_entries, before.live_entries);
        prop_assert!(matches!(service.lookup(tip), Err(LookupError::Halted(_))));

        service.resync().unwrap();
        prop_assert_eq!(service.lookup(tip), Ok(block_hash(1, tip)));
    }
}
