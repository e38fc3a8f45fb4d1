//! Integration test suite for the block-hash history service.
//!
//! Drives whole nodes through activation, window sliding, reorgs, halts and
//! the caching client, and checks the window invariants under random chains.

pub mod helpers;
