//! # blockhist-core
//! Bounded-window historical block-hash service: tagged-slot store, tip
//! tracking, reorg reconciliation, activation gate and the 32-byte lookup
//! boundary.

pub mod activation;
pub mod chain;
pub mod client;
pub mod codec;
pub mod constants;
pub mod error;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod tracker;
pub mod traits;
pub mod types;
