//! Activation gate: one immutable height below which lookups are disabled.
//!
//! The gate is a hard feature switch. It is consulted before any per-height
//! classification, so a disabled service rejects tip, past and future
//! requests identically.

use serde::{Deserialize, Serialize};

/// Whether the service answers lookups at a given tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationState {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationGate {
    height: u64,
}

impl ActivationGate {
    pub fn new(height: u64) -> Self {
        Self { height }
    }

    /// The configured activation height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// True iff `tip_height >= activation height`.
    pub fn is_enabled(&self, tip_height: u64) -> bool {
        tip_height >= self.height
    }

    /// State at an optional tip. No tip (empty chain) is always disabled.
    pub fn state(&self, tip_height: Option<u64>) -> ActivationState {
        match tip_height {
            Some(tip) if self.is_enabled(tip) => ActivationState::Enabled,
            _ => ActivationState::Disabled,
        }
    }
}
