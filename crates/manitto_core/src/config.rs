//! Allocation tuning knobs.
//!
//! # Invariants
//! - `max_attempts` is at least 1 after normalization.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration for [`crate::AllocationService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Commit attempts per request before reporting a transient conflict.
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AllocationConfig {
    /// Returns a copy with `max_attempts` clamped to at least one attempt.
    pub fn normalized(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
        }
    }
}
