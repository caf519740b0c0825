// SPDX-License-Identifier: GPL-3.0-only
//! Generation counters
//!
//! A generation is a monotonic request counter. Deferred work captures the
//! value at the time it is scheduled and, when it finally runs, compares the
//! snapshot against the live value to find out whether it has been superseded.

/// Monotonic counter whose only permitted decrease is a reset to zero
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

impl Generation {
    pub const fn new() -> Self {
        Self(0)
    }

    /// Bump the counter and return the new value
    pub fn increment(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn current(&self) -> u64 {
        self.0
    }

    /// Whether a snapshot taken earlier is still the latest request
    pub fn matches(&self, snapshot: u64) -> bool {
        self.0 == snapshot
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}
