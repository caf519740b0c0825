// SPDX-License-Identifier: GPL-3.0-only
//! Sleep gate
//!
//! Tracks whether the system is considered asleep. The state is derived from
//! the sleep generation alone: any nonzero value means asleep. A wake signal
//! never clears the state directly; it only hands out a snapshot for the
//! sober check that may clear it later.

use super::generation::Generation;

#[derive(Debug, Default)]
pub struct SleepGate {
    generation: Generation,
}

impl SleepGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asleep(&self) -> bool {
        !self.generation.is_zero()
    }

    pub fn is_awake(&self) -> bool {
        self.generation.is_zero()
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Record a sleep signal. Repeated signals stack.
    pub fn enter_sleep(&mut self) -> u64 {
        self.generation.increment()
    }

    /// Record a wake signal
    ///
    /// Returns the sleep generation to verify once the settle delay has
    /// passed, or `None` when the gate is already awake.
    pub fn wake(&self) -> Option<u64> {
        if self.is_asleep() {
            Some(self.generation.current())
        } else {
            None
        }
    }

    /// Commit to awake if no sleep signal arrived since `snapshot` was taken
    pub fn sober(&mut self, snapshot: u64) -> bool {
        if self.is_asleep() && self.generation.matches(snapshot) {
            self.generation.reset();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_awake() {
        let gate = SleepGate::new();
        assert!(gate.is_awake());
        assert_eq!(gate.wake(), None);
    }

    #[test]
    fn test_sleep_signals_stack() {
        let mut gate = SleepGate::new();
        assert_eq!(gate.enter_sleep(), 1);
        assert_eq!(gate.enter_sleep(), 2);
        assert!(gate.is_asleep());
        assert_eq!(gate.wake(), Some(2));
    }

    #[test]
    fn test_wake_alone_does_not_clear() {
        let mut gate = SleepGate::new();
        gate.enter_sleep();
        let _ = gate.wake();
        assert!(gate.is_asleep());
    }

    #[test]
    fn test_sober_with_current_snapshot_resets() {
        let mut gate = SleepGate::new();
        gate.enter_sleep();
        let snapshot = gate.wake().unwrap();
        assert!(gate.sober(snapshot));
        assert!(gate.is_awake());
        assert_eq!(gate.generation(), 0);
    }

    #[test]
    fn test_sober_after_new_sleep_is_noop() {
        let mut gate = SleepGate::new();
        gate.enter_sleep();
        let snapshot = gate.wake().unwrap();
        gate.enter_sleep();
        assert!(!gate.sober(snapshot));
        assert_eq!(gate.generation(), 2);
    }

    #[test]
    fn test_second_sober_check_for_same_wake_is_noop() {
        let mut gate = SleepGate::new();
        gate.enter_sleep();
        let first = gate.wake().unwrap();
        let second = gate.wake().unwrap();
        assert!(gate.sober(first));
        assert!(!gate.sober(second));
        assert!(gate.is_awake());
    }
}
