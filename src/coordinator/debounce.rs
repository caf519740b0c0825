// SPDX-License-Identifier: GPL-3.0-only
//! Debounce scheduling
//!
//! Deferred work is described by an immutable [`Scheduled`] record carrying
//! the generation snapshot taken when it was created. The [`Scheduler`] only
//! knows how to wait: it sleeps for the requested delay and hands the timer
//! back to the event loop, where the coordinator compares the snapshot with
//! the live generation. Nothing is ever cancelled; a superseded timer simply
//! declines to act when it fires.

use std::time::Duration;

use tokio::sync::mpsc::Sender;

use super::generation::Generation;
use crate::service::Event;

/// Delay between the last hardware reconfiguration signal and the pipeline run
pub const RECONFIGURE_DEBOUNCE: Duration = Duration::from_secs(2);
/// Time displays get to recover after a wake signal before we trust it
pub const WAKE_SETTLE: Duration = Duration::from_secs(6);
/// Delay before rebinding key capture after a permission change
pub const PERMISSION_REBIND: Duration = Duration::from_millis(100);

/// The fixed delays of the coordinator
///
/// The ratios between the three delays are part of the behaviour (2 : 6 : 0.1),
/// so the only way to change them is to rescale the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub reconfigure: Duration,
    pub wake_settle: Duration,
    pub permission_rebind: Duration,
}

impl Timings {
    /// Build the delays from an arbitrary time unit (one second by default)
    #[cfg(test)]
    pub fn from_unit(unit: Duration) -> Self {
        Self {
            reconfigure: unit * 2,
            wake_settle: unit * 6,
            permission_rebind: unit / 10,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconfigure: RECONFIGURE_DEBOUNCE,
            wake_settle: WAKE_SETTLE,
            permission_rebind: PERMISSION_REBIND,
        }
    }
}

/// What a timer does when it fires, with the snapshot it is keyed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Debounced reconfiguration keyed to the reconfigure generation
    Reconfigure { generation: u64 },
    /// Post-wake verification keyed to the sleep generation
    SoberCheck { sleep_generation: u64 },
    /// Media-key rebind after a permission change, never stale
    PermissionRebind,
}

/// A unit of deferred work, created once and never modified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub after: Duration,
    pub timer: Timer,
}

impl Scheduled {
    /// Debounced reconfiguration, snapshotting `generation` now
    pub fn reconfigure(generation: &Generation, timings: &Timings) -> Self {
        Self {
            after: timings.reconfigure,
            timer: Timer::Reconfigure {
                generation: generation.current(),
            },
        }
    }

    pub fn sober_check(sleep_generation: u64, timings: &Timings) -> Self {
        Self {
            after: timings.wake_settle,
            timer: Timer::SoberCheck { sleep_generation },
        }
    }

    pub fn permission_rebind(timings: &Timings) -> Self {
        Self {
            after: timings.permission_rebind,
            timer: Timer::PermissionRebind,
        }
    }
}

/// Delayed-call primitive backing all debounce timers
///
/// Each scheduled timer gets its own task that sleeps and then feeds the
/// timer back into the event channel.
#[derive(Debug, Clone)]
pub struct Scheduler {
    events: Sender<Event>,
}

impl Scheduler {
    pub fn new(events: Sender<Event>) -> Self {
        Self { events }
    }

    pub fn schedule(&self, scheduled: Scheduled) {
        let events = self.events.clone();
        debug!("Arming {:?} in {:?}", scheduled.timer, scheduled.after);
        tokio::spawn(async move {
            tokio::time::sleep(scheduled.after).await;
            if events.send(Event::Timer(scheduled.timer)).await.is_err() {
                debug!("Event loop gone, dropping {:?}", scheduled.timer);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let timings = Timings::default();
        assert_eq!(timings.reconfigure, Duration::from_secs(2));
        assert_eq!(timings.wake_settle, Duration::from_secs(6));
        assert_eq!(timings.permission_rebind, Duration::from_millis(100));
    }

    #[test]
    fn test_scaled_timings_keep_ratios() {
        let timings = Timings::from_unit(Duration::from_millis(10));
        assert_eq!(timings.reconfigure, Duration::from_millis(20));
        assert_eq!(timings.wake_settle, Duration::from_millis(60));
        assert_eq!(timings.permission_rebind, Duration::from_millis(1));
        assert_eq!(Timings::from_unit(Duration::from_secs(1)), Timings::default());
    }

    #[test]
    fn test_reconfigure_captures_snapshot_at_creation() {
        let timings = Timings::default();
        let mut generation = Generation::new();
        generation.increment();
        let scheduled = Scheduled::reconfigure(&generation, &timings);
        generation.increment();

        assert_eq!(scheduled.timer, Timer::Reconfigure { generation: 1 });
        assert_eq!(scheduled.after, timings.reconfigure);
    }

    #[tokio::test]
    async fn test_scheduler_delivers_timer_after_delay() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let scheduler = Scheduler::new(tx);
        let started = std::time::Instant::now();

        scheduler.schedule(Scheduled {
            after: Duration::from_millis(20),
            timer: Timer::PermissionRebind,
        });

        match rx.recv().await {
            Some(Event::Timer(timer)) => assert_eq!(timer, Timer::PermissionRebind),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
