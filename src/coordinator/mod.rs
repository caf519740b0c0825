// SPDX-License-Identifier: GPL-3.0-only
//! Reconfiguration coordinator
//!
//! Turns bursts of loosely ordered OS signals into exactly one
//! re-enumerate-and-rebuild pass per logical change.
//!
//! # Architecture
//!
//! The [`Coordinator`] is a plain state machine. It owns the two generation
//! counters (reconfigure and sleep) and answers every signal or timer expiry
//! with a list of [`Command`]s. It performs no I/O and never sleeps, which
//! keeps all ordering decisions on one serialized timeline:
//!
//! - A hardware signal bumps the reconfigure generation and, if awake, asks
//!   for a debounce timer keyed to the new value. Only the timer of the last
//!   signal in a burst still matches when it fires.
//! - While asleep nothing is scheduled. The nonzero generation is the record
//!   that a reconfiguration is owed, and it is paid once a sober check
//!   confirms the system stayed awake through the settle delay.
//! - The generation drops back to zero at the moment a pipeline run is
//!   issued, never when it is scheduled.
//!
//! The [`crate::service::Service`] executes the commands.

mod debounce;
mod generation;
mod signal;
mod sleep_gate;

pub use debounce::{Scheduled, Scheduler, Timer, Timings};
pub use generation::Generation;
pub use signal::{Command, Signal};
pub use sleep_gate::SleepGate;

use crate::config::PrefKey;

#[derive(Debug, Default)]
pub struct Coordinator {
    reconfigure: Generation,
    sleep: SleepGate,
    timings: Timings,
}

impl Coordinator {
    pub fn new(timings: Timings) -> Self {
        Self {
            reconfigure: Generation::new(),
            sleep: SleepGate::new(),
            timings,
        }
    }

    #[cfg(test)]
    pub fn reconfigure_generation(&self) -> u64 {
        self.reconfigure.current()
    }

    #[cfg(test)]
    pub fn sleep_generation(&self) -> u64 {
        self.sleep.generation()
    }

    #[cfg(test)]
    pub fn is_asleep(&self) -> bool {
        self.sleep.is_asleep()
    }

    /// Initial pipeline run at startup
    pub fn start(&mut self) -> Vec<Command> {
        self.run_if_current(0, true)
    }

    /// Startup with default preferences: reset first, then the first run
    pub fn start_with_reset(&mut self) -> Vec<Command> {
        info!("Starting with default preferences");
        self.reset_preferences()
    }

    pub fn handle_signal(&mut self, signal: Signal) -> Vec<Command> {
        match signal {
            Signal::DisplayHardwareReconfigured | Signal::ColorProfileChanged => {
                self.reconfiguration_requested()
            }
            Signal::SystemWillSleep | Signal::ScreensWillSleep => {
                let sleep_generation = self.sleep.enter_sleep();
                info!(sleep_generation, "Sleeping");
                Vec::new()
            }
            Signal::SystemDidWake | Signal::ScreensDidWake => match self.sleep.wake() {
                Some(sleep_generation) => {
                    info!(sleep_generation, "Waking up, waiting for displays to settle");
                    vec![Command::Schedule(Scheduled::sober_check(
                        sleep_generation,
                        &self.timings,
                    ))]
                }
                None => {
                    debug!("Wake signal while awake, ignoring");
                    Vec::new()
                }
            },
            Signal::PermissionChanged => {
                vec![Command::Schedule(Scheduled::permission_rebind(&self.timings))]
            }
            Signal::PreferenceChanged(key) => Self::preference_changed(key),
            Signal::PreferenceReset => {
                info!("Resetting all preferences");
                self.reset_preferences()
            }
        }
    }

    pub fn handle_timer(&mut self, timer: Timer) -> Vec<Command> {
        match timer {
            Timer::Reconfigure { generation } => self.run_if_current(generation, false),
            Timer::SoberCheck { sleep_generation } => {
                if self.sleep.sober(sleep_generation) {
                    info!(sleep_generation, "Sober from sleep");
                    self.post_wake()
                } else {
                    debug!(
                        sleep_generation,
                        current = self.sleep.generation(),
                        "Sober check superseded"
                    );
                    Vec::new()
                }
            }
            Timer::PermissionRebind => vec![Command::RebindMediaKeys],
        }
    }

    fn reconfiguration_requested(&mut self) -> Vec<Command> {
        let generation = self.reconfigure.increment();
        info!(generation, "Bumping reconfigure generation");

        if self.sleep.is_awake() {
            vec![Command::Schedule(Scheduled::reconfigure(
                &self.reconfigure,
                &self.timings,
            ))]
        } else {
            debug!(generation, "Asleep, reconfiguration deferred until sober");
            Vec::new()
        }
    }

    fn post_wake(&mut self) -> Vec<Command> {
        if self.reconfigure.is_zero() {
            debug!("Displays don't need reconfiguration after sleep, refreshing bindings only");
            vec![Command::RefreshServiceBindings]
        } else {
            let generation = self.reconfigure.current();
            info!(generation, "Displays need reconfiguration after sleep");
            self.run_if_current(generation, false)
        }
    }

    /// Issue a pipeline run if awake and `snapshot` is still the latest request
    fn run_if_current(&mut self, snapshot: u64, first_run: bool) -> Vec<Command> {
        if self.sleep.is_asleep() || !self.reconfigure.matches(snapshot) {
            debug!(
                snapshot,
                current = self.reconfigure.current(),
                asleep = self.sleep.is_asleep(),
                "Dropping stale reconfiguration"
            );
            return Vec::new();
        }

        info!(snapshot, first_run, "Reconfiguring displays");
        self.reconfigure.reset();
        vec![Command::Reconfigure { first_run }]
    }

    fn reset_preferences(&mut self) -> Vec<Command> {
        let mut commands = vec![
            Command::ResetPreferences,
            Command::CheckPermissions,
            Command::RebindMediaKeys,
        ];
        commands.extend(self.run_if_current(0, true));
        commands
    }

    fn preference_changed(key: PrefKey) -> Vec<Command> {
        match key {
            PrefKey::ListenFor => vec![Command::CheckPermissions, Command::RebindMediaKeys],
            key if key.affects_menu() => vec![Command::RebuildMenu],
            key => {
                debug!("No reaction to preference change: {:?}", key);
                Vec::new()
            }
        }
    }
}
