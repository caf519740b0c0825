// SPDX-License-Identifier: GPL-3.0-only
//! Coordinator event loop
//!
//! The one serialized context of the daemon. OS event sources and debounce
//! timers only send [`Event`]s into a bounded channel; this loop receives them
//! in arrival order, lets the [`Coordinator`] decide, and executes the
//! resulting commands, awaiting pipeline runs in place. Events arriving during
//! a run wait in the channel.

use std::future::Future;

use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::coordinator::{Command, Coordinator, Scheduler, Signal, Timer};
use crate::pipeline::Pipeline;

/// Capacity of the event channel
pub const EVENT_QUEUE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Signal(Signal),
    Timer(Timer),
}

impl From<Signal> for Event {
    fn from(signal: Signal) -> Self {
        Event::Signal(signal)
    }
}

pub type EventSender = Sender<Event>;

pub fn channel() -> (EventSender, Receiver<Event>) {
    mpsc::channel(EVENT_QUEUE)
}

pub struct Service<P> {
    coordinator: Coordinator,
    pipeline: P,
    scheduler: Scheduler,
    events: Receiver<Event>,
    reset_on_start: bool,
}

impl<P: Pipeline> Service<P> {
    /// `sender` must belong to the same channel as `events`; timers use it to
    /// come back into the loop.
    pub fn new(
        coordinator: Coordinator,
        pipeline: P,
        sender: EventSender,
        events: Receiver<Event>,
    ) -> Self {
        Self {
            coordinator,
            pipeline,
            scheduler: Scheduler::new(sender),
            events,
            reset_on_start: false,
        }
    }

    /// Reset preferences before the first pipeline run
    pub fn reset_on_start(mut self) -> Self {
        self.reset_on_start = true;
        self
    }

    /// Run until `shutdown` completes, then tear the pipeline down
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> P {
        tokio::pin!(shutdown);

        let startup = if self.reset_on_start {
            self.coordinator.start_with_reset()
        } else {
            self.coordinator.start()
        };
        self.execute(startup).await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping event loop");
                    break;
                }
                Some(event) = self.events.recv() => {
                    debug!("{:?}", event);
                    let commands = match event {
                        Event::Signal(signal) => self.coordinator.handle_signal(signal),
                        Event::Timer(timer) => self.coordinator.handle_timer(timer),
                    };
                    self.execute(commands).await;
                }
            }
        }

        self.pipeline.shutdown().await;
        self.pipeline
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Schedule(scheduled) => self.scheduler.schedule(scheduled),
                Command::Reconfigure { first_run } => self.pipeline.reconfigure(first_run).await,
                Command::RefreshServiceBindings => self.pipeline.refresh_service_bindings().await,
                Command::RebuildMenu => self.pipeline.rebuild_menu().await,
                Command::CheckPermissions => self.pipeline.check_permissions(),
                Command::RebindMediaKeys => self.pipeline.rebind_media_keys().await,
                Command::ResetPreferences => self.pipeline.reset_preferences().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::config::PrefKey;
    use crate::coordinator::Timings;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Reconfigure(bool),
        RefreshServiceBindings,
        RebuildMenu,
        CheckPermissions,
        RebindMediaKeys,
        ResetPreferences,
        Shutdown,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Recorder {
        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Pipeline for Recorder {
        async fn reconfigure(&mut self, first_run: bool) {
            self.push(Call::Reconfigure(first_run));
        }

        async fn refresh_service_bindings(&mut self) {
            self.push(Call::RefreshServiceBindings);
        }

        async fn rebuild_menu(&mut self) {
            self.push(Call::RebuildMenu);
        }

        fn check_permissions(&mut self) {
            self.push(Call::CheckPermissions);
        }

        async fn rebind_media_keys(&mut self) {
            self.push(Call::RebindMediaKeys);
        }

        async fn reset_preferences(&mut self) {
            self.push(Call::ResetPreferences);
        }

        async fn shutdown(&mut self) {
            self.push(Call::Shutdown);
        }
    }

    /// 10ms unit: 20ms debounce, 60ms settle, 1ms permission rebind
    fn fast_service(recorder: &Recorder) -> (EventSender, Service<Recorder>) {
        let (tx, rx) = channel();
        let coordinator = Coordinator::new(Timings::from_unit(Duration::from_millis(10)));
        let service = Service::new(coordinator, recorder.clone(), tx.clone(), rx);
        (tx, service)
    }

    #[tokio::test]
    async fn test_burst_runs_pipeline_once() {
        let recorder = Recorder::default();
        let (tx, service) = fast_service(&recorder);

        let driver = async move {
            for _ in 0..5 {
                tx.send(Signal::DisplayHardwareReconfigured.into()).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        service.run(driver).await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Reconfigure(true),
                Call::Reconfigure(false),
                Call::Shutdown,
            ]
        );
    }

    #[tokio::test]
    async fn test_sleep_defers_reconfiguration_until_sober() {
        let recorder = Recorder::default();
        let (tx, service) = fast_service(&recorder);
        let observed = recorder.clone();

        let driver = async move {
            tx.send(Signal::SystemWillSleep.into()).await.unwrap();
            tx.send(Signal::DisplayHardwareReconfigured.into()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            // nothing but the startup run while asleep
            assert_eq!(observed.calls(), vec![Call::Reconfigure(true)]);

            tx.send(Signal::SystemDidWake.into()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        };

        service.run(driver).await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Reconfigure(true),
                Call::Reconfigure(false),
                Call::Shutdown,
            ]
        );
    }

    #[tokio::test]
    async fn test_preference_changes_react_immediately() {
        let recorder = Recorder::default();
        let (tx, service) = fast_service(&recorder);

        let driver = async move {
            tx.send(Signal::PreferenceChanged(PrefKey::FriendlyName).into())
                .await
                .unwrap();
            tx.send(Signal::PreferenceChanged(PrefKey::ListenFor).into())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        };

        service.run(driver).await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Reconfigure(true),
                Call::RebuildMenu,
                Call::CheckPermissions,
                Call::RebindMediaKeys,
                Call::Shutdown,
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_on_start_precedes_first_run() {
        let recorder = Recorder::default();
        let (_tx, service) = fast_service(&recorder);

        service
            .reset_on_start()
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert_eq!(
            recorder.calls(),
            vec![
                Call::ResetPreferences,
                Call::CheckPermissions,
                Call::RebindMediaKeys,
                Call::Reconfigure(true),
                Call::Shutdown,
            ]
        );
    }
}
