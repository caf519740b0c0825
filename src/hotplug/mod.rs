// SPDX-License-Identifier: GPL-3.0-only
//! Display hotplug detection using udev
//!
//! DRM connector changes become `DisplayHardwareReconfigured`, I2C bus
//! nodes appearing or changing become `PermissionChanged` (that is when
//! DDC/CI access can be gained or lost). Bursts are left to the
//! coordinator's debounce.

mod udev_monitor;

use tokio::sync::mpsc::error::TrySendError;

use crate::coordinator::Signal;
use crate::service::{Event, EventSender};

use udev_monitor::DeviceWatch;

/// Map a udev subsystem to the signal it stands for
fn classify(subsystem: Option<&str>) -> Option<Signal> {
    match subsystem? {
        "drm" => Some(Signal::DisplayHardwareReconfigured),
        "i2c-dev" => Some(Signal::PermissionChanged),
        _ => None,
    }
}

/// Start udev monitoring on a dedicated thread
///
/// A dedicated blocking thread is used because `MonitorSocket` is not Send.
/// The thread stops once the service loop has gone away.
pub fn spawn(events: EventSender) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("udev-hotplug".to_string())
        .spawn(move || {
            let watch = match DeviceWatch::open() {
                Ok(watch) => watch,
                Err(e) => {
                    error!("Failed to initialize display hotplug monitoring: {}", e);
                    return;
                }
            };

            let err = loop {
                let event = match watch.next_change() {
                    Ok(event) => event,
                    Err(e) => break e,
                };
                let subsystem = event.subsystem().and_then(|s| s.to_str().map(str::to_owned));
                let Some(signal) = classify(subsystem.as_deref()) else {
                    continue;
                };
                match events.try_send(Event::Signal(signal)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        debug!("Event queue full, dropping {:?}", event);
                    }
                    Err(TrySendError::Closed(_)) => {
                        break std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "event loop closed",
                        );
                    }
                }
            };

            debug!("Display hotplug monitoring stopped: {}", err);
        })
}
