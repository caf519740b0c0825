// SPDX-License-Identifier: GPL-3.0-only
//! Kernel device notifications for display reconfiguration
//!
//! Two udev subsystems matter to the daemon. `drm` minors change whenever a
//! connector is plugged, unplugged or re-detected. `i2c-dev` nodes come and go
//! with the DDC/CI buses behind those connectors, and change when their
//! permissions are updated (for example when the user joins the `i2c` group
//! or a udev rule is reloaded).

use std::io;
use std::os::fd::AsRawFd;

/// Blocking reader over a udev netlink socket filtered to `drm` and `i2c-dev`
///
/// `MonitorSocket` is not Send, so the watch is created and read on the
/// thread that owns it.
pub struct DeviceWatch {
    socket: udev::MonitorSocket,
}

impl DeviceWatch {
    /// Subscribe to DRM minors and I2C character devices
    pub fn open() -> io::Result<Self> {
        let socket = udev::MonitorBuilder::new()?
            .match_subsystem_devtype("drm", "drm_minor")?
            .match_subsystem("i2c-dev")?
            .listen()?;

        info!("Watching drm and i2c-dev devices");
        Ok(Self { socket })
    }

    /// Block until a device is added, removed or changed
    ///
    /// Bind/unbind and other udev actions are skipped. Errors only come from
    /// `poll` itself.
    pub fn next_change(&self) -> io::Result<udev::Event> {
        let fd = self.socket.as_raw_fd();

        loop {
            let mut poll_fd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // SAFETY: one valid pollfd, negative timeout waits indefinitely
            let ready = unsafe { libc::poll(&mut poll_fd, 1, -1) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Polling the udev socket failed: {}", err);
                return Err(err);
            }

            let Some(event) = self.socket.iter().next() else {
                continue;
            };

            if !is_device_change(event.event_type()) {
                debug!("Ignoring udev {:?} on {:?}", event.event_type(), event.syspath());
                continue;
            }

            debug!(
                "Device {:?}: subsystem={:?} devnode={:?}",
                event.event_type(),
                event.subsystem(),
                event.devnode()
            );
            return Ok(event);
        }
    }
}

/// Actions that can alter connectors or bus access
fn is_device_change(event_type: udev::EventType) -> bool {
    matches!(
        event_type,
        udev::EventType::Add | udev::EventType::Remove | udev::EventType::Change
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_change_actions() {
        assert!(is_device_change(udev::EventType::Add));
        assert!(is_device_change(udev::EventType::Remove));
        assert!(is_device_change(udev::EventType::Change));
        assert!(!is_device_change(udev::EventType::Bind));
        assert!(!is_device_change(udev::EventType::Unbind));
        assert!(!is_device_change(udev::EventType::Unknown));
    }
}
