// SPDX-License-Identifier: GPL-3.0-only
//! Sleep and wake notifications
//!
//! System sleep comes from logind's `PrepareForSleep` on the system bus,
//! screen blanking from the session's `org.freedesktop.ScreenSaver`.

use futures::StreamExt;
use zbus::{Connection, proxy};

use crate::coordinator::Signal;
use crate::error::Result;
use crate::service::EventSender;

#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    /// Sent with `true` before suspend and `false` after resume
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.ScreenSaver",
    default_service = "org.freedesktop.ScreenSaver",
    default_path = "/org/freedesktop/ScreenSaver"
)]
trait ScreenSaver {
    #[zbus(signal)]
    fn active_changed(&self, active: bool) -> zbus::Result<()>;
}

fn system_signal(going_to_sleep: bool) -> Signal {
    if going_to_sleep {
        Signal::SystemWillSleep
    } else {
        Signal::SystemDidWake
    }
}

fn screens_signal(blanked: bool) -> Signal {
    if blanked {
        Signal::ScreensWillSleep
    } else {
        Signal::ScreensDidWake
    }
}

/// Forward logind suspend/resume until the service loop goes away
pub async fn watch_system(events: EventSender) -> Result<()> {
    let connection = Connection::system().await?;
    let proxy = LoginManagerProxy::new(&connection).await?;
    let mut stream = proxy.receive_prepare_for_sleep().await?;
    info!("Listening for system sleep");

    while let Some(message) = stream.next().await {
        let start = match message.args() {
            Ok(args) => args.start,
            Err(e) => {
                warn!("Malformed PrepareForSleep signal: {}", e);
                continue;
            }
        };
        if events.send(system_signal(start).into()).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Forward screen blanking and unblanking until the service loop goes away
pub async fn watch_screens(events: EventSender) -> Result<()> {
    let connection = Connection::session().await?;
    let proxy = ScreenSaverProxy::new(&connection).await?;
    let mut stream = proxy.receive_active_changed().await?;
    info!("Listening for screen sleep");

    while let Some(message) = stream.next().await {
        let active = match message.args() {
            Ok(args) => args.active,
            Err(e) => {
                warn!("Malformed ActiveChanged signal: {}", e);
                continue;
            }
        };
        if events.send(screens_signal(active).into()).await.is_err() {
            break;
        }
    }

    Ok(())
}
