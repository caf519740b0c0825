// SPDX-License-Identifier: GPL-3.0-only
//! Color profile changes, as reported by colord

use futures::StreamExt;
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, proxy};

use crate::coordinator::Signal;
use crate::error::Result;
use crate::service::EventSender;

#[proxy(
    interface = "org.freedesktop.ColorManager",
    default_service = "org.freedesktop.ColorManager",
    default_path = "/org/freedesktop/ColorManager"
)]
trait ColorManager {
    #[zbus(signal)]
    fn device_changed(&self, device: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn profile_changed(&self, profile: OwnedObjectPath) -> zbus::Result<()>;
}

/// Forward colord device and profile changes as `ColorProfileChanged`
pub async fn watch(events: EventSender) -> Result<()> {
    let connection = Connection::system().await?;
    let proxy = ColorManagerProxy::new(&connection).await?;

    let devices = proxy.receive_device_changed().await?.map(|_| ());
    let profiles = proxy.receive_profile_changed().await?.map(|_| ());
    let mut changes = futures::stream::select(devices, profiles);
    info!("Listening for color profile changes");

    while changes.next().await.is_some() {
        debug!("Color profile changed");
        if events.send(Signal::ColorProfileChanged.into()).await.is_err() {
            break;
        }
    }

    Ok(())
}
