// SPDX-License-Identifier: GPL-3.0-only
//! Display manager
//!
//! Owns one backend per physical display, so there is only ever one I2C
//! connection per monitor. The pipeline, the brightness store and the
//! brightness-key listener all go through a shared [`DisplayManager`].
//!
//! # Thread Safety
//!
//! Uses `Arc<RwLock<..>>` for the display table:
//! - Read operations (listing, looking up a display) use read locks
//! - Write operations (adding/removing displays) use write locks
//!
//! Each backend sits behind its own mutex, so a slow DDC/CI write to one
//! monitor does not hold up the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::protocols::ddc_ci::DdcCiDisplay;
use crate::protocols::DisplayProtocol;

use super::backend::{DisplayBackend, DisplayId, MonitorInfo};
use super::enumeration::{
    EnumerationOptions, SharedBackend, add_counter_suffixes, enumerate_displays,
};

#[derive(Default)]
struct Displays {
    backends: HashMap<DisplayId, SharedBackend>,
    /// Info as enumerated, without counter suffixes
    infos: HashMap<DisplayId, MonitorInfo>,
}

#[derive(Clone, Default)]
pub struct DisplayManager {
    displays: Arc<RwLock<Displays>>,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate and merge the result into the display table
    ///
    /// Existing connections are kept alive, new displays are added and
    /// displays that disappeared are dropped. Returns the full, disambiguated
    /// display list.
    pub async fn refresh_displays(&self, options: &EnumerationOptions) -> Vec<MonitorInfo> {
        let known: HashSet<DisplayId> = self.get_all_ids().await.into_iter().collect();
        let enumeration = enumerate_displays(&known, options).await;

        if enumeration.some_failed {
            warn!("Some displays did not answer, they will be retried on the next reconfiguration");
        }

        {
            let mut displays = self.displays.write().await;

            let gone: Vec<_> = displays
                .backends
                .keys()
                .filter(|id| !enumeration.present.contains(*id))
                .cloned()
                .collect();
            for id in gone {
                displays.backends.remove(&id);
                displays.infos.remove(&id);
                info!("Display {} removed from manager", id);
            }

            for (id, backend) in enumeration.backends {
                info!("Display {} added to manager", id);
                displays.backends.insert(id, backend);
            }
            for mon in enumeration.found {
                displays.infos.insert(mon.id.clone(), mon);
            }
        }

        self.displays().await
    }

    /// Reopen the DDC/CI handles of known displays
    ///
    /// Keeps display identity and cached state; only the underlying I2C
    /// handle is swapped for a fresh one.
    pub async fn refresh_service_bindings(&self) {
        let fresh = match tokio::task::spawn_blocking(DdcCiDisplay::enumerate).await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!("DDC/CI enumeration task failed: {e}");
                return;
            }
        };

        let mut rebound = 0;
        for ddc in fresh {
            let Some(backend) = self.get(&ddc.id()).await else {
                continue;
            };
            if let DisplayBackend::DdcCi(current) = &mut *backend.lock().await {
                current.rebind(ddc);
                rebound += 1;
            }
        }
        debug!("Refreshed {} DDC/CI binding(s)", rebound);
    }

    /// All known displays, sorted by id, with counter suffixes on shared names
    pub async fn displays(&self) -> Vec<MonitorInfo> {
        let mut list: Vec<_> = {
            let displays = self.displays.read().await;
            displays.infos.values().cloned().collect()
        };
        list.sort_by(|a, b| a.id.cmp(&b.id));
        add_counter_suffixes(&mut list);
        list
    }

    pub async fn get(&self, id: &str) -> Option<SharedBackend> {
        let displays = self.displays.read().await;
        displays.backends.get(id).cloned()
    }

    pub async fn get_all_ids(&self) -> Vec<DisplayId> {
        let displays = self.displays.read().await;
        displays.backends.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        let displays = self.displays.read().await;
        displays.backends.len()
    }

    /// Write a brightness to a display and remember it as its last known value
    ///
    /// DDC/CI writes block, so the backend is driven from a blocking thread.
    /// Unknown ids are ignored.
    pub async fn set_brightness(&self, id: &str, value: u16) -> Result<()> {
        let Some(backend) = self.get(id).await else {
            debug!("Display {} is gone, not setting brightness", id);
            return Ok(());
        };

        let target = id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = backend.blocking_lock();
            // DDC/CI needs 40ms between commands, retry once after 50ms
            if let Err(e) = guard.set_brightness(value) {
                debug!("Display {} first attempt failed: {}, retrying", target, e);
                std::thread::sleep(std::time::Duration::from_millis(50));
                if let Err(e) = guard.set_brightness(value) {
                    error!("Failed to set brightness on display {}: {}", target, e);
                }
            }
        })
        .await?;

        self.update(id, value).await;
        Ok(())
    }

    /// Record a brightness value for a display without touching the hardware
    pub async fn update(&self, id: &str, value: u16) {
        let mut displays = self.displays.write().await;
        if let Some(info) = displays.infos.get_mut(id) {
            info.brightness = Some(value);
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, backend: DisplayBackend, info: MonitorInfo) {
        let mut displays = self.displays.write().await;
        displays
            .backends
            .insert(info.id.clone(), Arc::new(tokio::sync::Mutex::new(backend)));
        displays.infos.insert(info.id.clone(), info);
    }
}

impl std::fmt::Debug for DisplayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayManager").finish_non_exhaustive()
    }
}
