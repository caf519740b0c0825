// SPDX-License-Identifier: GPL-3.0-only
//! Brightness-key capture
//!
//! While bound, a task follows COSMIC's `DisplayBrightness` property (changed
//! by the F1/F2 brightness keys) and applies it to every display that has key
//! sync enabled. Binding is re-evaluated whenever displays, preferences or
//! hardware access change; a rebind always drops the previous listener.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::brightness::{BrightnessCalculator, BrightnessStore};
use crate::config::{ConfigStore, ListenFor};
use crate::monitor::{DisplayId, DisplayKind, DisplayManager};

/// Whether brightness keys should be captured at all
pub fn should_listen(listen_for: ListenFor, can_access_displays: bool) -> bool {
    listen_for != ListenFor::None && can_access_displays
}

pub struct MediaKeyBinder {
    manager: DisplayManager,
    config: ConfigStore,
    store: BrightnessStore,
    task: Option<JoinHandle<()>>,
}

impl MediaKeyBinder {
    pub fn new(manager: DisplayManager, config: ConfigStore, store: BrightnessStore) -> Self {
        Self {
            manager,
            config,
            store,
            task: None,
        }
    }

    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Drop the current listener and start a new one if keys should be captured
    pub async fn rebind(&mut self) {
        self.unbind();

        let listen_for = self.config.current().listen_for;
        let permitted = crate::permissions::can_access_displays();
        if !should_listen(listen_for, permitted) {
            debug!(
                "Not capturing brightness keys (listen-for: {}, hardware access: {})",
                listen_for.as_str(),
                permitted
            );
            return;
        }

        if self.manager.count().await == 0 {
            debug!("No displays, not capturing brightness keys");
            return;
        }

        self.task = self.spawn_listener();
    }

    pub fn unbind(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Brightness keys released");
        }
    }

    #[cfg(feature = "brightness-key-sync")]
    fn spawn_listener(&self) -> Option<JoinHandle<()>> {
        let sync = KeySync {
            manager: self.manager.clone(),
            config: self.config.clone(),
            store: self.store.clone(),
            last_brightness: HashMap::new(),
        };
        Some(tokio::spawn(async move {
            if let Err(e) = sync.run().await {
                error!("Brightness key listener error: {:#}", e);
            }
        }))
    }

    #[cfg(not(feature = "brightness-key-sync"))]
    fn spawn_listener(&self) -> Option<JoinHandle<()>> {
        debug!("Built without brightness-key-sync, not capturing brightness keys");
        None
    }
}

impl Drop for MediaKeyBinder {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(feature = "brightness-key-sync")]
mod listener {
    use anyhow::{Context, Result};
    use futures::StreamExt;
    use zbus::{Connection, proxy};

    use super::KeySync;

    /// COSMIC Settings Daemon D-Bus proxy
    #[proxy(
        interface = "com.system76.CosmicSettingsDaemon",
        default_service = "com.system76.CosmicSettingsDaemon",
        default_path = "/com/system76/CosmicSettingsDaemon"
    )]
    trait CosmicSettingsDaemon {
        #[zbus(property)]
        fn display_brightness(&self) -> zbus::Result<i32>;

        #[zbus(property)]
        fn max_display_brightness(&self) -> zbus::Result<i32>;
    }

    /// Window in which rapid key repeats collapse into one change
    const DEBOUNCE: tokio::time::Duration = tokio::time::Duration::from_millis(50);
    const DRAIN_POLL: tokio::time::Duration = tokio::time::Duration::from_millis(5);

    impl KeySync {
        pub(super) async fn run(mut self) -> Result<()> {
            let connection = Connection::session()
                .await
                .context("Failed to connect to D-Bus session bus")?;
            let proxy = CosmicSettingsDaemonProxy::new(&connection)
                .await
                .context("Failed to create COSMIC Settings Daemon proxy")?;

            let max_brightness = proxy
                .max_display_brightness()
                .await
                .context("Failed to get max display brightness")?;
            debug!("Max display brightness: {}", max_brightness);

            let mut changes = proxy.receive_display_brightness_changed().await;
            info!("Listening for brightness keys");

            while let Some(change) = changes.next().await {
                let Ok(mut brightness) = change.get().await else {
                    continue;
                };

                tokio::time::sleep(DEBOUNCE).await;
                while let Ok(Some(newer)) = tokio::time::timeout(DRAIN_POLL, changes.next()).await {
                    if let Ok(newer) = newer.get().await {
                        debug!("Skipping intermediate brightness {}, using {}", brightness, newer);
                        brightness = newer;
                    }
                }

                self.apply(super::key_percentage(brightness, max_brightness))
                    .await;
            }

            warn!("Brightness change stream ended");
            Ok(())
        }
    }
}

/// Listener state: which display was last set to what
struct KeySync {
    manager: DisplayManager,
    config: ConfigStore,
    store: BrightnessStore,
    last_brightness: HashMap<DisplayId, u16>,
}

impl KeySync {
    /// Apply a key percentage to every sync-enabled display
    #[cfg_attr(not(feature = "brightness-key-sync"), allow(dead_code))]
    async fn apply(&mut self, percentage: u16) {
        let config = self.config.current();
        let calculator = BrightnessCalculator::new(&config);

        let mut writes = Vec::new();
        for mon in self.manager.displays().await {
            if !calculator.is_sync_enabled(&mon.id) {
                debug!("Skipping brightness sync for display {} (sync disabled)", mon.id);
                continue;
            }

            let value = calculator.calculate_for_display(percentage, &mon.id);
            if self.last_brightness.get(&mon.id) == Some(&value) {
                debug!("Skipping display {} - brightness unchanged at {}%", mon.id, value);
                continue;
            }
            self.last_brightness.insert(mon.id.clone(), value);

            if mon.kind == DisplayKind::Software {
                self.store.remember(&mon.id, value).await;
            }
            let manager = self.manager.clone();
            writes.push(async move {
                if let Err(e) = manager.set_brightness(&mon.id, value).await {
                    error!("Failed to set brightness on display {}: {}", mon.id, e);
                }
            });
        }

        let synced = writes.len();
        futures::future::join_all(writes).await;
        if synced > 0 {
            debug!("Synced brightness on {} display(s)", synced);
        }
    }
}

/// Convert the settings daemon's 0..=max value to a percentage
#[cfg_attr(not(feature = "brightness-key-sync"), allow(dead_code))]
fn key_percentage(brightness: i32, max_brightness: i32) -> u16 {
    if max_brightness <= 0 {
        return 0;
    }
    let percentage = (brightness.max(0) as f64 / max_brightness as f64) * 100.0;
    (percentage as u16).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MonitorConfig};

    #[test]
    fn test_should_listen() {
        assert!(should_listen(ListenFor::Brightness, true));
        assert!(!should_listen(ListenFor::Brightness, false));
        assert!(!should_listen(ListenFor::None, true));
        assert!(!should_listen(ListenFor::None, false));
    }

    #[test]
    fn test_key_percentage() {
        assert_eq!(key_percentage(0, 100), 0);
        assert_eq!(key_percentage(50, 100), 50);
        assert_eq!(key_percentage(7500, 7500), 100);
        assert_eq!(key_percentage(9000, 7500), 100);
        assert_eq!(key_percentage(10, 0), 0);
        assert_eq!(key_percentage(-5, 100), 0);
    }

    fn temp_config(name: &str, config: &Config) -> ConfigStore {
        let path = std::env::temp_dir()
            .join(format!("monitor-control-daemon-keys-{}-{}", name, std::process::id()))
            .join("config.kdl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, config.to_kdl()).unwrap();
        ConfigStore::load(path)
    }

    #[tokio::test]
    async fn test_apply_respects_sync_and_minimum() {
        let manager =
            crate::monitor::software_manager(&[("card1-DP-1", "LG"), ("card1-DP-2", "Dell")]).await;
        let mut config = Config::default();
        config.monitors.insert(
            "sw-card1-DP-1".to_string(),
            MonitorConfig {
                min_brightness: 20,
                ..MonitorConfig::new()
            },
        );
        config.monitors.insert(
            "sw-card1-DP-2".to_string(),
            MonitorConfig {
                sync_with_brightness_keys: false,
                ..MonitorConfig::new()
            },
        );

        let store = BrightnessStore::new();
        let mut sync = KeySync {
            manager: manager.clone(),
            config: temp_config("apply", &config),
            store: store.clone(),
            last_brightness: HashMap::new(),
        };
        sync.apply(10).await;

        let displays = manager.displays().await;
        assert_eq!(displays[0].brightness, Some(20));
        assert_eq!(displays[1].brightness, Some(100));
        assert_eq!(store.saved("sw-card1-DP-1").await, Some(20));
        assert_eq!(store.saved("sw-card1-DP-2").await, None);
    }

    #[tokio::test]
    async fn test_rebind_without_listen_for_stays_unbound() {
        let config = Config {
            listen_for: ListenFor::None,
            ..Config::default()
        };
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let mut binder =
            MediaKeyBinder::new(manager, temp_config("unbound", &config), BrightnessStore::new());

        binder.rebind().await;
        assert!(!binder.is_bound());
    }
}
