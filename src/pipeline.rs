// SPDX-License-Identifier: GPL-3.0-only
//! Reconfiguration pipeline
//!
//! The coordinator decides *when* displays are re-enumerated; this module
//! decides *what* happens then. [`DisplayPipeline`] wires the collaborators
//! together: the display manager (enumeration and DDC/CI bindings), the
//! control-surface builder, the software brightness store and the media-key
//! binder. Collaborator failures are logged where they happen and never
//! reach the coordinator.

use crate::brightness::{BrightnessStore, ReconcileMode};
use crate::config::ConfigStore;
use crate::media_keys::MediaKeyBinder;
use crate::menu::MenuBuilder;
use crate::monitor::{DisplayManager, EnumerationOptions};

/// Collaborator calls issued by the service loop
///
/// All calls are fire-and-forget: an implementation handles its own errors.
pub trait Pipeline {
    /// Full pass: enumerate, disambiguate, rebind, rebuild
    async fn reconfigure(&mut self, first_run: bool);

    /// Post-wake refresh of the display control bindings only
    async fn refresh_service_bindings(&mut self);

    /// Regenerate the control surface from the displays already known
    async fn rebuild_menu(&mut self);

    fn check_permissions(&mut self);

    async fn rebind_media_keys(&mut self);

    async fn reset_preferences(&mut self);

    async fn shutdown(&mut self);
}

pub struct DisplayPipeline {
    config: ConfigStore,
    manager: DisplayManager,
    menu: MenuBuilder,
    brightness: BrightnessStore,
    media_keys: MediaKeyBinder,
    options: EnumerationOptions,
}

impl DisplayPipeline {
    pub fn new(
        config: ConfigStore,
        manager: DisplayManager,
        menu: MenuBuilder,
        brightness: BrightnessStore,
        media_keys: MediaKeyBinder,
        options: EnumerationOptions,
    ) -> Self {
        Self {
            config,
            manager,
            menu,
            brightness,
            media_keys,
            options,
        }
    }

    fn restores_software_brightness(&self) -> bool {
        let config = self.config.current();
        config.fallback_sw || config.lower_sw_after_brightness
    }
}

impl Pipeline for DisplayPipeline {
    async fn reconfigure(&mut self, first_run: bool) {
        let displays = self.manager.refresh_displays(&self.options).await;
        self.manager.refresh_service_bindings().await;
        self.menu.notify_display_list(&displays);

        if first_run {
            self.brightness
                .reconcile(ReconcileMode::SettingsOnly, &self.manager)
                .await;
        }

        self.menu.rebuild(&displays, &self.config.current());

        if !first_run && self.restores_software_brightness() {
            self.brightness
                .reconcile(ReconcileMode::RestoreAsync, &self.manager)
                .await;
        }

        self.media_keys.rebind().await;
    }

    async fn refresh_service_bindings(&mut self) {
        self.manager.refresh_service_bindings().await;
    }

    async fn rebuild_menu(&mut self) {
        let displays = self.manager.displays().await;
        self.menu.rebuild(&displays, &self.config.current());
    }

    fn check_permissions(&mut self) {
        crate::permissions::report_if_required(self.config.current().listen_for);
    }

    async fn rebind_media_keys(&mut self) {
        self.media_keys.rebind().await;
    }

    async fn reset_preferences(&mut self) {
        if self.restores_software_brightness() {
            self.brightness.reset_all(&self.manager).await;
        }
        if let Err(e) = self.config.reset() {
            error!("can't write default preferences: {e}");
        }
    }

    async fn shutdown(&mut self) {
        info!("Goodbye!");
        self.media_keys.unbind();
        self.brightness.reset_all(&self.manager).await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio::sync::watch;

    use super::*;
    use crate::config::{Config, ListenFor};
    use crate::menu::{ControlSurface, MenuEntry};
    use crate::monitor::MonitorInfo;

    const LG: &str = "sw-card1-DP-1";

    struct Fixture {
        pipeline: DisplayPipeline,
        manager: DisplayManager,
        store: BrightnessStore,
        surface: watch::Receiver<ControlSurface>,
        display_list: watch::Receiver<Vec<MonitorInfo>>,
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "monitor-control-daemon-pipeline-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Pipeline over a fake DRM tree holding `connectors`, all connected
    fn fixture(name: &str, config: Config, manager: DisplayManager, connectors: &[&str]) -> Fixture {
        let dir = temp_dir(name);
        let config_path = dir.join("config.kdl");
        std::fs::write(&config_path, config.to_kdl()).unwrap();
        let config = ConfigStore::load(config_path);

        let drm_root = dir.join("drm");
        for connector in connectors {
            let connector = drm_root.join(connector);
            std::fs::create_dir_all(&connector).unwrap();
            std::fs::write(connector.join("status"), "connected\n").unwrap();
        }
        std::fs::create_dir_all(&drm_root).unwrap();

        let store = BrightnessStore::new();
        let menu = MenuBuilder::new();
        let surface = menu.subscribe();
        let display_list = menu.subscribe_display_list();
        let media_keys = MediaKeyBinder::new(manager.clone(), config.clone(), store.clone());
        let pipeline = DisplayPipeline::new(
            config,
            manager.clone(),
            menu,
            store.clone(),
            media_keys,
            EnumerationOptions {
                safe_mode: true,
                drm_root,
            },
        );

        Fixture {
            pipeline,
            manager,
            store,
            surface,
            display_list,
        }
    }

    fn quiet_config() -> Config {
        Config {
            listen_for: ListenFor::None,
            ..Config::default()
        }
    }

    async fn brightness(manager: &DisplayManager, id: &str) -> Option<u16> {
        manager
            .displays()
            .await
            .into_iter()
            .find(|d| d.id == id)
            .and_then(|d| d.brightness)
    }

    #[tokio::test]
    async fn test_no_displays_publishes_placeholder() {
        let mut f = fixture("empty", quiet_config(), DisplayManager::new(), &[]);

        f.pipeline.reconfigure(true).await;

        assert!(f.display_list.has_changed().unwrap());
        assert!(f.display_list.borrow_and_update().is_empty());
        assert_eq!(
            f.surface.borrow_and_update().entries,
            vec![MenuEntry::Placeholder("No supported display found".to_string())]
        );
    }

    #[tokio::test]
    async fn test_first_run_does_not_restore_levels() {
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let mut f = fixture("first-run", quiet_config(), manager, &["card1-DP-1"]);
        f.store.remember(LG, 30).await;
        f.manager.set_brightness(LG, 40).await.unwrap();

        f.pipeline.reconfigure(true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.store.saved(LG).await, Some(100));
        assert_eq!(brightness(&f.manager, LG).await, Some(40));

        let ids: Vec<_> = f.display_list.borrow_and_update().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![LG.to_string()]);
        match f.surface.borrow_and_update().entries.as_slice() {
            [MenuEntry::Section(menu)] => assert_eq!(menu.id, LG),
            other => panic!("unexpected control surface: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_later_run_restores_saved_levels() {
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let mut f = fixture("restore", quiet_config(), manager, &["card1-DP-1"]);
        f.store.remember(LG, 30).await;

        f.pipeline.reconfigure(false).await;

        let mut restored = false;
        for _ in 0..100 {
            if brightness(&f.manager, LG).await == Some(30) {
                restored = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(restored, "saved level was not restored");
        assert_eq!(f.store.saved(LG).await, Some(30));
    }

    #[tokio::test]
    async fn test_later_run_without_software_control_leaves_levels() {
        let config = Config {
            fallback_sw: false,
            lower_sw_after_brightness: false,
            ..quiet_config()
        };
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let mut f = fixture("no-restore", config, manager, &["card1-DP-1"]);
        f.store.remember(LG, 30).await;
        f.manager.set_brightness(LG, 40).await.unwrap();

        f.pipeline.reconfigure(false).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(brightness(&f.manager, LG).await, Some(40));
        assert_eq!(f.store.saved(LG).await, Some(30));
        // software displays are hidden without fallback
        assert_eq!(
            f.surface.borrow_and_update().entries,
            vec![MenuEntry::Placeholder("No supported display found".to_string())]
        );
        assert_eq!(f.display_list.borrow_and_update().len(), 1);
    }

    #[tokio::test]
    async fn test_unplugged_display_leaves_the_list() {
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let mut f = fixture("unplugged", quiet_config(), manager, &["card1-DP-2"]);

        f.pipeline.reconfigure(false).await;

        let ids: Vec<_> = f.display_list.borrow_and_update().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["sw-card1-DP-2".to_string()]);
        assert!(f.manager.get(LG).await.is_none());
    }
}
