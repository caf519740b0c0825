// SPDX-License-Identifier: GPL-3.0-only
//! Brightness calculation and software brightness levels
//!
//! [`BrightnessCalculator`] maps a brightness-key percentage to the value
//! sent to a display. [`BrightnessStore`] remembers the levels of
//! software-only displays across reconfigurations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::monitor::{DisplayId, DisplayKind, DisplayManager};

/// Level a software display is restored to when nothing else is known
pub const FULL_BRIGHTNESS: u16 = 100;

/// Apply a gamma curve to a 0.0-1.0 slider position
pub fn get_mapped_brightness(slider_brightness: f32, gamma: f32) -> u16 {
    (slider_brightness.powf(gamma) * 100.0).round() as u16
}

/// Handles brightness calculations with gamma correction and minimum brightness
pub struct BrightnessCalculator<'a> {
    config: &'a Config,
}

impl<'a> BrightnessCalculator<'a> {
    /// Create a new brightness calculator with the given configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Application configuration containing per-monitor settings
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Calculate brightness for a specific display
    ///
    /// This method applies gamma correction and minimum brightness clamping
    /// based on per-monitor configuration.
    ///
    /// # Arguments
    ///
    /// * `key_percentage` - Brightness percentage from the brightness keys (0-100)
    /// * `display_id` - The unique display identifier
    ///
    /// # Returns
    ///
    /// Final brightness value (0-100) after gamma correction and min brightness clamping
    ///
    pub fn calculate_for_display(&self, key_percentage: u16, display_id: &str) -> u16 {
        // Convert percentage to slider value (0.0-1.0)
        let slider_value = (key_percentage as f32 / 100.0).clamp(0.0, 1.0);

        // Apply gamma correction for this monitor
        let gamma = self.config.get_gamma_map(display_id);
        let mut gamma_corrected = get_mapped_brightness(slider_value, gamma);

        // Apply minimum brightness clamp
        let min_brightness = self.config.get_min_brightness(display_id);
        if gamma_corrected < min_brightness {
            tracing::debug!(
                display_id = %display_id,
                calculated = %gamma_corrected,
                min = %min_brightness,
                "Clamping brightness to minimum"
            );
            gamma_corrected = min_brightness;
        }

        gamma_corrected
    }

    /// Check if brightness sync is enabled for a display
    ///
    /// # Arguments
    ///
    /// * `display_id` - The unique display identifier
    ///
    /// # Returns
    ///
    /// `true` if keyboard brightness sync is enabled for this display
    pub fn is_sync_enabled(&self, display_id: &str) -> bool {
        self.config.is_sync_enabled(display_id)
    }
}

/// How [`BrightnessStore::reconcile`] treats the saved levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Forget saved levels, without touching the displays
    SettingsOnly,
    /// Re-apply saved levels in the background
    RestoreAsync,
}

/// Saved levels of software-only displays
#[derive(Clone, Default)]
pub struct BrightnessStore {
    saved: Arc<Mutex<HashMap<DisplayId, u16>>>,
}

impl BrightnessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remember(&self, id: &str, value: u16) {
        self.saved.lock().await.insert(id.to_string(), value);
    }

    #[cfg(test)]
    pub async fn saved(&self, id: &str) -> Option<u16> {
        self.saved.lock().await.get(id).copied()
    }

    /// Bring saved levels in line with the current displays
    ///
    /// Returns the restore task in [`ReconcileMode::RestoreAsync`].
    pub async fn reconcile(
        &self,
        mode: ReconcileMode,
        manager: &DisplayManager,
    ) -> Option<JoinHandle<()>> {
        let software = software_ids(manager).await;

        match mode {
            ReconcileMode::SettingsOnly => {
                let mut saved = self.saved.lock().await;
                for id in software {
                    saved.insert(id, FULL_BRIGHTNESS);
                }
                None
            }
            ReconcileMode::RestoreAsync => {
                let levels: Vec<_> = {
                    let saved = self.saved.lock().await;
                    software
                        .into_iter()
                        .filter_map(|id| saved.get(&id).map(|&level| (id, level)))
                        .collect()
                };
                let manager = manager.clone();
                Some(tokio::spawn(async move {
                    for (id, level) in levels {
                        debug!("Restoring software brightness of {} to {}%", id, level);
                        if let Err(e) = manager.set_brightness(&id, level).await {
                            error!("Failed to restore brightness of {}: {}", id, e);
                        }
                    }
                }))
            }
        }
    }

    /// Put every software display back to full brightness
    pub async fn reset_all(&self, manager: &DisplayManager) {
        for id in software_ids(manager).await {
            if let Err(e) = manager.set_brightness(&id, FULL_BRIGHTNESS).await {
                error!("Failed to reset brightness of {}: {}", id, e);
            }
            self.remember(&id, FULL_BRIGHTNESS).await;
        }
    }
}

async fn software_ids(manager: &DisplayManager) -> Vec<DisplayId> {
    manager
        .displays()
        .await
        .into_iter()
        .filter(|d| d.kind == DisplayKind::Software)
        .map(|d| d.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_basic_calculation() {
        let config = create_test_config();
        let calculator = BrightnessCalculator::new(&config);

        // Test basic calculation (no gamma, no min)
        let result = calculator.calculate_for_display(50, "test-display");
        assert!(result <= 100);
    }

    #[test]
    fn test_min_brightness_clamping() {
        let mut config = create_test_config();
        // Set minimum brightness to 10%
        config.monitors.insert(
            "test-display".to_string(),
            crate::config::MonitorConfig {
                min_brightness: 10,
                ..crate::config::MonitorConfig::new()
            },
        );

        let calculator = BrightnessCalculator::new(&config);

        // Test that 0% gets clamped to 10%
        let result = calculator.calculate_for_display(0, "test-display");
        assert_eq!(result, 10);
    }

    #[test]
    fn test_max_brightness() {
        let config = create_test_config();
        let calculator = BrightnessCalculator::new(&config);

        // Test that 100% stays at 100%
        let result = calculator.calculate_for_display(100, "test-display");
        assert_eq!(result, 100);
    }

    #[test]
    fn test_out_of_range_input() {
        let config = create_test_config();
        let calculator = BrightnessCalculator::new(&config);

        // Test that values > 100 are handled
        let result = calculator.calculate_for_display(150, "test-display");
        assert!(result <= 100);
    }

    #[test]
    fn test_sync_enabled() {
        let mut config = create_test_config();
        config.monitors.insert(
            "enabled-display".to_string(),
            crate::config::MonitorConfig {
                ..crate::config::MonitorConfig::new()
            },
        );
        config.monitors.insert(
            "disabled-display".to_string(),
            crate::config::MonitorConfig {
                sync_with_brightness_keys: false,
                ..crate::config::MonitorConfig::new()
            },
        );

        let calculator = BrightnessCalculator::new(&config);

        assert!(calculator.is_sync_enabled("enabled-display"));
        assert!(!calculator.is_sync_enabled("disabled-display"));
    }

    #[tokio::test]
    async fn test_settings_only_forgets_levels() {
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        let store = BrightnessStore::new();
        store.remember("sw-card1-DP-1", 30).await;

        assert!(store.reconcile(ReconcileMode::SettingsOnly, &manager).await.is_none());
        assert_eq!(store.saved("sw-card1-DP-1").await, Some(FULL_BRIGHTNESS));
    }

    #[tokio::test]
    async fn test_restore_applies_saved_levels() {
        let manager =
            crate::monitor::software_manager(&[("card1-DP-1", "LG"), ("card1-DP-2", "Dell")]).await;
        let store = BrightnessStore::new();
        store.remember("sw-card1-DP-1", 30).await;

        let task = store.reconcile(ReconcileMode::RestoreAsync, &manager).await;
        task.expect("restore task").await.unwrap();

        let displays = manager.displays().await;
        assert_eq!(displays[0].brightness, Some(30));
        assert_eq!(displays[1].brightness, Some(100));
    }

    #[tokio::test]
    async fn test_reset_all() {
        let manager = crate::monitor::software_manager(&[("card1-DP-1", "LG")]).await;
        manager.set_brightness("sw-card1-DP-1", 20).await.unwrap();
        let store = BrightnessStore::new();
        store.remember("sw-card1-DP-1", 20).await;

        store.reset_all(&manager).await;

        assert_eq!(manager.displays().await[0].brightness, Some(FULL_BRIGHTNESS));
        assert_eq!(store.saved("sw-card1-DP-1").await, Some(FULL_BRIGHTNESS));
    }

    #[test]
    fn test_gamma_mapping() {
        assert_eq!(get_mapped_brightness(0.5, 1.0), 50);
        assert_eq!(get_mapped_brightness(0.5, 2.0), 25);
        assert_eq!(get_mapped_brightness(1.0, 2.2), 100);
    }
}
