// SPDX-License-Identifier: GPL-3.0-only
//! User preferences
//!
//! Preferences are stored as KDL in
//! `$XDG_CONFIG_HOME/monitor-control-daemon/config.kdl`. The [`ConfigStore`]
//! keeps the current value in a watch channel so every collaborator reads the
//! same snapshot, and [`watch`] turns edits of the file into
//! `PreferenceChanged` signals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use tokio::sync::watch;

use crate::coordinator::Signal;
use crate::error::{AppError, Result};
use crate::monitor::DisplayId;
use crate::service::EventSender;

pub const APPID: &str = "monitor-control-daemon";
const CONFIG_FILE: &str = "config.kdl";
/// How often the watcher looks at the config file
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Preference keys whose changes the coordinator reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    ListenFor,
    FriendlyName,
    ShowVolume,
    ShowContrast,
    ShowTickMarks,
    FallbackSw,
    LowerSwAfterBrightness,
    /// Gamma, minimum brightness or key sync of a single monitor
    MonitorSettings,
}

impl PrefKey {
    /// Whether the control surface has to be rebuilt when this key changes
    pub fn affects_menu(self) -> bool {
        matches!(
            self,
            PrefKey::FriendlyName
                | PrefKey::ShowVolume
                | PrefKey::ShowContrast
                | PrefKey::ShowTickMarks
                | PrefKey::FallbackSw
        )
    }
}

/// Which media keys are captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenFor {
    #[default]
    Brightness,
    None,
}

impl ListenFor {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenFor::Brightness => "brightness",
            ListenFor::None => "none",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "brightness" => Some(ListenFor::Brightness),
            "none" => Some(ListenFor::None),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    /// Name shown instead of the EDID model name
    pub friendly_name: Option<String>,
    pub gamma_map: f32,
    /// Whether this monitor should respond to keyboard brightness keys
    pub sync_with_brightness_keys: bool,
    /// Minimum brightness percentage (0-100) that will be sent to hardware
    pub min_brightness: u16,
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self {
            friendly_name: None,
            gamma_map: 1.,
            sync_with_brightness_keys: true,
            min_brightness: 0,
        }
    }

    fn same_settings(&self, other: &MonitorConfig) -> bool {
        self.gamma_map == other.gamma_map
            && self.sync_with_brightness_keys == other.sync_with_brightness_keys
            && self.min_brightness == other.min_brightness
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub listen_for: ListenFor,
    pub show_volume: bool,
    pub show_contrast: bool,
    pub show_tick_marks: bool,
    /// Offer software brightness for displays without DDC/CI
    pub fallback_sw: bool,
    pub lower_sw_after_brightness: bool,
    pub monitors: HashMap<DisplayId, MonitorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_for: ListenFor::Brightness,
            show_volume: true,
            show_contrast: false,
            show_tick_marks: false,
            fallback_sw: true,
            lower_sw_after_brightness: false,
            monitors: HashMap::new(),
        }
    }
}

impl Config {
    pub fn get_gamma_map(&self, id: &str) -> f32 {
        self.monitors.get(id).map(|m| m.gamma_map).unwrap_or(1.0)
    }

    pub fn is_sync_enabled(&self, id: &str) -> bool {
        self.monitors
            .get(id)
            .map(|m| m.sync_with_brightness_keys)
            .unwrap_or(true)
    }

    pub fn get_min_brightness(&self, id: &str) -> u16 {
        self.monitors.get(id).map(|m| m.min_brightness).unwrap_or(0)
    }

    pub fn friendly_name(&self, id: &str) -> Option<&str> {
        self.monitors
            .get(id)
            .and_then(|m| m.friendly_name.as_deref())
    }

    /// Keys that differ between `self` and `newer`, each reported once
    pub fn changed_keys(&self, newer: &Config) -> Vec<PrefKey> {
        let mut keys = Vec::new();
        if self.listen_for != newer.listen_for {
            keys.push(PrefKey::ListenFor);
        }
        if self.show_volume != newer.show_volume {
            keys.push(PrefKey::ShowVolume);
        }
        if self.show_contrast != newer.show_contrast {
            keys.push(PrefKey::ShowContrast);
        }
        if self.show_tick_marks != newer.show_tick_marks {
            keys.push(PrefKey::ShowTickMarks);
        }
        if self.fallback_sw != newer.fallback_sw {
            keys.push(PrefKey::FallbackSw);
        }
        if self.lower_sw_after_brightness != newer.lower_sw_after_brightness {
            keys.push(PrefKey::LowerSwAfterBrightness);
        }

        let default = MonitorConfig::new();
        let ids = self.monitors.keys().chain(newer.monitors.keys());
        let (mut names_changed, mut settings_changed) = (false, false);
        for id in ids {
            let old = self.monitors.get(id).unwrap_or(&default);
            let new = newer.monitors.get(id).unwrap_or(&default);
            names_changed |= old.friendly_name != new.friendly_name;
            settings_changed |= !old.same_settings(new);
        }
        if names_changed {
            keys.push(PrefKey::FriendlyName);
        }
        if settings_changed {
            keys.push(PrefKey::MonitorSettings);
        }

        keys
    }

    /// Parse a KDL preference document
    ///
    /// Unknown nodes are ignored, missing nodes keep their defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text.parse()?;
        let mut config = Config::default();

        for node in doc.nodes() {
            let value = first_arg(node);
            match node.name().value() {
                "listen-for" => {
                    let raw = value.and_then(KdlValue::as_string).unwrap_or_default();
                    config.listen_for = ListenFor::parse(raw).ok_or_else(|| {
                        AppError::Config(format!("unknown listen-for value {raw:?}"))
                    })?;
                }
                "show-volume" => config.show_volume = bool_arg(node)?,
                "show-contrast" => config.show_contrast = bool_arg(node)?,
                "show-tick-marks" => config.show_tick_marks = bool_arg(node)?,
                "fallback-sw" => config.fallback_sw = bool_arg(node)?,
                "lower-sw-after-brightness" => config.lower_sw_after_brightness = bool_arg(node)?,
                "monitor" => {
                    let id = value
                        .and_then(KdlValue::as_string)
                        .ok_or_else(|| AppError::Config("monitor node without id".to_string()))?;
                    config
                        .monitors
                        .insert(id.to_string(), parse_monitor(node)?);
                }
                other => debug!("Ignoring unknown preference {other}"),
            }
        }

        Ok(config)
    }

    pub fn to_kdl(&self) -> String {
        let mut doc = KdlDocument::new();
        let nodes = doc.nodes_mut();
        nodes.push(node_with("listen-for", self.listen_for.as_str()));
        nodes.push(node_with("show-volume", self.show_volume));
        nodes.push(node_with("show-contrast", self.show_contrast));
        nodes.push(node_with("show-tick-marks", self.show_tick_marks));
        nodes.push(node_with("fallback-sw", self.fallback_sw));
        nodes.push(node_with(
            "lower-sw-after-brightness",
            self.lower_sw_after_brightness,
        ));

        let mut ids: Vec<_> = self.monitors.keys().collect();
        ids.sort();
        for id in ids {
            let monitor = &self.monitors[id];
            let mut children = KdlDocument::new();
            let child_nodes = children.nodes_mut();
            if let Some(name) = &monitor.friendly_name {
                child_nodes.push(node_with("friendly-name", name.as_str()));
            }
            // two decimals is all the precision the gamma slider has
            let gamma = (monitor.gamma_map as f64 * 100.0).round() / 100.0;
            child_nodes.push(node_with("gamma", gamma));
            child_nodes.push(node_with(
                "sync-brightness-keys",
                monitor.sync_with_brightness_keys,
            ));
            child_nodes.push(node_with(
                "min-brightness",
                KdlValue::Integer(monitor.min_brightness as i128),
            ));

            let mut node = node_with("monitor", id.as_str());
            node.set_children(children);
            nodes.push(node);
        }

        doc.autoformat();
        doc.to_string()
    }
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(KdlEntry::value)
}

fn bool_arg(node: &KdlNode) -> Result<bool> {
    first_arg(node).and_then(KdlValue::as_bool).ok_or_else(|| {
        AppError::Config(format!("{} expects #true or #false", node.name().value()))
    })
}

fn node_with(name: &str, value: impl Into<KdlValue>) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    node
}

fn parse_monitor(node: &KdlNode) -> Result<MonitorConfig> {
    let mut monitor = MonitorConfig::new();
    let Some(children) = node.children() else {
        return Ok(monitor);
    };

    for child in children.nodes() {
        let value = first_arg(child);
        match child.name().value() {
            "friendly-name" => {
                monitor.friendly_name = value.and_then(KdlValue::as_string).map(str::to_string);
            }
            "gamma" => {
                let gamma = value
                    .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
                    .ok_or_else(|| AppError::Config("gamma expects a number".to_string()))?;
                monitor.gamma_map = gamma as f32;
            }
            "sync-brightness-keys" => monitor.sync_with_brightness_keys = bool_arg(child)?,
            "min-brightness" => {
                let min = value
                    .and_then(KdlValue::as_integer)
                    .ok_or_else(|| AppError::Config("min-brightness expects an integer".to_string()))?;
                monitor.min_brightness = min.clamp(0, 100) as u16;
            }
            other => debug!("Ignoring unknown monitor preference {other}"),
        }
    }

    Ok(monitor)
}

/// Shared handle to the preference file and its current value
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    current: Arc<watch::Sender<Config>>,
}

impl ConfigStore {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(APPID)
            .join(CONFIG_FILE)
    }

    /// Load preferences from `path`, falling back to defaults on any error
    ///
    /// A missing file is created with the defaults.
    pub fn load(path: PathBuf) -> Self {
        let config = if path.exists() {
            match read_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("errors loading config {}: {}", path.display(), e);
                    Config::default()
                }
            }
        } else {
            let config = Config::default();
            if let Err(e) = write_config(&path, &config) {
                warn!("can't write default config {}: {}", path.display(), e);
            }
            config
        };

        let (current, _) = watch::channel(config);
        Self {
            path,
            current: Arc::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Config {
        self.current.borrow().clone()
    }

    /// Write default preferences and make them current
    pub fn reset(&self) -> Result<()> {
        let config = Config::default();
        write_config(&self.path, &config)?;
        self.current.send_replace(config);
        info!("Preferences reset to defaults");
        Ok(())
    }

    /// Re-read the file and return the keys that changed
    pub fn reload(&self) -> Result<Vec<PrefKey>> {
        let newer = read_config(&self.path)?;
        let keys = self.current.borrow().changed_keys(&newer);
        if !keys.is_empty() {
            self.current.send_replace(newer);
        }
        Ok(keys)
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    Config::parse(&text)
}

fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_kdl())?;
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll the preference file and report changes as signals
///
/// An edit yields one `PreferenceChanged` per changed key; deleting the file
/// yields `PreferenceReset`.
pub async fn watch(store: ConfigStore, events: EventSender) {
    let mut last_modified = modified(store.path());

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let now_modified = modified(store.path());
        if now_modified == last_modified {
            continue;
        }

        let signals = match now_modified {
            None => {
                info!("Preference file removed, resetting preferences");
                vec![Signal::PreferenceReset]
            }
            Some(_) => match store.reload() {
                Ok(keys) => {
                    debug!("Preferences reloaded, changed keys: {:?}", keys);
                    keys.into_iter().map(Signal::PreferenceChanged).collect()
                }
                Err(e) => {
                    error!("can't load config {}: {}", store.path().display(), e);
                    Vec::new()
                }
            },
        };
        // the reset rewrites the file; pick up its new timestamp next round
        last_modified = now_modified;

        for signal in signals {
            if events.send(signal.into()).await.is_err() {
                error!("Event loop closed, stopping preference watcher");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
listen-for "none"
show-volume #false
show-contrast #true
show-tick-marks #true
fallback-sw #false
lower-sw-after-brightness #true
monitor "ddc-0x112E647C" {
    friendly-name "Left"
    gamma 1.8
    sync-brightness-keys #false
    min-brightness 5
}
monitor "sw-card1-HDMI-A-1"
"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("{}-{}-{}", APPID, std::process::id(), name))
            .join(CONFIG_FILE)
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.listen_for, ListenFor::None);
        assert!(!config.show_volume);
        assert!(config.show_contrast);
        assert!(config.show_tick_marks);
        assert!(!config.fallback_sw);
        assert!(config.lower_sw_after_brightness);

        assert_eq!(config.friendly_name("ddc-0x112E647C"), Some("Left"));
        assert!((config.get_gamma_map("ddc-0x112E647C") - 1.8).abs() < f32::EPSILON);
        assert!(!config.is_sync_enabled("ddc-0x112E647C"));
        assert_eq!(config.get_min_brightness("ddc-0x112E647C"), 5);

        // bare monitor node keeps defaults
        assert_eq!(config.monitors["sw-card1-HDMI-A-1"], MonitorConfig::new());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_bad_listen_for_is_rejected() {
        assert!(Config::parse(r#"listen-for "everything""#).is_err());
        assert!(Config::parse("show-volume 3").is_err());
    }

    #[test]
    fn test_written_config_reads_back() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(Config::parse(&config.to_kdl()).unwrap(), config);
    }

    #[test]
    fn test_changed_keys() {
        let old = Config::default();
        let mut new = old.clone();
        assert!(old.changed_keys(&new).is_empty());

        new.listen_for = ListenFor::None;
        new.show_contrast = true;
        new.monitors.insert(
            "ddc-1".to_string(),
            MonitorConfig {
                friendly_name: Some("Desk".to_string()),
                ..MonitorConfig::new()
            },
        );
        assert_eq!(
            old.changed_keys(&new),
            vec![PrefKey::ListenFor, PrefKey::ShowContrast, PrefKey::FriendlyName]
        );
    }

    #[test]
    fn test_monitor_settings_change_is_reported_once() {
        let old = Config::default();
        let mut new = old.clone();
        for id in ["ddc-1", "ddc-2"] {
            new.monitors.insert(
                id.to_string(),
                MonitorConfig {
                    min_brightness: 10,
                    ..MonitorConfig::new()
                },
            );
        }
        assert_eq!(old.changed_keys(&new), vec![PrefKey::MonitorSettings]);
    }

    #[test]
    fn test_store_creates_reloads_and_resets() {
        let path = temp_path("store");
        let _ = std::fs::remove_file(&path);

        let store = ConfigStore::load(path.clone());
        assert!(path.exists());
        assert_eq!(store.current(), Config::default());

        std::fs::write(&path, SAMPLE).unwrap();
        let keys = store.reload().unwrap();
        assert!(keys.contains(&PrefKey::ListenFor));
        assert_eq!(store.current().listen_for, ListenFor::None);

        store.reset().unwrap();
        assert_eq!(store.current(), Config::default());
        assert_eq!(read_config(&path).unwrap(), Config::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_menu_keys() {
        assert!(PrefKey::FriendlyName.affects_menu());
        assert!(PrefKey::FallbackSw.affects_menu());
        assert!(!PrefKey::ListenFor.affects_menu());
        assert!(!PrefKey::MonitorSettings.affects_menu());
    }
}
