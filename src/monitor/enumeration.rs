// SPDX-License-Identifier: GPL-3.0-only
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::protocols::ddc_ci::DdcCiDisplay;
use crate::protocols::software::{DRM_SYSFS, SoftwareDisplay};
use crate::protocols::DisplayProtocol;

use super::backend::{DisplayBackend, DisplayId, MonitorInfo};

/// Attempts at reading brightness from a freshly plugged DDC/CI display
const PROBE_ATTEMPTS: u64 = 5;

pub type SharedBackend = Arc<tokio::sync::Mutex<DisplayBackend>>;

#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    /// Register DDC/CI displays without reading from them
    pub safe_mode: bool,
    pub drm_root: PathBuf,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            safe_mode: false,
            drm_root: PathBuf::from(DRM_SYSFS),
        }
    }
}

/// Result of one enumeration pass
#[derive(Default)]
pub struct Enumeration {
    /// Displays that were not known before
    pub found: Vec<MonitorInfo>,
    pub backends: HashMap<DisplayId, SharedBackend>,
    /// Every display id seen in this pass, known ones included
    pub present: HashSet<DisplayId>,
    /// Some DDC/CI display answered enumeration but not the brightness probe
    pub some_failed: bool,
}

/// Enumerate all available displays (DDC/CI and software-only)
///
/// `known_ids`: display IDs that are already cached and should be skipped.
pub async fn enumerate_displays(
    known_ids: &HashSet<DisplayId>,
    options: &EnumerationOptions,
) -> Enumeration {
    let mut res = Vec::new();
    let mut displays = HashMap::new();
    let mut present = HashSet::new();
    let mut some_failed = false;

    info!("=== START ENUMERATE (known displays: {}) ===", known_ids.len());

    let ddc_displays = match tokio::task::spawn_blocking(DdcCiDisplay::enumerate).await {
        Ok(found) => found,
        Err(e) => {
            error!("DDC/CI enumeration task failed: {e}");
            Vec::new()
        }
    };
    info!("Found {} DDC/CI display(s) total", ddc_displays.len());

    // every DDC/CI model present, cached or not, hides its DRM connector
    let ddc_names: HashSet<String> = ddc_displays.iter().map(|ddc| ddc.name()).collect();

    let mut ddc_tasks = Vec::new();
    for ddc in ddc_displays {
        let id = ddc.id();
        if !id.starts_with("ddc-") {
            warn!(
                "DDC/CI display '{}' using unstable I2C-based ID: {} - settings may not persist across reboots",
                ddc.name(),
                id
            );
        }

        present.insert(id.clone());
        if known_ids.contains(&id) {
            debug!("Skipping cached DDC/CI display: {}", id);
            continue;
        }

        info!("Probing new DDC/CI display: {} (ID: {})", ddc.name(), id);
        let safe_mode = options.safe_mode;
        ddc_tasks.push(tokio::task::spawn_blocking(move || {
            probe(DisplayBackend::DdcCi(ddc), safe_mode)
        }));
    }

    for task in ddc_tasks {
        match task.await.map_err(AppError::from) {
            Ok(Ok((mon, backend))) => {
                info!("Successfully initialized DDC/CI display: {} ({})", mon.name, mon.id);
                displays.insert(mon.id.clone(), Arc::new(tokio::sync::Mutex::new(backend)));
                res.push(mon);
            }
            Ok(Err(e)) | Err(e) => {
                error!("Failed to initialize DDC/CI display: {}", e);
                some_failed = true;
            }
        }
    }

    for connector in SoftwareDisplay::enumerate(&options.drm_root) {
        let id = connector.id();
        if connector.model_name().is_some_and(|name| ddc_names.contains(name)) {
            debug!("Connector {} is driven over DDC/CI, not adding software control", id);
            continue;
        }
        present.insert(id.clone());
        if known_ids.contains(&id) {
            continue;
        }

        let mut backend = DisplayBackend::Software(connector);
        let mon = MonitorInfo {
            id: id.clone(),
            name: backend.name(),
            kind: backend.kind(),
            brightness: backend.get_brightness().ok(),
        };
        info!("Found software-only display: {} ({})", mon.name, id);
        displays.insert(id, Arc::new(tokio::sync::Mutex::new(backend)));
        res.push(mon);
    }

    info!("=== END ENUMERATE: Found {} new monitors ===", res.len());

    Enumeration {
        found: res,
        backends: displays,
        present,
        some_failed,
    }
}

/// Read the brightness of a new display, retrying while DDC/CI wakes up
///
/// Runs on a blocking thread.
fn probe(mut backend: DisplayBackend, safe_mode: bool) -> Result<(MonitorInfo, DisplayBackend)> {
    let id = backend.id();
    let name = backend.name();

    let brightness = if safe_mode {
        debug!("Safe mode, not reading from {}", id);
        None
    } else {
        let mut last_error = None;
        let mut value = None;
        for attempt in 1..=PROBE_ATTEMPTS {
            match backend.get_brightness() {
                Ok(v) => {
                    if attempt > 1 {
                        info!("DDC/CI display succeeded on attempt {}", attempt);
                    }
                    value = Some(v);
                    break;
                }
                Err(e) => {
                    debug!("DDC/CI attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < PROBE_ATTEMPTS {
                        // 100ms, 150ms, 200ms, 250ms
                        std::thread::sleep(Duration::from_millis(50 + attempt * 50));
                    }
                }
            }
        }

        match value {
            Some(v) => Some(v),
            None => {
                return Err(AppError::DisplayInit {
                    id,
                    reason: last_error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no response".to_string()),
                });
            }
        }
    };

    if brightness == Some(0) {
        warn!(
            display_id = %id,
            display_name = %name,
            "Monitor reports 0% brightness - this may indicate DDC/CI communication issues or unsupported monitor"
        );
    }

    let mon = MonitorInfo {
        id,
        name,
        kind: backend.kind(),
        brightness,
    };
    Ok((mon, backend))
}

/// Give displays that share a name a ` (1)`, ` (2)`, ... suffix
///
/// Numbering follows the order of `displays`, which callers keep sorted by id.
pub fn add_counter_suffixes(displays: &mut [MonitorInfo]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for display in displays.iter() {
        *counts.entry(display.name.clone()).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for display in displays.iter_mut() {
        if counts[&display.name] > 1 {
            let index = seen.entry(display.name.clone()).or_default();
            *index += 1;
            display.name = format!("{} ({})", display.name, index);
        }
    }
}
