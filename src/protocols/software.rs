// SPDX-License-Identifier: GPL-3.0-only
//! Software brightness for displays without DDC/CI
//!
//! Connected DRM connectors are read from sysfs. A software display only
//! holds a dimming level; rendering the dimming is up to whoever draws the
//! control surface.

use std::path::Path;

use anyhow::Result;

use super::DisplayProtocol;

pub const DRM_SYSFS: &str = "/sys/class/drm";

/// Connector types of built-in panels, which have their own backlight control
const INTERNAL_CONNECTORS: [&str; 3] = ["eDP", "LVDS", "DSI"];

pub struct SoftwareDisplay {
    connector: String,
    model_name: Option<String>,
    level: u16,
}

impl SoftwareDisplay {
    pub fn new(connector: String, model_name: Option<String>) -> Self {
        Self {
            connector,
            model_name,
            level: 100,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Enumerate connected external connectors below `root` (normally [`DRM_SYSFS`])
    pub fn enumerate(root: &Path) -> Vec<Self> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Can't read {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        let mut displays: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let connector = entry.file_name().to_string_lossy().into_owned();
                if !is_external_connector(&connector) {
                    return None;
                }

                let status = std::fs::read_to_string(entry.path().join("status")).ok()?;
                if status.trim() != "connected" {
                    return None;
                }

                let model_name = std::fs::read(entry.path().join("edid"))
                    .ok()
                    .and_then(|edid| edid_model_name(&edid));
                debug!("Connected DRM connector {} ({:?})", connector, model_name);
                Some(Self::new(connector, model_name))
            })
            .collect();

        displays.sort_by(|a, b| a.connector.cmp(&b.connector));
        displays
    }
}

/// `card1-DP-2` style names, excluding built-in panels
fn is_external_connector(name: &str) -> bool {
    let Some((card, connector)) = name.split_once('-') else {
        return false;
    };
    card.starts_with("card")
        && !INTERNAL_CONNECTORS
            .iter()
            .any(|internal| connector.starts_with(internal))
}

/// Extract the monitor name descriptor (tag 0xFC) from an EDID base block
pub fn edid_model_name(edid: &[u8]) -> Option<String> {
    const DESCRIPTORS: [usize; 4] = [54, 72, 90, 108];

    DESCRIPTORS.iter().find_map(|&offset| {
        let descriptor = edid.get(offset..offset + 18)?;
        if descriptor[..3] != [0, 0, 0] || descriptor[3] != 0xFC {
            return None;
        }
        let text: String = descriptor[5..]
            .iter()
            .take_while(|&&b| b != 0x0A)
            .map(|&b| b as char)
            .collect();
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

impl DisplayProtocol for SoftwareDisplay {
    fn id(&self) -> String {
        format!("sw-{}", self.connector)
    }

    fn name(&self) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| self.connector.clone())
    }

    fn get_brightness(&mut self) -> Result<u16> {
        Ok(self.level)
    }

    fn set_brightness(&mut self, value: u16) -> Result<()> {
        self.level = value.min(100);
        debug!("Software brightness of {} set to {}%", self.connector, self.level);
        Ok(())
    }
}

impl std::fmt::Debug for SoftwareDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftwareDisplay(id: {}, level: {})", self.id(), self.level)
    }
}
