// SPDX-License-Identifier: GPL-3.0-only
//! Control surface model
//!
//! The daemon has no UI of its own. It publishes a description of the
//! controls a front end should show, rebuilt whenever displays or display
//! preferences change.

use tokio::sync::watch;

use crate::config::Config;
use crate::monitor::{DisplayId, DisplayKind, MonitorInfo};

const PLACEHOLDER: &str = "No supported display found";
/// Above this many displays every display gets its own submenu
const MAX_INLINE_DISPLAYS: usize = 3;
const TICK_MARKS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Volume,
    Contrast,
    Brightness,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slider {
    pub control: Control,
    pub value: Option<u16>,
    /// Number of tick marks under the slider, 0 for none
    pub tick_marks: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMenu {
    pub id: DisplayId,
    pub title: String,
    pub sliders: Vec<Slider>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuEntry {
    /// Disabled item shown when there is nothing to control
    Placeholder(String),
    /// Headed section, displays listed inline
    Section(DisplayMenu),
    Submenu(DisplayMenu),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSurface {
    pub entries: Vec<MenuEntry>,
}

impl ControlSurface {
    pub fn build(displays: &[MonitorInfo], config: &Config) -> Self {
        let shown: Vec<_> = displays
            .iter()
            .filter(|d| d.kind == DisplayKind::DdcCi || config.fallback_sw)
            .collect();

        if shown.is_empty() {
            return Self {
                entries: vec![MenuEntry::Placeholder(PLACEHOLDER.to_string())],
            };
        }

        let as_submenus = shown.len() > MAX_INLINE_DISPLAYS;
        let entries = shown
            .into_iter()
            .map(|display| {
                let menu = display_menu(display, config);
                if as_submenus {
                    MenuEntry::Submenu(menu)
                } else {
                    MenuEntry::Section(menu)
                }
            })
            .collect();

        Self { entries }
    }
}

fn display_menu(display: &MonitorInfo, config: &Config) -> DisplayMenu {
    let tick_marks = if config.show_tick_marks { TICK_MARKS } else { 0 };
    let slider = |control, value| Slider {
        control,
        value,
        tick_marks,
    };

    let mut sliders = Vec::new();
    if display.kind == DisplayKind::DdcCi {
        if config.show_volume {
            sliders.push(slider(Control::Volume, None));
        }
        if config.show_contrast {
            sliders.push(slider(Control::Contrast, None));
        }
    }
    sliders.push(slider(Control::Brightness, display.brightness));

    DisplayMenu {
        id: display.id.clone(),
        title: config
            .friendly_name(&display.id)
            .map(str::to_string)
            .unwrap_or_else(|| display.name.clone()),
        sliders,
    }
}

/// Publishes the control surface and the display list
pub struct MenuBuilder {
    surface: watch::Sender<ControlSurface>,
    display_list: watch::Sender<Vec<MonitorInfo>>,
}

impl MenuBuilder {
    pub fn new() -> Self {
        Self {
            surface: watch::channel(ControlSurface::default()).0,
            display_list: watch::channel(Vec::new()).0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSurface> {
        self.surface.subscribe()
    }

    pub fn subscribe_display_list(&self) -> watch::Receiver<Vec<MonitorInfo>> {
        self.display_list.subscribe()
    }

    /// Tell listeners the set of displays was refreshed
    pub fn notify_display_list(&self, displays: &[MonitorInfo]) {
        self.display_list.send_replace(displays.to_vec());
    }

    pub fn rebuild(&self, displays: &[MonitorInfo], config: &Config) {
        let surface = ControlSurface::build(displays, config);
        debug!("Control surface rebuilt with {} entries", surface.entries.len());
        self.surface.send_replace(surface);
    }
}

impl Default for MenuBuilder {
    fn default() -> Self {
        Self::new()
    }
}
