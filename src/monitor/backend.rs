// SPDX-License-Identifier: GPL-3.0-only
use crate::protocols::{DisplayProtocol, ddc_ci::DdcCiDisplay, software::SoftwareDisplay};

pub type DisplayId = String;

/// Backend type for display control
pub enum DisplayBackend {
    /// DDC/CI protocol (standard external monitors via I2C)
    DdcCi(DdcCiDisplay),
    /// Software dimming level (connected, but no DDC/CI)
    Software(SoftwareDisplay),
}

impl std::fmt::Debug for DisplayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayBackend::DdcCi(display) => write!(f, "{:?}", display),
            DisplayBackend::Software(display) => write!(f, "{:?}", display),
        }
    }
}

impl DisplayBackend {
    fn protocol(&mut self) -> &mut dyn DisplayProtocol {
        match self {
            DisplayBackend::DdcCi(display) => display,
            DisplayBackend::Software(display) => display,
        }
    }

    pub fn id(&self) -> String {
        match self {
            DisplayBackend::DdcCi(display) => display.id(),
            DisplayBackend::Software(display) => display.id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            DisplayBackend::DdcCi(display) => display.name(),
            DisplayBackend::Software(display) => display.name(),
        }
    }

    pub fn kind(&self) -> DisplayKind {
        match self {
            DisplayBackend::DdcCi(_) => DisplayKind::DdcCi,
            DisplayBackend::Software(_) => DisplayKind::Software,
        }
    }

    /// Get the current brightness (0-100)
    pub fn get_brightness(&mut self) -> anyhow::Result<u16> {
        self.protocol().get_brightness()
    }

    /// Set the brightness (0-100)
    pub fn set_brightness(&mut self, value: u16) -> anyhow::Result<()> {
        self.protocol().set_brightness(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    DdcCi,
    Software,
}

/// What the rest of the daemon knows about a display
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub id: DisplayId,
    /// Model name, with a counter suffix when several displays share it
    pub name: String,
    pub kind: DisplayKind,
    /// Last brightness read from the display, `None` if it was not probed
    pub brightness: Option<u16>,
}
