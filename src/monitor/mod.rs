// SPDX-License-Identifier: GPL-3.0-only
mod backend;
mod enumeration;
mod manager;

pub use backend::{DisplayId, DisplayKind, MonitorInfo};
pub use enumeration::EnumerationOptions;
pub use manager::DisplayManager;

#[cfg(test)]
pub(crate) use manager::tests::software_manager;
