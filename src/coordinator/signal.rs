// SPDX-License-Identifier: GPL-3.0-only
use crate::config::PrefKey;

use super::debounce::Scheduled;

/// Inbound signals from the OS event sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A display connector was added, removed or changed
    DisplayHardwareReconfigured,
    /// A color profile was (re)assigned to a display device
    ColorProfileChanged,
    SystemWillSleep,
    ScreensWillSleep,
    SystemDidWake,
    ScreensDidWake,
    /// Access to the display control devices may have changed
    PermissionChanged,
    PreferenceChanged(PrefKey),
    /// Preferences were wiped and must be restored to defaults
    PreferenceReset,
}

/// Work the coordinator asks the event loop to carry out, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Schedule(Scheduled),
    /// Run the reconfiguration pipeline; the generation is already reset
    Reconfigure { first_run: bool },
    /// Lighter post-wake refresh of the display control bindings
    RefreshServiceBindings,
    RebuildMenu,
    CheckPermissions,
    RebindMediaKeys,
    ResetPreferences,
}
