// SPDX-License-Identifier: GPL-3.0-only
//! Hardware access checks
//!
//! Controlling monitors over DDC/CI needs read/write access to `/dev/i2c-*`.
//! Capturing the brightness keys is only useful with that access, so the
//! media-key binder asks [`can_access_displays`] before listening.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ListenFor;

const I2C_RULES: [&str; 2] = [
    "/etc/udev/rules.d/45-i2c-permissions.rules",
    "/usr/lib/udev/rules.d/45-i2c-permissions.rules",
];

#[derive(Debug, Clone)]
pub struct PermissionCheckResult {
    pub requirements: Vec<PermissionRequirement>,
}

#[derive(Debug, Clone)]
pub struct PermissionRequirement {
    pub name: String,
    pub description: String,
    pub status: RequirementStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequirementStatus {
    Met,
    NotMet,
    NotApplicable,
    Partial, // Some requirements met, but not all (informational, not blocking)
}

impl PermissionCheckResult {
    pub fn has_issues(&self) -> bool {
        self.requirements
            .iter()
            .any(|r| r.status == RequirementStatus::NotMet)
    }

    pub fn summary(&self) -> String {
        let not_met = self
            .requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::NotMet)
            .count();

        if not_met == 0 {
            let met_count = self
                .requirements
                .iter()
                .filter(|r| r.status == RequirementStatus::Met)
                .count();
            format!("All {} requirements met", met_count)
        } else {
            format!("{} requirement(s) not met", not_met)
        }
    }
}

/// Whether at least one I2C bus can be driven
pub fn can_access_displays() -> bool {
    find_i2c_devices().iter().any(|d| can_write(d))
}

/// Log missing hardware access, if the current preferences need it
pub fn report_if_required(listen_for: ListenFor) {
    if listen_for == ListenFor::None {
        debug!("Brightness keys are not captured, skipping permission check");
        return;
    }

    let result = check_i2c_permissions();
    if result.has_issues() {
        warn!("Brightness keys need I2C access: {}", result.summary());
        for requirement in result
            .requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::NotMet)
        {
            warn!("  {}: {}", requirement.name, requirement.description);
        }
    } else {
        info!("Permissions: {}", result.summary());
    }
}

/// Check if the current user has the necessary permissions to access I2C devices
pub fn check_i2c_permissions() -> PermissionCheckResult {
    let i2c_devices = find_i2c_devices();
    let accessible_count = i2c_devices.iter().filter(|d| can_write(d)).count();
    let rules_installed = I2C_RULES.iter().any(|rules| Path::new(rules).exists());

    build_result(
        i2c_devices.len(),
        accessible_count,
        is_in_i2c_group(),
        rules_installed,
    )
}

fn build_result(
    device_count: usize,
    accessible_count: usize,
    in_i2c_group: bool,
    rules_installed: bool,
) -> PermissionCheckResult {
    let met_if = |met| {
        if met {
            RequirementStatus::Met
        } else {
            RequirementStatus::NotMet
        }
    };
    let mut requirements = Vec::new();

    requirements.push(PermissionRequirement {
        name: "I2C devices".to_string(),
        description: if device_count == 0 {
            "No /dev/i2c-* devices found".to_string()
        } else {
            format!("Found {} I2C device(s)", device_count)
        },
        status: met_if(device_count > 0),
    });

    // DDC/CI needs both read and write
    requirements.push(PermissionRequirement {
        name: "I2C read/write access".to_string(),
        description: if device_count == 0 {
            "N/A".to_string()
        } else if accessible_count == device_count {
            format!("Can access all {} device(s)", accessible_count)
        } else if accessible_count > 0 {
            format!("Can access {}/{} device(s)", accessible_count, device_count)
        } else {
            "Cannot access any I2C devices".to_string()
        },
        status: if device_count == 0 {
            RequirementStatus::NotApplicable
        } else if accessible_count == device_count {
            RequirementStatus::Met
        } else if accessible_count > 0 {
            RequirementStatus::Partial
        } else {
            RequirementStatus::NotMet
        },
    });

    requirements.push(PermissionRequirement {
        name: "i2c group".to_string(),
        description: if in_i2c_group {
            "User is in i2c group".to_string()
        } else {
            "User not in i2c group".to_string()
        },
        status: met_if(in_i2c_group),
    });

    requirements.push(PermissionRequirement {
        name: "udev rules (I2C)".to_string(),
        description: if rules_installed {
            "I2C udev rules installed".to_string()
        } else {
            "I2C udev rules not found".to_string()
        },
        status: met_if(rules_installed),
    });

    PermissionCheckResult { requirements }
}

/// Find all I2C device files
fn find_i2c_devices() -> Vec<PathBuf> {
    (0..256)
        .map(|i| PathBuf::from(format!("/dev/i2c-{}", i)))
        .filter(|path| path.exists())
        .collect()
}

fn can_write(path: &Path) -> bool {
    fs::OpenOptions::new().write(true).open(path).is_ok()
}

/// Check if current user is in the i2c group
fn is_in_i2c_group() -> bool {
    use std::process::Command;

    match Command::new("groups").output() {
        Ok(output) => match String::from_utf8(output.stdout) {
            Ok(groups) => {
                debug!("Groups output: '{}'", groups.trim());
                lists_group(&groups, "i2c")
            }
            Err(e) => {
                debug!("Failed to parse groups output: {}", e);
                false
            }
        },
        Err(e) => {
            debug!("Failed to run groups command: {}", e);
            false
        }
    }
}

fn lists_group(groups: &str, group: &str) -> bool {
    groups.split_whitespace().any(|g| g == group)
}
