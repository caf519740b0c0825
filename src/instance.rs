// SPDX-License-Identifier: GPL-3.0-only
//! Single-instance lock
//!
//! Two daemons talking DDC/CI to the same monitors would interleave I2C
//! transactions, so only one may run per user session.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::config::APPID;
use crate::error::{AppError, Result};

/// Held for as long as the daemon runs; the lock is released on drop
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    pub fn default_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(format!("{APPID}.lock"))
    }

    /// Take the lock without blocking
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = File::create(path)?;

        // flock is per open file description, a second acquire in this
        // process fails just like one from another process
        let lock_result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if lock_result != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(AppError::AlreadyRunning(path.display().to_string()));
            }
            return Err(err.into());
        }

        info!("Acquired instance lock {}", path.display());
        Ok(Self { _file: file })
    }
}
