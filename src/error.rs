// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the daemon
//!
//! The coordinator itself cannot fail; these errors belong to the plumbing
//! around it (preferences, D-Bus signal sources, udev, process setup).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Failed to initialize a display
    #[error("Failed to initialize display {id}: {reason}")]
    DisplayInit { id: String, reason: String },

    /// Invalid preference value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preference file is not valid KDL
    #[error("Configuration syntax error: {0}")]
    ConfigSyntax(#[from] kdl::KdlError),

    /// D-Bus error (signal subscriptions, brightness keys)
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    /// Another daemon instance holds the lock
    #[error("Another instance is already running (lock {0})")]
    AlreadyRunning(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;
