// SPDX-License-Identifier: GPL-3.0-only
//! Termination signals

/// Completes on SIGINT, SIGTERM or SIGQUIT
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => debug!("SIGINT received"),
        _ = sigterm.recv() => debug!("SIGTERM received"),
        _ = sigquit.recv() => debug!("SIGQUIT received"),
    }
    Ok(())
}
