// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;

use crate::brightness::BrightnessStore;
use crate::config::ConfigStore;
use crate::coordinator::{Coordinator, Timings};
use crate::instance::InstanceLock;
use crate::media_keys::MediaKeyBinder;
use crate::menu::MenuBuilder;
use crate::monitor::{DisplayManager, EnumerationOptions};
use crate::pipeline::DisplayPipeline;
use crate::service::{EventSender, Service};

#[macro_use]
extern crate tracing;

mod brightness;
mod color;
mod config;
mod coordinator;
mod error;
mod hotplug;
mod instance;
mod media_keys;
mod menu;
mod monitor;
mod permissions;
mod pipeline;
mod power;
mod protocols;
mod service;
mod shutdown;

/// Start with default preferences and without reading from DDC/CI displays
const SAFE_MODE_ENV: &str = "MONITOR_CONTROL_SAFE_MODE";

fn setup_logs() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    // init() also installs the tracing-log bridge for ddc-hi and udev
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}=info",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

/// Start the OS event sources; each one stops when the event loop is gone
fn spawn_sources(config: &ConfigStore, events: &EventSender) {
    if let Err(e) = hotplug::spawn(events.clone()) {
        error!("Failed to start hotplug thread: {}", e);
    }

    let sender = events.clone();
    tokio::spawn(async move {
        if let Err(e) = power::watch_system(sender).await {
            warn!("System sleep notifications unavailable: {}", e);
        }
    });

    let sender = events.clone();
    tokio::spawn(async move {
        if let Err(e) = power::watch_screens(sender).await {
            warn!("Screen sleep notifications unavailable: {}", e);
        }
    });

    let sender = events.clone();
    tokio::spawn(async move {
        if let Err(e) = color::watch(sender).await {
            warn!("Color profile notifications unavailable: {}", e);
        }
    });

    tokio::spawn(config::watch(config.clone(), events.clone()));
}

/// Log every published display list and control surface
fn spawn_surface_logger(menu: &MenuBuilder) {
    let mut display_list = menu.subscribe_display_list();
    tokio::spawn(async move {
        while display_list.changed().await.is_ok() {
            let displays = display_list.borrow_and_update().clone();
            info!("Display list updated: {} display(s)", displays.len());
            for mon in displays {
                debug!("  {} ({}): {:?}", mon.name, mon.id, mon.kind);
            }
        }
    });

    let mut surface = menu.subscribe();
    tokio::spawn(async move {
        while surface.changed().await.is_ok() {
            let entries = surface.borrow_and_update().entries.clone();
            info!("Control surface: {} entries", entries.len());
            for entry in entries {
                debug!("  {:?}", entry);
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logs();

    let _lock = InstanceLock::acquire(&InstanceLock::default_path())
        .context("Failed to start monitor-control-daemon")?;

    let safe_mode = std::env::var_os(SAFE_MODE_ENV).is_some();
    if safe_mode {
        warn!("Safe mode: preferences will be reset and DDC/CI reads are disabled");
    }

    let config = ConfigStore::load(ConfigStore::default_path());
    let manager = DisplayManager::new();
    let store = BrightnessStore::new();
    let menu = MenuBuilder::new();
    spawn_surface_logger(&menu);

    let media_keys = MediaKeyBinder::new(manager.clone(), config.clone(), store.clone());
    let pipeline = DisplayPipeline::new(
        config.clone(),
        manager,
        menu,
        store,
        media_keys,
        EnumerationOptions {
            safe_mode,
            ..EnumerationOptions::default()
        },
    );

    let (sender, events) = service::channel();
    spawn_sources(&config, &sender);

    let mut service = Service::new(Coordinator::new(Timings::default()), pipeline, sender, events);
    if safe_mode {
        service = service.reset_on_start();
    }
    info!("monitor-control-daemon {} started", env!("CARGO_PKG_VERSION"));

    service
        .run(async {
            if let Err(e) = shutdown::wait_for_shutdown_signal().await {
                error!("Failed to listen for termination signals: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
