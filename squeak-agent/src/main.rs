//! Squeak Mouse Agent
//!
//! Finds the Cool mouse (or its receiver) on the serial bus, polls it for
//! click counters and battery level, logs status changes, and records mouse
//! readings to a CSV history. Runs until Ctrl-C.

mod history;
mod reporter;
mod settings;

use std::sync::Arc;

use history::HistoryStore;
use reporter::Reporter;
use settings::Settings;
use squeak_detect::{system_source, DeviceRegistry, HotplugEvents, HotplugWatcher, SystemPorts};
use squeak_link::{ConnectionManager, MonitorLoop, ProtocolClient, StatusEvent};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "squeak=info,squeak_protocol=info,squeak_detect=info,squeak_link=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Squeak mouse agent");

    let settings = Settings::load_or_init();
    let history = settings.history_file().map(HistoryStore::new);
    if let Some(store) = &history {
        match store.last_record() {
            Ok(Some(record)) => info!(
                "Last recorded reading {}: {} clicks",
                record.timestamp,
                record.total_clicks()
            ),
            Ok(None) => info!("Recording history to {}", store.path().display()),
            Err(e) => warn!("Could not read history: {}", e),
        }
    }

    let hotplug = Arc::new(HotplugEvents::new());
    let mut watcher = HotplugWatcher::spawn(
        system_source(Arc::new(SystemPorts), settings.hotplug_tick()),
        hotplug.clone(),
        settings.hotplug_tick(),
    )?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StatusEvent>();
    let monitor = MonitorLoop::new(
        DeviceRegistry::new(),
        Arc::new(ConnectionManager::system(settings.line_settings())),
        ProtocolClient::with_config(settings.client_config()),
        hotplug,
        move |event: StatusEvent| {
            let _ = tx.send(event);
        },
        settings.monitor_config(),
    );
    let monitor = monitor.spawn()?;

    let mut reporter = Reporter::new(history, settings.low_battery_percent);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Ctrl-C handler failed: {}", e);
                }
                info!("Shutting down");
                break;
            }
            event = rx.recv() => match event {
                Some(event) => reporter.handle(&event),
                None => {
                    warn!("Monitor loop exited");
                    break;
                }
            },
        }
    }

    monitor.join();
    watcher.shutdown();
    match reporter.last_reading() {
        Some(at) => info!("Stopped (last reading {})", at.format("%Y-%m-%d %H:%M:%S")),
        None => info!("Stopped"),
    }
    Ok(())
}
