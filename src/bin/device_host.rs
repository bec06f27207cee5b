//! `inu-device` — a generic device host.
//!
//! Loads a local configuration document (design spec §6), connects to
//! JetStream, and runs the [`inu::runtime::DeviceRuntime`] lifecycle against
//! a small demo [`DeviceCapabilities`] that logs every callback it receives.
//! Host-appropriate equivalent of the teacher firmware's `main.rs` boot
//! sequence — no ESP-IDF peripheral bring-up, just config load, bus connect,
//! and the event loop.
//!
//! Usage: `inu-device <config.json> [build_number]`
//!
//! Exit codes (design spec §6): `0` success, `1` usage, `9` unknown mode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use inu::bus::nats::JetStreamBus;
use inu::config::LocalConfig;
use inu::model::SettingsKind;
use inu::runtime::{DeviceCapabilities, DeviceRuntime};
use log::{error, info, warn};
use std::sync::Arc;

/// Logs every capability callback it receives; stands in for a real
/// application (relay/actuator/sensor/robotics) until one is embedded.
struct LoggingCapabilities;

#[async_trait]
impl DeviceCapabilities for LoggingCapabilities {
    async fn on_connect(&mut self) {
        info!("bus connected");
    }

    async fn on_disconnect(&mut self) {
        warn!("bus disconnected, returning to LINKING");
    }

    async fn on_settings_updated(&mut self, settings: &SettingsKind) -> inu::Result<()> {
        info!(
            "settings applied: heartbeat_interval={}s listen_subjects={:?}",
            settings.common().heartbeat_interval,
            settings.common().listen_subjects_list()
        );
        Ok(())
    }

    async fn app_init(&mut self) -> inu::Result<()> {
        info!("app_init complete, entering RUNNING");
        Ok(())
    }

    async fn on_trigger(&mut self, code: i32) -> inu::Result<()> {
        info!("application trigger code={code}");
        Ok(())
    }

    async fn on_interrupt(&mut self) {
        info!("interrupt trigger received");
    }

    async fn on_enabled_changed(&mut self, enabled: bool) {
        info!("enabled changed -> {enabled}");
    }
}

fn usage() -> ! {
    eprintln!("usage: inu-device <config.json> [build_number]");
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    info!("inu-device v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(p) => p,
        None => usage(),
    };
    let build: u32 = match args.next() {
        Some(b) => b.parse().context("build_number must be an integer")?,
        None => 0,
    };

    let config_text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading {config_path}"))?;
    let config = LocalConfig::parse(&config_text).context("parsing local config")?;

    let bus = Arc::new(JetStreamBus::new(config.nats.server.clone()));
    let mut runtime = DeviceRuntime::new(bus, &config, build)?;
    let mut capabilities = LoggingCapabilities;

    loop {
        if let Err(e) = runtime.run(&mut capabilities).await {
            error!("bootstrap failure: {e}");
            // Fatal only at bootstrap (design spec §7): back off briefly,
            // then retry the full link/bus connect sequence rather than
            // hard-resetting a host process.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            continue;
        }
        break;
    }

    Ok(())
}
