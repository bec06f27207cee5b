//! Device Runtime (design spec §4.B) — the lifecycle state machine, status/
//! heartbeat publisher, and settings/command subscriber every device runs.
//!
//! ```text
//!   INIT -> LINKING -> SETTLING -> RUNNING -> MAINTENANCE -> RUNNING|RESET
//!     ^________________________________|
//!            (disconnect, any state)
//! ```
//!
//! Applications implement [`DeviceCapabilities`] (a default-no-op trait, not
//! a base class to subclass) and hand it to [`DeviceRuntime::run`].

use crate::bus::{BusAdapter, DeliverPolicy};
use crate::config::LocalConfig;
use crate::error::{Error, Result};
use crate::model::{DeviceId, Heartbeat, SettingsKind, Status, Trigger, TriggerCode};
use crate::subject;
use crate::trigger::TriggerDispatcher;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

/// Lifecycle state of a [`DeviceRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Linking,
    Settling,
    Running,
    Maintenance,
    Reset,
}

/// The capability set an application implements. Every method has a no-op
/// default — applications override only what they need, rather than
/// subclassing a base handler (design spec §9).
#[async_trait]
pub trait DeviceCapabilities: Send {
    async fn on_connect(&mut self) {}

    async fn on_disconnect(&mut self) {}

    async fn on_settings_updated(&mut self, _settings: &SettingsKind) -> Result<()> {
        Ok(())
    }

    async fn app_init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn app_tick(&mut self) -> Result<()> {
        Ok(())
    }

    /// Invoked for non-reserved trigger codes, only while `enabled`.
    async fn on_trigger(&mut self, _code: i32) -> Result<()> {
        Ok(())
    }

    async fn on_interrupt(&mut self) {}

    async fn on_enabled_changed(&mut self, _enabled: bool) {}

    /// An OTA update command was accepted; `version == 0` means "latest".
    /// The runtime has already entered `MAINTENANCE`.
    async fn on_ota(&mut self, _version: u32) {}

    /// A soft reboot command was accepted; the runtime has already entered
    /// `MAINTENANCE`.
    async fn on_reboot(&mut self) {}
}

/// Owns `Status`, the current `SettingsKind`, the bus adapter, and the
/// trigger/settings/command consumer registry. The sole mutator of status.
pub struct DeviceRuntime {
    bus: Arc<dyn BusAdapter>,
    device_id: DeviceId,
    build: u32,
    local_addr: String,
    started_at: Instant,
    status: Status,
    settings: Option<SettingsKind>,
    lifecycle: Lifecycle,
    trigger: TriggerDispatcher,
}

impl DeviceRuntime {
    pub fn new(bus: Arc<dyn BusAdapter>, config: &LocalConfig, build: u32) -> Result<Self> {
        let device_id = DeviceId::parse(&config.device_id)?;
        let trigger = TriggerDispatcher::new(bus.clone(), device_id.as_str());
        Ok(Self {
            bus,
            device_id,
            build,
            local_addr: config.nats.server.clone(),
            started_at: Instant::now(),
            status: Status::default(),
            settings: None,
            lifecycle: Lifecycle::Init,
            trigger,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn settings(&self) -> Option<&SettingsKind> {
        self.settings.as_ref()
    }

    /// `enabled ∧ ¬locked ∧ (¬active ∨ allow_active)` — guards application
    /// entry points (§4.B).
    pub fn can_act(&self, allow_active: bool) -> bool {
        self.status.can_act(allow_active)
    }

    /// Mark active and publish the full status record.
    pub async fn activate(&mut self, reason: impl Into<String>) -> Result<()> {
        self.status.active = true;
        self.status.status = reason.into();
        self.publish_status().await
    }

    /// Mark inactive and publish the full status record.
    pub async fn deactivate(&mut self, reason: impl Into<String>) -> Result<()> {
        self.status.active = false;
        self.status.status = reason.into();
        self.publish_status().await
    }

    /// Update the human-readable status cause without changing
    /// `enabled`/`active`/`locked`, and publish.
    pub async fn status_update(&mut self, reason: impl Into<String>) -> Result<()> {
        self.status.status = reason.into();
        self.publish_status().await
    }

    async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.status.enabled = enabled;
        self.publish_status().await
    }

    async fn set_locked(&mut self, locked: bool) -> Result<()> {
        self.status.locked = locked;
        self.publish_status().await
    }

    async fn publish_status(&self) -> Result<()> {
        let payload = serde_json::to_vec(&self.status)
            .map_err(|e| Error::malformed(format!("status encode: {e}")))?;
        self.bus
            .publish(&subject::status(&self.device_id.as_str()), &payload)
            .await
    }

    async fn publish_heartbeat(&self, interval_seconds: u8) -> Result<()> {
        let heartbeat = Heartbeat {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            build: self.build,
            local_addr: self.local_addr.clone(),
            interval_seconds,
        };
        let payload = serde_json::to_vec(&heartbeat)
            .map_err(|e| Error::malformed(format!("heartbeat encode: {e}")))?;
        self.bus
            .publish(&subject::heartbeat(&self.device_id.as_str()), &payload)
            .await
    }

    /// Run the full lifecycle against `capabilities`. Does not return under
    /// normal operation — the caller's `main` drives this for the process
    /// lifetime, restarting it (or hard-resetting the host) on a fatal
    /// bootstrap error per §7's "fatal only at bootstrap" policy.
    pub async fn run<C: DeviceCapabilities>(&mut self, capabilities: &mut C) -> Result<()> {
        self.lifecycle = Lifecycle::Linking;
        self.bus.connect().await?;
        capabilities.on_connect().await;

        self.lifecycle = Lifecycle::Settling;
        self.publish_heartbeat(5).await?;
        self.publish_status().await?;

        let settings = self.await_settings().await?;
        self.settings = Some(settings.clone());

        let central = self.device_id.central_subject();
        self.trigger
            .resubscribe(&central, &settings.common().listen_subjects_list())
            .await?;
        capabilities.on_settings_updated(&settings).await?;
        capabilities.app_init().await?;
        self.lifecycle = Lifecycle::Running;

        self.run_loop(capabilities, settings).await
    }

    /// Subscribe to `settings.<device_id>` with `LAST_PER_SUBJECT` and wait
    /// for the first validly-parsed record (`SETTLING -> RUNNING` per §4.B).
    async fn await_settings(&self) -> Result<SettingsKind> {
        let filter = subject::settings(&self.device_id.as_str());
        let durable = format!("settings-{}", self.device_id.as_str().replace('.', "_"));
        let mut consumer = self
            .bus
            .create_consumer(
                subject::stream::SETTINGS,
                &filter,
                &durable,
                DeliverPolicy::LastPerSubject,
            )
            .await?;

        loop {
            let msg = consumer
                .next()
                .await?
                .ok_or_else(|| Error::bad_request("settings consumer closed before settling"))?;
            let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_slice(&msg.payload);
            let kind = parsed
                .map_err(|e| Error::malformed(e.to_string()))
                .and_then(|json| SettingsKind::parse(self.device_id.device_type(), &json));

            match kind {
                Ok(settings) => {
                    msg.ack().await?;
                    return Ok(settings);
                }
                Err(e) => {
                    error!("invalid settings record for {}: {e}", self.device_id);
                    msg.term().await?;
                }
            }
        }
    }

    async fn run_loop<C: DeviceCapabilities>(
        &mut self,
        capabilities: &mut C,
        mut settings: SettingsKind,
    ) -> Result<()> {
        let mut tick = interval(Duration::from_millis(10));
        let mut heartbeat = interval(Duration::from_secs(
            settings.common().heartbeat_interval as u64,
        ));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.lifecycle == Lifecycle::Running {
                        if let Err(e) = capabilities.app_tick().await {
                            error!("app_tick failed: {e}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.publish_heartbeat(settings.common().heartbeat_interval).await {
                        warn!("heartbeat publish skipped: {e}");
                    }
                }
                Some((listen_subject, trig)) = self.trigger.recv() => {
                    self.dispatch_trigger(capabilities, &listen_subject, trig).await;
                }
            }

            if self.lifecycle == Lifecycle::Reset {
                info!("runtime entering RESET for {}", self.device_id);
                return Ok(());
            }

            if let Some(new_settings) = self.maybe_reload_settings(capabilities).await? {
                settings = new_settings;
                heartbeat = interval(Duration::from_secs(
                    settings.common().heartbeat_interval as u64,
                ));
            }
        }
    }

    /// Placeholder hook for a settings-change consumer; kept distinct from
    /// the initial `await_settings` fetch so a future live-reload consumer
    /// can be wired in without touching the select loop's shape.
    async fn maybe_reload_settings<C: DeviceCapabilities>(
        &mut self,
        _capabilities: &mut C,
    ) -> Result<Option<SettingsKind>> {
        Ok(None)
    }

    async fn dispatch_trigger<C: DeviceCapabilities>(
        &mut self,
        capabilities: &mut C,
        listen_subject: &str,
        trig: Trigger,
    ) {
        debug!("trigger {} on {listen_subject}", trig.code);
        match TriggerCode::classify(trig.code) {
            TriggerCode::Interrupt => capabilities.on_interrupt().await,
            TriggerCode::Calibrate => {
                if let Err(e) = capabilities.on_trigger(trig.code).await {
                    error!("calibrate handler failed: {e}");
                }
            }
            TriggerCode::EnableToggle => {
                let enabled = !self.status.enabled;
                self.toggle_enabled(capabilities, enabled).await;
            }
            TriggerCode::EnableOn => self.toggle_enabled(capabilities, true).await,
            TriggerCode::EnableOff => self.toggle_enabled(capabilities, false).await,
            TriggerCode::LockToggle => self.toggle_locked(!self.status.locked).await,
            TriggerCode::LockOn => self.toggle_locked(true).await,
            TriggerCode::LockOff => self.toggle_locked(false).await,
            TriggerCode::Application(code) => {
                if !self.status.enabled {
                    info!("Ignoring trigger while disabled: code={code}");
                    return;
                }
                if self.status.locked {
                    info!("Ignoring trigger while locked: code={code}");
                    return;
                }
                if let Err(e) = capabilities.on_trigger(code).await {
                    error!("on_trigger({code}) failed: {e}");
                }
            }
        }
    }

    async fn toggle_enabled<C: DeviceCapabilities>(&mut self, capabilities: &mut C, enabled: bool) {
        if let Err(e) = self.set_enabled(enabled).await {
            warn!("failed to publish enabled change: {e}");
        }
        capabilities.on_enabled_changed(enabled).await;
    }

    async fn toggle_locked(&mut self, locked: bool) {
        if let Err(e) = self.set_locked(locked).await {
            warn!("failed to publish locked change: {e}");
        }
    }

    /// Enter `MAINTENANCE`, suspending `app_tick` while the bus is still
    /// serviced. Called by an embedding OTA/reboot handler before it drives
    /// [`crate::ota::OtaManager`].
    pub fn enter_maintenance(&mut self) {
        self.lifecycle = Lifecycle::Maintenance;
    }

    /// Return to `RUNNING` after a maintenance operation aborts or
    /// completes without requiring a reset.
    pub fn resume_running(&mut self) {
        self.lifecycle = Lifecycle::Running;
    }

    /// Request a hard reset of the host after a maintenance operation
    /// completes successfully (`MAINTENANCE -> RESET`).
    pub fn request_reset(&mut self) {
        self.lifecycle = Lifecycle::Reset;
    }

    /// `LINKING` re-entry on disconnect: discard consumer handles, notify
    /// the application, and let the caller retry `run`.
    pub async fn handle_disconnect<C: DeviceCapabilities>(&mut self, capabilities: &mut C) {
        self.lifecycle = Lifecycle::Linking;
        capabilities.on_disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingCapabilities {
        triggered: Arc<AtomicBool>,
        enabled_changes: Arc<std::sync::Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl DeviceCapabilities for RecordingCapabilities {
        async fn on_trigger(&mut self, _code: i32) -> Result<()> {
            self.triggered.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn on_enabled_changed(&mut self, enabled: bool) {
            self.enabled_changes.lock().unwrap().push(enabled);
        }
    }

    fn test_config() -> LocalConfig {
        LocalConfig::parse(
            r#"{
                "device_id": "relay.hallway",
                "nats": { "server": "nats://localhost:4222" },
                "wifi": { "ssid": "home", "password": "secret" }
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn trigger_gated_by_disabled_status() {
        let bus = Arc::new(MockBus::new());
        let config = test_config();
        let mut runtime = DeviceRuntime::new(bus, &config, 1).unwrap();
        runtime.status.enabled = false;

        let triggered = Arc::new(AtomicBool::new(false));
        let mut caps = RecordingCapabilities {
            triggered: triggered.clone(),
            enabled_changes: Arc::new(std::sync::Mutex::new(Vec::new())),
        };

        runtime
            .dispatch_trigger(&mut caps, "room.a", Trigger { code: 0 })
            .await;

        assert!(!triggered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn enable_toggle_invokes_capability() {
        let bus = Arc::new(MockBus::new());
        let config = test_config();
        let mut runtime = DeviceRuntime::new(bus, &config, 1).unwrap();

        let enabled_changes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut caps = RecordingCapabilities {
            triggered: Arc::new(AtomicBool::new(false)),
            enabled_changes: enabled_changes.clone(),
        };

        runtime
            .dispatch_trigger(
                &mut caps,
                "central.relay.hallway",
                Trigger {
                    code: TriggerCode::ENABLE_OFF,
                },
            )
            .await;

        assert_eq!(*enabled_changes.lock().unwrap(), vec![false]);
        assert!(!runtime.status().enabled);
    }

    #[tokio::test]
    async fn can_act_reflects_status() {
        let bus = Arc::new(MockBus::new());
        let config = test_config();
        let runtime = DeviceRuntime::new(bus, &config, 1).unwrap();
        assert!(runtime.can_act(false));
    }
}
