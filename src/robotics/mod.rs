//! Robotics Controller (design spec §4.E) — parses a control-language
//! program, drives a registry of [`RoboticsDevice`] drivers through it, and
//! handles mid-sequence interruption by reversing and replaying the
//! interruptible tail.
//!
//! Grounded on `original_source`'s `Robotics`/`RoboticsDevice` classes
//! (`hardware/robotics/__init__.py`): a device registry keyed by id, a
//! rolling "interrupt chain" of consecutive interruptible controls, and a
//! reverse-list construction (`prepare_int_list`) that skips the
//! currently-interrupted control (the driver already reverses its own
//! partial displacement) and any `WAIT`s, flushing tangible runs onto the
//! reverse list only once a preceding `SEL` is found.

pub mod control;

pub use control::{Control, ControlKind};

use crate::error::{Error, Result};
use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pause before a reversal begins, giving the driver IC time to settle
/// after the abrupt stop (mirrors `Actuator.INT_PAUSE_TIME`).
const INT_PAUSE_TIME: Duration = Duration::from_millis(500);

/// A single physical device a `Robotics` controller can select and drive.
/// Implementors own one piece of hardware (an actuator, an LED strip) and
/// are the sole mutator of it.
#[async_trait]
pub trait RoboticsDevice: Send {
    /// Execute a tangible control (`Move`, `Colour`, `Fx`). `reverse` is set
    /// during the interrupt-chain reversal pass — a tangible is expected to
    /// undo itself (reverse direction/target) rather than repeat forward.
    async fn execute(&mut self, ctrl: &Control, reverse: bool) -> Result<()>;

    /// Cut or restore drive power to the device.
    fn set_power(&mut self, powered: bool);

    /// Select a sub-component (e.g. an LED strip segment) named by a
    /// `SEL device:sub` control. No-op for devices without sub-components.
    fn select_component(&mut self, _sub: Option<&str>) {}

    /// The shared interrupt flag this device polls during a long-running
    /// `execute`. `Robotics` sets it the moment an interrupt is accepted,
    /// independent of the controller's own event loop — a single atomic
    /// boolean per in-flight control, not a lock held across awaits.
    fn interrupted_flag(&self) -> Arc<AtomicBool>;
}

/// A cheap, `Clone`-able handle to a `Robotics` controller's interrupt
/// state. Obtained once via [`Robotics::interrupt_handle`] and held by
/// whichever task delivers interrupt triggers — it never needs access to
/// the controller itself, only a few shared atomics.
#[derive(Clone)]
pub struct InterruptHandle {
    requested: Arc<AtomicBool>,
    allow: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    active_flag: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl InterruptHandle {
    /// Request an interrupt of whatever control is currently executing.
    /// Returns `true` only if there is an active device and its current
    /// control was tagged interruptible — otherwise the request is a no-op.
    pub fn request(&self) -> bool {
        if self.active.load(Ordering::Acquire) && self.allow.load(Ordering::Acquire) {
            self.requested.store(true, Ordering::Release);
            if let Some(flag) = self.active_flag.lock().unwrap().as_ref() {
                flag.store(true, Ordering::Release);
            }
            true
        } else {
            false
        }
    }
}

/// Owns the device registry and drives control-language programs through
/// it. Not `Clone` and not `Sync` — one task runs `run()` at a time; other
/// tasks deliver interrupts via [`Robotics::interrupt_handle`].
pub struct Robotics {
    devices: HashMap<String, Box<dyn RoboticsDevice>>,
    active_device_id: Option<String>,
    handle: InterruptHandle,
    powered: bool,
    idle_since: Instant,
    power_up_delay: Duration,
}

impl Robotics {
    pub fn new(power_up_delay: Duration) -> Self {
        Self {
            devices: HashMap::new(),
            active_device_id: None,
            handle: InterruptHandle {
                requested: Arc::new(AtomicBool::new(false)),
                allow: Arc::new(AtomicBool::new(false)),
                active: Arc::new(AtomicBool::new(false)),
                active_flag: Arc::new(Mutex::new(None)),
            },
            powered: false,
            idle_since: Instant::now(),
            power_up_delay,
        }
    }

    /// `device_id` is canonicalized to uppercase, matching the parser's
    /// canonicalization of the `SEL` control-language argument (the control
    /// string is uppercased wholesale before tokenizing — see
    /// `control::parse_program`) so a lookup by the parsed device id always
    /// hits the same key regardless of the case callers register under.
    pub fn register(&mut self, device_id: impl Into<String>, driver: Box<dyn RoboticsDevice>) {
        self.devices.insert(device_id.into().to_uppercase(), driver);
    }

    /// A clone-able handle that can be passed to another task (e.g. the
    /// trigger dispatcher's interrupt-code handler) to request an
    /// interrupt without needing `&Robotics`.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.handle.clone()
    }

    /// Request an interrupt from the same task that owns this controller
    /// (mainly useful in tests — production callers hold an
    /// [`InterruptHandle`] instead).
    pub fn interrupt(&self) -> bool {
        self.handle.request()
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn set_power(&mut self, powered: bool) {
        self.powered = powered;
        for device in self.devices.values_mut() {
            device.set_power(powered);
        }
        self.idle_since = Instant::now();
    }

    /// Time since the controller was last busy (powered on or mid-run).
    /// The embedding application's `app_tick` polls this and calls
    /// `set_power(false)` once it exceeds its configured idle period — the
    /// controller does not time itself out.
    pub fn idle_time(&self) -> Duration {
        self.idle_since.elapsed()
    }

    /// Power down if idle for at least `idle_period`. A convenience for
    /// `app_tick`; equivalent to polling [`Robotics::idle_time`] directly.
    pub fn tick_idle(&mut self, idle_period: Duration) {
        if self.powered && self.idle_time() >= idle_period {
            self.set_power(false);
        }
    }

    /// Parse and run a full control-language program end to end.
    pub async fn run(&mut self, program: &str) -> Result<()> {
        self.reset_runtime_state();
        let controls = control::parse_program(program)?;
        let result = self.run_list(&controls).await;
        self.reset_runtime_state();
        result
    }

    fn reset_runtime_state(&mut self) {
        self.active_device_id = None;
        self.handle.active.store(false, Ordering::Release);
        self.handle.allow.store(false, Ordering::Release);
        self.handle.requested.store(false, Ordering::Release);
        *self.handle.active_flag.lock().unwrap() = None;
        self.idle_since = Instant::now();
    }

    async fn ready_devices(&mut self) {
        if !self.powered {
            self.set_power(true);
            tokio::time::sleep(self.power_up_delay).await;
        }
        self.idle_since = Instant::now();
    }

    fn select_device(&mut self, sel: &control::SelectControl) -> Result<()> {
        let flag = self
            .devices
            .get(sel.device_id())
            .ok_or_else(|| Error::bad_request(format!("device '{}' not registered", sel.device_id())))?
            .interrupted_flag();

        self.active_device_id = Some(sel.device_id().to_string());
        self.handle.active.store(true, Ordering::Release);
        *self.handle.active_flag.lock().unwrap() = Some(flag);

        if let Some(device) = self.devices.get_mut(sel.device_id()) {
            device.select_component(sel.sub_component());
        }
        Ok(())
    }

    async fn dispatch_tangible(&mut self, ctrl: &Control, reverse: bool) -> Result<()> {
        let device_id = self
            .active_device_id
            .clone()
            .ok_or_else(|| Error::bad_request("tangible control executed with no prior SEL"))?;
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| Error::bad_request(format!("device '{device_id}' not registered")))?;
        device.execute(ctrl, reverse).await
    }

    async fn run_list(&mut self, controls: &[Control]) -> Result<()> {
        self.ready_devices().await;

        let mut chain: Vec<Control> = Vec::new();
        let mut last_sel: Option<Control> = None;

        for ctrl in controls {
            if ctrl.allow_interrupt() {
                chain.push(ctrl.clone());
                self.handle.allow.store(true, Ordering::Release);
            } else {
                chain.clear();
                self.handle.allow.store(false, Ordering::Release);
                if let Some(sel) = &last_sel {
                    chain.push(sel.clone());
                }
            }

            match &ctrl.kind {
                ControlKind::Select(sel) => {
                    self.select_device(sel)?;
                    last_sel = Some(ctrl.clone());
                }
                ControlKind::Wait(w) => {
                    tokio::time::sleep(Duration::from_millis(u64::from(w.millis))).await;
                }
                _ => self.dispatch_tangible(ctrl, false).await?,
            }

            if self.handle.requested.swap(false, Ordering::AcqRel) {
                tokio::time::sleep(INT_PAUSE_TIME).await;
                self.run_reverse(&chain).await?;
                self.run_forward(&chain).await?;
                break;
            }
        }

        Ok(())
    }

    /// Replay the interruptible tail in reverse, oldest-completed-first.
    /// Not interruptible itself.
    async fn run_reverse(&mut self, chain: &[Control]) -> Result<()> {
        for ctrl in Self::prepare_reverse_list(chain) {
            match &ctrl.kind {
                ControlKind::Select(sel) => self.select_device(sel)?,
                _ => self.dispatch_tangible(&ctrl, true).await?,
            }
        }
        Ok(())
    }

    /// Replay the original tail forward, restoring the motion plan that was
    /// in flight when the interrupt landed. Not interruptible itself.
    async fn run_forward(&mut self, chain: &[Control]) -> Result<()> {
        for ctrl in chain {
            match &ctrl.kind {
                ControlKind::Select(sel) => self.select_device(sel)?,
                ControlKind::Wait(w) => {
                    tokio::time::sleep(Duration::from_millis(u64::from(w.millis))).await;
                }
                _ => self.dispatch_tangible(ctrl, false).await?,
            }
        }
        Ok(())
    }

    /// Build the reverse-order replay list from an interrupt chain.
    ///
    /// Walks the chain right to left, skipping the last element — it was
    /// just interrupted mid-flight and the driver already reverses its own
    /// partial displacement internally — and skipping every `Wait` (a
    /// reversal doesn't re-wait). When a `Select` is found, the tangible
    /// controls accumulated since the previous flush are appended after it.
    /// Tangibles with no preceding `Select` are appended anyway, with a
    /// warning, since the chain always starts from a device selection in
    /// practice. This runs inside `run_reverse`'s synchronous setup and
    /// must never await — logging here is a plain `warn!`, not suspended.
    fn prepare_reverse_list(chain: &[Control]) -> Vec<Control> {
        let mut out = Vec::new();
        let mut pending_tangibles = Vec::new();

        if chain.len() <= 1 {
            return out;
        }

        for ctrl in chain[..chain.len() - 1].iter().rev() {
            match &ctrl.kind {
                ControlKind::Select(_) => {
                    out.push(ctrl.clone());
                    out.append(&mut pending_tangibles);
                }
                ControlKind::Wait(_) => {}
                _ => pending_tangibles.push(ctrl.clone()),
            }
        }

        if !pending_tangibles.is_empty() {
            warn!("interrupt chain has tangible controls with no preceding SEL; appending anyway");
            out.append(&mut pending_tangibles);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingDevice {
        calls: Arc<StdMutex<Vec<(String, bool)>>>,
        interrupted: Arc<AtomicBool>,
        powered: bool,
    }

    fn label(ctrl: &Control) -> String {
        match &ctrl.kind {
            ControlKind::Move(m) => format!("MV {} {}", m.distance_mm, m.speed_mm_s),
            ControlKind::Colour(_) => "COL".to_string(),
            ControlKind::Fx(_) => "FX".to_string(),
            ControlKind::Select(_) | ControlKind::Wait(_) => "n/a".to_string(),
        }
    }

    #[async_trait]
    impl RoboticsDevice for RecordingDevice {
        async fn execute(&mut self, ctrl: &Control, reverse: bool) -> Result<()> {
            self.calls.lock().unwrap().push((label(ctrl), reverse));
            Ok(())
        }

        fn set_power(&mut self, powered: bool) {
            self.powered = powered;
        }

        fn interrupted_flag(&self) -> Arc<AtomicBool> {
            self.interrupted.clone()
        }
    }

    fn device() -> (RecordingDevice, Arc<StdMutex<Vec<(String, bool)>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        (
            RecordingDevice {
                calls: calls.clone(),
                interrupted: Arc::new(AtomicBool::new(false)),
                powered: false,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn runs_a_program_with_no_interrupts_in_order() {
        let mut robotics = Robotics::new(Duration::from_millis(0));
        let (dev, calls) = device();
        robotics.register("a0", Box::new(dev));

        robotics
            .run("SEL a0; MV 500 200; MV -500 200")
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("MV 500 200".to_string(), false),
                ("MV -500 200".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn tangible_control_without_select_is_bad_request() {
        let mut robotics = Robotics::new(Duration::from_millis(0));
        let err = robotics.run("MV 500 200").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn unregistered_device_is_bad_request() {
        let mut robotics = Robotics::new(Duration::from_millis(0));
        let err = robotics.run("SEL ghost; MV 500 200").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    /// Scenario S2: an interrupt mid-chain reverses the preceding completed
    /// controls (excluding the one currently in flight — here a `WAIT`,
    /// since the recording device completes its own `execute` instantly and
    /// only `WAIT` actually occupies real time for the interrupt to land
    /// during) and then replays the whole chain forward.
    #[tokio::test]
    async fn interrupt_reverses_then_replays_the_chain() {
        let mut robotics = Robotics::new(Duration::from_millis(0));
        let (dev, calls) = device();
        let interrupt = robotics.interrupt_handle();
        robotics.register("a0", Box::new(dev));

        // SEL a0; MV 1000 200 INT; W 50 INT; MV -1000 200 INT
        // Interrupt is requested 10ms in, while the WAIT is still sleeping.
        let program = "SEL a0; MV 1000 200 INT; W 50 INT; MV -1000 200 INT";
        let run = tokio::spawn(async move {
            let mut robotics = robotics;
            robotics.run(program).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(interrupt.request());
        run.await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("MV 1000 200".to_string(), false),
                ("MV 1000 200".to_string(), true),
                ("MV 1000 200".to_string(), false),
            ]
        );
    }

    #[test]
    fn prepare_reverse_list_flushes_tangibles_after_the_preceding_select() {
        let controls = control::parse_program(
            "SEL a0; MV 1000 200 INT; W 10 INT; MV -1000 200 INT",
        )
        .unwrap();
        let reversed = Robotics::prepare_reverse_list(&controls);
        assert_eq!(reversed.len(), 2);
        assert!(reversed[0].is_select());
        assert_eq!(label(&reversed[1]), "MV 1000 200");
    }

    #[test]
    fn prepare_reverse_list_warns_but_still_appends_orphan_tangibles() {
        let controls = control::parse_program("MV 1000 200 INT; MV -1000 200 INT").unwrap();
        let reversed = Robotics::prepare_reverse_list(&controls);
        assert_eq!(reversed.len(), 1);
        assert_eq!(label(&reversed[0]), "MV 1000 200");
    }
}
