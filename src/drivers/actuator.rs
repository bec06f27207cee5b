//! Stepper-driven linear actuator (design spec §4.F).
//!
//! Grounded on `original_source`'s `hardware/robotics/actuator.py`
//! (`OpVector`, `Screw`, `Actuator.drive`) and `hardware/switch.py`
//! (`Switch.check_state`). The ramp-accel math and phase state machine
//! follow `OpVector` directly; the pulse/direction/enable lines and the
//! end-stops are expressed as ports so the motion profile is host-testable
//! without real GPIO, following the same dual-target split as
//! `drivers::pump`.
//!
//! ## Ramp displacement formula
//!
//! The design spec gives `ramp_displacement = (speed + min_speed)/2 *
//! ramp_time` (the trapezoidal average of start and end speed over the
//! ramp) — the formula this driver implements. `actuator.py`'s literal
//! arithmetic, `((speed - min_speed) + min_speed)/2 * ramp_time`, algebraically
//! reduces to `speed/2 * ramp_time` instead; see `DESIGN.md` for the
//! resolution.

use crate::error::{Error, Result};
use crate::robotics::{Control, ControlKind, RoboticsDevice};
use async_trait::async_trait;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Step/direction/enable lines to a stepper driver IC.
pub trait StepperPort: Send {
    fn set_enabled(&mut self, enabled: bool);
    fn set_direction(&mut self, forward: bool);
    /// Set the pulse (step) frequency in Hz. `0.0` means "no pulses".
    fn set_pulse_frequency(&mut self, hz: f64);
    fn stop_pulses(&mut self);
}

/// An end-stop (limit switch) armed in one direction of travel.
pub trait EndStopPort: Send {
    fn is_active(&self) -> bool;
}

/// The driver IC's alert/fault line, if wired.
pub trait AlertPort: Send {
    fn is_active(&self) -> bool;
}

/// Lead-screw geometry converting linear mm to stepper pulses.
#[derive(Debug, Clone, Copy)]
pub struct Screw {
    pub steps_per_revolution: u32,
    pub lead_mm_per_revolution: f64,
    /// Whether the stepper's physical "forward" pin state drives the screw
    /// in the positive linear direction. XORed against the requested
    /// direction (`actuator.py`: `direction = not (screw.forward ^ direction)`).
    pub forward_is_positive: bool,
}

impl Screw {
    fn pulses_per_mm(&self) -> f64 {
        self.steps_per_revolution as f64 / self.lead_mm_per_revolution
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActuatorConfig {
    pub screw: Screw,
    /// Minimum "creep" speed (mm/s) at the start/end of a ramp.
    pub min_speed_mm_s: f64,
    /// Acceleration (mm/s^2) used for the ramp unless the distance is too
    /// short to reach full speed, in which case it is raised to the
    /// minimum required.
    pub ramp_accel_mm_s2: f64,
    /// Delay after stopping pulses before the next move may begin,
    /// protecting the driver IC from back-to-back direction changes.
    pub safe_wait_ms: u32,
}

/// The ramp motion profile for one move (`original_source`'s `OpVector`).
/// Pure and host-testable — no I/O.
#[derive(Debug, Clone, Copy)]
struct OpVector {
    min_speed: f64,
    speed: f64,
    ramp_accel: f64,
    ramp_time: Duration,
    full_speed_time: Duration,
}

impl OpVector {
    fn compute(min_speed: f64, speed: f64, distance: f64, ramp_accel: f64) -> Self {
        let min_ramp_accel = if distance > 0.0 {
            2.0 * speed * speed / distance
        } else {
            f64::INFINITY
        };
        let ramp_accel = ramp_accel.max(min_ramp_accel);
        let ramp_time = speed / ramp_accel;
        let ramp_displacement = (speed + min_speed) / 2.0 * ramp_time;
        let full_speed_displacement = (distance - 2.0 * ramp_displacement).max(0.0);
        let full_speed_time = if speed > 0.0 {
            full_speed_displacement / speed
        } else {
            0.0
        };

        Self {
            min_speed,
            speed,
            ramp_accel,
            ramp_time: Duration::from_secs_f64(ramp_time.max(0.0)),
            full_speed_time: Duration::from_secs_f64(full_speed_time.max(0.0)),
        }
    }

    fn op_time(&self) -> Duration {
        self.ramp_time + self.full_speed_time + self.ramp_time
    }
}

/// Phase of an in-flight move (`actuator.py`'s nested `DisplacementPhase`
/// class, converted to a proper closed sum type per the design spec's
/// redesign guidance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    RampUp,
    FullSpeed,
    RampDown,
    End,
}

/// A linear actuator driven by a stepper through a lead screw, with
/// end-stops in each direction of travel.
pub struct Actuator {
    stepper: Box<dyn StepperPort>,
    fwd_stop: Option<Box<dyn EndStopPort>>,
    rev_stop: Option<Box<dyn EndStopPort>>,
    alert: Option<Box<dyn AlertPort>>,
    config: ActuatorConfig,
    powered: bool,
    /// Linear displacement (mm, signed by direction) of the last move —
    /// the controller reads this to drive an exact reversing move after an
    /// interrupt chain is unwound.
    last_displacement_mm: f64,
    interrupted: Arc<AtomicBool>,
}

impl Actuator {
    pub fn new(
        stepper: Box<dyn StepperPort>,
        config: ActuatorConfig,
        fwd_stop: Option<Box<dyn EndStopPort>>,
        rev_stop: Option<Box<dyn EndStopPort>>,
        alert: Option<Box<dyn AlertPort>>,
    ) -> Self {
        Self {
            stepper,
            fwd_stop,
            rev_stop,
            alert,
            config,
            powered: false,
            last_displacement_mm: 0.0,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn last_displacement_mm(&self) -> f64 {
        self.last_displacement_mm
    }

    fn pulse_rate_from_speed(&self, speed_mm_s: f64) -> f64 {
        speed_mm_s * self.config.screw.pulses_per_mm()
    }

    fn end_stop_active(&self, forward: bool) -> bool {
        if forward {
            self.fwd_stop.as_deref().is_some_and(EndStopPort::is_active)
        } else {
            self.rev_stop.as_deref().is_some_and(EndStopPort::is_active)
        }
    }

    /// Drive `distance_mm` at up to `speed_mm_s`, ramping up then down.
    /// `forward` is the requested direction before the screw's polarity
    /// flip is applied. `ignore_interrupt` is set during a reversal replay
    /// pass, where the move must run to completion uninterrupted.
    async fn drive(
        &mut self,
        distance_mm: f64,
        speed_mm_s: f64,
        forward: bool,
        ignore_interrupt: bool,
    ) -> Result<()> {
        if let Some(alert) = &self.alert {
            if alert.is_active() {
                return Err(Error::device_alert("actuator driver alert line active"));
            }
        }

        if !self.powered {
            self.set_power(true);
        }

        let physical_forward = forward ^ !self.config.screw.forward_is_positive;
        self.stepper.set_direction(physical_forward);

        if self.end_stop_active(forward) {
            self.last_displacement_mm = 0.0;
            return Err(Error::LimitHalt);
        }

        let op = OpVector::compute(
            self.config.min_speed_mm_s,
            speed_mm_s,
            distance_mm,
            self.config.ramp_accel_mm_s2,
        );

        let mut phase = Phase::RampUp;
        let mut displacement_mm = 0.0_f64;
        let mut current_speed = self.config.min_speed_mm_s.min(op.speed.max(self.config.min_speed_mm_s));
        let start = Instant::now();
        let mut last_tick = start;
        let mut halted_by_limit = false;

        self.stepper
            .set_pulse_frequency(self.pulse_rate_from_speed(current_speed));

        loop {
            if displacement_mm >= distance_mm {
                break;
            }

            if !ignore_interrupt && self.interrupted.load(Ordering::Acquire) && phase < Phase::RampDown {
                phase = Phase::RampDown;
            }

            if self.end_stop_active(forward) {
                halted_by_limit = true;
                break;
            }

            let now = Instant::now();
            let tick = now.duration_since(last_tick);
            last_tick = now;
            displacement_mm += current_speed * tick.as_secs_f64();

            let elapsed = now.duration_since(start);

            match phase {
                Phase::RampUp => {
                    let t = if op.ramp_time.is_zero() {
                        1.0
                    } else {
                        (elapsed.as_secs_f64() / op.ramp_time.as_secs_f64()).min(1.0)
                    };
                    current_speed = op.min_speed + (op.speed - op.min_speed) * t;
                    self.stepper
                        .set_pulse_frequency(self.pulse_rate_from_speed(current_speed));
                    if t >= 1.0 {
                        phase = Phase::FullSpeed;
                    }
                }
                Phase::FullSpeed => {
                    if elapsed >= op.ramp_time + op.full_speed_time {
                        phase = Phase::RampDown;
                    }
                }
                Phase::RampDown => {
                    let ramp_down_start = op.ramp_time + op.full_speed_time;
                    let t = if op.ramp_time.is_zero() {
                        1.0
                    } else {
                        ((elapsed.saturating_sub(ramp_down_start)).as_secs_f64()
                            / op.ramp_time.as_secs_f64())
                        .min(1.0)
                    };
                    current_speed = op.speed - (op.speed - op.min_speed) * t;
                    self.stepper
                        .set_pulse_frequency(self.pulse_rate_from_speed(current_speed.max(op.min_speed)));
                    if t >= 1.0 {
                        phase = Phase::End;
                        if !ignore_interrupt && self.interrupted.load(Ordering::Acquire) {
                            break;
                        }
                    }
                }
                Phase::End => {}
            }

            // Ramp-down and end-of-move are not yield points — they must
            // complete within their step-pulse timing deadlines. Only
            // ramp-up and full-speed cruising yield cooperatively.
            if phase < Phase::RampDown {
                tokio::task::yield_now().await;
            }
        }

        self.stepper.stop_pulses();
        tokio::time::sleep(Duration::from_millis(u64::from(self.config.safe_wait_ms))).await;

        self.last_displacement_mm = if forward {
            displacement_mm
        } else {
            -displacement_mm
        };

        let _ = op.op_time();

        if halted_by_limit {
            return Err(Error::LimitHalt);
        }

        Ok(())
    }
}

#[async_trait]
impl RoboticsDevice for Actuator {
    async fn execute(&mut self, ctrl: &Control, reverse: bool) -> Result<()> {
        let ControlKind::Move(mv) = &ctrl.kind else {
            return Err(Error::bad_request("actuator can only execute MV controls"));
        };

        let requested_forward = mv.distance_mm >= 0;
        let forward = if reverse {
            !requested_forward
        } else {
            requested_forward
        };
        let distance = f64::from(mv.distance_mm.unsigned_abs());
        let speed = f64::from(mv.speed_mm_s);

        if !reverse {
            self.interrupted.store(false, Ordering::Release);
        }

        self.drive(distance, speed, forward, reverse).await?;

        if !reverse && self.interrupted.load(Ordering::Acquire) {
            warn!("actuator move interrupted mid-flight, reversing partial displacement");
            tokio::time::sleep(Duration::from_millis(500)).await;
            let reversed_forward = self.last_displacement_mm < 0.0;
            self.drive(self.last_displacement_mm.abs(), speed, reversed_forward, true)
                .await?;
        }

        Ok(())
    }

    fn set_power(&mut self, powered: bool) {
        self.powered = powered;
        self.stepper.set_enabled(powered);
    }

    fn interrupted_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubStepper {
        enabled: bool,
        forward: Option<bool>,
        last_hz: f64,
        stopped: bool,
    }

    impl StepperPort for StubStepper {
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn set_direction(&mut self, forward: bool) {
            self.forward = Some(forward);
        }
        fn set_pulse_frequency(&mut self, hz: f64) {
            self.last_hz = hz;
        }
        fn stop_pulses(&mut self) {
            self.stopped = true;
            self.last_hz = 0.0;
        }
    }

    struct NeverActive;
    impl EndStopPort for NeverActive {
        fn is_active(&self) -> bool {
            false
        }
    }

    struct AlwaysActive;
    impl EndStopPort for AlwaysActive {
        fn is_active(&self) -> bool {
            true
        }
    }

    fn test_config() -> ActuatorConfig {
        ActuatorConfig {
            screw: Screw {
                steps_per_revolution: 1600,
                lead_mm_per_revolution: 8.0,
                forward_is_positive: true,
            },
            min_speed_mm_s: 5.0,
            ramp_accel_mm_s2: 400.0,
            safe_wait_ms: 0,
        }
    }

    fn actuator_with(fwd: Option<Box<dyn EndStopPort>>, rev: Option<Box<dyn EndStopPort>>) -> Actuator {
        Actuator::new(
            Box::<StubStepper>::default(),
            test_config(),
            fwd,
            rev,
            None,
        )
    }

    #[tokio::test]
    async fn completes_a_short_forward_move() {
        let mut actuator = actuator_with(Some(Box::new(NeverActive)), Some(Box::new(NeverActive)));
        let ctrl = crate::robotics::control::parse_program("MV 20 50").unwrap();
        actuator.execute(&ctrl[0], false).await.unwrap();
        assert!(actuator.last_displacement_mm() > 0.0);
    }

    #[tokio::test]
    async fn end_stop_in_direction_of_travel_halts_with_limit_error() {
        let mut actuator = actuator_with(Some(Box::new(AlwaysActive)), Some(Box::new(NeverActive)));
        let ctrl = crate::robotics::control::parse_program("MV 20 50").unwrap();
        let err = actuator.execute(&ctrl[0], false).await.unwrap_err();
        assert!(matches!(err, Error::LimitHalt));
    }

    #[tokio::test]
    async fn end_stop_behind_travel_direction_does_not_block() {
        // Forward move, only the reverse stop is engaged — should complete.
        let mut actuator = actuator_with(Some(Box::new(NeverActive)), Some(Box::new(AlwaysActive)));
        let ctrl = crate::robotics::control::parse_program("MV 20 50").unwrap();
        actuator.execute(&ctrl[0], false).await.unwrap();
    }

    #[tokio::test]
    async fn driver_alert_short_circuits_before_any_motion() {
        struct Tripped;
        impl AlertPort for Tripped {
            fn is_active(&self) -> bool {
                true
            }
        }
        let mut actuator = Actuator::new(
            Box::<StubStepper>::default(),
            test_config(),
            None,
            None,
            Some(Box::new(Tripped)),
        );
        let ctrl = crate::robotics::control::parse_program("MV 20 50").unwrap();
        let err = actuator.execute(&ctrl[0], false).await.unwrap_err();
        assert!(matches!(err, Error::DeviceAlert(_)));
    }

    #[test]
    fn op_vector_raises_ramp_accel_when_distance_too_short() {
        let op = OpVector::compute(5.0, 200.0, 10.0, 50.0);
        // With the requested accel the ramp alone would overshoot the
        // 10mm distance; the minimum-required accel must be used instead.
        assert!(op.ramp_accel > 50.0);
        assert!(op.full_speed_time.is_zero());
    }

    #[test]
    fn op_vector_keeps_requested_accel_over_long_distances() {
        let op = OpVector::compute(5.0, 200.0, 10_000.0, 400.0);
        assert!((op.ramp_accel - 400.0).abs() < 1e-6);
        assert!(op.full_speed_time > Duration::ZERO);
    }

    #[test]
    fn interrupt_flag_is_shared_and_mutable_from_outside() {
        let actuator = actuator_with(None, None);
        let flag = actuator.interrupted_flag();
        assert!(!flag.load(Ordering::Acquire));
        flag.store(true, Ordering::Release);
        assert!(actuator.interrupted.load(Ordering::Acquire));
    }

    #[allow(dead_code)]
    fn assert_send<T: Send>() {}

    #[test]
    fn actuator_is_send() {
        assert_send::<Actuator>();
    }

    static _UNUSED_LOCK: Mutex<()> = Mutex::new(());
}
