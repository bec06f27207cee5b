//! `inu-robotics` — a robotics control-language demo host.
//!
//! Registers a demo actuator (`a0`) and LED strip (`strip0`) backed by
//! logging-only hardware ports (design spec §1: physical GPIO/PWM/SPI
//! drivers are out of scope, external collaborators), then parses and runs
//! a control-language program (design spec §4.E, §6 grammar).
//!
//! Usage: `inu-robotics "SEL a0; MV 800 300; W 500; MV -800 150"`
//!
//! Exit codes (design spec §6): `0` success, `1` usage, `9` unknown mode.

use anyhow::{bail, Result};
use inu::drivers::actuator::{Actuator, ActuatorConfig, EndStopPort, Screw, StepperPort};
use inu::drivers::led::{LedStrip, PixelPort};
use inu::robotics::Robotics;
use log::info;
use std::time::Duration;

struct LoggingStepper;

impl StepperPort for LoggingStepper {
    fn set_enabled(&mut self, enabled: bool) {
        info!("a0: power {}", if enabled { "on" } else { "off" });
    }

    fn set_direction(&mut self, forward: bool) {
        info!("a0: direction {}", if forward { "forward" } else { "reverse" });
    }

    fn set_pulse_frequency(&mut self, hz: f64) {
        info!("a0: pulse frequency {hz:.1} Hz");
    }

    fn stop_pulses(&mut self) {
        info!("a0: pulses stopped");
    }
}

struct NeverTripped;

impl EndStopPort for NeverTripped {
    fn is_active(&self) -> bool {
        false
    }
}

struct LoggingPixel;

impl PixelPort for LoggingPixel {
    fn write_frame(&mut self, frame: &[u8]) {
        info!("strip0: frame of {} bytes", frame.len());
    }
}

fn usage() -> ! {
    eprintln!(r#"usage: inu-robotics "SEL a0; MV 800 300; W 2000 INT; MV -800 150 INT""#);
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    info!("inu-robotics v{}", env!("CARGO_PKG_VERSION"));

    let program = match std::env::args().nth(1) {
        Some(p) if !p.trim().is_empty() => p,
        _ => usage(),
    };

    let mut robotics = Robotics::new(Duration::from_millis(50));

    let actuator = Actuator::new(
        Box::new(LoggingStepper),
        ActuatorConfig {
            screw: Screw {
                steps_per_revolution: 1600,
                lead_mm_per_revolution: 8.0,
                forward_is_positive: true,
            },
            min_speed_mm_s: 5.0,
            ramp_accel_mm_s2: 400.0,
            safe_wait_ms: 100,
        },
        Some(Box::new(NeverTripped)),
        Some(Box::new(NeverTripped)),
        None,
    );
    robotics.register("a0", Box::new(actuator));

    let mut strip = LedStrip::new(Box::new(LoggingPixel), 60);
    strip.register_segment("tail", 40, 20);
    robotics.register("strip0", Box::new(strip));

    match robotics.run(&program).await {
        Ok(()) => {
            info!("program completed");
            Ok(())
        }
        Err(e) => bail!("program failed: {e}"),
    }
}
