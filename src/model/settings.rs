//! Settings records (design spec §3): a polymorphic record keyed by device
//! type. Every variant inherits [`CommonSettings`]; type-specific variants
//! add sensor thresholds, sequence strings, etc. A settings record is
//! validated before use — invalid records are rejected, not coerced.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fields every settings variant inherits (`original_source`'s
/// `schema.settings.Settings` base class).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSettings {
    /// Seconds between heartbeat publications, 1..=60.
    pub heartbeat_interval: u8,
    /// Space-delimited list of upstream subjects this device listens to
    /// for triggers, in addition to its own central subject.
    #[serde(default)]
    pub listen_subjects: String,
    /// Time in ms before the device will reactivate after execution.
    #[serde(default)]
    pub cooldown_time_ms: Option<u32>,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: 5,
            listen_subjects: String::new(),
            cooldown_time_ms: None,
        }
    }
}

impl CommonSettings {
    /// Split `listen_subjects` into its component subjects, dropping blanks.
    pub fn listen_subjects_list(&self) -> Vec<String> {
        self.listen_subjects
            .split(' ')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.heartbeat_interval) {
            return Err(Error::malformed(format!(
                "heartbeat_interval must be 1..=60, got {}",
                self.heartbeat_interval
            )));
        }
        Ok(())
    }
}

/// An on-off or timer-based power relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(default)]
    pub auto_off: bool,
    #[serde(default)]
    pub allow_toggle: bool,
    #[serde(default = "default_time_delay_secs")]
    pub time_delay_secs: u32,
}

fn default_time_delay_secs() -> u32 {
    30
}

/// A physical actuator driving a mechanical action (the settings record;
/// see [`crate::drivers::actuator`] for the motion-profile driver itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(default = "default_actuator_speed")]
    pub actuator_speed_percent: u8,
}

fn default_actuator_speed() -> u8 {
    50
}

/// A motorised door: open for `drive_ticks`, wait `wait_time_ms`, reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorSettings {
    #[serde(flatten)]
    pub actuator: ActuatorSettings,
    #[serde(default = "default_drive_ticks")]
    pub drive_ticks: u32,
    #[serde(default)]
    pub wait_time_ms: u32,
    #[serde(default = "default_true")]
    pub auto_calibrate: bool,
}

fn default_drive_ticks() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

/// A device that sends a trigger command of its own (motion/range sensors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDeviceSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(default)]
    pub trigger_code: i32,
}

/// A motion sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSettings {
    #[serde(flatten)]
    pub trigger: TriggerDeviceSettings,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,
}

fn default_sensitivity() -> u8 {
    50
}

/// A range-based trip sensor: trips when the measured range drops below
/// `max_distance_mm` for at least `wait_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSettings {
    #[serde(flatten)]
    pub trigger: TriggerDeviceSettings,
    #[serde(default = "default_max_distance")]
    pub max_distance_mm: u32,
    #[serde(default)]
    pub wait_delay_ms: u32,
}

fn default_max_distance() -> u32 {
    1000
}

/// A collection of one or more actuators/steppers/LED strips that execute
/// named control-language sequences (design spec §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoboticsSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(default)]
    pub seq_0: String,
    #[serde(default)]
    pub seq_1: String,
    #[serde(default)]
    pub seq_2: String,
    #[serde(default)]
    pub seq_3: String,
    #[serde(default)]
    pub seq_4: String,
    #[serde(default)]
    pub seq_5: String,
}

impl RoboticsSettings {
    /// The six named sequences, in order.
    pub fn sequences(&self) -> [&str; 6] {
        [
            &self.seq_0,
            &self.seq_1,
            &self.seq_2,
            &self.seq_3,
            &self.seq_4,
            &self.seq_5,
        ]
    }
}

/// Tagged union over every settings variant, discriminated by device type.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsKind {
    Relay(RelaySettings),
    Actuator(ActuatorSettings),
    Door(DoorSettings),
    Motion(MotionSettings),
    Range(RangeSettings),
    Robotics(RoboticsSettings),
}

impl SettingsKind {
    /// Parse and validate a settings record for the given device type.
    ///
    /// Unknown device types and out-of-range common fields are rejected
    /// outright — settings are the authoritative source of device
    /// behaviour and must never be silently coerced (§3).
    pub fn parse(device_type: &str, payload: &serde_json::Value) -> Result<Self> {
        let kind = match device_type {
            "relay" => Self::Relay(deserialize(payload)?),
            "actuator" => Self::Actuator(deserialize(payload)?),
            "door" => Self::Door(deserialize(payload)?),
            "motion" => Self::Motion(deserialize(payload)?),
            "range" => Self::Range(deserialize(payload)?),
            "robotics" => Self::Robotics(deserialize(payload)?),
            other => return Err(Error::unsupported_device_type(other)),
        };
        kind.common().validate()?;
        Ok(kind)
    }

    /// The [`CommonSettings`] every variant carries.
    pub fn common(&self) -> &CommonSettings {
        match self {
            Self::Relay(s) => &s.common,
            Self::Actuator(s) => &s.common,
            Self::Door(s) => &s.actuator.common,
            Self::Motion(s) => &s.trigger.common,
            Self::Range(s) => &s.trigger.common,
            Self::Robotics(s) => &s.common,
        }
    }
}

fn deserialize<T: for<'de> Deserialize<'de>>(payload: &serde_json::Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::malformed(format!("settings payload: {e}")))
}

// ---------------------------------------------------------------------------
// Sensor state machines
// ---------------------------------------------------------------------------
//
// Two subtly different state machines exist in the original source for the
// range and motion sensors. Per the design spec's resolved Open Question,
// range sensors use the four-state model and motion sensors the
// three-state model (the later source variants). These are
// application-level states, not part of the settings record or the
// generic device runtime — an embedding range/motion application owns the
// transitions; the runtime only ever sees `on_trigger`.

/// Range sensor state (four states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeState {
    Idle,
    Hot,
    Active,
    Cooldown,
}

/// Motion sensor state (three states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Active,
    Cooldown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_relay_settings() {
        let payload = json!({
            "heartbeat_interval": 10,
            "listen_subjects": "a b",
            "auto_off": true,
            "time_delay_secs": 45,
        });
        let kind = SettingsKind::parse("relay", &payload).unwrap();
        match kind {
            SettingsKind::Relay(r) => {
                assert!(r.auto_off);
                assert_eq!(r.time_delay_secs, 45);
                assert_eq!(r.common.listen_subjects_list(), vec!["a", "b"]);
            }
            _ => panic!("expected relay settings"),
        }
    }

    #[test]
    fn rejects_out_of_range_heartbeat() {
        let payload = json!({ "heartbeat_interval": 0 });
        let err = SettingsKind::parse("relay", &payload).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_device_type() {
        let payload = json!({ "heartbeat_interval": 5 });
        let err = SettingsKind::parse("toaster", &payload).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDeviceType(_)));
    }

    #[test]
    fn parses_robotics_sequences() {
        let payload = json!({
            "heartbeat_interval": 5,
            "seq_0": "SEL A0; MV 500 200",
        });
        let kind = SettingsKind::parse("robotics", &payload).unwrap();
        match kind {
            SettingsKind::Robotics(r) => {
                assert_eq!(r.seq_0, "SEL A0; MV 500 200");
                assert_eq!(r.seq_1, "");
            }
            _ => panic!("expected robotics settings"),
        }
    }
}
