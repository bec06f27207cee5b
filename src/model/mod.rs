//! Wire data model (design spec §3) — device identity and the payload
//! structs published/subscribed on the subjects named in [`crate::subject`].

pub mod settings;
pub mod status;
pub mod trigger;

pub use settings::{CommonSettings, SettingsKind};
pub use status::{Heartbeat, Status};
pub use trigger::{Trigger, TriggerCode};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A hierarchical device identifier of at least two namespaces, e.g.
/// `relay.hallway`. The first namespace is the device *type*; the full
/// dotted string is the *device id*.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Vec<String>);

impl DeviceId {
    /// Parse a dotted device id string. Rejects anything with fewer than
    /// two namespaces or an empty namespace.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<String> = s
            .split('.')
            .map(|p| p.trim().to_lowercase())
            .collect();

        if parts.len() < 2 || parts.iter().any(String::is_empty) {
            return Err(Error::InvalidDeviceId);
        }

        Ok(Self(parts))
    }

    /// The first namespace — the device's type, e.g. `"relay"`.
    pub fn device_type(&self) -> &str {
        &self.0[0]
    }

    /// The full dotted id string, e.g. `"relay.hallway"`.
    pub fn as_str(&self) -> String {
        self.0.join(".")
    }

    /// This device's central subject, used to address commands to it
    /// individually: `central.<device_id>`.
    pub fn central_subject(&self) -> String {
        crate::subject::central(&self.as_str())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Log / alert payloads (log.<device_id> / alert.<device_id>)
// ---------------------------------------------------------------------------

/// `{lvl, msg}` published to `log.<device_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub lvl: crate::subject::LogLevel,
    pub msg: String,
}

/// `{priority, msg}` published to `alert.<device_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub priority: crate::subject::Priority,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Command payloads
// ---------------------------------------------------------------------------

/// `cmd.jog.<central>` — manual actuator jog (only honoured while disabled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JogCommand {
    pub device_id: String,
    pub distance: i32,
    pub speed: i32,
}

/// `cmd.ota.<central>` — firmware update request. `version == 0` means
/// "latest".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaCommand {
    pub version: u32,
}

/// `cmd.reboot.<central>` — soft reboot request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RebootCommand {}

/// `cmd.alarm` — overwatch alarm, consumed by the out-of-scope audio
/// overwatch backend; carried here only so the taxonomy is fully typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmCommand {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// `cmd.announce` — overwatch text-to-speech announcement; see
/// [`AlarmCommand`] for why this lives in the core's model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceCommand {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chime: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_namespace_id() {
        let id = DeviceId::parse("relay.hallway").unwrap();
        assert_eq!(id.device_type(), "relay");
        assert_eq!(id.as_str(), "relay.hallway");
        assert_eq!(id.central_subject(), "central.relay.hallway");
    }

    #[test]
    fn rejects_single_namespace() {
        assert_eq!(DeviceId::parse("relay"), Err(Error::InvalidDeviceId));
    }

    #[test]
    fn rejects_empty_namespace() {
        assert_eq!(DeviceId::parse("relay..hallway"), Err(Error::InvalidDeviceId));
    }

    #[test]
    fn lowercases_and_trims() {
        let id = DeviceId::parse(" Relay . Hallway ").unwrap();
        assert_eq!(id.as_str(), "relay.hallway");
    }
}
