//! Unified error taxonomy for the inu device runtime and robotics subsystem.
//!
//! A single `Error` enum that every subsystem funnels into, keeping the
//! top-level control loop's error handling uniform — the kinds named in
//! the design spec (§7), not exhaustive wrapped source errors. Callers that
//! need the underlying cause should log it at the point of occurrence and
//! pass on the matching `Error` kind.

use std::fmt;

/// Every fallible operation in the device runtime and robotics subsystem
/// funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Semantic misuse, e.g. executing a tangible control without a prior `SEL`.
    BadRequest(String),
    /// The bus adapter is not connected.
    NoConnection,
    /// A payload or control string failed to parse.
    Malformed(String),
    /// A device id string did not resolve to `<type>.<name>[...]`.
    InvalidDeviceId,
    /// A device-type string has no registered settings/driver constructor.
    UnsupportedDeviceType(String),
    /// An actuator end-stop halted the current move.
    LimitHalt,
    /// A driver malfunction/alert signal was raised.
    DeviceAlert(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::NoConnection => write!(f, "not connected to bus"),
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
            Self::InvalidDeviceId => write!(f, "invalid device id"),
            Self::UnsupportedDeviceType(t) => write!(f, "unsupported device type: {t}"),
            Self::LimitHalt => write!(f, "end-stop limit halt"),
            Self::DeviceAlert(msg) => write!(f, "device alert: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn unsupported_device_type(t: impl Into<String>) -> Self {
        Self::UnsupportedDeviceType(t.into())
    }

    pub fn device_alert(msg: impl Into<String>) -> Self {
        Self::DeviceAlert(msg.into())
    }
}
