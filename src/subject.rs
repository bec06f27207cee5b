//! Subject and stream taxonomy (design spec §6).
//!
//! Every subject is dot-delimited. Payloads are JSON unless noted (the OTA
//! archive body is the one binary exception, see [`crate::ota::archive`]).

use std::fmt;

/// Standard log levels carried in a [`crate::model::LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// Alert priority, 1 (highest) through 5 (lowest/informational), per §6.
pub type Priority = u8;

/// Base subjects. A fully-qualified subject is `base.device_id[.sub]`.
pub mod base {
    pub const LOG: &str = "log";
    pub const ALERT: &str = "alert";
    pub const STATUS: &str = "status";
    pub const COMMAND: &str = "cmd";
    pub const COMMAND_TRIGGER: &str = "trigger";
    pub const COMMAND_JOG: &str = "jog";
    pub const COMMAND_OTA: &str = "ota";
    pub const COMMAND_REBOOT: &str = "reboot";
    pub const COMMAND_ALARM: &str = "alarm";
    pub const COMMAND_ANNOUNCE: &str = "announce";
    pub const HEARTBEAT: &str = "hb";
    pub const SETTINGS: &str = "settings";
}

/// Logical retention buckets (JetStream streams), each filtering the
/// corresponding subject prefix.
pub mod stream {
    pub const LOGS: &str = "logs";
    pub const ALERTS: &str = "alerts";
    pub const STATUS: &str = "status";
    pub const COMMAND: &str = "commands";
    pub const HEARTBEAT: &str = "heartbeats";
    pub const SETTINGS: &str = "settings";
}

/// Build a fully-qualified subject from parts, joined with `.`.
///
/// `fqs(&["cmd", "trigger"], "relay.hallway")` -> `"cmd.trigger.relay.hallway"`.
pub fn fqs(parts: &[&str], device: &str) -> String {
    let mut joined = parts.join(".");
    joined.push('.');
    joined.push_str(device);
    joined
}

/// Subject for log records of `device_id`.
pub fn log(device_id: &str) -> String {
    format!("{}.{device_id}", base::LOG)
}

/// Subject for alert records of `device_id`.
pub fn alert(device_id: &str) -> String {
    format!("{}.{device_id}", base::ALERT)
}

/// Subject carrying the durable status record of `device_id`.
pub fn status(device_id: &str) -> String {
    format!("{}.{device_id}", base::STATUS)
}

/// Subject carrying the durable heartbeat record of `device_id`.
pub fn heartbeat(device_id: &str) -> String {
    format!("{}.{device_id}", base::HEARTBEAT)
}

/// Subject carrying the durable, authoritative settings record of `device_id`.
pub fn settings(device_id: &str) -> String {
    format!("{}.{device_id}", base::SETTINGS)
}

/// Subject a trigger dispatcher subscribes to for a given listen subject
/// (which may itself be a device's central subject).
pub fn trigger(listen_subject: &str) -> String {
    fqs(&[base::COMMAND, base::COMMAND_TRIGGER], listen_subject)
}

/// Subject for a manual actuator jog command addressed at `central`.
pub fn jog(central: &str) -> String {
    fqs(&[base::COMMAND, base::COMMAND_JOG], central)
}

/// Subject for an OTA update command addressed at `central`.
pub fn ota(central: &str) -> String {
    fqs(&[base::COMMAND, base::COMMAND_OTA], central)
}

/// Subject for a soft reboot command addressed at `central`.
pub fn reboot(central: &str) -> String {
    fqs(&[base::COMMAND, base::COMMAND_REBOOT], central)
}

/// A device's central subject, used to address commands to it individually.
pub fn central(device_id: &str) -> String {
    format!("central.{device_id}")
}

/// Overwatch alarm subject (no per-device suffix — global).
pub fn alarm() -> &'static str {
    "cmd.alarm"
}

/// Overwatch announcement subject (no per-device suffix — global).
pub fn announce() -> &'static str {
    "cmd.announce"
}

/// Wildcard subject under `subject`, e.g. `all("log.relay.hallway", true)` ->
/// `"log.relay.hallway.>"`.
pub fn all(subject: &str, multi: bool) -> String {
    let wc = if multi { ">" } else { "*" };
    format!("{subject}.{wc}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqs_joins_parts_then_device() {
        assert_eq!(
            fqs(&["cmd", "trigger"], "relay.hallway"),
            "cmd.trigger.relay.hallway"
        );
    }

    #[test]
    fn trigger_subject_matches_taxonomy() {
        assert_eq!(trigger("room.a"), "cmd.trigger.room.a");
    }

    #[test]
    fn wildcard_subject() {
        assert_eq!(all("log.relay.hallway", true), "log.relay.hallway.>");
        assert_eq!(all("log.relay.hallway", false), "log.relay.hallway.*");
    }
}
