//! Local device configuration (design spec §6).
//!
//! A JSON document read once from device storage at bootstrap — the only
//! moment the runtime consults it. Everything discovered after that point
//! (settings, command subjects) comes from the bus instead.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// NATS connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub server: String,
}

/// Wi-Fi association parameters. The link layer itself is an external
/// collaborator (§1); this is only the credential the bootstrap step hands
/// off to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

/// Local device bootstrap configuration, loaded once at `INIT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub device_id: String,
    pub nats: NatsConfig,
    pub wifi: WifiConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Device-type-specific hardware pin maps, opaque to the runtime and
    /// interpreted only by the embedding application's port adapters.
    #[serde(default)]
    pub pins: HashMap<String, serde_json::Value>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LocalConfig {
    /// Parse and validate a local configuration document.
    ///
    /// Unknown top-level fields are accepted (forward compatibility with
    /// newer documents written by the TUI settings editor); a missing
    /// `device_id`, `nats.server`, or Wi-Fi credential is rejected rather
    /// than defaulted, since bootstrap cannot proceed without them.
    pub fn parse(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::malformed(format!("local config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::malformed("device_id must not be empty"));
        }
        if self.nats.server.trim().is_empty() {
            return Err(Error::malformed("nats.server must not be empty"));
        }
        if self.wifi.ssid.trim().is_empty() {
            return Err(Error::malformed("wifi.ssid must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let json = r#"{
            "device_id": "relay.hallway",
            "nats": { "server": "nats://localhost:4222" },
            "wifi": { "ssid": "home", "password": "secret" }
        }"#;
        let config = LocalConfig::parse(json).unwrap();
        assert_eq!(config.device_id, "relay.hallway");
        assert_eq!(config.log_level, "info");
        assert!(config.pins.is_empty());
    }

    #[test]
    fn rejects_empty_device_id() {
        let json = r#"{
            "device_id": "",
            "nats": { "server": "nats://localhost:4222" },
            "wifi": { "ssid": "home", "password": "secret" }
        }"#;
        assert!(LocalConfig::parse(json).is_err());
    }
}
