//! `Status` and `Heartbeat` records (design spec §3).

use serde::{Deserialize, Serialize};

/// Device status, durable on the bus via last-message-per-subject retrieval.
///
/// Invariants enforced by [`crate::runtime::DeviceRuntime`], not by this
/// type itself (it is a plain data record): `enabled == false` implies
/// `on_trigger` is never dispatched for non-reserved codes; `active` may
/// only be `true` while `enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub enabled: bool,
    pub active: bool,
    pub locked: bool,
    pub status: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            enabled: true,
            active: false,
            locked: false,
            status: String::new(),
        }
    }
}

impl Status {
    /// `enabled ∧ ¬locked ∧ (¬active ∨ allow_active)` — guards application
    /// entry points per §4.B.
    pub fn can_act(&self, allow_active: bool) -> bool {
        self.enabled && !self.locked && (!self.active || allow_active)
    }
}

/// `{uptime_seconds, build, local_addr, interval_seconds}`, published every
/// `interval_seconds` (1..=60).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub uptime_seconds: u64,
    pub build: u32,
    pub local_addr: String,
    pub interval_seconds: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_enabled_idle() {
        let s = Status::default();
        assert!(s.enabled);
        assert!(!s.active);
        assert!(!s.locked);
    }

    #[test]
    fn can_act_requires_enabled_and_unlocked() {
        let mut s = Status::default();
        assert!(s.can_act(false));

        s.enabled = false;
        assert!(!s.can_act(false));
        s.enabled = true;

        s.locked = true;
        assert!(!s.can_act(false));
        s.locked = false;

        s.active = true;
        assert!(!s.can_act(false));
        assert!(s.can_act(true));
    }
}
