//! `Trigger` payload and the reserved trigger code table (design spec §3).

use serde::{Deserialize, Serialize};

/// `{code}` published to `cmd.trigger.<listen_subject>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub code: i32,
}

/// Reserved trigger codes with built-in semantics. Codes outside this set
/// are application codes, forwarded verbatim to `on_trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCode {
    Interrupt,
    Calibrate,
    EnableToggle,
    EnableOn,
    EnableOff,
    LockToggle,
    LockOn,
    LockOff,
    /// Not one of the reserved codes — carries the raw application code.
    Application(i32),
}

impl TriggerCode {
    pub const INTERRUPT: i32 = 100;
    pub const CALIBRATE: i32 = 101;
    pub const ENABLE_TOGGLE: i32 = 110;
    pub const ENABLE_ON: i32 = 111;
    pub const ENABLE_OFF: i32 = 112;
    pub const LOCK_TOGGLE: i32 = 115;
    pub const LOCK_ON: i32 = 116;
    pub const LOCK_OFF: i32 = 117;

    /// Classify a raw trigger code.
    pub fn classify(code: i32) -> Self {
        match code {
            Self::INTERRUPT => Self::Interrupt,
            Self::CALIBRATE => Self::Calibrate,
            Self::ENABLE_TOGGLE => Self::EnableToggle,
            Self::ENABLE_ON => Self::EnableOn,
            Self::ENABLE_OFF => Self::EnableOff,
            Self::LOCK_TOGGLE => Self::LockToggle,
            Self::LOCK_ON => Self::LockOn,
            Self::LOCK_OFF => Self::LockOff,
            other => Self::Application(other),
        }
    }

    /// `true` for any of the built-in reserved codes.
    pub fn is_reserved(self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reserved_codes() {
        assert_eq!(TriggerCode::classify(100), TriggerCode::Interrupt);
        assert_eq!(TriggerCode::classify(101), TriggerCode::Calibrate);
        assert_eq!(TriggerCode::classify(110), TriggerCode::EnableToggle);
        assert_eq!(TriggerCode::classify(111), TriggerCode::EnableOn);
        assert_eq!(TriggerCode::classify(112), TriggerCode::EnableOff);
        assert_eq!(TriggerCode::classify(115), TriggerCode::LockToggle);
        assert_eq!(TriggerCode::classify(116), TriggerCode::LockOn);
        assert_eq!(TriggerCode::classify(117), TriggerCode::LockOff);
    }

    #[test]
    fn classifies_application_codes() {
        assert_eq!(TriggerCode::classify(7), TriggerCode::Application(7));
        assert!(!TriggerCode::classify(7).is_reserved());
        assert!(TriggerCode::classify(100).is_reserved());
    }
}
