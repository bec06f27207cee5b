//! Hardware drivers for the robotics control subsystem (design spec §4.F,
//! §4.G). Each driver is a hexagonal adapter: it implements
//! [`crate::robotics::RoboticsDevice`] against one or more small port traits
//! (pulse/direction lines, end-stops, a pixel sink) so the motion and
//! lighting algorithms stay host-testable without real hardware, following
//! the port-trait boundary established by the pet-filter firmware's
//! `app::ports` module.

pub mod actuator;
pub mod led;
