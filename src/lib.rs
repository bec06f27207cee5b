//! inu device runtime and robotics control library.
//!
//! Exposes the pure-logic modules for integration testing and for the
//! `inu-device` / `inu-robotics` host binaries. Hardware and bus access are
//! expressed as traits (`bus::BusAdapter`, `drivers::*::*Port`) so the
//! runtime itself never depends on a particular transport or board.

#![deny(unused_must_use)]

pub mod bus;
pub mod config;
pub mod drivers;
pub mod error;
pub mod model;
pub mod ota;
pub mod robotics;
pub mod runtime;
pub mod subject;
pub mod trigger;

pub use error::{Error, Result};
