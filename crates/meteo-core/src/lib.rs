//! Hardware-independent core of the meteo station
//!
//! This crate holds the data-routing core of a cyclic environmental monitoring
//! station: the static device catalog, sensor/clock/bus/calibration providers,
//! the router that fetches tagged readings and fans them out to sinks, the
//! resumable state machines driven by the cooperative scheduler, and the
//! component status bitmasks used for (re)initialization.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on embedded
//! targets and on desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app;
pub mod bus;
pub mod calibration;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod reading;
pub mod router;
pub mod scheduler;
pub mod sensors;
pub mod sinks;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use reading::{Input, InputKind, OutputKind, Reading};
pub use router::Router;
pub use scheduler::Scheduler;
pub use status::{ComponentStatus, initialize};
