//! ElectroOxidizer firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod credentials;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod reset_detect;
pub mod sensors;

// Driver and adapter modules carry their own cfg gates; host builds get
// the simulation halves.
pub mod adapters;
pub mod drivers;
