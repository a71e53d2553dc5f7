//! Application core: domain logic behind port traits.
//!
//! The control loop ([`service`]), the connectivity service
//! ([`connectivity`]), the command decoder ([`commands`]) and the
//! outbound event vocabulary ([`events`]).  All interaction with hardware
//! happens through the traits in [`ports`], so this layer runs unchanged
//! against the mocks in `tests/integration`.

pub mod commands;
pub mod connectivity;
pub mod events;
pub mod ports;
pub mod service;
