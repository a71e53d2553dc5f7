//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem of the
//! application service against the mock adapters in `mock_hw`.  All tests
//! run on the host with no real hardware required.

mod command_tests;
mod connectivity_tests;
mod control_loop_tests;
mod mock_hw;
mod reset_tests;
