//! EV charging co-simulation: a dispatch controller coordinating a vehicle
//! fleet, a stationary battery, renewable production, an electricity market,
//! and a low-voltage distribution grid in discrete time.

pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
/// Result export.
pub mod io;
pub mod models;
pub mod runner;
/// Simulation engine, controller, and reporting modules.
pub mod sim;
