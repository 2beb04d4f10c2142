//! Stateful physical models owned by a simulation run.

/// Per-step vehicle status derivation and charge traces.
pub mod ev_state;
/// Stationary battery storage model.
pub mod battery;
/// Vehicles and their daily presence schedules.
pub mod vehicle;

// Re-export the main types for convenience
pub use battery::BatteryStorage;
pub use ev_state::{ChargeTraces, FULL_TOLERANCE_WH, VehicleStatus, derive_statuses, vehicle_status};
pub use vehicle::{HourOfDay, Presence, Vehicle};
