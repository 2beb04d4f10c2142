/// Simulation clock for timestep management.
pub mod clock;
pub mod controller;
pub mod engine;
pub mod kpi;
pub mod power_balance;
/// Authoritative per-run time series.
pub mod series;
pub mod types;
