//! Per-step charging eligibility of each vehicle and the charge traces it reads.

use serde::Serialize;

use super::vehicle::{Presence, Vehicle};

/// Absolute tolerance (Wh) below capacity at which a vehicle counts as full.
///
/// Keeps floating-point accumulation from flipping a vehicle between
/// `CanCharge` and `Full` at the capacity boundary.
pub const FULL_TOLERANCE_WH: f64 = 1e-3;

/// Charging eligibility of one vehicle for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleStatus {
    /// Vehicle is away from its charger.
    NotCharging,
    /// Vehicle is present and below capacity.
    CanCharge,
    /// Vehicle is present and at capacity (within tolerance).
    Full,
}

/// Derives one vehicle's status from its presence, capacity, and current charge.
pub fn vehicle_status(presence: Presence, battery_capacity_wh: f64, charge_wh: f64) -> VehicleStatus {
    match presence {
        Presence::Away => VehicleStatus::NotCharging,
        Presence::Present if charge_wh < battery_capacity_wh - FULL_TOLERANCE_WH => {
            VehicleStatus::CanCharge
        }
        Presence::Present => VehicleStatus::Full,
    }
}

/// Derives every vehicle's status at `time_index`.
///
/// Pure: reads the presence schedules and `traces` at `time_index` and
/// mutates nothing, so calling it twice yields the same statuses.
///
/// # Panics
///
/// Panics if `schedules`, `fleet`, and `traces` disagree on the number of
/// vehicles, or `time_index` lies beyond a schedule.
pub fn derive_statuses(
    time_index: usize,
    schedules: &[Vec<Presence>],
    fleet: &[Vehicle],
    traces: &ChargeTraces,
) -> Vec<VehicleStatus> {
    assert_eq!(schedules.len(), fleet.len());
    assert_eq!(traces.vehicle_count(), fleet.len());

    fleet
        .iter()
        .zip(schedules)
        .enumerate()
        .map(|(i, (vehicle, schedule))| {
            vehicle_status(
                schedule[time_index],
                vehicle.battery_capacity_wh,
                traces.get(i, time_index),
            )
        })
        .collect()
}

/// Per-vehicle charge level (Wh) over the horizon.
///
/// Each trace has `horizon + 1` entries. Index 0 starts at zero; index
/// `t + 1` is written by the controller step that processes index `t`.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeTraces {
    traces: Vec<Vec<f64>>,
}

impl ChargeTraces {
    /// Creates zero-filled traces for `vehicles` vehicles over `horizon` steps.
    pub fn new(vehicles: usize, horizon: usize) -> Self {
        Self {
            traces: vec![vec![0.0; horizon + 1]; vehicles],
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.traces.len()
    }

    /// Number of entries per trace (`horizon + 1`).
    pub fn len(&self) -> usize {
        self.traces.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Charge of vehicle `vehicle` at `time_index`, in Wh.
    pub fn get(&self, vehicle: usize, time_index: usize) -> f64 {
        self.traces[vehicle][time_index]
    }

    /// Writes the next-step charge of `vehicle`, clamped to `[0, capacity_wh]`.
    ///
    /// Returns the value actually written.
    pub fn set_next(&mut self, vehicle: usize, time_index: usize, charge_wh: f64, capacity_wh: f64) -> f64 {
        let clamped = charge_wh.clamp(0.0, capacity_wh.max(0.0));
        self.traces[vehicle][time_index + 1] = clamped;
        clamped
    }

    /// Copies every vehicle's charge at `time_index` into `time_index + 1`.
    pub fn carry_forward(&mut self, time_index: usize) {
        for trace in &mut self.traces {
            trace[time_index + 1] = trace[time_index];
        }
    }

    /// Full trace of one vehicle.
    pub fn trace(&self, vehicle: usize) -> &[f64] {
        &self.traces[vehicle]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.traces.iter().map(Vec::as_slice)
    }
}
