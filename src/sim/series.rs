//! Authoritative time series of one run, exposed as plain ordered sequences.

use serde::Serialize;

use super::types::StepResult;
use crate::devices::ChargeTraces;

/// Everything a run records, step by step.
///
/// Per-step series have one entry per completed step. `setpoints_w` and
/// `budget` also hold their value before the first step at index 0, so
/// they are one longer; `setpoints_w[t]` is the setpoint the grid saw at
/// step `t`. Charge traces span the full horizon plus one from the start.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSeries {
    pub times_min: Vec<f64>,
    pub voltages_pu: Vec<f64>,
    pub solar_w: Vec<f64>,
    pub wind_w: Vec<f64>,
    pub price_per_wh: Vec<f64>,
    pub setpoints_w: Vec<f64>,
    pub storage_soc_wh: Vec<f64>,
    pub budget: Vec<f64>,
    pub vehicle_ids: Vec<String>,
    pub charge_traces: ChargeTraces,
}

impl SimulationSeries {
    /// Creates empty series for a horizon of `steps`.
    pub fn new(steps: usize, initial_budget: f64, vehicle_ids: Vec<String>) -> Self {
        let charge_traces = ChargeTraces::new(vehicle_ids.len(), steps);
        let mut setpoints_w = Vec::with_capacity(steps + 1);
        setpoints_w.push(0.0);
        let mut budget = Vec::with_capacity(steps + 1);
        budget.push(initial_budget);

        Self {
            times_min: Vec::with_capacity(steps),
            voltages_pu: Vec::with_capacity(steps),
            solar_w: Vec::with_capacity(steps),
            wind_w: Vec::with_capacity(steps),
            price_per_wh: Vec::with_capacity(steps),
            setpoints_w,
            storage_soc_wh: Vec::with_capacity(steps),
            budget,
            vehicle_ids,
            charge_traces,
        }
    }

    /// Number of steps recorded so far.
    pub fn len(&self) -> usize {
        self.times_min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_min.is_empty()
    }

    /// Setpoint the grid sees at the next step.
    pub fn last_setpoint_w(&self) -> f64 {
        self.setpoints_w.last().copied().unwrap_or(0.0)
    }

    /// Appends one completed step.
    pub fn record(&mut self, step: &StepResult) {
        self.times_min.push(step.time_min);
        self.voltages_pu.push(step.voltage_pu);
        self.solar_w.push(step.solar_w);
        self.wind_w.push(step.wind_w);
        self.price_per_wh.push(step.price_per_wh);
        self.setpoints_w.push(step.setpoint_w);
        self.storage_soc_wh.push(step.storage_soc_wh);
        self.budget.push(step.budget);
    }
}
