//! Core simulation types: timing configuration, step data, and controller contracts.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::power_balance::EnergyLedger;
use crate::devices::vehicle::HOURS_PER_DAY;
use crate::devices::{BatteryStorage, ChargeTraces, Vehicle, VehicleStatus};

/// Centralized simulation timing.
///
/// The horizon is a fixed number of equally spaced steps derived from the
/// start time, end time, and step size (all in minutes). All devices and the
/// engine reference this struct instead of recomputing `dt_hours`.
///
/// # Examples
///
/// ```
/// use ev_cosim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(0.0, 24.0 * 60.0, 60.0);
/// assert_eq!(cfg.dt_hours, 1.0);
/// assert_eq!(cfg.total_steps(), 24);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Simulation start time in minutes.
    pub start_min: f64,
    /// Simulation end time in minutes (exclusive).
    pub end_min: f64,
    /// Step size in minutes.
    pub delta_min: f64,
    /// Step size in hours, derived as `delta_min / 60`.
    pub dt_hours: f64,
    steps: usize,
}

impl SimConfig {
    /// Creates a new simulation timing configuration.
    ///
    /// # Panics
    ///
    /// Panics if `delta_min <= 0`, `end_min <= start_min`, or the window is
    /// shorter than one step.
    pub fn new(start_min: f64, end_min: f64, delta_min: f64) -> Self {
        assert!(delta_min > 0.0, "delta_min must be > 0");
        assert!(end_min > start_min, "end_min must be > start_min");
        let steps = ((end_min - start_min) / delta_min).floor() as usize;
        assert!(steps > 0, "simulation window must hold at least one step");

        Self {
            start_min,
            end_min,
            delta_min,
            dt_hours: delta_min / 60.0,
            steps,
        }
    }

    /// Total number of simulation steps.
    pub fn total_steps(&self) -> usize {
        self.steps
    }

    /// Simulation time in minutes at the start of step `t`.
    pub fn time_at(&self, t: usize) -> f64 {
        self.start_min + t as f64 * self.delta_min
    }

    /// Hour of day (0..=23) that step `t` starts in.
    pub fn hour_of_day(&self, t: usize) -> usize {
        let hours = (self.time_at(t) / 60.0).floor().max(0.0) as usize;
        hours % HOURS_PER_DAY
    }
}

/// Readings and external signals for one step, fed to the controller.
#[derive(Debug, Clone)]
pub struct StepInput<'a> {
    /// Current step index.
    pub time_index: usize,
    /// Charging eligibility of every vehicle at this step.
    pub statuses: &'a [VehicleStatus],
    /// Vehicle fleet (port power and capacity per vehicle).
    pub fleet: &'a [Vehicle],
    /// Solar production (W, >= 0).
    pub solar_w: f64,
    /// Wind production (W, >= 0).
    pub wind_w: f64,
    /// Market price (currency/Wh).
    pub price_per_wh: f64,
    /// Measured voltage at the controllable load (p.u.).
    pub voltage_pu: f64,
    /// Setpoint returned by the previous step (W).
    pub previous_setpoint_w: f64,
}

impl StepInput<'_> {
    /// Total renewable production (W).
    pub fn production_w(&self) -> f64 {
        self.solar_w + self.wind_w
    }
}

/// State the controller mutates in place for the duration of one call.
#[derive(Debug)]
pub struct StepState<'a> {
    pub storage: &'a mut BatteryStorage,
    /// Money balance; may go negative.
    pub budget: &'a mut f64,
    /// Charge traces; the controller writes index `time_index + 1`.
    pub traces: &'a mut ChargeTraces,
}

/// Power setpoint as handed back by a controller.
///
/// Controllers are expected to produce a single value. A multi-valued
/// signal is a contract violation that the engine flattens to its first
/// element instead of failing mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum SetpointSignal {
    Scalar(f64),
    Multi(Vec<f64>),
}

impl SetpointSignal {
    /// Reduces the signal to one setpoint in W.
    ///
    /// A `Multi` signal logs a warning and yields its first element (or
    /// `0.0` when empty).
    pub fn flatten(self, time_index: usize) -> f64 {
        match self {
            Self::Scalar(w) => w,
            Self::Multi(values) => {
                warn!(
                    time_index,
                    len = values.len(),
                    "controller returned a multi-valued setpoint; using the first element"
                );
                values.first().copied().unwrap_or(0.0)
            }
        }
    }
}

impl From<f64> for SetpointSignal {
    fn from(w: f64) -> Self {
        Self::Scalar(w)
    }
}

/// Which dispatch branch the controller took for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchRegime {
    /// Voltage outside the safety band; no charging this step.
    Disconnected,
    /// No vehicle charging, high price: all production sold.
    IdleSell,
    /// No vehicle charging, low price: production stored, overflow sold.
    IdleStore,
    /// No vehicle charging, mid price: no action.
    IdleHold,
    /// Production alone covers EV demand.
    Direct,
    /// Production plus storage covers EV demand.
    StorageAssisted,
    /// Production, storage, and grid import cover EV demand.
    GridAssisted,
    /// Demand exceeds all available power; charging curtailed.
    Curtailed,
}

impl DispatchRegime {
    /// All regimes in reporting order.
    pub const ALL: [Self; 8] = [
        Self::Disconnected,
        Self::IdleSell,
        Self::IdleStore,
        Self::IdleHold,
        Self::Direct,
        Self::StorageAssisted,
        Self::GridAssisted,
        Self::Curtailed,
    ];

    /// Short machine-friendly label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::IdleSell => "idle_sell",
            Self::IdleStore => "idle_store",
            Self::IdleHold => "idle_hold",
            Self::Direct => "direct",
            Self::StorageAssisted => "storage_assisted",
            Self::GridAssisted => "grid_assisted",
            Self::Curtailed => "curtailed",
        }
    }
}

impl fmt::Display for DispatchRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Controller decision for one step.
#[derive(Debug, Clone)]
pub struct StepDispatch {
    /// Power setpoint for the grid interconnection at the next step.
    pub setpoint: SetpointSignal,
    /// Branch taken.
    pub regime: DispatchRegime,
    /// Energy flows realized this step.
    pub ledger: EnergyLedger,
}

/// Complete record of one simulation step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step index.
    pub time_index: usize,
    /// Simulation time in minutes.
    pub time_min: f64,
    /// Voltage at the controllable load (p.u.).
    pub voltage_pu: f64,
    /// Solar production (W).
    pub solar_w: f64,
    /// Wind production (W).
    pub wind_w: f64,
    /// Market price (currency/Wh).
    pub price_per_wh: f64,
    /// Number of vehicles eligible to charge.
    pub vehicles_charging: usize,
    /// Branch taken by the controller.
    pub regime: DispatchRegime,
    /// Setpoint produced for the next step (W).
    pub setpoint_w: f64,
    /// Storage state of charge after the step (Wh).
    pub storage_soc_wh: f64,
    /// Budget after the step.
    pub budget: f64,
    /// Energy flows of the step.
    pub ledger: EnergyLedger,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} ({:>7.1}h) | V={:.3} pu | solar={:>8.1} W  wind={:>8.1} W  \
             price={:.6}/Wh | evs={} {:<16} | setpoint={:>8.1} W | \
             storage={:>8.1} Wh | budget={:>10.4}",
            self.time_index,
            self.time_min / 60.0,
            self.voltage_pu,
            self.solar_w,
            self.wind_w,
            self.price_per_wh,
            self.vehicles_charging,
            self.regime.label(),
            self.setpoint_w,
            self.storage_soc_wh,
            self.budget,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_basic() {
        let cfg = SimConfig::new(0.0, 1440.0, 60.0);
        assert_eq!(cfg.total_steps(), 24);
        assert_eq!(cfg.dt_hours, 1.0);
        assert_eq!(cfg.time_at(3), 180.0);
    }

    #[test]
    fn sim_config_partial_step_is_dropped() {
        let cfg = SimConfig::new(0.0, 150.0, 60.0);
        assert_eq!(cfg.total_steps(), 2);
    }

    #[test]
    fn sim_config_quarter_hour() {
        let cfg = SimConfig::new(0.0, 2.0 * 1440.0, 15.0);
        assert_eq!(cfg.total_steps(), 192);
        assert_eq!(cfg.dt_hours, 0.25);
        assert_eq!(cfg.hour_of_day(4), 1);
        assert_eq!(cfg.hour_of_day(96 + 5), 1);
    }

    #[test]
    fn hour_of_day_respects_start_offset() {
        let cfg = SimConfig::new(22.0 * 60.0, 30.0 * 60.0, 60.0);
        assert_eq!(cfg.hour_of_day(0), 22);
        assert_eq!(cfg.hour_of_day(2), 0);
    }

    #[test]
    #[should_panic]
    fn sim_config_zero_step_panics() {
        SimConfig::new(0.0, 60.0, 0.0);
    }

    #[test]
    #[should_panic]
    fn sim_config_non_increasing_window_panics() {
        SimConfig::new(60.0, 60.0, 15.0);
    }

    #[test]
    fn scalar_setpoint_passes_through() {
        assert_eq!(SetpointSignal::from(42.5).flatten(0), 42.5);
    }

    #[test]
    fn multi_setpoint_flattens_to_first_element() {
        assert_eq!(SetpointSignal::Multi(vec![10.0, 20.0]).flatten(3), 10.0);
        assert_eq!(SetpointSignal::Multi(Vec::new()).flatten(3), 0.0);
    }

    #[test]
    fn step_result_display_does_not_panic() {
        let r = StepResult {
            time_index: 0,
            time_min: 0.0,
            voltage_pu: 1.01,
            solar_w: 120.0,
            wind_w: 30.0,
            price_per_wh: 0.0002,
            vehicles_charging: 1,
            regime: DispatchRegime::Direct,
            setpoint_w: 50.0,
            storage_soc_wh: 95.0,
            budget: 10.0,
            ledger: EnergyLedger::default(),
        };
        let s = format!("{r}");
        assert!(s.contains("direct"));
    }
}
