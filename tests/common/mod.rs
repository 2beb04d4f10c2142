//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use ev_cosim::config::ScenarioConfig;
use ev_cosim::devices::{BatteryStorage, HourOfDay, Vehicle};
use ev_cosim::error::ModelError;
use ev_cosim::models::{GridModel, GridVoltages, Profile};
use ev_cosim::runner::{SimulationReport, run_scenario};
use ev_cosim::sim::controller::{ControllerSettings, DispatchController};
use ev_cosim::sim::engine::{Collaborators, Engine};
use ev_cosim::sim::types::SimConfig;

/// Energy tolerance used by the per-step balance checks (Wh).
pub const EPS_WH: f64 = 1e-3;

/// Baseline preset shortened to `days` days.
pub fn baseline_days(days: u32) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.end_time = f64::from(days) * 24.0 * 60.0;
    cfg
}

/// Runs a config that is expected to succeed.
pub fn run(cfg: &ScenarioConfig) -> SimulationReport {
    run_scenario(cfg).unwrap_or_else(|e| panic!("scenario should run: {e}"))
}

pub fn hour(h: i64) -> HourOfDay {
    HourOfDay::try_from(h).unwrap()
}

/// Grid whose smart-consumer voltage follows a fixed per-step series,
/// ignoring the setpoint.
pub struct ScriptedGrid {
    pub voltages_pu: Vec<f64>,
}

impl GridModel for ScriptedGrid {
    fn voltages(&mut self, _setpoint_w: f64, t: usize) -> Result<GridVoltages, ModelError> {
        let smart_consumer = *self.voltages_pu.get(t).ok_or(ModelError::OutOfRange {
            index: t,
            len: self.voltages_pu.len(),
        })?;
        Ok(GridVoltages {
            consumers: BTreeMap::new(),
            smart_consumer,
        })
    }
}

/// Hourly engine over `voltages_pu.len()` steps with flat production and price,
/// one 1 kWh storage, and a 1 kW grid connection.
pub fn scripted_engine(
    voltages_pu: Vec<f64>,
    production_w: f64,
    price_per_wh: f64,
    fleet: Vec<Vehicle>,
) -> Engine<DispatchController> {
    let steps = voltages_pu.len();
    let config = SimConfig::new(0.0, steps as f64 * 60.0, 60.0);
    let settings = ControllerSettings::new(0.95, 1.05, 100.0, 0.3, 0.1);
    let controller = DispatchController::new(settings, 1000.0, config.dt_hours);
    let models = Collaborators {
        grid: Box::new(ScriptedGrid { voltages_pu }),
        solar: Box::new(Profile::new(vec![production_w; steps])),
        wind: Box::new(Profile::new(vec![0.0; steps])),
        price: Box::new(Profile::new(vec![price_per_wh; steps])),
    };
    let storage = BatteryStorage::new(1000.0, 0.9, 0.9, 0.0);
    Engine::new(config, controller, models, fleet, storage, 10.0)
}

/// Scratch path under the system temp dir, unique per test name.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ev_cosim_it_{}_{name}", std::process::id()))
}
