//! Builds collaborators and the engine from a scenario and runs it.

use tracing::info;

use crate::config::{ConfigError, CsvSource, ScenarioConfig};
use crate::devices::BatteryStorage;
use crate::error::SimError;
use crate::models::grid::{FeederParams, LoadShape};
use crate::models::solar::SolarParams;
use crate::models::wind::WindParams;
use crate::models::{
    FeederLine, GridModel, PriceModel, ProductionModel, Profile, RadialFeeder, SolarArray,
    TimeOfUseTariff, TurbineGroup, WindFarm,
};
use crate::sim::controller::DispatchController;
use crate::sim::engine::{Collaborators, Engine};
use crate::sim::kpi::RunSummary;
use crate::sim::series::SimulationSeries;
use crate::sim::types::{SimConfig, StepResult};

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub results: Vec<StepResult>,
    pub series: SimulationSeries,
    pub summary: RunSummary,
}

/// Validates `config` and assembles a ready-to-run engine.
///
/// # Errors
///
/// Returns [`SimError::InvalidConfig`] listing every violated constraint,
/// or an I/O, CSV, or data error if an input file is unusable.
pub fn build_engine(config: &ScenarioConfig) -> Result<Engine<DispatchController>, SimError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(SimError::InvalidConfig(errors));
    }

    let sim = config.sim_config();
    let seed = config.simulation.seed;
    let fleet = config.fleet().map_err(|e| SimError::InvalidConfig(vec![e]))?;

    let models = Collaborators {
        grid: build_grid(config, &sim, seed.wrapping_add(4))?,
        solar: build_solar(config, &sim, seed.wrapping_add(1))?,
        wind: build_wind(config, &sim, seed.wrapping_add(2))?,
        price: build_price(config, &sim, seed.wrapping_add(3))?,
    };

    let sys = &config.system;
    let storage = BatteryStorage::new(
        sys.storage_capacity_wh,
        sys.charge_efficiency,
        sys.discharge_efficiency,
        sys.initial_soc_wh,
    );
    let controller =
        DispatchController::new(config.controller_settings(), sys.grid_capacity_w, sim.dt_hours);

    info!(
        steps = sim.total_steps(),
        delta_min = sim.delta_min,
        vehicles = fleet.len(),
        seed,
        "scenario built"
    );
    Ok(Engine::new(sim, controller, models, fleet, storage, sys.initial_budget))
}

/// Builds and runs `config` to completion.
///
/// # Errors
///
/// Returns any construction error from [`build_engine`], or the first
/// collaborator failure during the run.
pub fn run_scenario(config: &ScenarioConfig) -> Result<SimulationReport, SimError> {
    let mut engine = build_engine(config)?;
    let results = engine.run()?;
    let summary = RunSummary::from_results(&results, config.system.initial_budget);
    Ok(SimulationReport {
        results,
        series: engine.into_series(),
        summary,
    })
}

/// Loads a CSV profile and checks it covers the whole horizon.
fn load_profile(csv: &CsvSource, sim: &SimConfig) -> Result<Profile, SimError> {
    let profile = Profile::from_csv(&csv.path, &csv.column, csv.scale)?;
    if profile.len() < sim.total_steps() {
        return Err(SimError::data(
            &csv.path,
            format!(
                "column \"{}\" has {} rows but the run needs {}",
                csv.column,
                profile.len(),
                sim.total_steps()
            ),
        ));
    }
    Ok(profile)
}

fn build_solar(
    config: &ScenarioConfig,
    sim: &SimConfig,
    seed: u64,
) -> Result<Box<dyn ProductionModel>, SimError> {
    let s = &config.solar;
    if let Some(csv) = &s.csv {
        return Ok(Box::new(load_profile(csv, sim)?));
    }
    let params = SolarParams {
        panel_peak_w: s.panel_peak_w,
        panels: s.panels,
        sunrise_hour: s.sunrise_hour,
        sunset_hour: s.sunset_hour,
        cloud_alpha: s.cloud_alpha,
        cloud_noise_std: s.cloud_noise_std,
    };
    Ok(Box::new(SolarArray::new(params, sim, seed)))
}

fn build_wind(
    config: &ScenarioConfig,
    sim: &SimConfig,
    seed: u64,
) -> Result<Box<dyn ProductionModel>, SimError> {
    let w = &config.wind;
    if let Some(csv) = &w.csv {
        return Ok(Box::new(load_profile(csv, sim)?));
    }
    let params = WindParams {
        mean_speed_ms: w.mean_speed_ms,
        alpha: w.alpha,
        noise_std: w.noise_std,
    };
    let turbines = w
        .turbines
        .iter()
        .map(|t| TurbineGroup {
            hub_height_m: t.hub_height_m,
            nominal_power_w: t.nominal_power_w,
            count: t.count,
        })
        .collect();
    Ok(Box::new(WindFarm::new(&params, turbines, sim, seed)))
}

fn build_price(
    config: &ScenarioConfig,
    sim: &SimConfig,
    seed: u64,
) -> Result<Box<dyn PriceModel>, SimError> {
    let p = &config.price;
    if let Some(csv) = &p.csv {
        return Ok(Box::new(load_profile(csv, sim)?));
    }
    Ok(Box::new(TimeOfUseTariff::new(
        p.offpeak,
        p.base,
        p.peak,
        p.noise_std,
        sim,
        seed,
    )))
}

fn build_grid(
    config: &ScenarioConfig,
    sim: &SimConfig,
    seed: u64,
) -> Result<Box<dyn GridModel>, SimError> {
    let g = &config.grid;
    let lines = match &g.topology_csv {
        Some(path) => FeederLine::from_csv(path)?,
        None => FeederLine::chain(g.nodes, g.line_r_ohm, g.line_x_ohm),
    };
    let smart_node = g.smart_node.unwrap_or_else(|| {
        lines
            .iter()
            .flat_map(|l| [l.from, l.to])
            .max()
            .unwrap_or(g.slack_node)
    });

    let params = FeederParams {
        nominal_voltage_v: g.nominal_voltage_v,
        power_factor: g.power_factor,
        slack_node: g.slack_node,
        smart_node,
    };
    let shape = LoadShape {
        base_w: g.consumer_base_w,
        amplitude_w: g.consumer_amplitude_w,
        peak_hour: g.consumer_peak_hour,
        noise_std_w: g.consumer_noise_std_w,
    };
    let feeder = RadialFeeder::new(&lines, &params, &shape, sim, seed)
        .map_err(|e| SimError::InvalidConfig(vec![ConfigError::new("grid", e.to_string())]))?;
    Ok(Box::new(feeder))
}
