//! Simulation engine that steps collaborators, vehicle states, and the controller.

use tracing::{debug, info};

use crate::devices::{BatteryStorage, Presence, Vehicle, VehicleStatus, derive_statuses};
use crate::error::{ModelError, SimError};
use crate::models::{GridModel, PriceModel, ProductionModel};

use super::clock::SimClock;
use super::controller::Controller;
use super::series::SimulationSeries;
use super::types::{SimConfig, StepInput, StepResult, StepState};

/// External models queried once per step.
pub struct Collaborators {
    pub grid: Box<dyn GridModel>,
    pub solar: Box<dyn ProductionModel>,
    pub wind: Box<dyn ProductionModel>,
    pub price: Box<dyn PriceModel>,
}

/// Simulation engine owning the storage, budget, fleet, and result series.
///
/// Generic over `C: Controller` for static dispatch. Steps run strictly in
/// order: the controller writes charge index `t + 1` and mutates storage,
/// both of which step `t + 1` reads. The grid always sees the setpoint the
/// controller produced one step earlier.
pub struct Engine<C: Controller> {
    config: SimConfig,
    controller: C,
    models: Collaborators,
    fleet: Vec<Vehicle>,
    schedules: Vec<Vec<Presence>>,
    storage: BatteryStorage,
    budget: f64,
    clock: SimClock,
    series: SimulationSeries,
}

fn model_failure(step: usize, model: &'static str) -> impl FnOnce(ModelError) -> SimError {
    move |source| SimError::Model {
        step,
        model,
        source,
    }
}

impl<C: Controller> Engine<C> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation timing
    /// * `controller` - Dispatch controller
    /// * `models` - Grid, renewable, and price collaborators
    /// * `fleet` - Vehicles; their presence schedules are tiled here
    /// * `storage` - Stationary battery, owned by the run
    /// * `initial_budget` - Money balance before the first step
    pub fn new(
        config: SimConfig,
        controller: C,
        models: Collaborators,
        fleet: Vec<Vehicle>,
        storage: BatteryStorage,
        initial_budget: f64,
    ) -> Self {
        let schedules = fleet.iter().map(|v| v.presence_schedule(&config)).collect();
        let ids = fleet.iter().map(|v| v.id.clone()).collect();
        let series = SimulationSeries::new(config.total_steps(), initial_budget, ids);
        let clock = SimClock::new(&config);

        Self {
            config,
            controller,
            models,
            fleet,
            schedules,
            storage,
            budget: initial_budget,
            clock,
            series,
        }
    }

    /// Executes the next step, or returns `Ok(None)` once the horizon is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Model`] naming the step and collaborator if any
    /// model lookup fails. The run cannot continue after an error.
    pub fn step_next(&mut self) -> Result<Option<StepResult>, SimError> {
        let Some(tick) = self.clock.tick() else {
            return Ok(None);
        };
        let t = tick.index;

        // 1. Grid sees the previous step's setpoint
        let previous_setpoint_w = self.series.last_setpoint_w();
        let voltages = self
            .models
            .grid
            .voltages(previous_setpoint_w, t)
            .map_err(model_failure(t, "grid"))?;

        // 2. Renewables and price for this step
        let solar_w = self.models.solar.power_w(t).map_err(model_failure(t, "solar"))?;
        let wind_w = self.models.wind.power_w(t).map_err(model_failure(t, "wind"))?;
        let price_per_wh = self
            .models
            .price
            .price_per_wh(t)
            .map_err(model_failure(t, "price"))?;
        debug!(
            t,
            solar_w,
            wind_w,
            price_per_wh,
            voltage_pu = voltages.smart_consumer,
            grid_min_pu = voltages.min_pu(),
            "collaborators queried"
        );

        // 3. Vehicle statuses from the charge written by the previous step
        let statuses = derive_statuses(t, &self.schedules, &self.fleet, &self.series.charge_traces);

        // 4. Controller
        let input = StepInput {
            time_index: t,
            statuses: &statuses,
            fleet: &self.fleet,
            solar_w,
            wind_w,
            price_per_wh,
            voltage_pu: voltages.smart_consumer,
            previous_setpoint_w,
        };
        let mut state = StepState {
            storage: &mut self.storage,
            budget: &mut self.budget,
            traces: &mut self.series.charge_traces,
        };
        let dispatch = self.controller.dispatch(&input, &mut state);

        // 5. Record
        let result = StepResult {
            time_index: t,
            time_min: tick.time_min,
            voltage_pu: voltages.smart_consumer,
            solar_w,
            wind_w,
            price_per_wh,
            vehicles_charging: statuses
                .iter()
                .filter(|s| **s == VehicleStatus::CanCharge)
                .count(),
            regime: dispatch.regime,
            setpoint_w: dispatch.setpoint.flatten(t),
            storage_soc_wh: self.storage.get_soc(),
            budget: self.budget,
            ledger: dispatch.ledger,
        };
        self.series.record(&result);

        Ok(Some(result))
    }

    /// Executes every remaining step and returns their records.
    pub fn run(&mut self) -> Result<Vec<StepResult>, SimError> {
        info!(
            steps = self.clock.remaining(),
            vehicles = self.fleet.len(),
            "simulation started"
        );
        let mut results = Vec::with_capacity(self.clock.remaining());
        while let Some(result) = self.step_next()? {
            results.push(result);
        }
        info!(
            steps = results.len(),
            final_budget = self.budget,
            storage_soc_wh = self.storage.get_soc(),
            "simulation finished"
        );
        Ok(results)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn fleet(&self) -> &[Vehicle] {
        &self.fleet
    }

    /// Returns a reference to the storage (for KPI capacity queries).
    pub fn storage(&self) -> &BatteryStorage {
        &self.storage
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn series(&self) -> &SimulationSeries {
        &self.series
    }

    pub fn into_series(self) -> SimulationSeries {
        self.series
    }
}
