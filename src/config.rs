//! TOML-based scenario configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::devices::{HourOfDay, Vehicle};
use crate::sim::controller::ControllerSettings;
use crate::sim::types::SimConfig;

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation window and master seed.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Voltage and price thresholds of the dispatch controller.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Storage, grid connection, and money.
    #[serde(default)]
    pub system: SystemConfig,
    /// EV fleet.
    #[serde(default = "default_fleet")]
    pub vehicles: Vec<VehicleConfig>,
    #[serde(default)]
    pub solar: SolarConfig,
    #[serde(default)]
    pub wind: WindConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

/// Simulation window, in minutes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Start time (min).
    pub start_time: f64,
    /// End time (min, exclusive).
    pub end_time: f64,
    /// Step size (min, must be > 0).
    pub delta_t: f64,
    /// Master random seed; each model derives its own from it.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 7.0 * 24.0 * 60.0,
            delta_t: 60.0,
            seed: 42,
        }
    }
}

/// Dispatch controller thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Lower voltage bound (p.u.).
    pub voltage_min: f64,
    /// Upper voltage bound (p.u.).
    pub voltage_max: f64,
    /// Setpoint correction per out-of-band step (W).
    pub voltage_adjust_step_w: f64,
    /// Sell idle production above this price (currency/Wh).
    pub price_high: f64,
    /// Store idle production below this price (currency/Wh).
    pub price_low: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            voltage_min: 0.95,
            voltage_max: 1.05,
            voltage_adjust_step_w: 500.0,
            price_high: 3.0e-4,
            price_low: 1.5e-4,
        }
    }
}

/// Storage, grid connection, and initial money.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    /// Storage capacity (Wh).
    pub storage_capacity_wh: f64,
    /// Storage charge efficiency (0, 1].
    pub charge_efficiency: f64,
    /// Storage discharge efficiency (0, 1].
    pub discharge_efficiency: f64,
    /// Initial stored energy (Wh).
    pub initial_soc_wh: f64,
    /// Maximum grid import (W).
    pub grid_capacity_w: f64,
    /// Money balance at the start of the run.
    pub initial_budget: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            storage_capacity_wh: 20_000.0,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.95,
            initial_soc_wh: 0.0,
            grid_capacity_w: 11_000.0,
            initial_budget: 100.0,
        }
    }
}

/// A time of day given either as an integer hour or an `"HH:MM"` string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeOfDay {
    Hour(i64),
    Clock(String),
}

impl TimeOfDay {
    /// Normalizes to an hour of day, truncating minutes.
    pub fn to_hour(&self) -> Result<HourOfDay, String> {
        match self {
            Self::Hour(h) => HourOfDay::try_from(*h),
            Self::Clock(s) => s.parse(),
        }
    }
}

impl From<i64> for TimeOfDay {
    fn from(h: i64) -> Self {
        Self::Hour(h)
    }
}

impl From<&str> for TimeOfDay {
    fn from(s: &str) -> Self {
        Self::Clock(s.to_string())
    }
}

/// One vehicle of the fleet.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleConfig {
    pub id: String,
    /// Battery capacity (Wh).
    pub battery_capacity_wh: f64,
    /// Charging port power (W).
    pub charging_port_w: f64,
    /// Time the vehicle arrives home.
    pub arrival: TimeOfDay,
    /// Time the vehicle leaves.
    pub departure: TimeOfDay,
}

impl VehicleConfig {
    fn new(id: &str, capacity_wh: f64, port_w: f64, arrival: TimeOfDay, departure: TimeOfDay) -> Self {
        Self {
            id: id.to_string(),
            battery_capacity_wh: capacity_wh,
            charging_port_w: port_w,
            arrival,
            departure,
        }
    }
}

fn default_fleet() -> Vec<VehicleConfig> {
    vec![
        VehicleConfig::new("ev_1", 40_000.0, 7_400.0, "18:00".into(), "07:30".into()),
        VehicleConfig::new("ev_2", 60_000.0, 11_000.0, "19:15".into(), "08:00".into()),
        VehicleConfig::new("ev_3", 25_000.0, 3_700.0, 9.into(), 17.into()),
    ]
}

/// A numeric column of a CSV file used in place of a synthetic model.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvSource {
    pub path: PathBuf,
    pub column: String,
    /// Multiplier applied to every value (e.g. `1e-6` for currency/MWh).
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

/// Solar array parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    /// Peak output per panel (W).
    pub panel_peak_w: f64,
    pub panels: u32,
    /// Sunrise (fractional hour of day).
    pub sunrise_hour: f64,
    /// Sunset (fractional hour of day).
    pub sunset_hour: f64,
    /// AR(1) correlation of the cloud multiplier (0.0-1.0).
    pub cloud_alpha: f64,
    /// AR(1) innovation standard deviation.
    pub cloud_noise_std: f64,
    /// Read production (W) from a file instead.
    pub csv: Option<CsvSource>,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            panel_peak_w: 300.0,
            panels: 20,
            sunrise_hour: 6.0,
            sunset_hour: 20.0,
            cloud_alpha: 0.9,
            cloud_noise_std: 0.2,
            csv: None,
        }
    }
}

/// A group of identical turbines.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurbineConfig {
    pub hub_height_m: f64,
    pub nominal_power_w: f64,
    pub count: u32,
}

/// Wind farm parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindConfig {
    /// Mean wind speed at 10 m (m/s).
    pub mean_speed_ms: f64,
    /// AR(1) correlation of the wind speed.
    pub alpha: f64,
    /// Wind speed innovation standard deviation (m/s).
    pub noise_std: f64,
    pub turbines: Vec<TurbineConfig>,
    /// Read production (W) from a file instead.
    pub csv: Option<CsvSource>,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            mean_speed_ms: 6.0,
            alpha: 0.85,
            noise_std: 1.2,
            turbines: vec![TurbineConfig {
                hub_height_m: 30.0,
                nominal_power_w: 5_500.0,
                count: 1,
            }],
            csv: None,
        }
    }
}

/// Market price parameters, in currency/Wh.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriceConfig {
    pub offpeak: f64,
    pub base: f64,
    pub peak: f64,
    /// Relative standard deviation of the per-step noise.
    pub noise_std: f64,
    /// Read prices from a file instead.
    pub csv: Option<CsvSource>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            offpeak: 1.0e-4,
            base: 2.0e-4,
            peak: 3.5e-4,
            noise_std: 0.1,
            csv: None,
        }
    }
}

/// Distribution feeder parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Nodes of the generated chain (ignored with `topology_csv`).
    pub nodes: u32,
    /// Resistance per chain segment (ohm).
    pub line_r_ohm: f64,
    /// Reactance per chain segment (ohm).
    pub line_x_ohm: f64,
    /// Topology file with `FROM,TO,Raa,Xaa` columns.
    pub topology_csv: Option<PathBuf>,
    /// Nominal voltage (V).
    pub nominal_voltage_v: f64,
    /// Load power factor (0, 1].
    pub power_factor: f64,
    pub slack_node: u32,
    /// Node of the controllable load; defaults to the highest node id.
    pub smart_node: Option<u32>,
    /// Passive consumer mean load (W).
    pub consumer_base_w: f64,
    /// Passive consumer daily swing (W).
    pub consumer_amplitude_w: f64,
    /// Hour of the passive consumer peak.
    pub consumer_peak_hour: f64,
    /// Passive consumer noise standard deviation (W).
    pub consumer_noise_std_w: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            line_r_ohm: 0.015,
            line_x_ohm: 0.006,
            topology_csv: None,
            nominal_voltage_v: 400.0,
            power_factor: 0.95,
            slack_node: 1,
            smart_node: None,
            consumer_base_w: 600.0,
            consumer_amplitude_w: 400.0,
            consumer_peak_hour: 19.0,
            consumer_noise_std_w: 50.0,
        }
    }
}

/// A violated configuration constraint.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.delta_t"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: small rooftop PV, one turbine, three vehicles.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            controller: ControllerConfig::default(),
            system: SystemConfig::default(),
            vehicles: default_fleet(),
            solar: SolarConfig::default(),
            wind: WindConfig::default(),
            price: PriceConfig::default(),
            grid: GridConfig::default(),
        }
    }

    /// Returns the high-renewables preset: large PV array, a wind cluster, big storage.
    pub fn high_renewables() -> Self {
        Self {
            system: SystemConfig {
                storage_capacity_wh: 60_000.0,
                initial_soc_wh: 10_000.0,
                ..SystemConfig::default()
            },
            solar: SolarConfig {
                panels: 60,
                sunrise_hour: 5.5,
                sunset_hour: 20.5,
                cloud_noise_std: 0.25,
                ..SolarConfig::default()
            },
            wind: WindConfig {
                mean_speed_ms: 7.5,
                turbines: vec![
                    TurbineConfig {
                        hub_height_m: 30.0,
                        nominal_power_w: 5_500.0,
                        count: 3,
                    },
                    TurbineConfig {
                        hub_height_m: 50.0,
                        nominal_power_w: 10_000.0,
                        count: 1,
                    },
                ],
                ..WindConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns the weak-grid preset: long resistive feeder, small import limit,
    /// a larger fleet that often overlaps.
    pub fn weak_grid() -> Self {
        let mut vehicles = default_fleet();
        vehicles.push(VehicleConfig::new(
            "ev_4",
            50_000.0,
            11_000.0,
            "17:30".into(),
            "06:45".into(),
        ));
        vehicles.push(VehicleConfig::new("ev_5", 30_000.0, 7_400.0, 20.into(), 20.into()));

        Self {
            system: SystemConfig {
                storage_capacity_wh: 5_000.0,
                grid_capacity_w: 6_000.0,
                ..SystemConfig::default()
            },
            vehicles,
            grid: GridConfig {
                nodes: 12,
                line_r_ohm: 0.02,
                line_x_ohm: 0.008,
                consumer_base_w: 700.0,
                ..GridConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "high_renewables", "weak_grid"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "high_renewables" => Ok(Self::high_renewables()),
            "weak_grid" => Ok(Self::weak_grid()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// Relative CSV paths inside the file are resolved against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            cfg.resolve_paths(dir);
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        for csv in [&mut self.solar.csv, &mut self.wind.csv, &mut self.price.csv]
            .into_iter()
            .flatten()
        {
            resolve(&mut csv.path);
        }
        if let Some(p) = self.grid.topology_csv.as_mut() {
            resolve(p);
        }
    }

    /// Number of steps the scenario's window holds.
    pub fn horizon(&self) -> usize {
        let s = &self.simulation;
        if s.delta_t > 0.0 && s.end_time > s.start_time {
            ((s.end_time - s.start_time) / s.delta_t).floor() as usize
        } else {
            0
        }
    }

    /// Timing for the engine. Call [`validate`](Self::validate) first.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.start_time, s.end_time, s.delta_t)
    }

    /// Controller thresholds. Call [`validate`](Self::validate) first.
    pub fn controller_settings(&self) -> ControllerSettings {
        let c = &self.controller;
        ControllerSettings::new(
            c.voltage_min,
            c.voltage_max,
            c.voltage_adjust_step_w,
            c.price_high,
            c.price_low,
        )
    }

    /// Builds the fleet, normalizing arrival and departure times.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for the first time that cannot be parsed.
    pub fn fleet(&self) -> Result<Vec<Vehicle>, ConfigError> {
        self.vehicles
            .iter()
            .enumerate()
            .map(|(i, v)| -> Result<Vehicle, ConfigError> {
                let hour = |t: &TimeOfDay, name: &str| {
                    t.to_hour()
                        .map_err(|e| ConfigError::new(format!("vehicles[{i}].{name}"), e))
                };
                Ok(Vehicle::new(
                    v.id.clone(),
                    v.battery_capacity_wh,
                    v.charging_port_w,
                    hour(&v.arrival, "arrival")?,
                    hour(&v.departure, "departure")?,
                ))
            })
            .collect()
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(s.delta_t > 0.0, "simulation.delta_t", "must be > 0");
        check(
            s.end_time > s.start_time,
            "simulation.end_time",
            "must be > simulation.start_time",
        );
        check(s.start_time >= 0.0, "simulation.start_time", "must be >= 0");
        if s.delta_t > 0.0 && s.end_time > s.start_time {
            check(
                self.horizon() > 0,
                "simulation.delta_t",
                "window must hold at least one step",
            );
        }

        let c = &self.controller;
        check(
            c.voltage_min < c.voltage_max,
            "controller.voltage_min",
            "must be < controller.voltage_max",
        );
        check(
            c.voltage_adjust_step_w >= 0.0,
            "controller.voltage_adjust_step_w",
            "must be >= 0",
        );
        check(
            c.price_low <= c.price_high,
            "controller.price_low",
            "must be <= controller.price_high",
        );

        let sys = &self.system;
        let efficiency = |e: f64| e > 0.0 && e <= 1.0;
        check(sys.storage_capacity_wh >= 0.0, "system.storage_capacity_wh", "must be >= 0");
        check(efficiency(sys.charge_efficiency), "system.charge_efficiency", "must be in (0, 1]");
        check(
            efficiency(sys.discharge_efficiency),
            "system.discharge_efficiency",
            "must be in (0, 1]",
        );
        check(
            (0.0..=sys.storage_capacity_wh.max(0.0)).contains(&sys.initial_soc_wh),
            "system.initial_soc_wh",
            "must be in [0, system.storage_capacity_wh]",
        );
        check(sys.grid_capacity_w >= 0.0, "system.grid_capacity_w", "must be >= 0");
        check(sys.initial_budget.is_finite(), "system.initial_budget", "must be finite");

        let mut ids = HashSet::new();
        for (i, v) in self.vehicles.iter().enumerate() {
            let field = |name: &str| format!("vehicles[{i}].{name}");
            check(!v.id.is_empty(), &field("id"), "must not be empty");
            check(ids.insert(v.id.as_str()), &field("id"), "duplicate vehicle id");
            check(v.battery_capacity_wh >= 0.0, &field("battery_capacity_wh"), "must be >= 0");
            check(v.charging_port_w >= 0.0, &field("charging_port_w"), "must be >= 0");
            for (name, time) in [("arrival", &v.arrival), ("departure", &v.departure)] {
                if let Err(e) = time.to_hour() {
                    check(false, &field(name), &e);
                }
            }
        }

        let sol = &self.solar;
        if sol.csv.is_none() {
            check(sol.panel_peak_w >= 0.0, "solar.panel_peak_w", "must be >= 0");
            check(
                (0.0..=24.0).contains(&sol.sunrise_hour)
                    && (0.0..=24.0).contains(&sol.sunset_hour)
                    && sol.sunrise_hour < sol.sunset_hour,
                "solar.sunrise_hour",
                "must be < solar.sunset_hour, both within [0, 24]",
            );
            check((0.0..=1.0).contains(&sol.cloud_alpha), "solar.cloud_alpha", "must be in [0, 1]");
            check(sol.cloud_noise_std >= 0.0, "solar.cloud_noise_std", "must be >= 0");
        }

        let w = &self.wind;
        if w.csv.is_none() {
            check(w.mean_speed_ms >= 0.0, "wind.mean_speed_ms", "must be >= 0");
            check((0.0..=1.0).contains(&w.alpha), "wind.alpha", "must be in [0, 1]");
            check(w.noise_std >= 0.0, "wind.noise_std", "must be >= 0");
            for (i, t) in w.turbines.iter().enumerate() {
                check(
                    t.hub_height_m > 0.15,
                    &format!("wind.turbines[{i}].hub_height_m"),
                    "must be above the 0.15 m roughness length",
                );
                check(
                    t.nominal_power_w >= 0.0,
                    &format!("wind.turbines[{i}].nominal_power_w"),
                    "must be >= 0",
                );
            }
        }

        let p = &self.price;
        if p.csv.is_none() {
            check(
                p.offpeak >= 0.0 && p.base >= 0.0 && p.peak >= 0.0,
                "price",
                "band prices must be >= 0",
            );
            check(p.noise_std >= 0.0, "price.noise_std", "must be >= 0");
        }

        for (section, csv) in [("solar", &sol.csv), ("wind", &w.csv), ("price", &p.csv)] {
            if let Some(csv) = csv {
                check(!csv.column.is_empty(), &format!("{section}.csv.column"), "must not be empty");
                check(csv.scale.is_finite(), &format!("{section}.csv.scale"), "must be finite");
            }
        }

        let g = &self.grid;
        check(g.nominal_voltage_v > 0.0, "grid.nominal_voltage_v", "must be > 0");
        check(efficiency(g.power_factor), "grid.power_factor", "must be in (0, 1]");
        check(g.line_r_ohm >= 0.0, "grid.line_r_ohm", "must be >= 0");
        check(g.line_x_ohm >= 0.0, "grid.line_x_ohm", "must be >= 0");
        check(g.consumer_base_w >= 0.0, "grid.consumer_base_w", "must be >= 0");
        check(g.consumer_noise_std_w >= 0.0, "grid.consumer_noise_std_w", "must be >= 0");
        if g.topology_csv.is_none() {
            check(g.nodes >= 2, "grid.nodes", "must be >= 2");
            check(
                (1..=g.nodes).contains(&g.slack_node),
                "grid.slack_node",
                "must be a node of the chain",
            );
            if let Some(smart) = g.smart_node {
                check(
                    (1..=g.nodes).contains(&smart),
                    "grid.smart_node",
                    "must be a node of the chain",
                );
            }
        }
        if let Some(smart) = g.smart_node {
            check(smart != g.slack_node, "grid.smart_node", "must differ from grid.slack_node");
        }

        errors
    }
}
