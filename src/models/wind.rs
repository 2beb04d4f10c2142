use rand::{SeedableRng, rngs::StdRng};

use super::ProductionModel;
use super::profile::{Ar1, Profile};
use crate::error::ModelError;
use crate::sim::types::SimConfig;

/// Height of the reference wind speed measurement (m).
const REFERENCE_HEIGHT_M: f64 = 10.0;
/// Surface roughness length used for the logarithmic wind profile (m).
const ROUGHNESS_LENGTH_M: f64 = 0.15;
const CUT_IN_MS: f64 = 3.0;
const CUT_OUT_MS: f64 = 25.0;

/// Power curve of the reference turbine as (wind speed m/s, fraction of nominal).
///
/// The reference turbine peaks at 5.5 kW; every point is normalized to that.
const POWER_CURVE: [(f64, f64); 8] = [
    (CUT_IN_MS, 0.0),
    (7.0, 1000.0 / 5500.0),
    (8.5, 2000.0 / 5500.0),
    (9.0, 2100.0 / 5500.0),
    (11.5, 5000.0 / 5500.0),
    (12.0, 1.0),
    (15.0, 5000.0 / 5500.0),
    (CUT_OUT_MS, 5000.0 / 5500.0),
];

/// A group of identical turbines.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbineGroup {
    pub hub_height_m: f64,
    pub nominal_power_w: f64,
    pub count: u32,
}

/// Wind climate driving the farm.
#[derive(Debug, Clone, PartialEq)]
pub struct WindParams {
    /// Long-run mean wind speed at 10 m (m/s).
    pub mean_speed_ms: f64,
    /// AR(1) persistence of the wind speed.
    pub alpha: f64,
    /// Standard deviation of the wind speed innovation (m/s).
    pub noise_std: f64,
}

/// Wind farm whose output follows an AR(1) wind speed through a turbine power curve.
#[derive(Debug, Clone)]
pub struct WindFarm {
    turbines: Vec<TurbineGroup>,
    speeds_ms: Vec<f64>,
    profile: Profile,
}

impl WindFarm {
    /// Simulates the reference wind speed over `config`'s horizon and
    /// converts it to farm output.
    ///
    /// # Panics
    ///
    /// Panics if any turbine group has a hub height at or below the roughness
    /// length or a negative nominal power.
    pub fn new(params: &WindParams, turbines: Vec<TurbineGroup>, config: &SimConfig, seed: u64) -> Self {
        for group in &turbines {
            assert!(group.hub_height_m > ROUGHNESS_LENGTH_M, "hub_height_m too low");
            assert!(group.nominal_power_w >= 0.0, "nominal_power_w must be >= 0");
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut speed = Ar1::new(
            params.mean_speed_ms.max(0.0),
            params.alpha,
            params.noise_std,
            0.0,
            40.0,
        );
        let speeds_ms: Vec<f64> = (0..config.total_steps())
            .map(|_| speed.next(&mut rng))
            .collect();
        let values = speeds_ms
            .iter()
            .map(|&v10| farm_output_w(&turbines, v10))
            .collect();

        Self {
            turbines,
            speeds_ms,
            profile: Profile::new(values),
        }
    }

    pub fn turbines(&self) -> &[TurbineGroup] {
        &self.turbines
    }

    /// Reference (10 m) wind speed per step.
    pub fn speeds_ms(&self) -> &[f64] {
        &self.speeds_ms
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

impl ProductionModel for WindFarm {
    fn power_w(&self, time_index: usize) -> Result<f64, ModelError> {
        self.profile.power_w(time_index)
    }
}

/// Extrapolates a 10 m wind speed to `hub_height_m` with the logarithmic profile.
pub fn hub_speed_ms(reference_speed_ms: f64, hub_height_m: f64) -> f64 {
    reference_speed_ms * (hub_height_m / ROUGHNESS_LENGTH_M).ln()
        / (REFERENCE_HEIGHT_M / ROUGHNESS_LENGTH_M).ln()
}

/// Fraction of nominal power at hub wind speed `speed_ms`.
pub fn power_curve_frac(speed_ms: f64) -> f64 {
    if !(CUT_IN_MS..=CUT_OUT_MS).contains(&speed_ms) {
        return 0.0;
    }
    POWER_CURVE
        .windows(2)
        .find(|w| speed_ms <= w[1].0)
        .map(|w| {
            let (v0, p0) = w[0];
            let (v1, p1) = w[1];
            p0 + (p1 - p0) * (speed_ms - v0) / (v1 - v0)
        })
        .unwrap_or(0.0)
}

fn farm_output_w(turbines: &[TurbineGroup], reference_speed_ms: f64) -> f64 {
    turbines
        .iter()
        .map(|g| {
            let v = hub_speed_ms(reference_speed_ms, g.hub_height_m);
            power_curve_frac(v) * g.nominal_power_w * f64::from(g.count)
        })
        .sum()
}
