use rand::{SeedableRng, rngs::StdRng};

use super::ProductionModel;
use super::profile::{Ar1, Profile};
use crate::error::ModelError;
use crate::sim::types::SimConfig;

/// Minimum cloud multiplier (heavy overcast).
const MULTIPLIER_MIN: f64 = 0.2;
/// Maximum cloud multiplier (enhanced irradiance from cloud edges).
const MULTIPLIER_MAX: f64 = 1.2;

/// Physical parameters of a solar array.
#[derive(Debug, Clone, PartialEq)]
pub struct SolarParams {
    /// Peak output of one panel under clear sky, in W.
    pub panel_peak_w: f64,
    pub panels: u32,
    /// Hour of day generation starts (fractional hours allowed).
    pub sunrise_hour: f64,
    /// Hour of day generation ends.
    pub sunset_hour: f64,
    /// AR(1) persistence of the cloud multiplier (0 = white noise, 1 = frozen).
    pub cloud_alpha: f64,
    /// Standard deviation of the cloud innovation noise.
    pub cloud_noise_std: f64,
}

/// Solar array with a half-sine daylight envelope and AR(1) cloud cover.
///
/// Output over the whole horizon is drawn once at construction:
/// ```text
/// P(t) = panel_peak_w * panels * envelope(hour(t)) * m(t)
/// ```
/// where `m` is a cloud multiplier around 1.0, clamped to \[0.2, 1.2\].
/// The multiplier evolves every step, day or night, so cloud fronts carry
/// over between days.
#[derive(Debug, Clone)]
pub struct SolarArray {
    params: SolarParams,
    profile: Profile,
}

impl SolarArray {
    /// Builds the array's production profile for `config`'s horizon.
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_hour >= sunset_hour` or either lies outside `[0, 24]`.
    pub fn new(params: SolarParams, config: &SimConfig, seed: u64) -> Self {
        assert!(
            (0.0..=24.0).contains(&params.sunrise_hour)
                && (0.0..=24.0).contains(&params.sunset_hour)
                && params.sunrise_hour < params.sunset_hour,
            "sunrise_hour must be < sunset_hour within [0, 24]"
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mut cloud = Ar1::new(
            1.0,
            params.cloud_alpha,
            params.cloud_noise_std,
            MULTIPLIER_MIN,
            MULTIPLIER_MAX,
        );
        let peak_w = params.panel_peak_w.max(0.0) * f64::from(params.panels);

        let values = (0..config.total_steps())
            .map(|t| {
                let m = cloud.next(&mut rng);
                let mid_hour = (config.time_at(t) + config.delta_min / 2.0) / 60.0;
                peak_w * daylight_frac(mid_hour, params.sunrise_hour, params.sunset_hour) * m
            })
            .collect();

        Self {
            params,
            profile: Profile::new(values),
        }
    }

    pub fn params(&self) -> &SolarParams {
        &self.params
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

impl ProductionModel for SolarArray {
    fn power_w(&self, time_index: usize) -> Result<f64, ModelError> {
        self.profile.power_w(time_index)
    }
}

/// Fraction of peak irradiance at `hour` (any real number, wrapped to one day).
///
/// A half sine between sunrise and sunset, zero at night.
pub fn daylight_frac(hour: f64, sunrise_hour: f64, sunset_hour: f64) -> f64 {
    let h = hour.rem_euclid(24.0);
    if h <= sunrise_hour || h >= sunset_hour {
        return 0.0;
    }
    let x = (h - sunrise_hour) / (sunset_hour - sunrise_hour);
    (std::f64::consts::PI * x).sin().max(0.0)
}
