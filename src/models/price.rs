use rand::{SeedableRng, rngs::StdRng};

use super::PriceModel;
use super::profile::{Profile, gaussian_noise};
use crate::error::ModelError;
use crate::sim::types::SimConfig;

/// Tariff band of one hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TariffBand {
    OffPeak,
    Base,
    Peak,
}

impl TariffBand {
    /// Band for an hour of day in `0..=23`.
    ///
    /// Off-peak 00:00-06:59, peak 07:00-09:59 and 17:00-21:59, base otherwise.
    pub fn for_hour(hour: usize) -> Self {
        match hour {
            0..=6 => Self::OffPeak,
            7..=9 | 17..=21 => Self::Peak,
            _ => Self::Base,
        }
    }
}

/// Synthetic time-of-use market with multiplicative noise.
///
/// # Examples
///
/// ```
/// use ev_cosim::models::{PriceModel, TimeOfUseTariff};
/// use ev_cosim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(0.0, 24.0 * 60.0, 60.0);
/// let tariff = TimeOfUseTariff::new(1e-4, 2e-4, 4e-4, 0.0, &cfg, 0);
/// assert_eq!(tariff.price_per_wh(3).unwrap(), 1e-4);
/// assert_eq!(tariff.price_per_wh(8).unwrap(), 4e-4);
/// ```
#[derive(Debug, Clone)]
pub struct TimeOfUseTariff {
    profile: Profile,
}

impl TimeOfUseTariff {
    /// Draws the price series for `config`'s horizon.
    ///
    /// # Arguments
    ///
    /// * `offpeak`, `base`, `peak` - Band prices in currency/Wh
    /// * `noise_std` - Relative standard deviation of the per-step noise
    /// * `config` - Simulation timing
    /// * `seed` - Random seed
    pub fn new(
        offpeak: f64,
        base: f64,
        peak: f64,
        noise_std: f64,
        config: &SimConfig,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..config.total_steps())
            .map(|t| {
                let band_price = match TariffBand::for_hour(config.hour_of_day(t)) {
                    TariffBand::OffPeak => offpeak,
                    TariffBand::Base => base,
                    TariffBand::Peak => peak,
                };
                (band_price * (1.0 + gaussian_noise(&mut rng, noise_std))).max(0.0)
            })
            .collect();

        Self {
            profile: Profile::new(values),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

impl PriceModel for TimeOfUseTariff {
    fn price_per_wh(&self, time_index: usize) -> Result<f64, ModelError> {
        self.profile.price_per_wh(time_index)
    }
}
