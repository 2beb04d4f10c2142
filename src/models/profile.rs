use std::path::Path;

use rand::{Rng, rngs::StdRng};

use super::{PriceModel, ProductionModel};
use crate::error::{ModelError, SimError};

/// A finite, pre-computed series indexed by simulation step.
///
/// Used directly for file-backed inputs and as the backing store of the
/// synthetic models, which fill one at construction time.
///
/// # Examples
///
/// ```
/// use ev_cosim::models::Profile;
///
/// let p = Profile::new(vec![1.0, 2.0]);
/// assert_eq!(p.at(1), Ok(2.0));
/// assert!(p.at(2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    values: Vec<f64>,
}

impl Profile {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Loads one numeric column from a CSV file with a header row.
    ///
    /// Every value is multiplied by `scale`, e.g. `1e-6` to turn a price in
    /// currency/MWh into currency/Wh.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Csv`] if the file cannot be read and
    /// [`SimError::Data`] if the column is missing, empty, or holds a value
    /// that is not a finite number.
    pub fn from_csv(path: &Path, column: &str, scale: f64) -> Result<Self, SimError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let headers = rdr.headers()?.clone();
        let idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))
            .ok_or_else(|| SimError::data(path, format!("no column named \"{column}\"")))?;

        let mut values = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let raw = record.get(idx).unwrap_or_default();
            let value: f64 = raw
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| {
                    SimError::data(path, format!("row {}: \"{raw}\" is not a number", row + 1))
                })?;
            values.push(value * scale);
        }

        if values.is_empty() {
            return Err(SimError::data(path, format!("column \"{column}\" has no rows")));
        }
        Ok(Self { values })
    }

    /// Value at `time_index`.
    pub fn at(&self, time_index: usize) -> Result<f64, ModelError> {
        self.values
            .get(time_index)
            .copied()
            .ok_or(ModelError::OutOfRange {
                index: time_index,
                len: self.values.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl ProductionModel for Profile {
    fn power_w(&self, time_index: usize) -> Result<f64, ModelError> {
        self.at(time_index).map(|w| w.max(0.0))
    }
}

impl PriceModel for Profile {
    fn price_per_wh(&self, time_index: usize) -> Result<f64, ModelError> {
        self.at(time_index)
    }
}

/// Generates Gaussian noise using the Box-Muller transform.
///
/// Returns a sample with mean 0 and standard deviation `std_dev`; `0.0`
/// when `std_dev <= 0`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// First-order autoregressive process around a fixed mean.
///
/// ```text
/// x(t) = mean + alpha * (x(t-1) - mean) + noise(t)
/// ```
/// clamped to `[min, max]` after every step.
#[derive(Debug, Clone)]
pub struct Ar1 {
    pub mean: f64,
    pub alpha: f64,
    pub noise_std: f64,
    pub min: f64,
    pub max: f64,
    state: f64,
}

impl Ar1 {
    /// Creates a process starting at its mean. `alpha` is clamped to `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn new(mean: f64, alpha: f64, noise_std: f64, min: f64, max: f64) -> Self {
        assert!(min <= max, "min must be <= max");
        Self {
            mean,
            alpha: alpha.clamp(0.0, 1.0),
            noise_std: noise_std.max(0.0),
            min,
            max,
            state: mean.clamp(min, max),
        }
    }

    /// Advances one step and returns the new value.
    pub fn next(&mut self, rng: &mut StdRng) -> f64 {
        let innovation = gaussian_noise(rng, self.noise_std);
        self.state = self.mean + self.alpha * (self.state - self.mean) + innovation;
        self.state = self.state.clamp(self.min, self.max);
        self.state
    }
}
