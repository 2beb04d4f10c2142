//! External collaborators queried by the engine each step.
//!
//! Every model is constructed once per run and handed to the engine by
//! value. Renewable and price models are pre-computed over the run horizon,
//! so a lookup beyond it is a [`ModelError::OutOfRange`].

use std::collections::BTreeMap;

use crate::error::ModelError;

/// Grid power flow over a radial feeder.
pub mod grid;
/// Synthetic time-of-use and file-backed market prices.
pub mod price;
/// Finite pre-computed series and CSV loading.
pub mod profile;
/// Solar array with correlated cloud cover.
pub mod solar;
/// Wind farm with a turbine power curve.
pub mod wind;

pub use grid::{FeederLine, LoadShape, RadialFeeder};
pub use price::TimeOfUseTariff;
pub use profile::Profile;
pub use solar::SolarArray;
pub use wind::{TurbineGroup, WindFarm};

/// Reserved consumer key for the controllable load's own voltage.
pub const SMART_CONSUMER: &str = "smart_consumer";

/// A renewable source producing power per time index.
pub trait ProductionModel {
    /// Power output at `time_index`, in W (>= 0).
    fn power_w(&self, time_index: usize) -> Result<f64, ModelError>;
}

/// A market quoting one price per time index.
pub trait PriceModel {
    /// Price at `time_index`, in currency/Wh.
    fn price_per_wh(&self, time_index: usize) -> Result<f64, ModelError>;
}

/// A grid that reports consumer voltages for a given smart-consumer injection.
pub trait GridModel {
    /// Solves the grid at `time_index` with the controllable load drawing
    /// `setpoint_w`.
    fn voltages(&mut self, setpoint_w: f64, time_index: usize) -> Result<GridVoltages, ModelError>;
}

/// Per-consumer voltages (p.u.) for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVoltages {
    /// Passive consumers keyed by name.
    pub consumers: BTreeMap<String, f64>,
    /// Voltage at the controllable load.
    pub smart_consumer: f64,
}

impl GridVoltages {
    /// Voltage of any consumer, including [`SMART_CONSUMER`].
    pub fn get(&self, name: &str) -> Result<f64, ModelError> {
        if name == SMART_CONSUMER {
            return Ok(self.smart_consumer);
        }
        self.consumers
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::MissingConsumer(name.to_string()))
    }

    /// Lowest voltage across all consumers.
    pub fn min_pu(&self) -> f64 {
        self.consumers
            .values()
            .copied()
            .fold(self.smart_consumer, f64::min)
    }
}
