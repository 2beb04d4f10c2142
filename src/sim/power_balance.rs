//! Per-step energy bookkeeping for the dispatch controller.

use std::ops::AddAssign;

use serde::Serialize;

/// Energy flows realized in one step, all in Wh and all non-negative.
///
/// Sources are renewable production, storage discharge, and grid purchase.
/// Sinks are vehicle charging, storage charging (measured at the storage
/// input, so conversion losses are included), grid sales, and production
/// that was left unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyLedger {
    /// Renewable production (solar + wind).
    pub production_wh: f64,
    /// Energy added to vehicle batteries.
    pub to_vehicles_wh: f64,
    /// Energy drawn into storage (input side).
    pub stored_wh: f64,
    /// Energy delivered by storage (output side).
    pub discharged_wh: f64,
    /// Energy sold to the grid.
    pub sold_wh: f64,
    /// Energy bought from the grid.
    pub bought_wh: f64,
    /// Production neither used, stored, nor sold, plus supply a vehicle
    /// could not take once it reached capacity.
    pub unused_wh: f64,
    /// Energy vehicles received that no source covered (storage losses with
    /// no purchase behind them). Not part of sources or sinks, so a step
    /// with unserved energy shows exactly this much negative residual.
    pub unserved_wh: f64,
}

impl EnergyLedger {
    /// Starts a ledger with the step's production already booked.
    pub fn with_production(production_wh: f64) -> Self {
        Self {
            production_wh,
            ..Self::default()
        }
    }

    /// Total energy entering the step.
    pub fn sources_wh(&self) -> f64 {
        self.production_wh + self.discharged_wh + self.bought_wh
    }

    /// Total energy leaving the step.
    pub fn sinks_wh(&self) -> f64 {
        self.to_vehicles_wh + self.stored_wh + self.sold_wh + self.unused_wh
    }

    /// Sources minus sinks. Zero when energy is conserved; positive when
    /// supply was drawn but not used (a capacity clamp), negative when
    /// demand was served without a booked source.
    pub fn residual_wh(&self) -> f64 {
        self.sources_wh() - self.sinks_wh()
    }

    /// Returns `true` if the step conserves energy within `tolerance_wh`.
    pub fn is_balanced(&self, tolerance_wh: f64) -> bool {
        self.residual_wh().abs() <= tolerance_wh
    }
}

impl AddAssign for EnergyLedger {
    fn add_assign(&mut self, rhs: Self) {
        self.production_wh += rhs.production_wh;
        self.to_vehicles_wh += rhs.to_vehicles_wh;
        self.stored_wh += rhs.stored_wh;
        self.discharged_wh += rhs.discharged_wh;
        self.sold_wh += rhs.sold_wh;
        self.bought_wh += rhs.bought_wh;
        self.unused_wh += rhs.unused_wh;
        self.unserved_wh += rhs.unserved_wh;
    }
}
