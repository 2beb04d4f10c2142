//! Post-hoc run summary computed from step results.

use std::fmt;

use serde::Serialize;

use super::power_balance::EnergyLedger;
use super::types::{DispatchRegime, StepResult};

/// Aggregate indicators derived from a complete simulation run.
///
/// Computed post-hoc from `&[StepResult]` so the summary can never disagree
/// with the recorded steps.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub initial_budget: f64,
    pub final_budget: f64,
    /// `final_budget - initial_budget`.
    pub net_cash_flow: f64,
    /// Energy flows summed over every step.
    pub energy: EnergyLedger,
    pub min_voltage_pu: f64,
    pub max_voltage_pu: f64,
    /// Highest setpoint requested from the grid (W).
    pub peak_setpoint_w: f64,
    pub final_storage_soc_wh: f64,
    /// Steps per dispatch regime, in [`DispatchRegime::ALL`] order.
    pub regime_counts: Vec<(DispatchRegime, usize)>,
}

impl RunSummary {
    /// Summarizes `results`.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `initial_budget` - Budget before the first step
    pub fn from_results(results: &[StepResult], initial_budget: f64) -> Self {
        let mut energy = EnergyLedger::default();
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        let mut peak_setpoint_w = 0.0_f64;
        let mut regime_counts: Vec<(DispatchRegime, usize)> =
            DispatchRegime::ALL.iter().map(|r| (*r, 0)).collect();

        for r in results {
            energy += r.ledger;
            min_v = min_v.min(r.voltage_pu);
            max_v = max_v.max(r.voltage_pu);
            peak_setpoint_w = peak_setpoint_w.max(r.setpoint_w);
            if let Some(entry) = regime_counts.iter_mut().find(|(k, _)| *k == r.regime) {
                entry.1 += 1;
            }
        }

        let final_budget = results.last().map_or(initial_budget, |r| r.budget);
        if results.is_empty() {
            min_v = 0.0;
            max_v = 0.0;
        }

        Self {
            steps: results.len(),
            initial_budget,
            final_budget,
            net_cash_flow: final_budget - initial_budget,
            energy,
            min_voltage_pu: min_v,
            max_voltage_pu: max_v,
            peak_setpoint_w,
            final_storage_soc_wh: results.last().map_or(0.0, |r| r.storage_soc_wh),
            regime_counts,
        }
    }

    /// Number of steps that took `regime`.
    pub fn count(&self, regime: DispatchRegime) -> usize {
        self.regime_counts
            .iter()
            .find(|(k, _)| *k == regime)
            .map_or(0, |(_, n)| *n)
    }

    /// Steps in which a voltage excursion suspended charging.
    pub fn disconnect_steps(&self) -> usize {
        self.count(DispatchRegime::Disconnected)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(
            f,
            "Budget:                {:.4} -> {:.4} (net {:+.4})",
            self.initial_budget, self.final_budget, self.net_cash_flow
        )?;
        writeln!(f, "Production:            {:.1} Wh", self.energy.production_wh)?;
        writeln!(
            f,
            "Delivered to vehicles: {:.1} Wh ({:.1} Wh unserved)",
            self.energy.to_vehicles_wh, self.energy.unserved_wh
        )?;
        writeln!(
            f,
            "Storage in/out:        {:.1} / {:.1} Wh (final SoC {:.1} Wh)",
            self.energy.stored_wh, self.energy.discharged_wh, self.final_storage_soc_wh
        )?;
        writeln!(
            f,
            "Grid bought/sold:      {:.1} / {:.1} Wh",
            self.energy.bought_wh, self.energy.sold_wh
        )?;
        writeln!(
            f,
            "Voltage range:         {:.4} .. {:.4} pu ({} disconnect steps)",
            self.min_voltage_pu,
            self.max_voltage_pu,
            self.disconnect_steps()
        )?;
        writeln!(f, "Peak setpoint:         {:.1} W", self.peak_setpoint_w)?;
        write!(f, "Regimes:              ")?;
        for (regime, n) in self.regime_counts.iter().filter(|(_, n)| *n > 0) {
            write!(f, " {regime}={n}")?;
        }
        Ok(())
    }
}
