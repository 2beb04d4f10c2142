//! Rule-based dispatch of renewable production, storage, and grid import across an EV fleet.

use tracing::{debug, warn};

use super::power_balance::EnergyLedger;
use super::types::{DispatchRegime, StepDispatch, StepInput, StepState};
use crate::devices::VehicleStatus;

/// Immutable controller thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Lower voltage safety bound (p.u.).
    pub voltage_min: f64,
    /// Upper voltage safety bound (p.u.).
    pub voltage_max: f64,
    /// Setpoint correction applied per out-of-band step (W).
    pub voltage_adjust_step_w: f64,
    /// Above this price idle production is sold (currency/Wh).
    pub price_high: f64,
    /// Below this price idle production is stored (currency/Wh).
    pub price_low: f64,
}

impl ControllerSettings {
    /// Creates controller settings.
    ///
    /// # Panics
    ///
    /// Panics if `voltage_min >= voltage_max`, `voltage_adjust_step_w < 0`,
    /// or `price_low > price_high`.
    pub fn new(
        voltage_min: f64,
        voltage_max: f64,
        voltage_adjust_step_w: f64,
        price_high: f64,
        price_low: f64,
    ) -> Self {
        assert!(voltage_min < voltage_max, "voltage_min must be < voltage_max");
        assert!(voltage_adjust_step_w >= 0.0);
        assert!(price_low <= price_high, "price_low must be <= price_high");
        Self {
            voltage_min,
            voltage_max,
            voltage_adjust_step_w,
            price_high,
            price_low,
        }
    }

    /// Returns `true` when `voltage_pu` lies inside the safety band.
    pub fn voltage_in_band(&self, voltage_pu: f64) -> bool {
        (self.voltage_min..=self.voltage_max).contains(&voltage_pu)
    }
}

/// Decides one step of power allocation.
///
/// Implementations mutate storage, budget, and charge traces in place and
/// return the setpoint for the next step along with the branch taken.
pub trait Controller {
    fn dispatch(&self, input: &StepInput<'_>, state: &mut StepState<'_>) -> StepDispatch;
}

/// Source mix used to charge the fleet on a step with demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingCase {
    /// Production covers all demand.
    Direct,
    /// Production plus storage covers demand.
    StorageAssisted,
    /// Production, storage, and grid import cover demand.
    GridAssisted,
    /// Every source together falls short; vehicles are curtailed.
    Curtailed,
}

impl ChargingCase {
    /// Selects the case for a given demand.
    ///
    /// `stored_w` is the storage content expressed as power over one step.
    /// Exactly one case matches any input:
    /// - `Direct`: `demand <= production`
    /// - `StorageAssisted`: `demand <= production + stored`
    /// - `GridAssisted`: `demand <= production + stored + grid`
    /// - `Curtailed`: otherwise
    pub fn select(demand_w: f64, production_w: f64, stored_w: f64, grid_capacity_w: f64) -> Self {
        if demand_w <= production_w {
            Self::Direct
        } else if demand_w <= production_w + stored_w {
            Self::StorageAssisted
        } else if demand_w <= production_w + stored_w + grid_capacity_w {
            Self::GridAssisted
        } else {
            Self::Curtailed
        }
    }
}

impl From<ChargingCase> for DispatchRegime {
    fn from(case: ChargingCase) -> Self {
        match case {
            ChargingCase::Direct => Self::Direct,
            ChargingCase::StorageAssisted => Self::StorageAssisted,
            ChargingCase::GridAssisted => Self::GridAssisted,
            ChargingCase::Curtailed => Self::Curtailed,
        }
    }
}

/// Price- and voltage-aware EV charging controller.
///
/// Per step, in order:
/// 1. Voltage outside `[voltage_min, voltage_max]` nudges the previous
///    setpoint by `voltage_adjust_step_w` and skips charging entirely.
/// 2. With no vehicle able to charge, production is sold, stored, or left
///    idle depending on the price thresholds.
/// 3. Otherwise EV demand is met from production, then storage, then the
///    grid; if even that is short, every vehicle is curtailed in proportion
///    to its port power.
/// 4. Away vehicles drop to zero charge, full vehicles hold theirs.
#[derive(Debug, Clone)]
pub struct DispatchController {
    settings: ControllerSettings,
    grid_capacity_w: f64,
    dt_hours: f64,
}

impl DispatchController {
    /// Creates a controller.
    ///
    /// # Arguments
    ///
    /// * `settings` - Voltage and price thresholds
    /// * `grid_capacity_w` - Maximum grid import/export (W, >= 0)
    /// * `dt_hours` - Step length in hours (> 0)
    ///
    /// # Panics
    ///
    /// Panics if `grid_capacity_w < 0` or `dt_hours <= 0`.
    pub fn new(settings: ControllerSettings, grid_capacity_w: f64, dt_hours: f64) -> Self {
        assert!(grid_capacity_w >= 0.0);
        assert!(dt_hours > 0.0);
        Self {
            settings,
            grid_capacity_w,
            dt_hours,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn grid_capacity_w(&self) -> f64 {
        self.grid_capacity_w
    }

    /// Applies the voltage correction; returns the corrected setpoint when
    /// the step must be aborted.
    fn voltage_override(&self, voltage_pu: f64, previous_setpoint_w: f64) -> Option<f64> {
        let s = &self.settings;
        let mut setpoint_w = previous_setpoint_w;
        if voltage_pu < s.voltage_min {
            setpoint_w += s.voltage_adjust_step_w;
        } else if voltage_pu > s.voltage_max {
            setpoint_w -= s.voltage_adjust_step_w;
        }

        if s.voltage_in_band(voltage_pu) {
            None
        } else {
            Some(setpoint_w)
        }
    }

    /// Stores as much of `surplus_w` as fits and sells the rest.
    fn store_surplus(
        &self,
        surplus_w: f64,
        price: f64,
        state: &mut StepState<'_>,
        ledger: &mut EnergyLedger,
    ) {
        if surplus_w <= 0.0 {
            return;
        }
        let stored_w = state.storage.charge(surplus_w, self.dt_hours);
        let overflow_w = (surplus_w - stored_w).max(0.0);
        self.sell(overflow_w, price, state, ledger);
        ledger.stored_wh += stored_w * self.dt_hours;
    }

    fn sell(&self, power_w: f64, price: f64, state: &mut StepState<'_>, ledger: &mut EnergyLedger) {
        let energy_wh = power_w * self.dt_hours;
        *state.budget += energy_wh * price;
        ledger.sold_wh += energy_wh;
    }

    fn buy(&self, power_w: f64, price: f64, state: &mut StepState<'_>, ledger: &mut EnergyLedger) {
        let energy_wh = power_w * self.dt_hours;
        *state.budget -= energy_wh * price;
        ledger.bought_wh += energy_wh;
    }

    fn discharge(&self, power_w: f64, state: &mut StepState<'_>, ledger: &mut EnergyLedger) -> f64 {
        let delivered_w = state.storage.discharge(power_w, self.dt_hours);
        ledger.discharged_wh += delivered_w * self.dt_hours;
        delivered_w
    }

    /// Charges every listed vehicle at `power_w(i)` for one step, clamped to
    /// its capacity. Returns the energy actually added.
    fn charge_vehicles(
        &self,
        input: &StepInput<'_>,
        state: &mut StepState<'_>,
        charging: &[usize],
        power_w: impl Fn(usize) -> f64,
    ) -> f64 {
        let t = input.time_index;
        charging
            .iter()
            .map(|&i| {
                let capacity_wh = input.fleet[i].battery_capacity_wh;
                let current_wh = state.traces.get(i, t);
                let next_wh = current_wh + power_w(i) * self.dt_hours;
                state.traces.set_next(i, t, next_wh, capacity_wh) - current_wh
            })
            .sum()
    }

    /// Books vehicle charging against the power the sources supplied.
    ///
    /// Supply a full vehicle could not take is unused; energy delivered
    /// beyond the supply (storage losses no source made up) is unserved.
    fn settle(
        &self,
        time_index: usize,
        supplied_w: f64,
        delivered_wh: f64,
        ledger: &mut EnergyLedger,
    ) {
        let supplied_wh = supplied_w * self.dt_hours;
        ledger.to_vehicles_wh += delivered_wh;
        if supplied_wh >= delivered_wh {
            ledger.unused_wh += supplied_wh - delivered_wh;
        } else {
            let unserved_wh = delivered_wh - supplied_wh;
            warn!(
                time_index,
                unserved_wh, "vehicle charging exceeded supply after storage losses"
            );
            ledger.unserved_wh += unserved_wh;
        }
    }

    fn dispatch_idle(
        &self,
        input: &StepInput<'_>,
        state: &mut StepState<'_>,
        ledger: &mut EnergyLedger,
    ) -> (f64, DispatchRegime) {
        let production_w = input.production_w();
        let price = input.price_per_wh;

        if price > self.settings.price_high {
            self.sell(production_w, price, state, ledger);
            (0.0, DispatchRegime::IdleSell)
        } else if price < self.settings.price_low {
            self.store_surplus(production_w, price, state, ledger);
            (0.0, DispatchRegime::IdleStore)
        } else {
            ledger.unused_wh += production_w * self.dt_hours;
            (0.0, DispatchRegime::IdleHold)
        }
    }

    fn dispatch_charging(
        &self,
        input: &StepInput<'_>,
        state: &mut StepState<'_>,
        charging: &[usize],
        ledger: &mut EnergyLedger,
    ) -> (f64, DispatchRegime) {
        let fleet = input.fleet;
        let price = input.price_per_wh;
        let production_w = input.production_w();
        let demand_w: f64 = charging.iter().map(|&i| fleet[i].charging_port_w).sum();
        let stored_w = state.storage.get_soc() / self.dt_hours;
        let port = |i: usize| fleet[i].charging_port_w;

        let t = input.time_index;
        let case = ChargingCase::select(demand_w, production_w, stored_w, self.grid_capacity_w);
        let regime = DispatchRegime::from(case);
        debug!(time_index = t, demand_w, production_w, stored_w, %regime, "ev charging step");

        let setpoint_w = match case {
            ChargingCase::Direct => {
                let delivered_wh = self.charge_vehicles(input, state, charging, port);
                self.settle(t, demand_w, delivered_wh, ledger);
                self.store_surplus(production_w - demand_w, price, state, ledger);
                demand_w
            }
            ChargingCase::StorageAssisted => {
                let delivered_w = self.discharge(demand_w - production_w, state, ledger);
                let delivered_wh = self.charge_vehicles(input, state, charging, port);
                self.settle(t, production_w + delivered_w, delivered_wh, ledger);
                demand_w
            }
            ChargingCase::GridAssisted => {
                let needed_w = demand_w - production_w;
                let delivered_w = self.discharge(stored_w.min(needed_w), state, ledger);
                let grid_used_w = self.grid_capacity_w.min((needed_w - delivered_w).max(0.0));
                self.buy(grid_used_w, price, state, ledger);
                let delivered_wh = self.charge_vehicles(input, state, charging, port);
                self.settle(t, production_w + delivered_w + grid_used_w, delivered_wh, ledger);
                demand_w
            }
            ChargingCase::Curtailed => {
                let delivered_w =
                    self.discharge(stored_w.min(demand_w - production_w), state, ledger);
                let available_w = production_w + delivered_w + self.grid_capacity_w;
                self.buy(self.grid_capacity_w, price, state, ledger);

                let share = |i: usize| {
                    if demand_w > 0.0 {
                        port(i) / demand_w * available_w
                    } else {
                        0.0
                    }
                };
                let delivered_wh = self.charge_vehicles(input, state, charging, share);
                self.settle(t, available_w, delivered_wh, ledger);
                input.previous_setpoint_w
            }
        };

        (setpoint_w, regime)
    }
}

impl Controller for DispatchController {
    fn dispatch(&self, input: &StepInput<'_>, state: &mut StepState<'_>) -> StepDispatch {
        let t = input.time_index;
        let mut ledger = EnergyLedger::with_production(input.production_w() * self.dt_hours);

        if let Some(setpoint_w) = self.voltage_override(input.voltage_pu, input.previous_setpoint_w)
        {
            warn!(
                time_index = t,
                voltage_pu = input.voltage_pu,
                setpoint_w,
                "voltage outside safety band; charging suspended"
            );
            state.traces.carry_forward(t);
            ledger.unused_wh = ledger.production_wh;
            return StepDispatch {
                setpoint: setpoint_w.into(),
                regime: DispatchRegime::Disconnected,
                ledger,
            };
        }

        let charging: Vec<usize> = input
            .statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == VehicleStatus::CanCharge)
            .map(|(i, _)| i)
            .collect();

        let (setpoint_w, regime) = if charging.is_empty() {
            self.dispatch_idle(input, state, &mut ledger)
        } else {
            self.dispatch_charging(input, state, &charging, &mut ledger)
        };

        for (i, status) in input.statuses.iter().enumerate() {
            let capacity_wh = input.fleet[i].battery_capacity_wh;
            match status {
                VehicleStatus::NotCharging => {
                    state.traces.set_next(i, t, 0.0, capacity_wh);
                }
                VehicleStatus::Full => {
                    let current_wh = state.traces.get(i, t);
                    state.traces.set_next(i, t, current_wh, capacity_wh);
                }
                VehicleStatus::CanCharge => {}
            }
        }

        StepDispatch {
            setpoint: setpoint_w.into(),
            regime,
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{BatteryStorage, ChargeTraces, HourOfDay, Vehicle};

    fn settings() -> ControllerSettings {
        ControllerSettings::new(0.9, 1.1, 100.0, 0.3, 0.1)
    }

    fn controller(grid_capacity_w: f64) -> DispatchController {
        DispatchController::new(settings(), grid_capacity_w, 1.0)
    }

    fn ev(id: &str, capacity_wh: f64, port_w: f64) -> Vehicle {
        let h = |x: i64| HourOfDay::try_from(x).unwrap();
        Vehicle::new(id, capacity_wh, port_w, h(0), h(0))
    }

    /// Mutable state for one controller call.
    struct Fixture {
        storage: BatteryStorage,
        budget: f64,
        traces: ChargeTraces,
    }

    impl Fixture {
        fn new(storage: BatteryStorage, vehicles: usize) -> Self {
            Self {
                storage,
                budget: 0.0,
                traces: ChargeTraces::new(vehicles, 4),
            }
        }

        fn run(
            &mut self,
            controller: &DispatchController,
            fleet: &[Vehicle],
            statuses: &[VehicleStatus],
            production_w: f64,
            price: f64,
            voltage_pu: f64,
        ) -> StepDispatch {
            let input = StepInput {
                time_index: 0,
                statuses,
                fleet,
                solar_w: production_w,
                wind_w: 0.0,
                price_per_wh: price,
                voltage_pu,
                previous_setpoint_w: 500.0,
            };
            let mut state = StepState {
                storage: &mut self.storage,
                budget: &mut self.budget,
                traces: &mut self.traces,
            };
            controller.dispatch(&input, &mut state)
        }
    }

    fn setpoint(d: &StepDispatch) -> f64 {
        d.setpoint.clone().flatten(0)
    }

    #[test]
    fn idle_low_price_stores_production() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 0.95, 0.95, 0.0), 0);
        let d = fx.run(&controller(0.0), &[], &[], 100.0, 0.05, 1.0);
        assert_eq!(d.regime, DispatchRegime::IdleStore);
        assert!((fx.storage.get_soc() - 95.0).abs() < 1e-9);
        assert_eq!(setpoint(&d), 0.0);
        assert_eq!(fx.budget, 0.0);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn idle_low_price_sells_overflow_when_storage_full() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 950.0), 0);
        let d = fx.run(&controller(0.0), &[], &[], 100.0, 0.05, 1.0);
        assert_eq!(fx.storage.get_soc(), 1000.0);
        assert!((fx.budget - 50.0 * 0.05).abs() < 1e-12);
        assert!((d.ledger.sold_wh - 50.0).abs() < 1e-9);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn idle_high_price_sells_everything() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 0.95, 0.95, 0.0), 0);
        let d = fx.run(&controller(0.0), &[], &[], 100.0, 0.5, 1.0);
        assert_eq!(d.regime, DispatchRegime::IdleSell);
        assert!((fx.budget - 50.0).abs() < 1e-12);
        assert_eq!(fx.storage.get_soc(), 0.0);
        assert_eq!(setpoint(&d), 0.0);
    }

    #[test]
    fn idle_mid_price_holds() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 0.95, 0.95, 10.0), 0);
        let d = fx.run(&controller(0.0), &[], &[], 100.0, 0.2, 1.0);
        assert_eq!(d.regime, DispatchRegime::IdleHold);
        assert_eq!(fx.budget, 0.0);
        assert_eq!(fx.storage.get_soc(), 10.0);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn direct_case_tops_up_vehicle_and_stores_excess() {
        let fleet = [ev("a", 1000.0, 50.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 1);
        fx.traces.set_next(0, 0, 990.0, 1000.0);
        fx.traces.carry_forward(1);
        let input_statuses = [VehicleStatus::CanCharge];

        // Run at t=1 so the vehicle sits at 990 Wh
        let input = StepInput {
            time_index: 1,
            statuses: &input_statuses,
            fleet: &fleet,
            solar_w: 200.0,
            wind_w: 0.0,
            price_per_wh: 0.2,
            voltage_pu: 1.0,
            previous_setpoint_w: 0.0,
        };
        let mut state = StepState {
            storage: &mut fx.storage,
            budget: &mut fx.budget,
            traces: &mut fx.traces,
        };
        let d = controller(0.0).dispatch(&input, &mut state);

        assert_eq!(d.regime, DispatchRegime::Direct);
        assert_eq!(fx.traces.get(0, 2), 1000.0);
        assert_eq!(setpoint(&d), 50.0);
        assert!((fx.storage.get_soc() - 150.0).abs() < 1e-9);
        assert_eq!(d.ledger.to_vehicles_wh, 10.0);
        // the 40 Wh the full vehicle refused is unused, not lost
        assert!((d.ledger.unused_wh - 40.0).abs() < 1e-9);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn storage_assisted_case_discharges_deficit() {
        let fleet = [ev("a", 10_000.0, 300.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 500.0), 1);
        let d = fx.run(&controller(1000.0), &fleet, &[VehicleStatus::CanCharge], 100.0, 0.2, 1.0);

        assert_eq!(d.regime, DispatchRegime::StorageAssisted);
        assert!((fx.storage.get_soc() - 300.0).abs() < 1e-9);
        assert_eq!(fx.traces.get(0, 1), 300.0);
        assert_eq!(fx.budget, 0.0);
        assert_eq!(setpoint(&d), 300.0);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn storage_assisted_losses_are_not_bought() {
        // 100 Wh stored at 50% discharge efficiency delivers only 50 W of the 80 W deficit
        let fleet = [ev("a", 10_000.0, 100.0)];
        for grid_capacity_w in [0.0, 1000.0] {
            let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 0.5, 100.0), 1);
            let d = fx.run(
                &controller(grid_capacity_w),
                &fleet,
                &[VehicleStatus::CanCharge],
                20.0,
                0.2,
                1.0,
            );

            assert_eq!(d.regime, DispatchRegime::StorageAssisted);
            assert!((d.ledger.discharged_wh - 50.0).abs() < 1e-9);
            assert_eq!(d.ledger.bought_wh, 0.0);
            assert_eq!(fx.budget, 0.0);
            assert!(fx.storage.get_soc().abs() < 1e-9);
            assert_eq!(fx.traces.get(0, 1), 100.0);
            assert!((d.ledger.unserved_wh - 30.0).abs() < 1e-9);
            assert!((d.ledger.residual_wh() + 30.0).abs() < 1e-9);
        }
    }

    #[test]
    fn grid_assisted_case_buys_remaining_deficit() {
        let fleet = [ev("a", 10_000.0, 500.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 100.0), 1);
        let d = fx.run(&controller(1000.0), &fleet, &[VehicleStatus::CanCharge], 100.0, 0.2, 1.0);

        assert_eq!(d.regime, DispatchRegime::GridAssisted);
        assert!(fx.storage.get_soc().abs() < 1e-9);
        assert!((d.ledger.bought_wh - 300.0).abs() < 1e-9);
        assert!((fx.budget + 300.0 * 0.2).abs() < 1e-9);
        assert_eq!(fx.traces.get(0, 1), 500.0);
        assert_eq!(setpoint(&d), 500.0);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn grid_assisted_shortfall_past_grid_capacity_is_unserved() {
        // 100 Wh at 50% efficiency yields 50 W; 80 W remain but only 50 W can be imported
        let fleet = [ev("a", 10_000.0, 150.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 0.5, 100.0), 1);
        let d = fx.run(&controller(50.0), &fleet, &[VehicleStatus::CanCharge], 20.0, 0.2, 1.0);

        assert_eq!(d.regime, DispatchRegime::GridAssisted);
        assert!((d.ledger.discharged_wh - 50.0).abs() < 1e-9);
        assert!((d.ledger.bought_wh - 50.0).abs() < 1e-9);
        assert!((fx.budget + 50.0 * 0.2).abs() < 1e-9);
        assert_eq!(fx.traces.get(0, 1), 150.0);
        assert_eq!(d.ledger.to_vehicles_wh, 150.0);
        assert!((d.ledger.unserved_wh - 30.0).abs() < 1e-9);
        assert!((d.ledger.residual_wh() + 30.0).abs() < 1e-9);
        assert_eq!(setpoint(&d), 150.0);
    }

    #[test]
    fn curtailed_case_allocates_proportionally_to_port_power() {
        let fleet = [ev("a", 10_000.0, 100.0), ev("b", 10_000.0, 300.0)];
        let statuses = [VehicleStatus::CanCharge, VehicleStatus::CanCharge];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 2);
        let d = fx.run(&controller(200.0), &fleet, &statuses, 0.0, 0.2, 1.0);

        assert_eq!(d.regime, DispatchRegime::Curtailed);
        assert!((fx.traces.get(0, 1) - 50.0).abs() < 1e-9);
        assert!((fx.traces.get(1, 1) - 150.0).abs() < 1e-9);
        assert!((fx.budget + 200.0 * 0.2).abs() < 1e-9);
        // curtailment keeps the previous setpoint
        assert_eq!(setpoint(&d), 500.0);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn curtailed_case_uses_production_storage_and_grid() {
        let fleet = [ev("a", 10_000.0, 100.0), ev("b", 10_000.0, 300.0)];
        let statuses = [VehicleStatus::CanCharge, VehicleStatus::CanCharge];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 50.0), 2);
        let d = fx.run(&controller(50.0), &fleet, &statuses, 100.0, 0.2, 1.0);

        assert_eq!(d.regime, DispatchRegime::Curtailed);
        assert!((fx.traces.get(0, 1) - 50.0).abs() < 1e-9);
        assert!((fx.traces.get(1, 1) - 150.0).abs() < 1e-9);
        assert!(fx.storage.get_soc().abs() < 1e-9);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn curtailed_allocation_never_exceeds_capacity() {
        let fleet = [ev("a", 20.0, 100.0), ev("b", 10_000.0, 300.0)];
        let statuses = [VehicleStatus::CanCharge, VehicleStatus::CanCharge];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 2);
        let d = fx.run(&controller(200.0), &fleet, &statuses, 0.0, 0.2, 1.0);

        assert_eq!(fx.traces.get(0, 1), 20.0);
        assert!((fx.traces.get(1, 1) - 150.0).abs() < 1e-9);
        assert!((d.ledger.unused_wh - 30.0).abs() < 1e-9);
        assert!(d.ledger.is_balanced(1e-9));
    }

    #[test]
    fn low_voltage_aborts_and_raises_setpoint() {
        let fleet = [ev("a", 1000.0, 50.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 200.0), 1);
        let d = fx.run(&controller(100.0), &fleet, &[VehicleStatus::CanCharge], 100.0, 0.05, 0.89);

        assert_eq!(d.regime, DispatchRegime::Disconnected);
        assert_eq!(setpoint(&d), 600.0);
        assert_eq!(fx.budget, 0.0);
        assert_eq!(fx.storage.get_soc(), 200.0);
        assert_eq!(fx.traces.get(0, 1), fx.traces.get(0, 0));
    }

    #[test]
    fn high_voltage_aborts_and_lowers_setpoint() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 0);
        let d = fx.run(&controller(100.0), &[], &[], 100.0, 0.5, 1.2);
        assert_eq!(d.regime, DispatchRegime::Disconnected);
        assert_eq!(setpoint(&d), 400.0);
        assert_eq!(fx.budget, 0.0);
    }

    #[test]
    fn non_finite_voltage_is_out_of_band() {
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 0);
        let d = fx.run(&controller(100.0), &[], &[], 100.0, 0.5, f64::NAN);
        assert_eq!(d.regime, DispatchRegime::Disconnected);
        assert_eq!(setpoint(&d), 500.0);
    }

    #[test]
    fn away_vehicles_reset_and_full_vehicles_hold() {
        let fleet = [ev("away", 1000.0, 50.0), ev("full", 1000.0, 50.0)];
        let statuses = [VehicleStatus::NotCharging, VehicleStatus::Full];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 2);
        fx.traces.set_next(0, 0, 400.0, 1000.0);
        fx.traces.set_next(1, 0, 1000.0, 1000.0);

        let input = StepInput {
            time_index: 1,
            statuses: &statuses,
            fleet: &fleet,
            solar_w: 0.0,
            wind_w: 0.0,
            price_per_wh: 0.2,
            voltage_pu: 1.0,
            previous_setpoint_w: 0.0,
        };
        let mut state = StepState {
            storage: &mut fx.storage,
            budget: &mut fx.budget,
            traces: &mut fx.traces,
        };
        controller(0.0).dispatch(&input, &mut state);

        assert_eq!(fx.traces.get(0, 2), 0.0);
        assert_eq!(fx.traces.get(1, 2), 1000.0);
    }

    #[test]
    fn zero_port_power_vehicles_never_divide_by_zero() {
        let fleet = [ev("a", 1000.0, 0.0)];
        let mut fx = Fixture::new(BatteryStorage::new(1000.0, 1.0, 1.0, 0.0), 1);
        let d = fx.run(&controller(0.0), &fleet, &[VehicleStatus::CanCharge], 0.0, 0.2, 1.0);
        assert_eq!(d.regime, DispatchRegime::Direct);
        assert_eq!(setpoint(&d), 0.0);
        assert_eq!(fx.traces.get(0, 1), 0.0);
    }

    #[test]
    fn charging_cases_are_exclusive_and_exhaustive() {
        let values = [0.0, 50.0, 100.0, 150.0, 200.0, 400.0, 1000.0];
        for &demand in &values {
            for &production in &values {
                for &stored in &values {
                    for &grid in &values {
                        let a = demand <= production;
                        let b = !a && demand <= production + stored;
                        let c = !a && !b && demand <= production + stored + grid;
                        let d = demand > production + stored + grid;
                        assert_eq!([a, b, c, d].iter().filter(|x| **x).count(), 1);

                        let expected = if a {
                            ChargingCase::Direct
                        } else if b {
                            ChargingCase::StorageAssisted
                        } else if c {
                            ChargingCase::GridAssisted
                        } else {
                            ChargingCase::Curtailed
                        };
                        assert_eq!(ChargingCase::select(demand, production, stored, grid), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn voltage_band_is_inclusive() {
        let s = settings();
        assert!(s.voltage_in_band(0.9));
        assert!(s.voltage_in_band(1.1));
        assert!(!s.voltage_in_band(0.8999));
    }

    #[test]
    #[should_panic]
    fn inverted_voltage_band_panics() {
        ControllerSettings::new(1.1, 0.9, 100.0, 0.3, 0.1);
    }
}
