/// A stationary battery that buffers renewable surplus for later EV charging.
///
/// `BatteryStorage` tracks its stored energy (state of charge, in Wh) and
/// applies separate charge and discharge efficiencies. Both transfer
/// operations are clamped so that `0 <= soc <= capacity` always holds, and
/// both return the power that was *actually* transferred, which callers must
/// use for any downstream energy or money bookkeeping.
///
/// # Examples
///
/// ```
/// use ev_cosim::devices::BatteryStorage;
///
/// let mut storage = BatteryStorage::new(1000.0, 0.95, 0.95, 0.0);
/// let accepted = storage.charge(100.0, 1.0);
/// assert_eq!(accepted, 100.0);
/// assert!((storage.get_soc() - 95.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct BatteryStorage {
    /// Usable capacity in watt-hours.
    capacity_wh: f64,

    /// Fraction of input energy that ends up stored (0..=1.0).
    charge_efficiency: f64,

    /// Fraction of withdrawn stored energy that is delivered (0..=1.0).
    discharge_efficiency: f64,

    /// Stored energy in watt-hours.
    soc_wh: f64,
}

impl BatteryStorage {
    /// Creates a new battery storage.
    ///
    /// # Arguments
    ///
    /// * `capacity_wh` - Usable capacity in Wh (must be >= 0)
    /// * `charge_efficiency` - Charging efficiency (0..=1.0)
    /// * `discharge_efficiency` - Discharging efficiency (0..=1.0)
    /// * `initial_soc_wh` - Initial stored energy in Wh, within `[0, capacity_wh]`
    ///
    /// # Panics
    ///
    /// Panics if capacity is negative, an efficiency is outside (0, 1], or the
    /// initial state of charge is outside `[0, capacity_wh]`.
    pub fn new(
        capacity_wh: f64,
        charge_efficiency: f64,
        discharge_efficiency: f64,
        initial_soc_wh: f64,
    ) -> Self {
        assert!(capacity_wh >= 0.0, "capacity_wh must be >= 0");
        assert!(charge_efficiency > 0.0 && charge_efficiency <= 1.0);
        assert!(discharge_efficiency > 0.0 && discharge_efficiency <= 1.0);
        assert!(
            (0.0..=capacity_wh).contains(&initial_soc_wh),
            "initial_soc_wh must be within [0, capacity_wh]"
        );

        Self {
            capacity_wh,
            charge_efficiency,
            discharge_efficiency,
            soc_wh: initial_soc_wh,
        }
    }

    /// Charges with `amount_w` for `dt_hours` and returns the accepted power in W.
    ///
    /// The stored energy grows by `accepted * dt_hours * charge_efficiency`.
    /// When the request would overfill the battery, only the power that
    /// exactly fills it is accepted.
    pub fn charge(&mut self, amount_w: f64, dt_hours: f64) -> f64 {
        if amount_w <= 0.0 || dt_hours <= 0.0 {
            return 0.0;
        }

        let max_w = self.get_remaining_capacity() / (dt_hours * self.charge_efficiency);
        let accepted_w = amount_w.min(max_w.max(0.0));

        self.soc_wh += accepted_w * dt_hours * self.charge_efficiency;
        self.soc_wh = self.soc_wh.clamp(0.0, self.capacity_wh);

        accepted_w
    }

    /// Discharges `amount_w` for `dt_hours` and returns the delivered power in W.
    ///
    /// The stored energy shrinks by `delivered * dt_hours / discharge_efficiency`.
    /// When the battery cannot sustain the request, it delivers what it holds.
    pub fn discharge(&mut self, amount_w: f64, dt_hours: f64) -> f64 {
        if amount_w <= 0.0 || dt_hours <= 0.0 {
            return 0.0;
        }

        let max_w = self.soc_wh * self.discharge_efficiency / dt_hours;
        let delivered_w = amount_w.min(max_w.max(0.0));

        self.soc_wh -= delivered_w * dt_hours / self.discharge_efficiency;
        self.soc_wh = self.soc_wh.clamp(0.0, self.capacity_wh);

        delivered_w
    }

    /// Stored energy in Wh.
    pub fn get_soc(&self) -> f64 {
        self.soc_wh
    }

    /// Free capacity in Wh (`capacity - soc`).
    pub fn get_remaining_capacity(&self) -> f64 {
        (self.capacity_wh - self.soc_wh).max(0.0)
    }

    pub fn capacity_wh(&self) -> f64 {
        self.capacity_wh
    }

    pub fn charge_efficiency(&self) -> f64 {
        self.charge_efficiency
    }

    pub fn discharge_efficiency(&self) -> f64 {
        self.discharge_efficiency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_storage() {
        let storage = BatteryStorage::new(1000.0, 0.95, 0.9, 100.0);
        assert_eq!(storage.capacity_wh(), 1000.0);
        assert_eq!(storage.get_soc(), 100.0);
        assert_eq!(storage.get_remaining_capacity(), 900.0);
        assert_eq!(storage.charge_efficiency(), 0.95);
        assert_eq!(storage.discharge_efficiency(), 0.9);
    }

    #[test]
    #[should_panic]
    fn test_negative_capacity() {
        BatteryStorage::new(-1.0, 0.95, 0.95, 0.0);
    }

    #[test]
    #[should_panic]
    fn test_initial_soc_above_capacity() {
        BatteryStorage::new(100.0, 0.95, 0.95, 150.0);
    }

    #[test]
    #[should_panic]
    fn test_zero_efficiency() {
        BatteryStorage::new(100.0, 0.0, 0.95, 0.0);
    }

    #[test]
    fn test_charge_applies_efficiency() {
        let mut storage = BatteryStorage::new(1000.0, 0.95, 0.95, 0.0);
        let accepted = storage.charge(100.0, 1.0);
        assert_eq!(accepted, 100.0);
        assert!((storage.get_soc() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_charge_clamped_near_full() {
        // 19 Wh of room at 95% efficiency accepts exactly 20 W for one hour
        let mut storage = BatteryStorage::new(1000.0, 0.95, 0.95, 981.0);
        let accepted = storage.charge(100.0, 1.0);
        assert!((accepted - 20.0).abs() < 1e-9);
        assert!((storage.get_soc() - 1000.0).abs() < 1e-9);
        assert!(storage.get_remaining_capacity().abs() < 1e-9);
    }

    #[test]
    fn test_discharge_applies_efficiency() {
        let mut storage = BatteryStorage::new(1000.0, 1.0, 0.8, 500.0);
        let delivered = storage.discharge(100.0, 1.0);
        assert_eq!(delivered, 100.0);
        // 100 Wh delivered costs 125 Wh of stored energy
        assert!((storage.get_soc() - 375.0).abs() < 1e-9);
    }

    #[test]
    fn test_discharge_clamped_near_empty() {
        let mut storage = BatteryStorage::new(1000.0, 1.0, 0.5, 40.0);
        let delivered = storage.discharge(100.0, 1.0);
        assert!((delivered - 20.0).abs() < 1e-9);
        assert!(storage.get_soc().abs() < 1e-9);
    }

    #[test]
    fn test_sub_hour_step_scales_energy() {
        let mut storage = BatteryStorage::new(1000.0, 1.0, 1.0, 0.0);
        storage.charge(400.0, 0.25);
        assert!((storage.get_soc() - 100.0).abs() < 1e-9);
        let delivered = storage.discharge(800.0, 0.25);
        assert!((delivered - 400.0).abs() < 1e-9);
        assert!(storage.get_soc().abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_requests_are_noops() {
        let mut storage = BatteryStorage::new(1000.0, 0.95, 0.95, 500.0);
        assert_eq!(storage.charge(-10.0, 1.0), 0.0);
        assert_eq!(storage.discharge(0.0, 1.0), 0.0);
        assert_eq!(storage.get_soc(), 500.0);
    }

    #[test]
    fn test_zero_capacity_storage_never_holds_energy() {
        let mut storage = BatteryStorage::new(0.0, 0.95, 0.95, 0.0);
        assert_eq!(storage.charge(100.0, 1.0), 0.0);
        assert_eq!(storage.discharge(100.0, 1.0), 0.0);
        assert_eq!(storage.get_soc(), 0.0);
    }

    #[test]
    fn test_soc_stays_in_bounds_over_many_cycles() {
        let mut storage = BatteryStorage::new(500.0, 0.9, 0.9, 250.0);
        for i in 0..200 {
            let amount = (i % 7) as f64 * 90.0;
            if i % 3 == 0 {
                storage.discharge(amount, 1.0);
            } else {
                storage.charge(amount, 1.0);
            }
            assert!(storage.get_soc() >= 0.0);
            assert!(storage.get_soc() <= storage.capacity_wh());
        }
    }
}
