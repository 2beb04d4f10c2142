//! Electric vehicles, their daily home hours, and the tiled presence schedule.

use std::fmt;
use std::str::FromStr;

use crate::sim::types::SimConfig;

/// Hours in one day; presence schedules repeat with this period.
pub const HOURS_PER_DAY: usize = 24;

/// A normalized hour of the day in `0..=23`.
///
/// Arrival and departure times arrive either as an integer hour or as an
/// `"HH:MM"` string; both are normalized to this type at the configuration
/// boundary. Minutes are truncated.
///
/// # Examples
///
/// ```
/// use ev_cosim::devices::HourOfDay;
///
/// let h: HourOfDay = "18:45".parse().unwrap();
/// assert_eq!(h.get(), 18);
/// assert_eq!(HourOfDay::try_from(7).unwrap().get(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourOfDay(u8);

impl HourOfDay {
    /// Returns the hour as an index into a daily schedule.
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<i64> for HourOfDay {
    type Error = String;

    fn try_from(hour: i64) -> Result<Self, Self::Error> {
        if (0..HOURS_PER_DAY as i64).contains(&hour) {
            Ok(Self(hour as u8))
        } else {
            Err(format!("hour {hour} is outside 0..=23"))
        }
    }
}

impl FromStr for HourOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (hours, minutes) = match s.split_once(':') {
            Some((h, m)) => (h, Some(m)),
            None => (s, None),
        };

        let hour: i64 = hours
            .parse()
            .map_err(|_| format!("\"{s}\" is not an hour or HH:MM time"))?;
        if let Some(m) = minutes {
            let minute: i64 = m
                .parse()
                .map_err(|_| format!("\"{s}\" has an invalid minute field"))?;
            if !(0..60).contains(&minute) {
                return Err(format!("\"{s}\" has minutes outside 0..=59"));
            }
        }
        Self::try_from(hour)
    }
}

impl fmt::Display for HourOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00", self.0)
    }
}

/// Whether a vehicle is physically connectable to its charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Away,
    Present,
}

/// An electric vehicle with a fixed battery size, charger port, and daily home window.
#[derive(Debug, Clone)]
pub struct Vehicle {
    /// Vehicle identifier, unique within a fleet.
    pub id: String,

    /// Battery capacity in Wh; charge traces never exceed it.
    pub battery_capacity_wh: f64,

    /// Maximum power the charging port can draw, in W.
    pub charging_port_w: f64,

    /// Hour the vehicle arrives home (presence starts).
    pub arrival: HourOfDay,

    /// Hour the vehicle leaves (presence ends, exclusive).
    pub departure: HourOfDay,
}

impl Vehicle {
    /// Creates a new vehicle.
    ///
    /// # Panics
    ///
    /// Panics if `battery_capacity_wh` or `charging_port_w` is negative.
    pub fn new(
        id: impl Into<String>,
        battery_capacity_wh: f64,
        charging_port_w: f64,
        arrival: HourOfDay,
        departure: HourOfDay,
    ) -> Self {
        assert!(battery_capacity_wh >= 0.0, "battery_capacity_wh must be >= 0");
        assert!(charging_port_w >= 0.0, "charging_port_w must be >= 0");
        Self {
            id: id.into(),
            battery_capacity_wh,
            charging_port_w,
            arrival,
            departure,
        }
    }

    /// Returns the 24-hour presence pattern.
    ///
    /// `arrival < departure` is a same-day window `[arrival, departure)`.
    /// Otherwise the window wraps midnight: `[arrival, 24) ∪ [0, departure)`,
    /// which makes `arrival == departure` a vehicle that never leaves.
    pub fn daily_presence(&self) -> [Presence; HOURS_PER_DAY] {
        let arrival = self.arrival.get();
        let departure = self.departure.get();
        let mut daily = [Presence::Away; HOURS_PER_DAY];

        if arrival < departure {
            daily[arrival..departure].fill(Presence::Present);
        } else {
            daily[arrival..].fill(Presence::Present);
            daily[..departure].fill(Presence::Present);
        }
        daily
    }

    /// Tiles the daily pattern across the whole simulation horizon.
    ///
    /// Entry `t` is the presence during the hour of day that step `t` starts in.
    pub fn presence_schedule(&self, config: &SimConfig) -> Vec<Presence> {
        let daily = self.daily_presence();
        (0..config.total_steps())
            .map(|t| daily[config.hour_of_day(t)])
            .collect()
    }
}
