use super::types::SimConfig;

/// One tick of the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Step index, starting at 0.
    pub index: usize,
    /// Simulation time in minutes at the start of the step.
    pub time_min: f64,
}

/// A clock that walks the fixed horizon of a [`SimConfig`] one step at a time.
///
/// # Examples
///
/// ```
/// use ev_cosim::sim::clock::SimClock;
/// use ev_cosim::sim::types::SimConfig;
///
/// let mut clock = SimClock::new(&SimConfig::new(0.0, 180.0, 60.0));
/// let mut times = Vec::new();
///
/// clock.run(|tick| times.push(tick.time_min));
/// assert_eq!(times, vec![0.0, 60.0, 120.0]);
/// ```
#[derive(Debug, Clone)]
pub struct SimClock {
    current: usize,
    total: usize,
    start_min: f64,
    delta_min: f64,
}

impl SimClock {
    /// Creates a clock positioned at step 0 of `config`'s horizon.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            current: 0,
            total: config.total_steps(),
            start_min: config.start_min,
            delta_min: config.delta_min,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The step that was current before advancing
    /// * `None` - If the horizon is exhausted
    pub fn tick(&mut self) -> Option<Tick> {
        if self.current < self.total {
            let index = self.current;
            self.current += 1;
            Some(Tick {
                index,
                time_min: self.start_min + index as f64 * self.delta_min,
            })
        } else {
            None
        }
    }

    /// Index of the next step to be produced.
    pub fn position(&self) -> usize {
        self.current
    }

    /// Steps left before the horizon is exhausted.
    pub fn remaining(&self) -> usize {
        self.total - self.current
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.total
    }

    /// Calls `f` for every remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(Tick)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }
}
