//! Energy integration shared by every power node.

use greenflow_core::clock::Millis;
use serde::{Deserialize, Serialize};

/// Joules delivered by `watts` over `elapsed` milliseconds.
pub fn energy_joules(watts: f64, elapsed: Millis) -> f64 {
    watts * elapsed as f64 * 0.001
}

/// Joules to kilowatt-hours.
pub const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Capability every node in a power chain exposes for reporting.
pub trait PowerNode {
    /// Power (W) last requested of this node.
    fn power_demand(&self) -> f64;

    /// Power (W) this node last committed to deliver.
    fn power_draw(&self) -> f64;

    /// Cumulative energy (J) delivered, as of the last counter update.
    fn total_energy_usage(&self) -> f64;

    /// Integrate counters up to `now` using the values held before the call.
    fn update_counters(&mut self, now: Millis);
}

/// Cumulative energy integral with its own integration timestamp.
///
/// The integral only ever grows by `power * elapsed * 0.001`, where `power` is
/// the value the caller held over the elapsed interval. Calling
/// [`integrate`](Self::integrate) twice at the same instant adds nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCounter {
    last_update: Millis,
    total: f64,
}

impl EnergyCounter {
    pub fn new(start: Millis) -> Self {
        Self {
            last_update: start,
            total: 0.0,
        }
    }

    /// Add the energy delivered at `watts` since the last update and move the
    /// timestamp to `now`. Returns the energy added.
    pub fn integrate(&mut self, watts: f64, now: Millis) -> f64 {
        if now <= self.last_update {
            return 0.0;
        }
        let delta = energy_joules(watts, now - self.last_update);
        self.total += delta;
        self.last_update = now;
        delta
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn last_update(&self) -> Millis {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_watt_for_one_second_is_one_joule() {
        assert_eq!(energy_joules(1.0, 1_000), 1.0);
        assert_eq!(energy_joules(500.0, 2_000), 1_000.0);
    }

    #[test]
    fn integrate_accumulates_per_interval() {
        let mut counter = EnergyCounter::new(0);

        assert_eq!(counter.integrate(100.0, 500), 50.0);
        assert_eq!(counter.integrate(200.0, 1_500), 200.0);

        assert_eq!(counter.total(), 250.0);
        assert_eq!(counter.last_update(), 1_500);
    }

    #[test]
    fn same_instant_adds_nothing() {
        let mut counter = EnergyCounter::new(0);
        counter.integrate(100.0, 1_000);

        assert_eq!(counter.integrate(100.0, 1_000), 0.0);
        assert_eq!(counter.total(), 100.0);
    }

    #[test]
    fn earlier_instant_is_ignored() {
        let mut counter = EnergyCounter::new(1_000);

        assert_eq!(counter.integrate(100.0, 500), 0.0);
        assert_eq!(counter.last_update(), 1_000);
    }
}
