//! Carbon-aware green energy policies.

use greenflow_core::clock::Millis;
use serde::{Deserialize, Serialize};

/// Decides whether grid energy counts as green at a given instant.
///
/// The adapter consults its policy once per update and reuses the answer for
/// every routing decision taken in that update.
pub trait CarbonPolicy: std::fmt::Debug {
    fn green_energy_available(&self, carbon_intensity: f64, now: Millis) -> bool;
}

/// Green whenever the intensity is strictly below a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCarbonPolicy {
    /// gCO2/kWh.
    pub carbon_intensity_threshold: f64,
}

impl ThresholdCarbonPolicy {
    pub const DEFAULT_THRESHOLD: f64 = 100.0;

    pub fn new(carbon_intensity_threshold: f64) -> Self {
        Self {
            carbon_intensity_threshold,
        }
    }
}

impl Default for ThresholdCarbonPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl CarbonPolicy for ThresholdCarbonPolicy {
    fn green_energy_available(&self, carbon_intensity: f64, _now: Millis) -> bool {
        carbon_intensity < self.carbon_intensity_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_green() {
        let policy = ThresholdCarbonPolicy::default();
        assert!(policy.green_energy_available(50.0, 0));
        assert!(policy.green_energy_available(99.9, 1_000));
    }

    #[test]
    fn at_or_above_threshold_is_not_green() {
        let policy = ThresholdCarbonPolicy::new(100.0);
        assert!(!policy.green_energy_available(100.0, 0));
        assert!(!policy.green_energy_available(300.0, 0));
    }

    #[test]
    fn policies_are_swappable_behind_the_trait() {
        #[derive(Debug)]
        struct NightOnly;
        impl CarbonPolicy for NightOnly {
            fn green_energy_available(&self, _: f64, now: Millis) -> bool {
                now % 86_400_000 < 21_600_000
            }
        }

        let policies: Vec<Box<dyn CarbonPolicy>> =
            vec![Box::new(ThresholdCarbonPolicy::default()), Box::new(NightOnly)];
        let answers: Vec<bool> = policies
            .iter()
            .map(|p| p.green_energy_available(500.0, 3_600_000))
            .collect();
        assert_eq!(answers, vec![false, true]);
    }
}
