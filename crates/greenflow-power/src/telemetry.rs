//! Power chain snapshots and per-interval samples.

use greenflow_core::clock::Millis;
use serde::{Deserialize, Serialize};

use crate::battery::BatteryState;

/// Battery figures at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReport {
    pub charge_level: f64,
    pub state: BatteryState,
    pub total_charge_received: f64,
    pub charge_demand: f64,
}

/// Cumulative power chain figures at one instant, with counters refreshed to
/// `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    pub timestamp: Millis,
    pub power_demand: f64,
    pub power_draw: f64,
    /// Energy delivered to the load by the adapter (J).
    pub energy_usage: f64,
    /// Share of `energy_usage` served by the battery (J).
    pub battery_energy_usage: f64,
    /// Share of `energy_usage` served by the grid source (J).
    pub source_energy_usage: f64,
    /// Everything the grid source delivered, charging included (J).
    pub grid_energy_usage: f64,
    pub carbon_intensity: f64,
    /// Cumulative emission (g).
    pub carbon_emission: f64,
    pub green_energy_available: Option<bool>,
    pub battery: Option<BatteryReport>,
}

/// One recorded interval. Energy and emission fields hold the amount
/// accrued since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: Millis,
    pub power_draw: f64,
    pub energy_usage: f64,
    pub battery_energy_usage: f64,
    pub source_energy_usage: f64,
    pub grid_energy_usage: f64,
    pub carbon_emission: f64,
    pub carbon_intensity: f64,
    pub battery_charge_level: Option<f64>,
    pub battery_state: Option<BatteryState>,
}

/// Turns cumulative reports into per-interval samples.
#[derive(Debug, Clone, Default)]
pub struct PowerRecorder {
    previous: Option<PowerReport>,
    samples: Vec<PowerSample>,
}

impl PowerRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report and return the sample for the interval it closes.
    /// The first sample covers everything since the chain was built.
    pub fn record(&mut self, report: &PowerReport) -> PowerSample {
        let delta = |now: f64, before: fn(&PowerReport) -> f64| {
            now - self.previous.as_ref().map_or(0.0, before)
        };
        let sample = PowerSample {
            timestamp: report.timestamp,
            power_draw: report.power_draw,
            energy_usage: delta(report.energy_usage, |r| r.energy_usage),
            battery_energy_usage: delta(report.battery_energy_usage, |r| r.battery_energy_usage),
            source_energy_usage: delta(report.source_energy_usage, |r| r.source_energy_usage),
            grid_energy_usage: delta(report.grid_energy_usage, |r| r.grid_energy_usage),
            carbon_emission: delta(report.carbon_emission, |r| r.carbon_emission),
            carbon_intensity: report.carbon_intensity,
            battery_charge_level: report.battery.map(|b| b.charge_level),
            battery_state: report.battery.map(|b| b.state),
        };
        self.previous = Some(*report);
        self.samples.push(sample);
        sample
    }

    pub fn samples(&self) -> &[PowerSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<PowerSample> {
        self.samples
    }

    /// Forget the previous report so the next sample starts from zero.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
