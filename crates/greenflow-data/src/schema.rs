//! Serde data file structs for scenario definitions.
//!
//! These structs define the on-disk format of a scenario. They are
//! deserialized from RON, JSON, or TOML files and then validated into a
//! [`Scenario`](crate::scenario::Scenario).

use greenflow_power::CarbonFragment;
use serde::Deserialize;

// ===========================================================================
// Top level
// ===========================================================================

/// A scenario file: one power chain, a demand schedule and a run length.
/// Times are simulated milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioData {
    pub power_source: PowerSourceData,
    #[serde(default)]
    pub battery: Option<BatteryData>,
    #[serde(default)]
    pub demand: Vec<DemandStepData>,
    pub duration: u64,
    #[serde(default)]
    pub sample_interval: Option<u64>,
}

// ===========================================================================
// Power chain
// ===========================================================================

/// The grid connection. At least one of `carbon_intensity` and
/// `carbon_trace` must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerSourceData {
    pub capacity: f64,
    #[serde(default)]
    pub carbon_intensity: Option<f64>,
    #[serde(default)]
    pub carbon_trace: Option<CarbonTraceData>,
}

/// A carbon trace given inline or as a path to a fragment list file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CarbonTraceData {
    /// Path relative to the scenario file.
    File(String),
    Inline(Vec<CarbonFragment>),
}

/// Battery parameters. Capacity is in joules, charge speed in watts.
#[derive(Debug, Clone, Deserialize)]
pub struct BatteryData {
    pub capacity: f64,
    pub charge_speed: f64,
    pub carbon_threshold: f64,
    #[serde(default)]
    pub initial_charge: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub lower_bound: Option<f64>,
}

// ===========================================================================
// Demand
// ===========================================================================

/// Aggregate demand (W) taking effect at `at`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DemandStepData {
    pub at: u64,
    pub watts: f64,
}
