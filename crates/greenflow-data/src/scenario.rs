//! Validated scenarios and the runner that plays them against a power chain.
//!
//! A scenario drives one chain through a demand schedule and an optional
//! carbon trace. [`Scenario::run`] walks every event point in time order:
//! demand steps, carbon fragment boundaries and sample instants. At each
//! point the graph is advanced, a telemetry sample is taken if the point is a
//! sample instant, and then the inputs taking effect there are applied.

use std::path::Path;

use greenflow_core::clock::{Millis, SimClock};
use greenflow_core::graph::{FlowError, FlowGraph};
use greenflow_power::battery::BatteryConfig;
use greenflow_power::carbon::{CarbonTrace, CarbonTraceError};
use greenflow_power::chain::{ChainError, PowerChain, PowerChainConfig};
use greenflow_power::mux::Multiplexer;
use greenflow_power::telemetry::{PowerRecorder, PowerReport, PowerSample};
use tracing::{debug, info};

use crate::loader::{DataLoadError, deserialize_file, deserialize_list};
use crate::schema::{BatteryData, CarbonTraceData, ScenarioData};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Load(#[from] DataLoadError),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("invalid carbon trace: {0}")]
    Trace(#[from] CarbonTraceError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Flow(#[from] FlowError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ScenarioError {
    ScenarioError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<f64, ScenarioError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, format!("expected a finite non-negative value, got {value}")))
    }
}

/// Aggregate demand (W) taking effect at `at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandStep {
    pub at: Millis,
    pub watts: f64,
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    /// One sample per sample instant, the last one at the scenario's end.
    pub samples: Vec<PowerSample>,
    /// Cumulative figures at the scenario's end.
    pub report: PowerReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub chain: PowerChainConfig,
    pub carbon_trace: Option<CarbonTrace>,
    /// Strictly increasing in `at`, none after `duration`.
    pub demand: Vec<DemandStep>,
    pub duration: Millis,
    pub sample_interval: Millis,
}

impl Scenario {
    /// Load and validate a scenario file. Trace file paths are resolved
    /// relative to the scenario file's directory.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let data: ScenarioData = deserialize_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let scenario = Self::from_data(data, base_dir)?;
        info!(
            file = %path.display(),
            duration = scenario.duration,
            steps = scenario.demand.len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    /// Validate deserialized scenario data.
    pub fn from_data(data: ScenarioData, base_dir: &Path) -> Result<Self, ScenarioError> {
        let source = data.power_source;
        let capacity = source.capacity;
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(invalid(
                "power_source.capacity",
                format!("must be positive, got {capacity}"),
            ));
        }
        if let Some(intensity) = source.carbon_intensity {
            check_non_negative("power_source.carbon_intensity", intensity)?;
        }

        let carbon_trace = match source.carbon_trace {
            Some(CarbonTraceData::File(file)) => {
                let path = base_dir.join(file);
                Some(CarbonTrace::new(deserialize_list(&path, "fragments")?)?)
            }
            Some(CarbonTraceData::Inline(fragments)) => Some(CarbonTrace::new(fragments)?),
            None => None,
        };

        // An explicit intensity wins; otherwise start from the trace.
        let carbon_intensity = source
            .carbon_intensity
            .or_else(|| {
                let trace = carbon_trace.as_ref()?;
                trace
                    .intensity_at(0)
                    .or_else(|| trace.fragments().first().map(|f| f.intensity))
            })
            .ok_or_else(|| {
                invalid(
                    "power_source",
                    "needs carbon_intensity or a non-empty carbon_trace",
                )
            })?;

        let mut chain = PowerChainConfig::grid_only(capacity, carbon_intensity);
        if let Some(battery) = data.battery {
            let threshold = check_non_negative("battery.carbon_threshold", battery.carbon_threshold)?;
            chain = chain.with_battery(battery_config(&battery)?, threshold);
        }

        if data.duration == 0 {
            return Err(invalid("duration", "must be positive"));
        }
        let sample_interval = match data.sample_interval {
            Some(0) => return Err(invalid("sample_interval", "must be positive")),
            Some(interval) => interval,
            None => data.duration,
        };

        let mut demand: Vec<DemandStep> = Vec::with_capacity(data.demand.len());
        for step in data.demand {
            check_non_negative("demand.watts", step.watts)?;
            if let Some(previous) = demand.last().map(|s| s.at) {
                if step.at <= previous {
                    return Err(invalid(
                        "demand",
                        format!("step at {} does not follow step at {previous}", step.at),
                    ));
                }
            }
            if step.at > data.duration {
                return Err(invalid(
                    "demand",
                    format!("step at {} is after the end at {}", step.at, data.duration),
                ));
            }
            demand.push(DemandStep {
                at: step.at,
                watts: step.watts,
            });
        }

        Ok(Self {
            chain,
            carbon_trace,
            demand,
            duration: data.duration,
            sample_interval,
        })
    }

    /// Play the scenario from time zero to `duration`.
    pub fn run(&self) -> Result<ScenarioOutcome, ScenarioError> {
        let mut graph = FlowGraph::new(SimClock::new(0));
        let mux = graph.add_node(Multiplexer::new(graph.clock().clone()));
        let chain = PowerChain::build(&mut graph, mux, &self.chain)?;
        info!(
            duration = self.duration,
            sample_interval = self.sample_interval,
            "scenario started"
        );

        let mut recorder = PowerRecorder::new();
        let mut steps = self.demand.iter().peekable();
        let mut intensity = self.chain.carbon_intensity;
        let mut now: Millis = 0;

        let report = loop {
            graph.advance_to(now)?;

            // A sample closes the interval ending at `now`; inputs at `now`
            // belong to the next one.
            if now > 0 && (now % self.sample_interval == 0 || now == self.duration) {
                let report = chain.report(&mut graph)?;
                let sample = recorder.record(&report);
                debug!(
                    at = now,
                    draw = sample.power_draw,
                    energy = sample.energy_usage,
                    emission = sample.carbon_emission,
                    "sample recorded"
                );
                if now == self.duration {
                    break report;
                }
            }

            if let Some(next) = self.carbon_trace.as_ref().and_then(|t| t.intensity_at(now)) {
                if next != intensity {
                    chain.set_carbon_intensity(&mut graph, next)?;
                    intensity = next;
                }
            }
            while let Some(step) = steps.next_if(|s| s.at <= now) {
                graph.with_node::<Multiplexer, _>(mux, |m, ctx| m.set_demand(step.watts, ctx))??;
            }
            graph.settle()?;

            now = self.next_event_after(now, steps.peek().map(|s| s.at));
        };

        info!(
            energy = report.energy_usage,
            emission = report.carbon_emission,
            "scenario finished"
        );
        Ok(ScenarioOutcome {
            samples: recorder.into_samples(),
            report,
        })
    }

    fn next_event_after(&self, now: Millis, next_step: Option<Millis>) -> Millis {
        let next_sample = (now / self.sample_interval + 1).saturating_mul(self.sample_interval);
        let next_change = self
            .carbon_trace
            .as_ref()
            .and_then(|t| t.next_change_after(now));
        [Some(self.duration), Some(next_sample), next_step, next_change]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.duration)
    }
}

fn battery_config(data: &BatteryData) -> Result<BatteryConfig, ScenarioError> {
    let config = BatteryConfig::new(data.capacity, data.charge_speed)
        .with_initial_charge(data.initial_charge.unwrap_or(0.0))
        .with_bounds(
            data.lower_bound.unwrap_or(BatteryConfig::DEFAULT_LOWER_BOUND),
            data.upper_bound.unwrap_or(BatteryConfig::DEFAULT_UPPER_BOUND),
        );
    config
        .validate()
        .map_err(|e| invalid("battery", e.to_string()))?;
    Ok(config)
}
