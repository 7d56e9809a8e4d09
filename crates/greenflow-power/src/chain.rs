//! Builds and tears down the nodes of one machine's power chain.
//!
//! ```text
//!   multiplexer <-[to-multiplexer]- adapter <-[to-source]- grid source
//!                                      ^                       |
//!                                 [to-battery]            [charging]
//!                                      |                       v
//!                                      +-------- battery <-----+
//! ```

use greenflow_core::edge::EdgeRole;
use greenflow_core::graph::{FlowError, FlowGraph};
use greenflow_core::id::NodeId;
use greenflow_core::node::FlowNode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapter::PowerAdapter;
use crate::battery::{Battery, BatteryConfig, BatteryConfigError};
use crate::counter::PowerNode;
use crate::policy::{CarbonPolicy, ThresholdCarbonPolicy};
use crate::source::GridPowerSource;
use crate::telemetry::{BatteryReport, PowerReport};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("invalid battery: {0}")]
    Battery(#[from] BatteryConfigError),
}

/// What to build for one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerChainConfig {
    /// Advisory grid capacity (W).
    pub source_capacity: f64,
    /// Initial grid carbon intensity (gCO2/kWh).
    pub carbon_intensity: f64,
    /// Omit for a grid-only chain.
    pub battery: Option<BatteryConfig>,
    /// Threshold for the default carbon policy.
    pub carbon_threshold: f64,
}

impl PowerChainConfig {
    pub fn grid_only(source_capacity: f64, carbon_intensity: f64) -> Self {
        Self {
            source_capacity,
            carbon_intensity,
            battery: None,
            carbon_threshold: ThresholdCarbonPolicy::DEFAULT_THRESHOLD,
        }
    }

    pub fn with_battery(mut self, battery: BatteryConfig, carbon_threshold: f64) -> Self {
        self.battery = Some(battery);
        self.carbon_threshold = carbon_threshold;
        self
    }
}

/// Handles to the nodes of a built chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerChain {
    source: NodeId,
    battery: Option<NodeId>,
    adapter: NodeId,
}

fn node_mut<T: FlowNode + 'static>(graph: &mut FlowGraph, id: NodeId) -> Result<&mut T, FlowError> {
    graph.node_mut::<T>(id).ok_or(FlowError::NodeNotFound(id))
}

impl PowerChain {
    /// Build a chain feeding `mux`, using a threshold policy for the battery.
    pub fn build(
        graph: &mut FlowGraph,
        mux: NodeId,
        config: &PowerChainConfig,
    ) -> Result<Self, ChainError> {
        let policy = Box::new(ThresholdCarbonPolicy::new(config.carbon_threshold));
        Self::build_with_policy(graph, mux, config, policy)
    }

    /// Build a chain feeding `mux` with a custom carbon policy. The policy
    /// is unused for grid-only chains.
    pub fn build_with_policy(
        graph: &mut FlowGraph,
        mux: NodeId,
        config: &PowerChainConfig,
        policy: Box<dyn CarbonPolicy>,
    ) -> Result<Self, ChainError> {
        if !graph.contains_node(mux) {
            return Err(FlowError::NodeNotFound(mux).into());
        }
        if let Some(battery) = &config.battery {
            battery.validate()?;
        }
        let clock = graph.clock().clone();
        let source = graph.add_node(GridPowerSource::new(
            clock.clone(),
            config.source_capacity,
            config.carbon_intensity,
        ));

        let (battery, adapter) = match config.battery {
            Some(battery_config) => {
                let battery = graph.add_node(Battery::new(clock.clone(), battery_config)?);
                let adapter =
                    graph.add_node(PowerAdapter::with_battery(clock, source, battery, policy));
                graph.connect(battery, adapter, EdgeRole::ToBattery)?;
                graph.connect(source, battery, EdgeRole::Charging)?;
                (Some(battery), adapter)
            }
            None => (None, graph.add_node(PowerAdapter::grid_only(clock))),
        };
        graph.connect(source, adapter, EdgeRole::ToSource)?;
        graph.connect(adapter, mux, EdgeRole::ToMultiplexer)?;

        info!(
            battery = battery.is_some(),
            capacity = config.source_capacity,
            "power chain built"
        );
        Ok(Self {
            source,
            battery,
            adapter,
        })
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn battery(&self) -> Option<NodeId> {
        self.battery
    }

    pub fn adapter(&self) -> NodeId {
        self.adapter
    }

    /// Feed a new grid carbon intensity and have the adapter re-evaluate
    /// its policy when the graph next settles.
    pub fn set_carbon_intensity(
        &self,
        graph: &mut FlowGraph,
        carbon_intensity: f64,
    ) -> Result<(), FlowError> {
        node_mut::<GridPowerSource>(graph, self.source)?.update_carbon_intensity(carbon_intensity)?;
        graph.invalidate(self.adapter)
    }

    /// Snapshot the chain with all counters refreshed to the graph's time.
    pub fn report(&self, graph: &mut FlowGraph) -> Result<PowerReport, FlowError> {
        let now = graph.now();

        let source = node_mut::<GridPowerSource>(graph, self.source)?;
        source.update_counters(now);
        let grid_energy_usage = source.total_energy_usage();
        let carbon_intensity = source.carbon_intensity();
        let carbon_emission = source.carbon_emission();

        let battery = match self.battery {
            Some(id) => {
                let battery = node_mut::<Battery>(graph, id)?;
                battery.update_counters(now);
                Some(BatteryReport {
                    charge_level: battery.charge_level(),
                    state: battery.state(),
                    total_charge_received: battery.total_charge_received(),
                    charge_demand: battery.charge_demand(),
                })
            }
            None => None,
        };

        let adapter = node_mut::<PowerAdapter>(graph, self.adapter)?;
        adapter.update_counters(now);

        Ok(PowerReport {
            timestamp: now,
            power_demand: adapter.power_demand(),
            power_draw: adapter.power_draw(),
            energy_usage: adapter.total_energy_usage(),
            battery_energy_usage: adapter.battery_energy_usage(),
            source_energy_usage: adapter.source_energy_usage(),
            grid_energy_usage,
            carbon_intensity,
            carbon_emission,
            green_energy_available: adapter.green_energy_available(),
            battery,
        })
    }

    /// Decommission the chain: close the adapter, battery and source and
    /// release every edge they hold.
    pub fn close(self, graph: &mut FlowGraph) -> Result<(), FlowError> {
        graph.remove_node(self.adapter)?;
        if let Some(battery) = self.battery {
            graph.remove_node(battery)?;
        }
        graph.remove_node(self.source)?;
        info!(at = graph.now(), "power chain closed");
        Ok(())
    }
}
