//! Power chain models for the Greenflow engine.
//!
//! Models how a machine's aggregate power demand is met by a grid-connected
//! source and, optionally, a battery, and integrates energy and carbon
//! emission over simulated time.
//!
//! # Design
//!
//! - Every component is a [`FlowNode`](greenflow_core::node::FlowNode) in a
//!   [`FlowGraph`](greenflow_core::graph::FlowGraph) and reports through the
//!   shared [`PowerNode`] capability.
//! - Nodes reach one another only through role-tagged edges or, for the
//!   adapter's dispatch, by [`NodeId`](greenflow_core::id::NodeId).
//! - The battery adapter routes each update's demand wholly to the grid or
//!   wholly to the battery, based on a pluggable [`CarbonPolicy`].
//! - Energy counters only ever grow by `power * elapsed_ms * 0.001`.

pub mod adapter;
pub mod battery;
pub mod carbon;
pub mod chain;
pub mod counter;
pub mod mux;
pub mod policy;
pub mod source;
pub mod telemetry;

pub use adapter::{PowerAdapter, Route};
pub use battery::{Battery, BatteryConfig, BatteryState};
pub use carbon::{CarbonFragment, CarbonTrace, Sinusoid};
pub use chain::{ChainError, PowerChain, PowerChainConfig};
pub use counter::{EnergyCounter, JOULES_PER_KWH, PowerNode};
pub use mux::Multiplexer;
pub use policy::{CarbonPolicy, ThresholdCarbonPolicy};
pub use source::GridPowerSource;
pub use telemetry::{PowerRecorder, PowerReport, PowerSample};
