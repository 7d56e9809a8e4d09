//! Greenflow Core -- the discrete-event flow engine behind the power models.
//!
//! This crate provides the flow graph that power sources, batteries,
//! adapters and multiplexers plug into: a node arena addressed by handles,
//! typed edges, a virtual millisecond clock, and invalidation-driven
//! scheduling.
//!
//! # Settling
//!
//! Nodes never call each other directly. A node pushes a demand or supply
//! onto one of its edges through its [`context::FlowContext`]; the engine
//! queues the signal and delivers it once the running node returns. A
//! delivered signal usually invalidates its receiver, which is re-evaluated
//! via [`node::FlowNode::on_update`] in the same pass:
//!
//! 1. **Deliver** -- Pop the oldest queued signal and hand it to the
//!    receiving endpoint.
//! 2. **Update** -- When no signal is queued, update the lowest dirty node.
//! 3. **Repeat** -- Until nothing is queued and nothing is dirty.
//!
//! # Time
//!
//! [`graph::FlowGraph::advance_to`] moves the shared [`clock::SimClock`]
//! forward, stopping at every wake time a node requested on the way and
//! settling at each stop.
//!
//! ```rust,ignore
//! let mut graph = FlowGraph::new(SimClock::new(0));
//! let source = graph.add_node(GridPowerSource::new(graph.clock().clone(), 500.0, 80.0));
//! let adapter = graph.add_node(PowerAdapter::grid_only(graph.clock().clone()));
//! graph.connect(source, adapter, EdgeRole::ToSource)?;
//! graph.advance_to(60_000)?;
//! ```
//!
//! # Key Types
//!
//! - [`graph::FlowGraph`] -- Node arena, edge table and scheduler.
//! - [`node::FlowNode`] -- Trait implemented by every participant.
//! - [`edge::EdgeRole`] -- Closed set of edge roles resolved by `match`.
//! - [`dirty::DirtyTracker`] -- Dirty set plus wake timers.

pub mod clock;
pub mod context;
pub mod dirty;
pub mod edge;
pub mod graph;
pub mod id;
pub mod node;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
